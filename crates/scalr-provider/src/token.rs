//! Token precedence between explicit input and stored credentials.

use scalr_core::credentials::CredentialsLookup;
use scalr_core::{Error, NormalizedHost};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::Result;

/// Picks the bearer token for a host.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenResolver;

impl TokenResolver {
    /// Resolve the token for `host`.
    ///
    /// A non-empty explicit token is returned as is and the credentials are not
    /// consulted. Credential lookup failures are logged and treated as "not found".
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingToken`] when neither source yields a token.
    pub fn resolve(
        explicit: Option<&SecretString>,
        host: &NormalizedHost,
        credentials: &dyn CredentialsLookup,
    ) -> Result<SecretString> {
        if let Some(token) = explicit.filter(|token| !token.expose_secret().is_empty()) {
            debug!(host = %host, "using explicitly configured token");
            return Ok(SecretString::from(token.expose_secret().to_string()));
        }

        match credentials.token_for(host) {
            Ok(Some(token)) if !token.expose_secret().is_empty() => {
                debug!(host = %host, "using token from CLI credentials");
                return Ok(token);
            }
            Ok(_) => {}
            Err(err) => {
                debug!(host = %host, error = %err, "failed to get credentials for host (ignoring)");
            }
        }

        Err(Error::MissingToken(format!(
            "set a token in the provider configuration, the SCALR_TOKEN environment \
             variable, or a credentials block for {host}"
        )))
    }
}
