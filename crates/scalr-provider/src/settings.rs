//! Provider arguments merged with their environment defaults.

use scalr_core::config::EnvVars;
use secrecy::SecretString;

/// Environment variable providing the default hostname.
pub const HOSTNAME_ENV: &str = "SCALR_HOSTNAME";

/// Environment variable providing the default token.
pub const TOKEN_ENV: &str = "SCALR_TOKEN";

/// Environment variable scoping requests to an account.
pub const ACCOUNT_ID_ENV: &str = "SCALR_ACCOUNT_ID";

/// Hostname used when neither the provider block nor the environment sets one.
pub const DEFAULT_HOSTNAME: &str = "scalr.io";

/// Product name sent in the `User-Agent` header.
pub const USER_AGENT_PRODUCT: &str = "terraform-provider-scalr";

/// Inputs to a bootstrap run.
#[derive(Debug)]
pub struct ProviderSettings {
    /// Hostname as written by the user, not yet normalized
    pub hostname: String,

    /// Explicit token; `None` defers to the CLI credentials
    pub token: Option<SecretString>,

    /// Account scoping for sibling components
    pub account_id: Option<String>,

    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl ProviderSettings {
    /// Merge explicit provider arguments with environment defaults.
    ///
    /// Explicit non-empty arguments win; the hostname finally falls back to
    /// [`DEFAULT_HOSTNAME`].
    #[must_use]
    pub fn resolve(
        hostname: Option<&str>,
        token: Option<&str>,
        version: &str,
        env: &EnvVars,
    ) -> Self {
        let hostname = non_empty(hostname)
            .or_else(|| env.get(HOSTNAME_ENV))
            .unwrap_or(DEFAULT_HOSTNAME)
            .to_string();

        let token = non_empty(token)
            .or_else(|| env.get(TOKEN_ENV))
            .map(|token| SecretString::from(token.to_string()));

        Self {
            hostname,
            token,
            account_id: env.get(ACCOUNT_ID_ENV).map(str::to_string),
            user_agent: user_agent(version),
        }
    }

    /// Settings for a hostname with no token and no environment defaults.
    #[must_use]
    pub fn for_host(hostname: impl Into<String>, version: &str) -> Self {
        Self {
            hostname: hostname.into(),
            token: None,
            account_id: None,
            user_agent: user_agent(version),
        }
    }

    /// Set the explicit token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the account id.
    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

/// The provider `User-Agent` for a release version.
#[must_use]
pub fn user_agent(version: &str) -> String {
    format!("{USER_AGENT_PRODUCT}/{version}")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
