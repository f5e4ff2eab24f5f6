//! Host credentials lookup.

use secrecy::SecretString;
use std::collections::HashMap;

use crate::config::{CliConfig, CredentialRecord};
use crate::hostname::NormalizedHost;
use crate::Result;

/// Answers "which token belongs to host H".
#[cfg_attr(test, mockall::automock)]
pub trait CredentialsLookup: Send + Sync {
    /// Returns the token for a host, `Ok(None)` when the host has no credentials.
    ///
    /// # Errors
    ///
    /// Implementations backed by external helpers may fail; callers treat that as
    /// "not found".
    fn token_for(&self, host: &NormalizedHost) -> Result<Option<SecretString>>;
}

/// Static credentials table built from the merged CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct CredentialsSource {
    records: HashMap<NormalizedHost, CredentialRecord>,
}

impl CredentialsSource {
    /// A source with no credentials.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a source from the merged CLI configuration.
    #[must_use]
    pub fn from_config(config: &CliConfig) -> Self {
        Self {
            records: config.credentials().clone(),
        }
    }

    /// Returns the raw record for a host.
    #[must_use]
    pub fn record(&self, host: &NormalizedHost) -> Option<&CredentialRecord> {
        self.records.get(host)
    }

    /// Returns true if no host has credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CredentialsLookup for CredentialsSource {
    fn token_for(&self, host: &NormalizedHost) -> Result<Option<SecretString>> {
        Ok(self
            .record(host)
            .and_then(CredentialRecord::token)
            .map(|token| SecretString::from(token.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawCliConfig;
    use secrecy::ExposeSecret;
    use std::path::Path;

    fn host(s: &str) -> NormalizedHost {
        NormalizedHost::for_comparison(s).unwrap()
    }

    fn source(json: &str) -> CredentialsSource {
        let raw = RawCliConfig::parse(Path::new("credentials.tfrc.json"), json).unwrap();
        CredentialsSource::from_config(&CliConfig::merge(RawCliConfig::default(), raw))
    }

    #[test]
    fn test_token_found() {
        let creds = source(r#"{"credentials": {"Example.com": {"token": "abc"}}}"#);
        let token = creds.token_for(&host("example.com")).unwrap().unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }

    #[test]
    fn test_token_absent() {
        let creds = source(r#"{"credentials": {"example.com": {"token": "abc"}}}"#);
        assert!(creds.token_for(&host("other.com")).unwrap().is_none());
        assert!(CredentialsSource::empty()
            .token_for(&host("example.com"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_record_without_token() {
        let creds = source(r#"{"credentials": {"example.com": {"user": "me"}}}"#);
        assert!(creds.record(&host("example.com")).is_some());
        assert!(creds.token_for(&host("example.com")).unwrap().is_none());
    }

    #[test]
    fn test_mock_lookup() {
        let mut mock = MockCredentialsLookup::new();
        mock.expect_token_for()
            .times(1)
            .returning(|_| Ok(Some(SecretString::from("mocked".to_string()))));

        let token = mock.token_for(&host("scalr.io")).unwrap().unwrap();
        assert_eq!(token.expose_secret(), "mocked");
    }
}
