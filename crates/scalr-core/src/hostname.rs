//! Hostname normalization.
//!
//! User-supplied hostnames are turned into a comparison form so that spellings a user
//! would consider identical (letter case, Unicode composition, the default HTTPS port)
//! compare equal when looking up credentials, host overrides and cached discovery
//! results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Port elided from the comparison form because discovery talks HTTPS by default.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// A hostname (optionally with a port) in comparison form.
///
/// The inner string is the lowercase ASCII (Punycode) form of the host, followed by
/// `:<port>` when a non-default port was given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedHost(String);

impl NormalizedHost {
    /// Normalize a user-supplied `host[:port]` string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHostname`] when the host is empty, contains characters
    /// that are not allowed in hostnames, violates DNS length limits, fails IDNA
    /// conversion, or carries a malformed port.
    pub fn for_comparison(given: &str) -> Result<Self> {
        let (host, port) = match given.find(':') {
            Some(pos) => (&given[..pos], Some(&given[pos + 1..])),
            None => (given, None),
        };

        let port = normalize_port(given, port)?;

        if host.is_empty() {
            return Err(Error::InvalidHostname(format!(
                "empty string is not a valid hostname: {given:?}"
            )));
        }

        let ascii = idna::domain_to_ascii_strict(host).map_err(|err| {
            Error::InvalidHostname(format!("{given:?} is not a valid hostname: {err}"))
        })?;

        if ascii.is_empty() {
            return Err(Error::InvalidHostname(format!(
                "{given:?} is not a valid hostname"
            )));
        }

        Ok(Self(match port {
            Some(port) => format!("{ascii}:{port}"),
            None => ascii,
        }))
    }

    /// Returns the comparison form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the Unicode form, suitable for showing to users.
    #[must_use]
    pub fn for_display(&self) -> String {
        let (host, port) = self.split();
        let (unicode, result) = idna::domain_to_unicode(host);
        let host = if result.is_ok() { unicode } else { host.to_string() };
        match port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    /// Returns the host portion without the port.
    #[must_use]
    pub fn host(&self) -> &str {
        self.split().0
    }

    /// Returns the explicit port, if one survived normalization.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.split().1.and_then(|port| port.parse().ok())
    }

    fn split(&self) -> (&str, Option<&str>) {
        match self.0.find(':') {
            Some(pos) => (&self.0[..pos], Some(&self.0[pos + 1..])),
            None => (&self.0, None),
        }
    }
}

fn normalize_port(given: &str, port: Option<&str>) -> Result<Option<u16>> {
    let Some(port) = port else {
        return Ok(None);
    };

    if port.is_empty() {
        return Err(Error::InvalidHostname(format!(
            "port number part of {given:?} is empty"
        )));
    }

    if !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidHostname(format!(
            "port number portion of {given:?} is invalid"
        )));
    }

    let port: u16 = port.parse().map_err(|_| {
        Error::InvalidHostname(format!("port number portion of {given:?} is out of range"))
    })?;

    if port == DEFAULT_HTTPS_PORT {
        Ok(None)
    } else {
        Ok(Some(port))
    }
}

impl fmt::Display for NormalizedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NormalizedHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::for_comparison(s)
    }
}

impl TryFrom<String> for NormalizedHost {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::for_comparison(&value)
    }
}

impl From<NormalizedHost> for String {
    fn from(host: NormalizedHost) -> Self {
        host.0
    }
}

impl AsRef<str> for NormalizedHost {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(s: &str) -> NormalizedHost {
        NormalizedHost::for_comparison(s).unwrap()
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(normalize("Scalr.IO"), normalize("scalr.io"));
        assert_eq!(normalize("EXAMPLE.COM").as_str(), "example.com");
    }

    #[test]
    fn test_unicode_normalization_forms() {
        // precomposed vs. combining acute accent
        let composed = normalize("caf\u{e9}.example.com");
        let decomposed = normalize("cafe\u{301}.example.com");
        assert_eq!(composed, decomposed);
        assert_eq!(composed.as_str(), "xn--caf-dma.example.com");
    }

    #[test]
    fn test_unicode_case_folding() {
        assert_eq!(normalize("CAF\u{c9}.example.com"), normalize("caf\u{e9}.example.com"));
    }

    #[test]
    fn test_for_display_round_trips_unicode() {
        let host = normalize("caf\u{e9}.example.com:8443");
        assert_eq!(host.for_display(), "caf\u{e9}.example.com:8443");
    }

    #[test]
    fn test_default_port_elided() {
        assert_eq!(normalize("scalr.io:443"), normalize("scalr.io"));
        assert_eq!(normalize("scalr.io:443").port(), None);
    }

    #[test]
    fn test_custom_port_kept() {
        let host = normalize("Scalr.io:8443");
        assert_eq!(host.as_str(), "scalr.io:8443");
        assert_eq!(host.host(), "scalr.io");
        assert_eq!(host.port(), Some(8443));
        assert_ne!(host, normalize("scalr.io"));
    }

    #[test]
    fn test_ip_address_host() {
        assert_eq!(normalize("127.0.0.1:8080").as_str(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_hostnames() {
        for bad in [
            "",
            ":443",
            "scalr.io:",
            "scalr.io:abc",
            "scalr.io:99999",
            "scalr io",
            "scalr/io",
            "scalr@io",
        ] {
            let result = NormalizedHost::for_comparison(bad);
            assert!(
                matches!(result, Err(Error::InvalidHostname(_))),
                "expected {bad:?} to be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn test_label_too_long() {
        let label = "a".repeat(64);
        let result = NormalizedHost::for_comparison(&format!("{label}.example.com"));
        assert!(matches!(result, Err(Error::InvalidHostname(_))));
    }

    #[test]
    fn test_deterministic() {
        let first = normalize("App.Scalr.io");
        let second = normalize("App.Scalr.io");
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_str_and_serde() {
        let host: NormalizedHost = "Example.COM".parse().unwrap();
        assert_eq!(host.to_string(), "example.com");

        let json = serde_json::to_string(&host).unwrap();
        assert_eq!(json, "\"example.com\"");

        let decoded: NormalizedHost = serde_json::from_str("\"EXAMPLE.com\"").unwrap();
        assert_eq!(decoded, host);

        assert!(serde_json::from_str::<NormalizedHost>("\"bad host\"").is_err());
    }
}
