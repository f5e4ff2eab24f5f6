//! Picks the API endpoint out of a host's service table.

use scalr_core::services::{HostServices, ServiceId, IACP_V3};
use scalr_core::Error;
use tracing::debug;
use url::Url;

use crate::Result;

/// Anything that can resolve a service identifier to a URL.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceLookup: Send + Sync {
    /// Resolve `id` to an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionNotSupported`] for a tolerable miss; any other error is fatal.
    fn service_url(&self, id: &ServiceId) -> Result<Url>;
}

impl ServiceLookup for HostServices {
    fn service_url(&self, id: &ServiceId) -> Result<Url> {
        Self::service_url(self, id)
    }
}

/// Tries candidate service identifiers in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolver {
    candidates: Vec<ServiceId>,
}

impl EndpointResolver {
    /// Create a resolver from already parsed identifiers.
    #[must_use]
    pub const fn new(candidates: Vec<ServiceId>) -> Self {
        Self { candidates }
    }

    /// Create a resolver from identifier strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidServiceId`] if any identifier is malformed.
    pub fn from_ids(ids: &[&str]) -> Result<Self> {
        let candidates = ids
            .iter()
            .map(|id| ServiceId::parse(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(candidates))
    }

    /// Candidate identifiers, most preferred first.
    #[must_use]
    pub fn candidates(&self) -> &[ServiceId] {
        &self.candidates
    }

    /// Resolve the first candidate the host supports.
    ///
    /// A version miss moves on to the next candidate. Any other error aborts
    /// immediately. When every candidate misses, the first miss is reported.
    ///
    /// # Errors
    ///
    /// - the first non-tolerable error from the lookup
    /// - the first [`Error::VersionNotSupported`] if no candidate resolves
    /// - [`Error::InvalidServiceId`] if there are no candidates
    pub fn resolve(&self, lookup: &dyn ServiceLookup) -> Result<Url> {
        if self.candidates.is_empty() {
            return Err(Error::InvalidServiceId(
                "no candidate services configured".to_string(),
            ));
        }

        let mut first_miss: Option<Error> = None;

        for id in &self.candidates {
            match lookup.service_url(id) {
                Ok(url) => {
                    debug!(service = %id, url = %url, "resolved API endpoint");
                    return Ok(url);
                }
                Err(err) if err.is_version_not_supported() => {
                    debug!(service = %id, error = %err, "service version not offered");
                    first_miss.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(first_miss.unwrap_or_else(|| {
            Error::InvalidServiceId("no candidate service resolved".to_string())
        }))
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::from_ids(&[IACP_V3]).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use scalr_core::NormalizedHost;
    use serde_json::{json, Value};

    fn vns(id: &str) -> Error {
        let id = ServiceId::parse(id).unwrap();
        Error::VersionNotSupported {
            host: "scalr.io".to_string(),
            service: id.name().to_string(),
            version: format!("v{}", id.version()),
            supported: "v3".to_string(),
        }
    }

    fn ids(ids: &[&str]) -> Vec<ServiceId> {
        ids.iter().map(|id| ServiceId::parse(id).unwrap()).collect()
    }

    #[test]
    fn test_default_candidates() {
        let resolver = EndpointResolver::default();
        assert_eq!(resolver.candidates(), ids(&[IACP_V3]).as_slice());
    }

    #[test]
    fn test_from_ids_rejects_malformed() {
        assert!(EndpointResolver::from_ids(&["iacp.v3", "nope"]).is_err());
    }

    #[test]
    fn test_first_candidate_resolves() {
        let [a, b] = <[ServiceId; 2]>::try_from(ids(&["iacp.v3", "iacp.v2"])).unwrap();
        let mut lookup = MockServiceLookup::new();
        lookup
            .expect_service_url()
            .with(eq(a.clone()))
            .times(1)
            .returning(|_| Ok(Url::parse("https://scalr.io/api/iacp/v3/").unwrap()));
        lookup.expect_service_url().with(eq(b.clone())).times(0);

        let url = EndpointResolver::new(vec![a, b]).resolve(&lookup).unwrap();
        assert_eq!(url.path(), "/api/iacp/v3/");
    }

    #[test]
    fn test_version_miss_falls_through() {
        let [a, b] = <[ServiceId; 2]>::try_from(ids(&["iacp.v4", "iacp.v3"])).unwrap();
        let mut lookup = MockServiceLookup::new();
        lookup
            .expect_service_url()
            .with(eq(a.clone()))
            .times(1)
            .returning(|_| Err(vns("iacp.v4")));
        lookup
            .expect_service_url()
            .with(eq(b.clone()))
            .times(1)
            .returning(|_| Ok(Url::parse("https://scalr.io/api/iacp/v3/").unwrap()));

        let url = EndpointResolver::new(vec![a, b]).resolve(&lookup).unwrap();
        assert_eq!(url.as_str(), "https://scalr.io/api/iacp/v3/");
    }

    #[test]
    fn test_all_misses_report_first() {
        let [a, b] = <[ServiceId; 2]>::try_from(ids(&["iacp.v4", "iacp.v5"])).unwrap();
        let mut lookup = MockServiceLookup::new();
        lookup
            .expect_service_url()
            .with(eq(a.clone()))
            .returning(|_| Err(vns("iacp.v4")));
        lookup
            .expect_service_url()
            .with(eq(b.clone()))
            .returning(|_| Err(vns("iacp.v5")));

        let err = EndpointResolver::new(vec![a, b]).resolve(&lookup).unwrap_err();
        assert_eq!(err, vns("iacp.v4"));
    }

    #[test]
    fn test_fatal_error_stops_search() {
        let [a, b] = <[ServiceId; 2]>::try_from(ids(&["iacp.v3", "iacp.v2"])).unwrap();
        let mut lookup = MockServiceLookup::new();
        lookup
            .expect_service_url()
            .with(eq(a.clone()))
            .times(1)
            .returning(|_| {
                Err(Error::ServiceNotProvided {
                    host: "scalr.io".to_string(),
                    service: "iacp".to_string(),
                })
            });
        lookup.expect_service_url().with(eq(b.clone())).times(0);

        let err = EndpointResolver::new(vec![a, b]).resolve(&lookup).unwrap_err();
        assert!(matches!(err, Error::ServiceNotProvided { .. }));
    }

    #[test]
    fn test_no_candidates() {
        let lookup = MockServiceLookup::new();
        let err = EndpointResolver::new(Vec::new()).resolve(&lookup).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidServiceId("no candidate services configured".to_string())
        );
        assert_eq!(
            err.to_string(),
            "Invalid service identifier: no candidate services configured"
        );
    }

    #[test]
    fn test_resolves_against_host_services() {
        let Value::Object(map) = json!({"iacp.v3": "/api/iacp/v3/"}) else {
            unreachable!()
        };
        let services = HostServices::new(
            NormalizedHost::for_comparison("scalr.io").unwrap(),
            Url::parse("https://scalr.io/.well-known/terraform.json").unwrap(),
            map,
        );

        let url = EndpointResolver::default().resolve(&services).unwrap();
        assert_eq!(url.as_str(), "https://scalr.io/api/iacp/v3/");
    }
}
