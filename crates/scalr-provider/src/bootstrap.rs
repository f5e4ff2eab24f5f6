//! Turns provider settings into a ready [`ClientHandle`].

use scalr_core::client::ClientConfig;
use scalr_core::config::{CliConfig, ConfigLocator};
use scalr_core::credentials::{CredentialsLookup, CredentialsSource};
use scalr_core::transport::{HttpTransport, Transport, TransportLayer};
use scalr_core::NormalizedHost;
use scalr_disco::{DiscoveryConfig, DiscoveryRequest, EndpointResolver, ServiceCatalog};
use std::sync::Arc;
use tracing::{debug, info};

use crate::handle::{ClientAssembler, ClientHandle};
use crate::settings::ProviderSettings;
use crate::token::TokenResolver;
use crate::Result;

/// Runs the bootstrap pipeline.
///
/// Normalize, load CLI config, install host overrides, discover, resolve the
/// endpoint, resolve the token and assemble the client. Any fatal error aborts the
/// run; the only state that outlives it is the shared [`ServiceCatalog`].
#[derive(Clone)]
pub struct Bootstrap {
    catalog: Arc<ServiceCatalog>,
    locator: ConfigLocator,
    resolver: EndpointResolver,
    client_config: ClientConfig,
    transport: Arc<dyn Transport>,
    layers: Vec<TransportLayer>,
}

impl Bootstrap {
    /// Create a bootstrap with a fresh catalog, reading config locations from
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let catalog = Arc::new(ServiceCatalog::new(DiscoveryConfig::default())?);
        Self::with_catalog(catalog, ConfigLocator::from_process(), ClientConfig::default())
    }

    /// Create a bootstrap sharing `catalog` with other bootstraps.
    ///
    /// # Errors
    ///
    /// Returns an error if the API HTTP client cannot be built.
    pub fn with_catalog(
        catalog: Arc<ServiceCatalog>,
        locator: ConfigLocator,
        client_config: ClientConfig,
    ) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&client_config)?);
        Ok(Self {
            catalog,
            locator,
            resolver: EndpointResolver::default(),
            client_config,
            transport,
            layers: Vec::new(),
        })
    }

    /// Override the ordered list of candidate services.
    #[must_use]
    pub fn with_resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Send API requests through `transport` instead of the default HTTP client.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Add a decorator to the API transport.
    #[must_use]
    pub fn with_layer(mut self, layer: TransportLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// The shared service catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ServiceCatalog> {
        &self.catalog
    }

    /// Run the pipeline.
    ///
    /// # Errors
    ///
    /// - [`scalr_core::Error::InvalidHostname`] for a malformed hostname
    /// - discovery errors from [`ServiceCatalog::discover_with`]
    /// - endpoint errors from [`EndpointResolver::resolve`]
    /// - [`scalr_core::Error::MissingToken`] when no token is available
    /// - [`scalr_core::Error::ClientConstructionFailed`] if assembly fails
    pub async fn configure(&self, settings: &ProviderSettings) -> Result<ClientHandle> {
        let host = NormalizedHost::for_comparison(&settings.hostname)?;
        debug!(host = %host, "normalized hostname");

        let config = CliConfig::load(&self.locator);
        debug!(
            hosts = config.hosts().len(),
            credentials = config.credentials().len(),
            "loaded CLI configuration"
        );

        for (override_host, host_override) in config.hosts() {
            self.catalog
                .force_host_services(override_host, host_override.services.clone())
                .await?;
        }

        let credentials = CredentialsSource::from_config(&config);
        let discovery_token = credentials.token_for(&host).ok().flatten();
        let request = DiscoveryRequest::new()
            .with_token(discovery_token.as_ref())
            .with_user_agent(&settings.user_agent);
        let services = self.catalog.discover_with(&host, request).await?;

        let endpoint = self.resolver.resolve(services.as_ref())?;
        debug!(host = %host, endpoint = %endpoint, "resolved API endpoint");

        let token = TokenResolver::resolve(settings.token.as_ref(), &host, &credentials)?;

        let handle = ClientAssembler::new(&self.client_config)
            .with_layers(self.layers.iter().cloned())
            .with_account_id(settings.account_id.clone())
            .assemble(
                &endpoint,
                token,
                Arc::clone(&self.transport),
                &settings.user_agent,
            )?;

        info!(host = %host.for_display(), endpoint = %handle.base_url(), "Scalr client configured");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalr_core::Error;
    use tempfile::TempDir;

    fn bootstrap(home: &TempDir) -> Bootstrap {
        let catalog = Arc::new(ServiceCatalog::new(DiscoveryConfig::default()).unwrap());
        Bootstrap::with_catalog(
            catalog,
            ConfigLocator::with_home(home.path()),
            ClientConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_hostname_fails_first() {
        let home = TempDir::new().unwrap();
        let settings = ProviderSettings::for_host("bad host!", "test");
        let bootstrap = bootstrap(&home);
        let err = bootstrap.configure(&settings).await.unwrap_err();
        assert!(matches!(err, Error::InvalidHostname(_)));
        let status = bootstrap.catalog().status();
        assert_eq!(status.cache_misses, 0);
        assert!(status.last_attempt.is_none());
    }

    #[tokio::test]
    async fn test_shared_catalog() {
        let home = TempDir::new().unwrap();
        let first = bootstrap(&home);
        let second = Bootstrap::with_catalog(
            Arc::clone(first.catalog()),
            ConfigLocator::with_home(home.path()),
            ClientConfig::default(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(first.catalog(), second.catalog()));
    }
}
