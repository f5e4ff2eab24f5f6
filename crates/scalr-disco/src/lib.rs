//! # scalr-disco
//!
//! Service discovery for Scalr hosts.
//!
//! [`ServiceCatalog`] fetches and caches each host's discovery document, and
//! [`EndpointResolver`] picks the API endpoint out of the resulting service table.
//!
//! ## Example
//!
//! ```no_run
//! use scalr_core::NormalizedHost;
//! use scalr_disco::{DiscoveryConfig, EndpointResolver, ServiceCatalog};
//!
//! # async fn example() -> scalr_disco::Result<()> {
//! let catalog = ServiceCatalog::new(DiscoveryConfig::default())?;
//! let host = NormalizedHost::for_comparison("scalr.io")?;
//! let services = catalog.discover(&host).await?;
//! let endpoint = EndpointResolver::default().resolve(services.as_ref())?;
//! println!("API endpoint: {endpoint}");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod endpoint;

pub use catalog::{DiscoveryConfig, DiscoveryRequest, ServiceCatalog, MAX_DISCOVERY_DOCUMENT_BYTES};
pub use endpoint::{EndpointResolver, ServiceLookup};

/// Result type for discovery operations
pub type Result<T> = scalr_core::Result<T>;
