//! # scalr-provider
//!
//! Bootstrap of the Scalr API client used by the Terraform provider.
//!
//! [`Bootstrap::configure`] takes the provider settings (hostname, optional
//! token, account scoping) and produces a [`ClientHandle`] pointed at the
//! host's discovered API endpoint, authenticated with the explicit token or the
//! one stored by `terraform login`.
//!
//! ## Example
//!
//! ```no_run
//! use scalr_core::config::EnvVars;
//! use scalr_provider::{Bootstrap, ProviderSettings};
//!
//! # async fn example() -> scalr_provider::Result<()> {
//! let settings = ProviderSettings::resolve(
//!     None,
//!     None,
//!     env!("CARGO_PKG_VERSION"),
//!     &EnvVars::from_process(),
//! );
//! let client = Bootstrap::new()?.configure(&settings).await?;
//! let account: serde_json::Value = client.get_json("accounts").await?;
//! println!("{account}");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod handle;
pub mod settings;
pub mod token;

pub use bootstrap::Bootstrap;
pub use handle::{ClientAssembler, ClientHandle};
pub use settings::ProviderSettings;
pub use token::TokenResolver;

/// Result type for bootstrap operations
pub type Result<T> = scalr_core::Result<T>;
