//! # scalr-core
//!
//! Core types for bootstrapping a Scalr API client from a user-supplied hostname,
//! an optional token and the local Terraform CLI configuration.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy shared by every bootstrap stage
//! - [`hostname`] - Hostname normalization into comparison form
//! - [`config`] - CLI configuration file discovery, parsing and merging
//! - [`credentials`] - Per-host token lookup
//! - [`services`] - Service identifiers and per-host service tables
//! - [`client`] - HTTP client configuration and retry policy
//! - [`transport`] - Pluggable HTTP transport and logging decorator

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod hostname;
pub mod services;
pub mod transport;

// Re-export commonly used types
pub use error::{Error, Result};
pub use hostname::NormalizedHost;
