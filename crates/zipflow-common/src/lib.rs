//! Zipflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the zipflow workspace.
//!
//! # Overview
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: validated primitives carried through the ingestion pipeline
//!   ([`PostalCode`], [`EmailAddress`], [`Location`])
//! - **Errors**: [`CommonError`] and the matching [`Result`] alias
//!
//! # Example
//!
//! ```
//! use zipflow_common::{EmailAddress, PostalCode};
//!
//! let zip: PostalCode = "90210".parse().unwrap();
//! let email: EmailAddress = "user@example.com".parse().unwrap();
//! assert_eq!(zip.as_str(), "90210");
//! assert_eq!(email.domain(), "example.com");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{EmailAddress, Location, PostalCode};
