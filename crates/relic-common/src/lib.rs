//! Relic Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the Relic workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber bootstrap shared by every binary
//! - **Checksums**: SHA-256 digests for binaries sent to a repository
//! - **Timestamps**: run directory names and ledger timestamps
//!
//! # Example
//!
//! ```no_run
//! use relic_common::checksum::{digest_header, sha256_async};
//! use relic_common::Result;
//!
//! async fn print_digest(path: &str) -> Result<()> {
//!     let mut file = tokio::fs::File::open(path).await?;
//!     let digest = digest_header(&sha256_async(&mut file).await?);
//!     tracing::info!(%digest, "computed digest");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod timestamp;

// Re-export commonly used types
pub use error::{CommonError, Result};
