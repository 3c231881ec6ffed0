//! In-Situ Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the in-situ lake ingestion workspace.
//!
//! # Overview
//!
//! - **Checksums**: streaming SHA-512 digests of local artifacts
//! - **Files**: existence, size, deletion and gzip decompression helpers
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use insitu_common::{checksum, files};
//!
//! # async fn run() -> insitu_common::Result<()> {
//! let path = std::path::Path::new("/tmp/job/observations.json");
//! if files::file_exists(path).await {
//!     let digest = checksum::sha512_file(path).await?;
//!     tracing::info!(%digest, "computed digest");
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod error;
pub mod files;
pub mod logging;

pub use error::{CommonError, Result};
