//! Source object access
//!
//! Locators are opaque strings. `s3://bucket/key` locators are served by
//! [`S3ObjectStore`]; plain paths and `file://` URLs by
//! [`LocalObjectStore`]. [`ObjectStoreRouter`] picks between them per call.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod config;
pub mod local;
pub mod s3;

pub use config::S3Config;
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Upper bound for [`ObjectStore::read_small_text_file`] (1 MiB)
pub const MAX_SMALL_TEXT_BYTES: u64 = 1024 * 1024;

const S3_SCHEME: &str = "s3://";

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("object {locator} is {size} bytes, larger than the {limit} byte text limit")]
    TooLarge { locator: String, size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    pub(crate) fn invalid(locator: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy the object into `dest_dir` under its basename and return the path
    async fn download(&self, locator: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Read a small object (such as a digest side-car) as UTF-8 text
    async fn read_small_text_file(&self, locator: &str) -> Result<String>;

    /// Size of the object in bytes; `NotFound` when it does not exist
    async fn size_of(&self, locator: &str) -> Result<u64>;
}

/// Last path segment of a locator
pub fn basename(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}

/// Dispatches `s3://` locators to S3 and everything else to the local
/// file system
pub struct ObjectStoreRouter {
    s3: Option<S3ObjectStore>,
    local: LocalObjectStore,
}

impl ObjectStoreRouter {
    pub fn new(s3: Option<S3ObjectStore>) -> Self {
        Self {
            s3,
            local: LocalObjectStore::new(),
        }
    }

    fn route(&self, locator: &str) -> Result<&dyn ObjectStore> {
        if locator.starts_with(S3_SCHEME) {
            self.s3
                .as_ref()
                .map(|s3| s3 as &dyn ObjectStore)
                .ok_or_else(|| ObjectStoreError::invalid(locator, "S3 access is not configured"))
        } else {
            Ok(&self.local)
        }
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreRouter {
    async fn download(&self, locator: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.route(locator)?.download(locator, dest_dir).await
    }

    async fn read_small_text_file(&self, locator: &str) -> Result<String> {
        self.route(locator)?.read_small_text_file(locator).await
    }

    async fn size_of(&self, locator: &str) -> Result<u64> {
        self.route(locator)?.size_of(locator).await
    }
}
