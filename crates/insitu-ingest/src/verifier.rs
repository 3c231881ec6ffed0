//! Side-car digest verification
//!
//! A checksum problem never fails an ingestion. Every retrieval or parse
//! failure turns into an unverified [`ChecksumOutcome`] carrying a cause.

use crate::object_store::{basename, ObjectStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cause recorded when no side-car digest could be read
pub const MISSING_SIDECAR_CAUSE: &str = "missing S3 sha512";

const SIDECAR_SUFFIX: &str = ".sha512";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumOutcome {
    pub verified: bool,
    /// Empty when verified
    pub cause: String,
}

impl ChecksumOutcome {
    pub fn verified() -> Self {
        Self {
            verified: true,
            cause: String::new(),
        }
    }

    pub fn unverified(cause: impl Into<String>) -> Self {
        Self {
            verified: false,
            cause: cause.into(),
        }
    }
}

#[derive(Clone)]
pub struct ChecksumVerifier {
    object_store: Arc<dyn ObjectStore>,
}

impl ChecksumVerifier {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self { object_store }
    }

    /// Default side-car location for a source object
    pub fn sidecar_locator(locator: &str) -> String {
        format!("{}{}", locator, SIDECAR_SUFFIX)
    }

    /// Extract the digest from side-car text such as `<digest>  <basename>`
    ///
    /// Only whole tokens naming the source (optionally `*`-prefixed, as
    /// `sha512sum -b` writes them) are skipped.
    pub fn parse_sidecar(content: &str, source_basename: &str) -> Option<String> {
        content
            .split_whitespace()
            .map(|token| token.trim_start_matches('*'))
            .find(|token| !token.is_empty() && *token != source_basename)
            .map(str::to_string)
    }

    /// Fetch the expected digest; `None` when it is absent or unreadable
    pub async fn fetch_expected(&self, locator: &str, sidecar: &str) -> Option<String> {
        if let Err(e) = self.object_store.size_of(sidecar).await {
            debug!(%sidecar, error = %e, "Side-car digest not available");
            return None;
        }
        match self.object_store.read_small_text_file(sidecar).await {
            Ok(content) => Self::parse_sidecar(&content, basename(locator)),
            Err(e) => {
                debug!(%sidecar, error = %e, "Failed to read side-car digest");
                None
            },
        }
    }

    /// Compare hex digests, ignoring case
    pub fn compare(expected: Option<&str>, local: &str) -> ChecksumOutcome {
        match expected {
            None => ChecksumOutcome::unverified(MISSING_SIDECAR_CAUSE),
            Some(remote) if remote.eq_ignore_ascii_case(local) => ChecksumOutcome::verified(),
            Some(remote) => {
                ChecksumOutcome::unverified(format!("mismatched sha512: {} vs {}", remote, local))
            },
        }
    }

    /// Verify a locally computed digest against the object's side-car
    ///
    /// `sidecar` overrides the default `<locator>.sha512` location.
    pub async fn verify(
        &self,
        locator: &str,
        sidecar: Option<&str>,
        local_digest: &str,
    ) -> ChecksumOutcome {
        let sidecar = sidecar
            .map(str::to_string)
            .unwrap_or_else(|| Self::sidecar_locator(locator));
        let expected = self.fetch_expected(locator, &sidecar).await;
        let outcome = Self::compare(expected.as_deref(), local_digest);

        if outcome.verified {
            debug!(%locator, "Checksum verified");
        } else {
            warn!(%locator, %sidecar, cause = %outcome.cause, "Checksum not verified");
        }
        outcome
    }
}
