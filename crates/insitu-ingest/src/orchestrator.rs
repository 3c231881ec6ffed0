//! Ingestion state machine
//!
//! ```text
//! CheckExisting -> Transfer -> Decompress? -> Checksum -> Transform -> RecordMetadata -> Cleanup
//! ```
//!
//! Work is split in two phases. [`IngestionOrchestrator::prepare`] runs
//! everything up to and including checksum verification and returns a
//! [`PreparedIngest`]; [`IngestionOrchestrator::complete`] runs the
//! transform, records the outcome and cleans up. The working directory of
//! an attempt is removed on every exit path of either phase.
//!
//! Duplicate suppression relies on the metadata store's conditional write.
//! The existence check up front only avoids needless transfers; two racing
//! attempts may both pass it, and the conditional put then rejects one.

use crate::error::{IngestError, Result};
use crate::object_store::ObjectStore;
use crate::record::{MetadataRecord, MetadataTable};
use crate::response::IngestResponse;
use crate::verifier::{ChecksumOutcome, ChecksumVerifier};
use crate::writer::{DataLakeWriter, WriteOptions};
use chrono::Utc;
use insitu_common::{checksum, files};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Stage of an attempt, carried in log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    CheckExisting,
    Transfer,
    Decompress,
    Checksum,
    Transform,
    RecordMetadata,
    Cleanup,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::CheckExisting => "check_existing",
            IngestStage::Transfer => "transfer",
            IngestStage::Decompress => "decompress",
            IngestStage::Checksum => "checksum",
            IngestStage::Transform => "transform",
            IngestStage::RecordMetadata => "record_metadata",
            IngestStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub locator: String,
    /// Overrides the default `<locator>.sha512` side-car
    pub sidecar_locator: Option<String>,
    pub is_replacing: bool,
    pub is_sanitizing: bool,
    pub wait_till_complete: bool,
}

impl IngestRequest {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            sidecar_locator: None,
            is_replacing: false,
            is_sanitizing: true,
            wait_till_complete: true,
        }
    }

    pub fn with_sidecar(mut self, sidecar: impl Into<String>) -> Self {
        self.sidecar_locator = Some(sidecar.into());
        self
    }

    pub fn replacing(mut self, replacing: bool) -> Self {
        self.is_replacing = replacing;
        self
    }

    pub fn sanitizing(mut self, sanitizing: bool) -> Self {
        self.is_sanitizing = sanitizing;
        self
    }

    pub fn wait_till_complete(mut self, wait: bool) -> Self {
        self.wait_till_complete = wait;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.locator.trim().is_empty() {
            return Err(IngestError::Validation("locator is empty".to_string()));
        }
        if self.sidecar_locator.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(IngestError::Validation("side-car locator is empty".to_string()));
        }
        Ok(())
    }
}

/// Per-attempt scratch directory, `<working_root>/<job_id>`
///
/// Removed by [`WorkingDir::cleanup`] on the normal paths. If the owning
/// future panics or is dropped first, `Drop` removes it synchronously.
#[derive(Debug)]
pub struct WorkingDir {
    path: PathBuf,
    removed: bool,
}

impl WorkingDir {
    async fn create(root: &Path, job_id: &str) -> Result<Self> {
        let path = root.join(job_id);
        files::ensure_dir(&path).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything in it; failures are only logged
    async fn cleanup(mut self) {
        self.removed = true;
        match files::remove_dir(&self.path).await {
            Ok(()) => debug!(stage = %IngestStage::Cleanup, path = %self.path.display(), "Removed working directory"),
            Err(e) => warn!(
                stage = %IngestStage::Cleanup,
                path = %self.path.display(),
                error = %e,
                "Failed to remove working directory"
            ),
        }
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed abandoned working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove abandoned working directory"
            ),
        }
    }
}

/// Output of the prepare phase: a verified local artifact ready to transform
#[derive(Debug)]
pub struct PreparedIngest {
    pub job_id: String,
    pub locator: String,
    pub is_replacing: bool,
    pub is_sanitizing: bool,
    pub ingested_at: i64,
    /// Local file handed to the writer (decompressed when needed)
    pub artifact: PathBuf,
    pub file_size_bytes: u64,
    /// Digest of the artifact as transferred, before decompression
    pub checksum: String,
    pub checksum_outcome: ChecksumOutcome,
    working_dir: WorkingDir,
}

struct Transferred {
    artifact: PathBuf,
    file_size_bytes: u64,
    checksum: String,
    outcome: ChecksumOutcome,
}

#[derive(Clone)]
pub struct IngestionOrchestrator {
    metadata: MetadataTable,
    object_store: Arc<dyn ObjectStore>,
    writer: Arc<dyn DataLakeWriter>,
    verifier: ChecksumVerifier,
    working_root: PathBuf,
}

impl IngestionOrchestrator {
    pub fn new(
        metadata: MetadataTable,
        object_store: Arc<dyn ObjectStore>,
        writer: Arc<dyn DataLakeWriter>,
        working_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            metadata,
            verifier: ChecksumVerifier::new(object_store.clone()),
            object_store,
            writer,
            working_root: working_root.into(),
        }
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// Run the whole state machine and encode the outcome
    pub async fn ingest(&self, request: &IngestRequest) -> IngestResponse {
        match self.prepare(request).await {
            Ok(prepared) => self.complete(prepared).await,
            Err(e) => IngestResponse::failed(&e),
        }
    }

    /// Check, transfer, decompress and verify
    #[instrument(skip(self, request), fields(locator = %request.locator, replacing = request.is_replacing))]
    pub async fn prepare(&self, request: &IngestRequest) -> Result<PreparedIngest> {
        request.validate()?;
        self.check_existing(request).await?;

        let job_id = Uuid::new_v4().to_string();
        let ingested_at = Utc::now().timestamp();
        debug!(%job_id, "Starting ingestion attempt");

        let working_dir = match WorkingDir::create(&self.working_root, &job_id).await {
            Ok(dir) => dir,
            Err(e) => {
                files::remove_dir(self.working_root.join(&job_id)).await.ok();
                error!(%job_id, error = %e, "Failed to create working directory");
                return Err(e);
            },
        };

        match self.transfer(request, working_dir.path()).await {
            Ok(transferred) => Ok(PreparedIngest {
                job_id,
                locator: request.locator.clone(),
                is_replacing: request.is_replacing,
                is_sanitizing: request.is_sanitizing,
                ingested_at,
                artifact: transferred.artifact,
                file_size_bytes: transferred.file_size_bytes,
                checksum: transferred.checksum,
                checksum_outcome: transferred.outcome,
                working_dir,
            }),
            Err(e) => {
                error!(%job_id, error = %e, "Ingestion failed before transform");
                working_dir.cleanup().await;
                Err(e)
            },
        }
    }

    /// Transform, record and clean up a prepared attempt
    #[instrument(skip(self, prepared), fields(locator = %prepared.locator, job_id = %prepared.job_id))]
    pub async fn complete(&self, prepared: PreparedIngest) -> IngestResponse {
        let result = self.transform_and_record(&prepared).await;
        let PreparedIngest {
            job_id,
            checksum_outcome,
            working_dir,
            ..
        } = prepared;
        working_dir.cleanup().await;

        match result {
            Ok(record) => {
                info!(
                    records = record.record_count,
                    verified = record.checksum_verified,
                    "Ingestion complete"
                );
                IngestResponse::ingested(&job_id, &checksum_outcome)
            },
            Err(e) => {
                error!(error = %e, "Ingestion failed");
                IngestResponse::failed(&e)
            },
        }
    }

    async fn check_existing(&self, request: &IngestRequest) -> Result<()> {
        let existing = self.metadata.get_by_locator(&request.locator).await?;
        debug!(
            stage = %IngestStage::CheckExisting,
            exists = existing.is_some(),
            "Checked existing metadata"
        );
        match (existing, request.is_replacing) {
            (Some(record), false) => {
                error!(job_id = %record.job_id, "Rejected: already ingested");
                Err(IngestError::Conflict(request.locator.clone()))
            },
            (None, true) => {
                error!("Rejected: nothing to replace");
                Err(IngestError::NotFoundForReplace(request.locator.clone()))
            },
            _ => Ok(()),
        }
    }

    async fn transfer(&self, request: &IngestRequest, dir: &Path) -> Result<Transferred> {
        let downloaded = self.object_store.download(&request.locator, dir).await?;
        let checksum = checksum::sha512_file(&downloaded).await?;
        debug!(stage = %IngestStage::Transfer, path = %downloaded.display(), "Downloaded source object");

        let artifact = if files::is_gzip(&downloaded) {
            let out = files::gunzip_in_place(&downloaded).await?;
            debug!(stage = %IngestStage::Decompress, path = %out.display(), "Decompressed artifact");
            out
        } else {
            downloaded
        };
        let file_size_bytes = files::file_size(&artifact).await?;

        let outcome = self
            .verifier
            .verify(&request.locator, request.sidecar_locator.as_deref(), &checksum)
            .await;
        debug!(stage = %IngestStage::Checksum, verified = outcome.verified, "Checksum step finished");

        Ok(Transferred {
            artifact,
            file_size_bytes,
            checksum,
            outcome,
        })
    }

    async fn transform_and_record(&self, prepared: &PreparedIngest) -> Result<MetadataRecord> {
        let options = WriteOptions {
            sanitize: prepared.is_sanitizing,
            overwrite: prepared.is_replacing,
        };

        let job_start = Utc::now().timestamp();
        let record_count = self
            .writer
            .ingest(&prepared.artifact, &prepared.job_id, options)
            .await?;
        let job_end = Utc::now().timestamp();
        debug!(stage = %IngestStage::Transform, records = record_count, "Transform finished");

        let record = MetadataRecord {
            locator: prepared.locator.clone(),
            job_id: prepared.job_id.clone(),
            ingested_at: prepared.ingested_at,
            file_size_bytes: prepared.file_size_bytes,
            checksum: prepared.checksum.clone(),
            checksum_verified: prepared.checksum_outcome.verified,
            checksum_cause: prepared.checksum_outcome.cause.clone(),
            job_start,
            job_end,
            record_count,
        };

        let stored = if prepared.is_replacing {
            self.metadata.replace_record(&record).await
        } else {
            self.metadata.insert_record(&record).await
        };
        // A concurrent attempt may have won the conditional write since
        // the existence check
        stored.map_err(|e| match e {
            e if e.is_conditional() && prepared.is_replacing => {
                IngestError::NotFoundForReplace(prepared.locator.clone())
            },
            e if e.is_conditional() => IngestError::Conflict(prepared.locator.clone()),
            other => IngestError::Store(other),
        })?;
        debug!(stage = %IngestStage::RecordMetadata, replaced = prepared.is_replacing, "Recorded metadata");
        Ok(record)
    }
}
