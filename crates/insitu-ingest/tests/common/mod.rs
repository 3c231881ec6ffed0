//! Shared fixtures for the ingestion integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use insitu_common::checksum::compute_sha512;
use insitu_ingest::object_store::LocalObjectStore;
use insitu_ingest::{
    DataLakeWriter, ExecutionModeController, IngestionOrchestrator, MetadataTable,
    ObservationLakeWriter, WriteOptions, WriterError,
};
use insitu_store::{MemoryBackend, MetadataStore, StoreSchema};
use serde_json::json;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One call seen by [`RecordingWriter`]
#[derive(Debug, Clone)]
pub struct WriterCall {
    pub path: PathBuf,
    pub job_id: String,
    pub options: WriteOptions,
    pub file_existed: bool,
    pub file_name: String,
}

/// How [`RecordingWriter`] behaves once a call is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    Delegate,
    Fail,
    Panic,
}

/// Delegates to the real lake writer, or fails on demand, and records calls
pub struct RecordingWriter {
    inner: ObservationLakeWriter,
    calls: Mutex<Vec<WriterCall>>,
    mode: WriterMode,
    count: AtomicUsize,
}

impl RecordingWriter {
    pub fn new(lake: &Path, mode: WriterMode) -> Self {
        Self {
            inner: ObservationLakeWriter::new(lake),
            calls: Mutex::new(Vec::new()),
            mode,
            count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<WriterCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataLakeWriter for RecordingWriter {
    async fn ingest(
        &self,
        path: &Path,
        job_id: &str,
        options: WriteOptions,
    ) -> Result<u64, WriterError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(WriterCall {
            path: path.to_path_buf(),
            job_id: job_id.to_string(),
            options,
            file_existed: path.is_file(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        });
        match self.mode {
            WriterMode::Delegate => self.inner.ingest(path, job_id, options).await,
            WriterMode::Fail => Err(WriterError::InvalidDocument(
                "simulated transform failure".to_string(),
            )),
            WriterMode::Panic => panic!("simulated writer panic"),
        }
    }
}

pub struct Harness {
    _dir: TempDir,
    pub source_dir: PathBuf,
    pub working_root: PathBuf,
    pub lake_dir: PathBuf,
    pub metadata: MetadataTable,
    pub writer: Arc<RecordingWriter>,
    pub orchestrator: IngestionOrchestrator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(WriterMode::Delegate).await
    }

    pub async fn failing_writer() -> Self {
        Self::build(WriterMode::Fail).await
    }

    pub async fn panicking_writer() -> Self {
        Self::build(WriterMode::Panic).await
    }

    async fn build(mode: WriterMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("source");
        let working_root = dir.path().join("work");
        let lake_dir = dir.path().join("lake");
        for d in [&source_dir, &working_root, &lake_dir] {
            std::fs::create_dir_all(d).unwrap();
        }

        let schema = StoreSchema::with_string_hash_key("parquet_metadata_tbl", "s3_url").unwrap();
        let metadata = MetadataTable::new(
            MetadataStore::new(schema, Arc::new(MemoryBackend::new())),
            "uuid-index",
        );
        metadata.ensure_table().await.unwrap();

        let writer = Arc::new(RecordingWriter::new(&lake_dir, mode));
        let orchestrator = IngestionOrchestrator::new(
            metadata.clone(),
            Arc::new(LocalObjectStore::new()),
            writer.clone(),
            &working_root,
        );

        Self {
            _dir: dir,
            source_dir,
            working_root,
            lake_dir,
            metadata,
            writer,
            orchestrator,
        }
    }

    pub fn controller(&self) -> ExecutionModeController {
        ExecutionModeController::new(self.orchestrator.clone())
    }

    /// Write a source object and return its locator
    pub fn put_source(&self, name: &str, content: &[u8]) -> String {
        let path = self.source_dir.join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    /// Write `<name>.sha512` next to the source in `sha512sum` format
    pub fn put_sidecar(&self, name: &str, digest: &str) -> String {
        let path = self.source_dir.join(format!("{}.sha512", name));
        std::fs::write(&path, format!("{}  {}\n", digest, name)).unwrap();
        path.to_string_lossy().to_string()
    }

    /// Whether any per-job working directory is left behind
    pub fn working_root_is_empty(&self) -> bool {
        std::fs::read_dir(&self.working_root).unwrap().next().is_none()
    }
}

pub fn observation_document(count: usize) -> Vec<u8> {
    let observations: Vec<_> = (0..count)
        .map(|i| json!({"latitude": i as f64 * 0.5, "longitude": -120.0, "sea_surface_temperature": 14.5}))
        .collect();
    serde_json::to_vec(&json!({
        "provider": "NCAR",
        "project": "ICOADS",
        "observations": observations
    }))
    .unwrap()
}

pub fn sha512(bytes: &[u8]) -> String {
    compute_sha512(&mut Cursor::new(bytes)).unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}
