//! In-Situ Ingestion
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests observation files into a partitioned data lake exactly once per
//! source object, recording provenance and checksum status in a metadata
//! table.
//!
//! # Example
//!
//! ```no_run
//! use insitu_ingest::{IngestApp, IngestConfig, IngestRequest};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = IngestConfig::load()?;
//! let app = IngestApp::build(&config).await?;
//! app.metadata.ensure_table().await?;
//!
//! let response = app
//!     .controller
//!     .execute(IngestRequest::new("s3://insitu-data/obs.json.gz"))
//!     .await;
//! println!("{}", response.to_json());
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod execution;
pub mod object_store;
pub mod orchestrator;
pub mod record;
pub mod response;
pub mod verifier;
pub mod writer;

pub use app::IngestApp;
pub use config::{IngestConfig, MetadataConfig, StoreBackendKind};
pub use error::{IngestError, Result};
pub use execution::ExecutionModeController;
pub use object_store::{ObjectStore, ObjectStoreError, ObjectStoreRouter};
pub use orchestrator::{IngestRequest, IngestionOrchestrator, PreparedIngest};
pub use record::{MetadataRecord, MetadataTable};
pub use response::IngestResponse;
pub use verifier::{ChecksumOutcome, ChecksumVerifier};
pub use writer::{DataLakeWriter, ObservationLakeWriter, WriteOptions, WriterError};
