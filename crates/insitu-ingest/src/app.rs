//! Wiring of configuration into a ready-to-use ingestion pipeline

use crate::config::{IngestConfig, StoreBackendKind};
use crate::execution::ExecutionModeController;
use crate::object_store::{ObjectStoreRouter, S3ObjectStore};
use crate::orchestrator::IngestionOrchestrator;
use crate::record::MetadataTable;
use crate::writer::ObservationLakeWriter;
use anyhow::{Context, Result};
use insitu_store::{DynamoBackend, MemoryBackend, MetadataStore, StoreBackend};
use std::sync::Arc;
use tracing::info;

pub struct IngestApp {
    pub metadata: MetadataTable,
    pub controller: ExecutionModeController,
}

impl IngestApp {
    pub async fn build(config: &IngestConfig) -> Result<Self> {
        let schema = config.schema().context("Invalid metadata table schema")?;
        let backend: Arc<dyn StoreBackend> = match config.store_backend {
            StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
            StoreBackendKind::DynamoDb => Arc::new(DynamoBackend::new(config.dynamo.clone()).await),
        };
        let metadata = MetadataTable::new(
            MetadataStore::new(schema, backend),
            &config.metadata.job_id_index,
        );

        let s3 = S3ObjectStore::new(config.s3.clone()).await;
        let object_store = Arc::new(ObjectStoreRouter::new(Some(s3)));
        let writer = Arc::new(ObservationLakeWriter::new(&config.lake_dir));

        let orchestrator = IngestionOrchestrator::new(
            metadata.clone(),
            object_store,
            writer,
            &config.working_root,
        );

        info!(
            backend = ?config.store_backend,
            table = %config.metadata.table_name,
            working_root = %config.working_root.display(),
            lake_dir = %config.lake_dir.display(),
            "Ingestion pipeline ready"
        );

        Ok(Self {
            metadata,
            controller: ExecutionModeController::new(orchestrator),
        })
    }
}
