use crate::object_store::S3Config;
use crate::record::RECORD_ATTRIBUTES;
use anyhow::{bail, Context, Result};
use insitu_common::logging::{LogConfig, LogLevel};
use insitu_store::{DynamoConfig, StoreSchema};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_METADATA_TABLE: &str = "parquet_metadata_tbl";
pub const DEFAULT_METADATA_HASH_KEY: &str = "s3_url";
pub const DEFAULT_JOB_ID_INDEX: &str = "uuid-index";
pub const DEFAULT_LAKE_DIR: &str = "./lake";
pub const DEFAULT_WORKING_DIR_NAME: &str = "insitu-ingest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Memory,
    DynamoDb,
}

impl FromStr for StoreBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackendKind::Memory),
            "dynamodb" | "dynamo" => Ok(StoreBackendKind::DynamoDb),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub table_name: String,
    pub hash_key: String,
    pub job_id_index: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_METADATA_TABLE.to_string(),
            hash_key: DEFAULT_METADATA_HASH_KEY.to_string(),
            job_id_index: DEFAULT_JOB_ID_INDEX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Parent of the per-job working directories
    pub working_root: PathBuf,
    pub lake_dir: PathBuf,
    pub metadata: MetadataConfig,
    pub store_backend: StoreBackendKind,
    pub s3: S3Config,
    pub dynamo: DynamoConfig,
}

impl IngestConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let config = Self {
            working_root: env::var("INSITU_WORKING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join(DEFAULT_WORKING_DIR_NAME)),
            lake_dir: PathBuf::from(
                env::var("INSITU_LAKE_DIR").unwrap_or_else(|_| DEFAULT_LAKE_DIR.to_string()),
            ),
            metadata: MetadataConfig {
                table_name: env::var("INSITU_METADATA_TABLE")
                    .unwrap_or_else(|_| DEFAULT_METADATA_TABLE.to_string()),
                hash_key: env::var("INSITU_METADATA_HASH_KEY")
                    .unwrap_or_else(|_| DEFAULT_METADATA_HASH_KEY.to_string()),
                job_id_index: env::var("INSITU_JOB_ID_INDEX")
                    .unwrap_or_else(|_| DEFAULT_JOB_ID_INDEX.to_string()),
            },
            store_backend: match env::var("INSITU_STORE_BACKEND") {
                Ok(kind) => kind.parse()?,
                Err(_) => StoreBackendKind::DynamoDb,
            },
            s3: S3Config::from_env(),
            dynamo: DynamoConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests and local runs: in-memory metadata, local paths
    pub fn local(working_root: impl Into<PathBuf>, lake_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
            lake_dir: lake_dir.into(),
            metadata: MetadataConfig::default(),
            store_backend: StoreBackendKind::Memory,
            s3: S3Config::for_minio("http://localhost:9000"),
            dynamo: DynamoConfig::for_local("http://localhost:8000"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.working_root.as_os_str().is_empty() {
            bail!("INSITU_WORKING_ROOT must not be empty");
        }
        if self.lake_dir.as_os_str().is_empty() {
            bail!("INSITU_LAKE_DIR must not be empty");
        }
        if self.metadata.table_name.trim().is_empty() {
            bail!("INSITU_METADATA_TABLE must not be empty");
        }
        if self.metadata.job_id_index.trim().is_empty() {
            bail!("INSITU_JOB_ID_INDEX must not be empty");
        }
        let hash_key = self.metadata.hash_key.trim();
        if hash_key.is_empty() {
            bail!("INSITU_METADATA_HASH_KEY must not be empty");
        }
        if RECORD_ATTRIBUTES.contains(&hash_key) {
            bail!(
                "INSITU_METADATA_HASH_KEY '{}' collides with a metadata record attribute",
                hash_key
            );
        }
        Ok(())
    }

    pub fn schema(&self) -> insitu_store::Result<StoreSchema> {
        StoreSchema::with_string_hash_key(&self.metadata.table_name, self.metadata.hash_key.trim())
    }
}

/// Logging configuration for the CLI
///
/// `.env` is loaded first (from `env_file`, or the working directory when
/// `None`) so `LOG_*` entries in it take effect before the subscriber is
/// installed. Variables already set in the process win over the file.
pub fn load_log_config(verbose: bool, env_file: Option<&Path>) -> Result<LogConfig> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        },
        None => {
            dotenvy::dotenv().ok();
        },
    }

    let level = if verbose { LogLevel::Debug } else { LogLevel::Info };
    LogConfig::builder()
        .level(level)
        .log_file_prefix("insitu-ingest")
        .filter_directives("aws_smithy_runtime=warn,aws_config=warn")
        .build()
        .merge_env()
}
