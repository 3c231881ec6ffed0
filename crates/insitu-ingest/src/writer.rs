//! Data lake writer
//!
//! The orchestrator only needs "take this local file, write it under this
//! job id, tell me how many records landed". [`ObservationLakeWriter`] is
//! the shipped implementation: it reads an observation document and
//! appends one JSON line per observation under a
//! `provider=<p>/project=<q>/job_id=<id>/` partition.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

/// File name of the single part written per job partition
pub const PART_FILE_NAME: &str = "part-00000.jsonl";

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("input file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid observation document: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Drop malformed observations and null fields instead of failing
    pub sanitize: bool,
    /// Truncate the job partition instead of appending to it
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sanitize: true,
            overwrite: false,
        }
    }
}

#[async_trait]
pub trait DataLakeWriter: Send + Sync {
    /// Write the file's records under `job_id` and return how many landed
    async fn ingest(
        &self,
        path: &Path,
        job_id: &str,
        options: WriteOptions,
    ) -> Result<u64, WriterError>;
}

#[derive(Debug, Clone)]
pub struct ObservationLakeWriter {
    root: PathBuf,
}

impl ObservationLakeWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the records of one job
    pub fn partition_dir(&self, provider: &str, project: &str, job_id: &str) -> PathBuf {
        self.root
            .join(format!("provider={}", partition_value(provider)))
            .join(format!("project={}", partition_value(project)))
            .join(format!("job_id={}", partition_value(job_id)))
    }
}

fn partition_value(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '/' || c == '\\' || c == '=' { '_' } else { c })
        .collect()
}

fn required_str<'a>(document: &'a Map<String, Value>, field: &str) -> Result<&'a str, WriterError> {
    document
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| WriterError::InvalidDocument(format!("missing string field '{}'", field)))
}

/// Turn raw observations into rows, or fail on the first bad one
fn prepare_rows(
    observations: Vec<Value>,
    sanitize: bool,
) -> Result<Vec<Map<String, Value>>, WriterError> {
    let mut rows = Vec::with_capacity(observations.len());
    for (position, observation) in observations.into_iter().enumerate() {
        match observation {
            Value::Object(mut row) => {
                if sanitize {
                    row.retain(|_, value| !value.is_null());
                }
                rows.push(row);
            },
            other if sanitize => {
                warn!(position, kind = %json_kind(&other), "Dropping malformed observation");
            },
            other => {
                return Err(WriterError::InvalidDocument(format!(
                    "observation {} is a {}, expected an object",
                    position,
                    json_kind(&other)
                )))
            },
        }
    }
    Ok(rows)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl DataLakeWriter for ObservationLakeWriter {
    #[instrument(skip(self, options), fields(path = %path.display()))]
    async fn ingest(
        &self,
        path: &Path,
        job_id: &str,
        options: WriteOptions,
    ) -> Result<u64, WriterError> {
        if !insitu_common::files::file_exists(path).await {
            return Err(WriterError::MissingFile(path.to_path_buf()));
        }

        let raw = tokio::fs::read(path).await?;
        let mut document = match serde_json::from_slice::<Value>(&raw)? {
            Value::Object(map) => map,
            other => {
                return Err(WriterError::InvalidDocument(format!(
                    "top level is a {}, expected an object",
                    json_kind(&other)
                )))
            },
        };

        let provider = required_str(&document, "provider")?.to_string();
        let project = required_str(&document, "project")?.to_string();
        let observations = match document.remove("observations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(WriterError::InvalidDocument(
                    "missing array field 'observations'".to_string(),
                ))
            },
        };

        let rows = prepare_rows(observations, options.sanitize)?;

        let partition = self.partition_dir(&provider, &project, job_id);
        tokio::fs::create_dir_all(&partition).await?;
        let part = partition.join(PART_FILE_NAME);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(!options.overwrite)
            .truncate(options.overwrite)
            .open(&part)
            .await?;
        let mut out = BufWriter::new(file);

        let count = rows.len() as u64;
        for mut row in rows {
            row.insert("provider".to_string(), Value::String(provider.clone()));
            row.insert("project".to_string(), Value::String(project.clone()));
            row.insert("job_id".to_string(), Value::String(job_id.to_string()));
            let mut line = serde_json::to_vec(&Value::Object(row))?;
            line.push(b'\n');
            out.write_all(&line).await?;
        }
        out.flush().await?;

        debug!(part = %part.display(), "Wrote partition file");
        info!(%provider, %project, job_id, records = count, "Observations written to lake");
        Ok(count)
    }
}
