//! Ingestion metadata records
//!
//! One [`MetadataRecord`] per ingested source object, keyed by its locator.
//! [`MetadataTable`] is the typed view the orchestrator uses; it never
//! bypasses the store's conditional writes.

use insitu_store::{KeyDefinition, MetadataStore, Record, SecondaryIndex, StoreError, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

pub const JOB_ID_ATTR: &str = "uuid";
pub const INGESTED_DATE_ATTR: &str = "ingested_date";
pub const FILE_SIZE_ATTR: &str = "file_size";
pub const CHECKSUM_ATTR: &str = "checksum";
pub const CHECKSUM_VALIDATION_ATTR: &str = "checksum_validation";
pub const CHECKSUM_CAUSE_ATTR: &str = "checksum_cause";
pub const JOB_START_ATTR: &str = "job_start_time";
pub const JOB_END_ATTR: &str = "job_end_time";
pub const RECORDS_COUNT_ATTR: &str = "records_count";

/// Attribute names owned by the record body; the hash key may not reuse them
pub const RECORD_ATTRIBUTES: [&str; 9] = [
    JOB_ID_ATTR,
    INGESTED_DATE_ATTR,
    FILE_SIZE_ATTR,
    CHECKSUM_ATTR,
    CHECKSUM_VALIDATION_ATTR,
    CHECKSUM_CAUSE_ATTR,
    JOB_START_ATTR,
    JOB_END_ATTR,
    RECORDS_COUNT_ATTR,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub locator: String,
    pub job_id: String,
    /// Epoch seconds at which the attempt started
    pub ingested_at: i64,
    pub file_size_bytes: u64,
    pub checksum: String,
    pub checksum_verified: bool,
    /// Empty when the checksum was verified
    pub checksum_cause: String,
    pub job_start: i64,
    pub job_end: i64,
    pub record_count: u64,
}

fn to_int(name: &str, value: u64) -> Result<Value, StoreError> {
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| StoreError::Validation(format!("{} {} does not fit in i64", name, value)))
}

fn take_str(record: &mut Record, name: &str) -> Result<String, StoreError> {
    match record.remove(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(StoreError::Validation(format!(
            "attribute '{}' should be a string, got {:?}",
            name, other
        ))),
        None => Err(StoreError::Validation(format!("missing attribute '{}'", name))),
    }
}

fn take_int(record: &mut Record, name: &str) -> Result<i64, StoreError> {
    record
        .remove(name)
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| StoreError::Validation(format!("missing integer attribute '{}'", name)))
}

fn take_count(record: &mut Record, name: &str) -> Result<u64, StoreError> {
    let raw = take_int(record, name)?;
    u64::try_from(raw)
        .map_err(|_| StoreError::Validation(format!("attribute '{}' is negative: {}", name, raw)))
}

impl MetadataRecord {
    /// Record body without the hash key, which the store writes itself
    pub fn to_record(&self) -> Result<Record, StoreError> {
        let mut record = Record::new();
        record.insert(JOB_ID_ATTR.to_string(), Value::from(self.job_id.as_str()));
        record.insert(INGESTED_DATE_ATTR.to_string(), Value::Int(self.ingested_at));
        record.insert(FILE_SIZE_ATTR.to_string(), to_int(FILE_SIZE_ATTR, self.file_size_bytes)?);
        record.insert(CHECKSUM_ATTR.to_string(), Value::from(self.checksum.as_str()));
        record.insert(
            CHECKSUM_VALIDATION_ATTR.to_string(),
            Value::Bool(self.checksum_verified),
        );
        record.insert(
            CHECKSUM_CAUSE_ATTR.to_string(),
            Value::from(self.checksum_cause.as_str()),
        );
        record.insert(JOB_START_ATTR.to_string(), Value::Int(self.job_start));
        record.insert(JOB_END_ATTR.to_string(), Value::Int(self.job_end));
        record.insert(
            RECORDS_COUNT_ATTR.to_string(),
            to_int(RECORDS_COUNT_ATTR, self.record_count)?,
        );
        Ok(record)
    }

    pub fn from_record(hash_key: &str, mut record: Record) -> Result<Self, StoreError> {
        let checksum_verified = match record.remove(CHECKSUM_VALIDATION_ATTR) {
            Some(Value::Bool(b)) => b,
            _ => {
                return Err(StoreError::Validation(format!(
                    "missing boolean attribute '{}'",
                    CHECKSUM_VALIDATION_ATTR
                )))
            },
        };
        let checksum_cause = match record.remove(CHECKSUM_CAUSE_ATTR) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };

        Ok(Self {
            locator: take_str(&mut record, hash_key)?,
            job_id: take_str(&mut record, JOB_ID_ATTR)?,
            ingested_at: take_int(&mut record, INGESTED_DATE_ATTR)?,
            file_size_bytes: take_count(&mut record, FILE_SIZE_ATTR)?,
            checksum: take_str(&mut record, CHECKSUM_ATTR)?,
            checksum_verified,
            checksum_cause,
            job_start: take_int(&mut record, JOB_START_ATTR)?,
            job_end: take_int(&mut record, JOB_END_ATTR)?,
            record_count: take_count(&mut record, RECORDS_COUNT_ATTR)?,
        })
    }
}

/// Typed repository over the metadata table
#[derive(Debug, Clone)]
pub struct MetadataTable {
    store: MetadataStore,
    job_id_index: String,
}

impl MetadataTable {
    pub fn new(store: MetadataStore, job_id_index: impl Into<String>) -> Self {
        Self {
            store,
            job_id_index: job_id_index.into(),
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    fn hash_key(&self) -> &str {
        &self.store.schema().hash_key().name
    }

    /// Create the table and its job id index unless it already exists
    ///
    /// Returns whether the table was created by this call.
    #[instrument(skip(self), fields(table = self.store.table_name()))]
    pub async fn ensure_table(&self) -> Result<bool, StoreError> {
        if self.store.table_exists().await? {
            debug!("Metadata table already exists");
            return Ok(false);
        }
        let index = SecondaryIndex::new(&self.job_id_index, KeyDefinition::string(JOB_ID_ATTR));
        match self.store.create_table(&[index]).await {
            Ok(()) => {
                info!(index = %self.job_id_index, "Created metadata table");
                Ok(true)
            },
            Err(StoreError::TableExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_locator(&self, locator: &str) -> Result<Option<MetadataRecord>, StoreError> {
        self.store
            .get_item(locator, None)
            .await?
            .map(|record| MetadataRecord::from_record(self.hash_key(), record))
            .transpose()
    }

    pub async fn get_by_job_id(&self, job_id: &str) -> Result<Option<MetadataRecord>, StoreError> {
        let mut key = Record::new();
        key.insert(JOB_ID_ATTR.to_string(), Value::from(job_id));
        self.store
            .query_index(&self.job_id_index, key)
            .await?
            .into_iter()
            .next()
            .map(|record| MetadataRecord::from_record(self.hash_key(), record))
            .transpose()
    }

    /// Insert the first record for a locator; `Conflict` if one exists
    pub async fn insert_record(&self, record: &MetadataRecord) -> Result<(), StoreError> {
        self.store
            .put_item(record.to_record()?, record.locator.as_str(), None, false)
            .await
    }

    /// Supersede the existing record for a locator; `NotFound` if none exists
    pub async fn replace_record(&self, record: &MetadataRecord) -> Result<(), StoreError> {
        self.store
            .put_item(record.to_record()?, record.locator.as_str(), None, true)
            .await
    }

    pub async fn list(&self) -> Result<Vec<MetadataRecord>, StoreError> {
        self.store
            .scan_table(None)
            .await?
            .into_iter()
            .map(|record| MetadataRecord::from_record(self.hash_key(), record))
            .collect()
    }
}
