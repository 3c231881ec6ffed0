//! In-Situ Metadata Store
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A key-value abstraction over a table with a mandatory hash key and an
//! optional range key, used to track which source objects have been
//! ingested.
//!
//! # Overview
//!
//! - **Schema**: validated, immutable table and index definitions
//! - **Conditional writes**: insert-if-absent and replace-if-present, evaluated
//!   atomically by the backend
//! - **Pagination**: scans and index queries follow continuation tokens
//!   until the table is exhausted
//! - **Updates**: atomic server-side update expressions
//! - **Normalization**: every returned number is an `Int` when integral and a
//!   `Float` otherwise
//!
//! Two backends ship with the crate: [`MemoryBackend`] and [`DynamoBackend`].
//!
//! # Example
//!
//! ```no_run
//! use insitu_store::{MemoryBackend, MetadataStore, Record, StoreSchema, Value};
//! use std::sync::Arc;
//!
//! # async fn run() -> insitu_store::Result<()> {
//! let schema = StoreSchema::with_string_hash_key("parquet_metadata_tbl", "s3_url")?;
//! let store = MetadataStore::new(schema, Arc::new(MemoryBackend::new()));
//! store.create_table(&[]).await?;
//!
//! let mut record = Record::new();
//! record.insert("file_size".to_string(), Value::Int(3));
//! store.put_item(record, "s3://bucket/obs.json", None, false).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod condition;
pub mod dynamo;
pub mod error;
pub mod memory;
pub mod schema;
pub mod store;
pub mod update;
pub mod value;

pub use backend::{IndexQuery, Page, ReturnValues, StoreBackend, TableDescription, UpdateRequest};
pub use condition::{Condition, NativeCondition};
pub use dynamo::{DynamoBackend, DynamoConfig};
pub use error::{Result, StoreError};
pub use memory::MemoryBackend;
pub use schema::{KeyDefinition, KeyType, SecondaryIndex, StoreSchema, StoreSchemaBuilder};
pub use store::MetadataStore;
pub use value::{normalize, normalize_item, AttributeValue, Item, Record, Value};
