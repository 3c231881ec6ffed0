//! The metadata store facade
//!
//! [`MetadataStore`] binds a validated [`StoreSchema`] to a backend. It
//! builds and checks primary keys, turns the `replace` flag of
//! [`put_item`](MetadataStore::put_item) into an atomic write condition,
//! drives pagination, and normalizes every item it returns.

use crate::backend::{IndexQuery, ReturnValues, StoreBackend, UpdateRequest};
use crate::condition::{Condition, NativeCondition};
use crate::error::{Result, StoreError};
use crate::schema::{KeyDefinition, SecondaryIndex, StoreSchema};
use crate::value::{into_item, normalize_item, AttributeValue, Item, Record, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Page size of the first scan request
pub const FIRST_SCAN_PAGE_LIMIT: usize = 1;

/// Page size of every scan request after the first
pub const SCAN_PAGE_LIMIT: usize = 100;

/// Page size of index queries
pub const QUERY_PAGE_LIMIT: usize = 100;

#[derive(Clone)]
pub struct MetadataStore {
    schema: Arc<StoreSchema>,
    backend: Arc<dyn StoreBackend>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    pub fn new(schema: StoreSchema, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            schema: Arc::new(schema),
            backend,
        }
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        self.schema.table_name()
    }

    /// Probe the backing table
    ///
    /// Only "table not found" maps to `Ok(false)`. Every other failure is
    /// reported as `StoreUnavailable` so an outage is never mistaken for an
    /// absent table.
    #[instrument(skip(self), fields(table = self.table_name()))]
    pub async fn table_exists(&self) -> Result<bool> {
        match self.backend.describe_table(self.table_name()).await {
            Ok(description) => {
                debug!(status = ?description.status, "Table exists");
                Ok(true)
            },
            Err(StoreError::TableNotFound(_)) => Ok(false),
            Err(err @ StoreError::StoreUnavailable { .. }) => Err(err),
            Err(other) => Err(StoreError::unavailable(other.to_string(), false)),
        }
    }

    /// Create the table with the schema's keys and the given indexes
    #[instrument(skip(self, indexes), fields(table = self.table_name()))]
    pub async fn create_table(&self, indexes: &[SecondaryIndex]) -> Result<()> {
        for index in indexes {
            index.validate()?;
        }
        self.backend.create_table(&self.schema, indexes).await
    }

    pub async fn get_item(
        &self,
        hash: impl Into<Value>,
        range: Option<Value>,
    ) -> Result<Option<Record>> {
        let key = self.key(hash.into(), range)?;
        debug!(table = self.table_name(), key = %self.key_label(&key), "Getting item");
        Ok(self
            .backend
            .get_item(self.table_name(), key)
            .await?
            .map(normalize_item))
    }

    /// Delete an item and return its previous attributes, if any
    pub async fn delete_item(
        &self,
        hash: impl Into<Value>,
        range: Option<Value>,
    ) -> Result<Option<Record>> {
        let key = self.key(hash.into(), range)?;
        debug!(table = self.table_name(), key = %self.key_label(&key), "Deleting item");
        Ok(self
            .backend
            .delete_item(self.table_name(), key)
            .await?
            .map(normalize_item))
    }

    /// Write a whole item under the given key
    ///
    /// With `replace == false` the write only succeeds when no item has this
    /// key (`Conflict` otherwise). With `replace == true` it only succeeds
    /// when one does (`NotFound` otherwise). The backend evaluates the
    /// condition atomically with the write.
    pub async fn put_item(
        &self,
        item: Record,
        hash: impl Into<Value>,
        range: Option<Value>,
        replace: bool,
    ) -> Result<()> {
        let key = self.key(hash.into(), range)?;
        let label = self.key_label(&key);

        let condition = if replace {
            key.iter()
                .map(|(name, value)| Condition::Equals(name.clone(), value.clone()))
                .fold(None, |acc: Option<NativeCondition>, part| match acc {
                    Some(acc) => Some(acc.and(part)),
                    None => Some(part),
                })
        } else {
            Some(Condition::not_exists(self.schema.hash_key().name.clone()))
        };

        let mut native = into_item(item)?;
        native.extend(key);
        debug!(table = self.table_name(), key = %label, replace, "Putting item");

        match self.backend.put_item(self.table_name(), native, condition).await {
            Err(StoreError::ConditionFailed) if replace => Err(StoreError::NotFound {
                table: self.table_name().to_string(),
                key: label,
            }),
            Err(StoreError::ConditionFailed) => Err(StoreError::Conflict {
                table: self.table_name().to_string(),
                key: label,
            }),
            other => other,
        }
    }

    /// Apply an update expression atomically
    ///
    /// Returns all new attributes when `return_new`, otherwise all old ones
    /// (`None` when the item did not exist before).
    pub async fn update_item(
        &self,
        expression: &str,
        names: HashMap<String, String>,
        values: HashMap<String, Value>,
        hash: impl Into<Value>,
        range: Option<Value>,
        return_new: bool,
    ) -> Result<Option<Record>> {
        let key = self.key(hash.into(), range)?;
        let values = values
            .into_iter()
            .map(|(placeholder, value)| Ok((placeholder, value.into_attribute()?)))
            .collect::<Result<HashMap<_, _>>>()?;
        debug!(table = self.table_name(), key = %self.key_label(&key), expression, "Updating item");

        let request = UpdateRequest {
            expression: expression.to_string(),
            names,
            values,
            return_values: if return_new {
                ReturnValues::AllNew
            } else {
                ReturnValues::AllOld
            },
        };
        Ok(self
            .backend
            .update_item(self.table_name(), key, request)
            .await?
            .map(normalize_item))
    }

    /// Scan the whole table, following continuation tokens until exhausted
    #[instrument(skip(self, filter), fields(table = self.table_name()))]
    pub async fn scan_table(&self, filter: Option<Condition>) -> Result<Vec<Record>> {
        let filter = filter
            .map(|f| f.try_map(&mut Value::into_attribute))
            .transpose()?;

        let mut records = Vec::new();
        let mut start = None;
        let mut limit = FIRST_SCAN_PAGE_LIMIT;
        let mut pages = 0usize;

        loop {
            let page = self
                .backend
                .scan_page(self.table_name(), filter.as_ref(), limit, start.take())
                .await?;
            pages += 1;
            records.extend(page.items.into_iter().map(normalize_item));

            match page.last_evaluated_key {
                Some(next) => {
                    start = Some(next);
                    limit = SCAN_PAGE_LIMIT;
                },
                None => break,
            }
        }

        debug!(pages, items = records.len(), "Scan complete");
        Ok(records)
    }

    /// Equality lookup on a secondary index
    ///
    /// `key` must hold exactly one attribute, the index's hash key.
    #[instrument(skip(self, key), fields(table = self.table_name()))]
    pub async fn query_index(&self, index_name: &str, key: Record) -> Result<Vec<Record>> {
        if key.len() != 1 {
            return Err(StoreError::Validation(format!(
                "index queries take exactly one key attribute, got {}",
                key.len()
            )));
        }
        let Some((attribute, value)) = key.into_iter().next() else {
            return Ok(Vec::new());
        };
        let query = IndexQuery {
            index_name: index_name.to_string(),
            attribute,
            value: value.into_attribute()?,
        };

        let mut records = Vec::new();
        let mut start = None;
        loop {
            let page = self
                .backend
                .query_page(self.table_name(), &query, QUERY_PAGE_LIMIT, start.take())
                .await?;
            records.extend(page.items.into_iter().map(normalize_item));
            match page.last_evaluated_key {
                Some(next) => start = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    fn key(&self, hash: Value, range: Option<Value>) -> Result<Item> {
        let mut key = Item::new();
        let hash_key = self.schema.hash_key();
        key.insert(hash_key.name.clone(), key_value(hash_key, hash)?);

        match (self.schema.range_key(), range) {
            (Some(range_key), Some(range)) => {
                key.insert(range_key.name.clone(), key_value(range_key, range)?);
            },
            (Some(range_key), None) => {
                return Err(StoreError::Validation(format!(
                    "missing value for range key '{}'",
                    range_key.name
                )))
            },
            (None, Some(_)) => {
                return Err(StoreError::Validation(format!(
                    "table {} has no range key",
                    self.table_name()
                )))
            },
            (None, None) => {},
        }
        Ok(key)
    }

    fn key_label(&self, key: &Item) -> String {
        key.iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn key_value(definition: &KeyDefinition, value: Value) -> Result<AttributeValue> {
    let value = value.into_attribute()?;
    if !definition.key_type.matches(&value) {
        return Err(StoreError::Validation(format!(
            "key '{}' must be of type {}, got {}",
            definition.name,
            definition.key_type,
            value.type_name()
        )));
    }
    match &value {
        AttributeValue::S(s) if s.is_empty() => Err(StoreError::Validation(format!(
            "key '{}' must not be empty",
            definition.name
        ))),
        AttributeValue::B(b) if b.is_empty() => Err(StoreError::Validation(format!(
            "key '{}' must not be empty",
            definition.name
        ))),
        _ => Ok(value),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::{Page, TableDescription};
    use crate::memory::MemoryBackend;
    use async_trait::async_trait;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn ranged_store() -> MetadataStore {
        let schema = StoreSchema::builder()
            .table_name("readings")
            .hash_key("device", "S")
            .range_key("seq", "N")
            .build()
            .unwrap();
        let store = MetadataStore::new(schema, Arc::new(MemoryBackend::new()));
        store.create_table(&[]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_range_key_required_and_typed() {
        let store = ranged_store().await;
        assert!(matches!(
            store.get_item("dev-1", None).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.get_item("dev-1", Some(Value::from("one"))).await,
            Err(StoreError::Validation(_))
        ));
        assert!(store.get_item("dev-1", Some(Value::Int(1))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ranged_put_and_replace() {
        let store = ranged_store().await;
        let item = record(&[("temp", Value::Float(21.5))]);

        store
            .put_item(item.clone(), "dev-1", Some(Value::Int(1)), false)
            .await
            .unwrap();
        store
            .put_item(item.clone(), "dev-1", Some(Value::Int(2)), false)
            .await
            .unwrap();
        assert!(matches!(
            store.put_item(item.clone(), "dev-1", Some(Value::Int(1)), false).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.put_item(item.clone(), "dev-1", Some(Value::Int(3)), true).await,
            Err(StoreError::NotFound { .. })
        ));

        let updated = record(&[("temp", Value::Float(22.5))]);
        store
            .put_item(updated, "dev-1", Some(Value::Int(2)), true)
            .await
            .unwrap();
        let stored = store.get_item("dev-1", Some(Value::Int(2))).await.unwrap().unwrap();
        assert_eq!(stored["temp"], Value::Float(22.5));
        assert_eq!(stored["seq"], Value::Int(2));
    }

    #[tokio::test]
    async fn test_empty_hash_key_rejected() {
        let store = MetadataStore::new(
            StoreSchema::with_string_hash_key("files", "s3_url").unwrap(),
            Arc::new(MemoryBackend::new()),
        );
        assert!(matches!(
            store.get_item("", None).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.get_item("a", Some(Value::Int(1))).await,
            Err(StoreError::Validation(_))
        ));
    }

    /// A backend whose table probe always fails with the given error
    struct ProbeFailure(StoreError);

    #[async_trait]
    impl StoreBackend for ProbeFailure {
        async fn describe_table(&self, _table: &str) -> Result<TableDescription> {
            Err(self.0.clone())
        }
        async fn create_table(&self, _: &StoreSchema, _: &[SecondaryIndex]) -> Result<()> {
            Err(self.0.clone())
        }
        async fn get_item(&self, _: &str, _: Item) -> Result<Option<Item>> {
            Err(self.0.clone())
        }
        async fn delete_item(&self, _: &str, _: Item) -> Result<Option<Item>> {
            Err(self.0.clone())
        }
        async fn put_item(&self, _: &str, _: Item, _: Option<NativeCondition>) -> Result<()> {
            Err(self.0.clone())
        }
        async fn update_item(&self, _: &str, _: Item, _: UpdateRequest) -> Result<Option<Item>> {
            Err(self.0.clone())
        }
        async fn scan_page(
            &self,
            _: &str,
            _: Option<&NativeCondition>,
            _: usize,
            _: Option<Item>,
        ) -> Result<Page> {
            Err(self.0.clone())
        }
        async fn query_page(
            &self,
            _: &str,
            _: &IndexQuery,
            _: usize,
            _: Option<Item>,
        ) -> Result<Page> {
            Err(self.0.clone())
        }
    }

    fn probe_store(error: StoreError) -> MetadataStore {
        MetadataStore::new(
            StoreSchema::with_string_hash_key("files", "s3_url").unwrap(),
            Arc::new(ProbeFailure(error)),
        )
    }

    #[tokio::test]
    async fn test_table_exists_only_absorbs_not_found() {
        let store = probe_store(StoreError::TableNotFound("files".into()));
        assert!(!store.table_exists().await.unwrap());

        let store = probe_store(StoreError::unavailable("connection refused", true));
        let err = store.table_exists().await.unwrap_err();
        assert!(err.is_retryable());

        let store = probe_store(StoreError::Validation("access denied".into()));
        assert!(matches!(
            store.table_exists().await,
            Err(StoreError::StoreUnavailable { retryable: false, .. })
        ));
    }
}
