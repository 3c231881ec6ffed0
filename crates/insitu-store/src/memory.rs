//! In-memory backend
//!
//! Thread-safe via an async `RwLock`; every mutation holds the write lock for
//! its whole read-check-write sequence, which makes conditional puts atomic.
//! Items are kept in primary-key order so pagination is stable.

use crate::backend::{IndexQuery, Page, ReturnValues, StoreBackend, TableDescription, UpdateRequest};
use crate::condition::NativeCondition;
use crate::error::{Result, StoreError};
use crate::schema::{KeyDefinition, SecondaryIndex, StoreSchema};
use crate::update::UpdatePlan;
use crate::value::{AttributeValue, Item};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    S(String),
    N(BigDecimal),
    B(Vec<u8>),
}

type PrimaryKey = (KeyPart, Option<KeyPart>);

#[derive(Debug)]
struct MemoryTable {
    schema: StoreSchema,
    indexes: Vec<SecondaryIndex>,
    items: BTreeMap<PrimaryKey, Item>,
}

impl MemoryTable {
    fn key_part(definition: &KeyDefinition, item: &Item) -> Result<KeyPart> {
        let value = item.get(&definition.name).ok_or_else(|| {
            StoreError::Validation(format!("missing key attribute '{}'", definition.name))
        })?;
        if !definition.key_type.matches(value) {
            return Err(StoreError::Validation(format!(
                "key attribute '{}' must be {}, got {}",
                definition.name,
                definition.key_type,
                value.type_name()
            )));
        }
        Ok(match value {
            AttributeValue::S(s) => KeyPart::S(s.clone()),
            AttributeValue::N(n) => KeyPart::N(n.clone()),
            AttributeValue::B(b) => KeyPart::B(b.clone()),
            other => {
                return Err(StoreError::Validation(format!(
                    "unsupported key value {}",
                    other.type_name()
                )))
            },
        })
    }

    fn primary_key(&self, item: &Item) -> Result<PrimaryKey> {
        let hash = Self::key_part(self.schema.hash_key(), item)?;
        let range = match self.schema.range_key() {
            Some(definition) => Some(Self::key_part(definition, item)?),
            None => None,
        };
        Ok((hash, range))
    }

    /// The primary key attributes of an item, used as a continuation token
    fn key_item(&self, item: &Item) -> Item {
        item.iter()
            .filter(|(name, _)| self.schema.is_key_attribute(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn start_bound(&self, exclusive_start_key: Option<Item>) -> Result<Bound<PrimaryKey>> {
        Ok(match exclusive_start_key {
            Some(key) => Bound::Excluded(self.primary_key(&key)?),
            None => Bound::Unbounded,
        })
    }
}

/// In-memory store backend for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn table_not_found(table: &str) -> StoreError {
    StoreError::TableNotFound(table.to_string())
}

fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(StoreError::Validation("page limit must be at least 1".to_string()));
    }
    Ok(())
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        let tables = self.tables.read().await;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(TableDescription {
            table_name: table.to_string(),
            item_count: i64::try_from(memory_table.items.len()).ok(),
            status: Some("ACTIVE".to_string()),
        })
    }

    async fn create_table(&self, schema: &StoreSchema, indexes: &[SecondaryIndex]) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(schema.table_name()) {
            return Err(StoreError::TableExists(schema.table_name().to_string()));
        }
        tables.insert(
            schema.table_name().to_string(),
            MemoryTable {
                schema: schema.clone(),
                indexes: indexes.to_vec(),
                items: BTreeMap::new(),
            },
        );
        debug!(table = schema.table_name(), indexes = indexes.len(), "Created memory table");
        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let tables = self.tables.read().await;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        let primary_key = memory_table.primary_key(&key)?;
        Ok(memory_table.items.get(&primary_key).cloned())
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let mut tables = self.tables.write().await;
        let memory_table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let primary_key = memory_table.primary_key(&key)?;
        Ok(memory_table.items.remove(&primary_key))
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<NativeCondition>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let memory_table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let primary_key = memory_table.primary_key(&item)?;

        if let Some(condition) = condition {
            if !condition.evaluate(memory_table.items.get(&primary_key)) {
                return Err(StoreError::ConditionFailed);
            }
        }

        memory_table.items.insert(primary_key, item);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: Item,
        request: UpdateRequest,
    ) -> Result<Option<Item>> {
        let plan = UpdatePlan::parse(&request.expression, &request.names, &request.values)?;

        let mut tables = self.tables.write().await;
        let memory_table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let primary_key = memory_table.primary_key(&key)?;

        if let Some(path) = plan.paths().find(|path| memory_table.schema.is_key_attribute(path)) {
            return Err(StoreError::Expression(format!(
                "cannot update key attribute '{}'",
                path
            )));
        }

        let old = memory_table.items.get(&primary_key).cloned();
        let mut new = old.clone().unwrap_or_else(|| memory_table.key_item(&key));
        plan.apply(&mut new)?;
        memory_table.items.insert(primary_key, new.clone());

        Ok(match request.return_values {
            ReturnValues::AllNew => Some(new),
            ReturnValues::AllOld => old,
        })
    }

    async fn scan_page(
        &self,
        table: &str,
        filter: Option<&NativeCondition>,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page> {
        check_limit(limit)?;
        let tables = self.tables.read().await;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        let start = memory_table.start_bound(exclusive_start_key)?;

        let mut examined = memory_table.items.range((start, Bound::Unbounded)).peekable();
        let mut page = Page::default();
        let mut last = None;

        for _ in 0..limit {
            let Some((_, item)) = examined.next() else {
                break;
            };
            if filter.map_or(true, |f| f.evaluate(Some(item))) {
                page.items.push(item.clone());
            }
            last = Some(item);
        }

        if examined.peek().is_some() {
            page.last_evaluated_key = last.map(|item| memory_table.key_item(item));
        }
        Ok(page)
    }

    async fn query_page(
        &self,
        table: &str,
        query: &IndexQuery,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page> {
        check_limit(limit)?;
        let tables = self.tables.read().await;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;

        let index = memory_table
            .indexes
            .iter()
            .find(|index| index.name == query.index_name)
            .ok_or_else(|| {
                StoreError::Validation(format!("index '{}' does not exist", query.index_name))
            })?;
        if index.hash_key.name != query.attribute {
            return Err(StoreError::Validation(format!(
                "'{}' is not the hash key of index '{}'",
                query.attribute, index.name
            )));
        }
        if !index.hash_key.key_type.matches(&query.value) {
            return Err(StoreError::Validation(format!(
                "index key '{}' must be {}",
                query.attribute, index.hash_key.key_type
            )));
        }

        let start = memory_table.start_bound(exclusive_start_key)?;
        let mut matches = memory_table
            .items
            .range((start, Bound::Unbounded))
            .map(|(_, item)| item)
            .filter(|item| item.get(&query.attribute) == Some(&query.value))
            .peekable();

        let mut page = Page::default();
        while page.items.len() < limit {
            match matches.next() {
                Some(item) => page.items.push(item.clone()),
                None => break,
            }
        }

        if matches.peek().is_some() {
            page.last_evaluated_key = page.items.last().map(|item| memory_table.key_item(item));
        }
        Ok(page)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    fn schema() -> StoreSchema {
        StoreSchema::with_string_hash_key("files", "s3_url").unwrap()
    }

    fn item(url: &str, uuid: &str) -> Item {
        let mut item = Item::new();
        item.insert("s3_url".into(), AttributeValue::S(url.into()));
        item.insert("uuid".into(), AttributeValue::S(uuid.into()));
        item
    }

    fn key(url: &str) -> Item {
        let mut key = Item::new();
        key.insert("s3_url".into(), AttributeValue::S(url.into()));
        key
    }

    async fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .create_table(
                &schema(),
                &[SecondaryIndex::new("uuid-index", KeyDefinition::string("uuid"))],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_missing_table() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.describe_table("files").await,
            Err(StoreError::TableNotFound(_))
        ));
        assert!(matches!(
            backend.get_item("files", key("a")).await,
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let backend = backend().await;
        assert!(matches!(
            backend.create_table(&schema(), &[]).await,
            Err(StoreError::TableExists(_))
        ));
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let backend = backend().await;
        let guard: NativeCondition = Condition::not_exists("s3_url");

        backend
            .put_item("files", item("a", "1"), Some(guard.clone()))
            .await
            .unwrap();
        assert_eq!(
            backend.put_item("files", item("a", "2"), Some(guard)).await,
            Err(StoreError::ConditionFailed)
        );

        let stored = backend.get_item("files", key("a")).await.unwrap().unwrap();
        assert_eq!(stored["uuid"], AttributeValue::S("1".into()));
    }

    #[tokio::test]
    async fn test_put_rejects_wrong_key_type() {
        let backend = backend().await;
        let mut bad = Item::new();
        bad.insert("s3_url".into(), AttributeValue::number("1").unwrap());
        assert!(matches!(
            backend.put_item("files", bad, None).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_limit_counts_examined_items() {
        let backend = backend().await;
        for (url, uuid) in [("a", "x"), ("b", "y"), ("c", "x")] {
            backend.put_item("files", item(url, uuid), None).await.unwrap();
        }
        let filter: NativeCondition = Condition::equals("uuid", AttributeValue::S("x".into()));

        let first = backend.scan_page("files", Some(&filter), 2, None).await.unwrap();
        assert_eq!(first.items.len(), 1);
        let token = first.last_evaluated_key.unwrap();
        assert_eq!(token, key("b"));

        let second = backend
            .scan_page("files", Some(&filter), 2, Some(token))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_query_page_validates_index() {
        let backend = backend().await;
        let query = IndexQuery {
            index_name: "missing-index".into(),
            attribute: "uuid".into(),
            value: AttributeValue::S("x".into()),
        };
        assert!(matches!(
            backend.query_page("files", &query, 10, None).await,
            Err(StoreError::Validation(_))
        ));

        let query = IndexQuery {
            index_name: "uuid-index".into(),
            attribute: "s3_url".into(),
            value: AttributeValue::S("x".into()),
        };
        assert!(backend.query_page("files", &query, 10, None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_creates_item_and_rejects_key_updates() {
        let backend = backend().await;
        let mut values = HashMap::new();
        values.insert(":one".to_string(), AttributeValue::number("1").unwrap());

        let request = UpdateRequest {
            expression: "ADD hits :one".into(),
            names: HashMap::new(),
            values: values.clone(),
            return_values: ReturnValues::AllOld,
        };
        let old = backend.update_item("files", key("a"), request).await.unwrap();
        assert!(old.is_none());

        let stored = backend.get_item("files", key("a")).await.unwrap().unwrap();
        assert_eq!(stored["hits"], AttributeValue::number("1").unwrap());
        assert_eq!(stored["s3_url"], AttributeValue::S("a".into()));

        let request = UpdateRequest {
            expression: "SET s3_url = :one".into(),
            names: HashMap::new(),
            values,
            return_values: ReturnValues::AllNew,
        };
        assert!(matches!(
            backend.update_item("files", key("a"), request).await,
            Err(StoreError::Expression(_))
        ));
    }
}
