//! Backend contract for the metadata store
//!
//! A backend speaks store-native [`Item`]s and [`NativeCondition`]s. Key
//! validation, condition construction and numeric normalization all happen
//! in [`MetadataStore`](crate::MetadataStore), so backends stay thin.

use crate::condition::NativeCondition;
use crate::error::Result;
use crate::schema::{SecondaryIndex, StoreSchema};
use crate::value::{AttributeValue, Item};
use async_trait::async_trait;
use std::collections::HashMap;

/// Summary of an existing table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub table_name: String,
    pub item_count: Option<i64>,
    pub status: Option<String>,
}

/// Which attributes an update returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValues {
    AllNew,
    AllOld,
}

/// Atomic update request
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
    pub return_values: ReturnValues,
}

/// One page of a scan or query
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Continuation token; `None` when the table or index is exhausted
    pub last_evaluated_key: Option<Item>,
}

/// Single-attribute equality lookup on a secondary index
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index_name: String,
    pub attribute: String,
    pub value: AttributeValue,
}

/// Storage backend trait for the metadata store
///
/// All backends (DynamoDB, memory) implement this trait. A failed write
/// condition is reported as [`StoreError::ConditionFailed`](crate::StoreError::ConditionFailed)
/// and must be evaluated atomically with the write.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Describe a table
    ///
    /// Returns `StoreError::TableNotFound` when the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<TableDescription>;

    /// Create a table with the given key schema and indexes
    async fn create_table(&self, schema: &StoreSchema, indexes: &[SecondaryIndex]) -> Result<()>;

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>>;

    /// Delete an item, returning its previous attributes
    ///
    /// Deleting an absent key succeeds and returns `None`.
    async fn delete_item(&self, table: &str, key: Item) -> Result<Option<Item>>;

    /// Write a whole item, optionally guarded by a condition on the
    /// existing item with the same primary key
    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<NativeCondition>,
    ) -> Result<()>;

    /// Apply an update expression atomically, creating the item if needed
    async fn update_item(
        &self,
        table: &str,
        key: Item,
        request: UpdateRequest,
    ) -> Result<Option<Item>>;

    /// Read one scan page
    ///
    /// `limit` bounds the number of items examined, before the filter is
    /// applied, so a page may hold fewer matches than `limit` and still
    /// carry a continuation token.
    async fn scan_page(
        &self,
        table: &str,
        filter: Option<&NativeCondition>,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page>;

    /// Read one page of an index query
    async fn query_page(
        &self,
        table: &str,
        query: &IndexQuery,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page>;
}
