//! DynamoDB backend
//!
//! Conditions and filters are rendered into DynamoDB expressions with
//! generated `#nN` / `:vN` placeholders, so attribute names never collide
//! with reserved words.

use crate::backend::{IndexQuery, Page, ReturnValues, StoreBackend, TableDescription, UpdateRequest};
use crate::condition::{Condition, NativeCondition};
use crate::error::{Result, StoreError};
use crate::schema::{KeyDefinition, SecondaryIndex, StoreSchema};
use crate::value::{AttributeValue, Item};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::{
        AttributeDefinition, AttributeValue as DynamoValue, BillingMode, GlobalSecondaryIndex,
        KeySchemaElement, KeyType as DynamoKeyType, Projection, ProjectionType, ReturnValue,
        ScalarAttributeType,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use tracing::{debug, info, instrument};

/// Connection settings for the DynamoDB backend
#[derive(Clone, Serialize, Deserialize)]
pub struct DynamoConfig {
    /// Custom endpoint, e.g. `http://localhost:8000` for DynamoDB Local
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when unset the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for DynamoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DynamoConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("DYNAMODB_ENDPOINT").ok(),
            region: env::var("DYNAMODB_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or_else(|_| "us-west-2".to_string()),
            access_key: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
        }
    }

    /// Settings for a DynamoDB Local container
    pub fn for_local(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-west-2".to_string(),
            access_key: Some("local".to_string()),
            secret_key: Some("local".to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DynamoBackend {
    client: Client,
}

impl DynamoBackend {
    pub async fn new(config: DynamoConfig) -> Self {
        debug!("Initializing DynamoDB backend with config: {:?}", config);

        let client = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "insitu-dynamodb");
                let mut builder = aws_sdk_dynamodb::Config::builder()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()));
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            },
            _ => {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()));
                if let Some(endpoint) = &config.endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                Client::new(&loader.load().await)
            },
        };

        info!("DynamoDB backend initialized for region: {}", config.region);
        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_failure<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let retryable = match &err {
        SdkError::ServiceError(_) => matches!(
            err.code(),
            Some(
                "ThrottlingException"
                    | "ProvisionedThroughputExceededException"
                    | "RequestLimitExceeded"
                    | "InternalServerError"
                    | "ServiceUnavailable"
            )
        ),
        SdkError::ConstructionFailure(_) => false,
        _ => true,
    };
    StoreError::unavailable(format!("{} failed: {}", operation, DisplayErrorContext(&err)), retryable)
}

fn to_dynamo(value: AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::Null => DynamoValue::Null(true),
        AttributeValue::Bool(b) => DynamoValue::Bool(b),
        AttributeValue::S(s) => DynamoValue::S(s),
        AttributeValue::N(n) => DynamoValue::N(n.to_string()),
        AttributeValue::B(b) => DynamoValue::B(Blob::new(b)),
        AttributeValue::L(values) => DynamoValue::L(values.into_iter().map(to_dynamo).collect()),
        AttributeValue::M(map) => DynamoValue::M(to_dynamo_item(map)),
    }
}

fn to_dynamo_item(item: Item) -> HashMap<String, DynamoValue> {
    item.into_iter()
        .map(|(name, value)| (name, to_dynamo(value)))
        .collect()
}

fn from_dynamo(value: DynamoValue) -> Result<AttributeValue> {
    Ok(match value {
        DynamoValue::Null(_) => AttributeValue::Null,
        DynamoValue::Bool(b) => AttributeValue::Bool(b),
        DynamoValue::S(s) => AttributeValue::S(s),
        DynamoValue::N(n) => AttributeValue::number(&n)?,
        DynamoValue::B(b) => AttributeValue::B(b.into_inner()),
        DynamoValue::L(values) => AttributeValue::L(
            values
                .into_iter()
                .map(from_dynamo)
                .collect::<Result<_>>()?,
        ),
        DynamoValue::M(map) => AttributeValue::M(from_dynamo_item(map)?),
        // Sets come back as lists; nothing in the workspace writes them.
        DynamoValue::Ss(values) => {
            AttributeValue::L(values.into_iter().map(AttributeValue::S).collect())
        },
        DynamoValue::Ns(values) => AttributeValue::L(
            values
                .iter()
                .map(|n| AttributeValue::number(n))
                .collect::<Result<_>>()?,
        ),
        DynamoValue::Bs(values) => AttributeValue::L(
            values
                .into_iter()
                .map(|b| AttributeValue::B(b.into_inner()))
                .collect(),
        ),
        other => {
            return Err(StoreError::Validation(format!(
                "unsupported DynamoDB attribute value: {:?}",
                other
            )))
        },
    })
}

fn from_dynamo_item(map: HashMap<String, DynamoValue>) -> Result<Item> {
    map.into_iter()
        .map(|(name, value)| Ok((name, from_dynamo(value)?)))
        .collect()
}

fn from_dynamo_items(items: Option<Vec<HashMap<String, DynamoValue>>>) -> Result<Vec<Item>> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(from_dynamo_item)
        .collect()
}

/// Renders conditions into an expression plus its placeholder maps
#[derive(Default)]
struct ExpressionRenderer {
    names: HashMap<String, String>,
    values: HashMap<String, DynamoValue>,
}

impl ExpressionRenderer {
    fn name(&mut self, attribute: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, name)| *name == attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn value(&mut self, value: &AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), to_dynamo(value.clone()));
        placeholder
    }

    fn render(&mut self, condition: &NativeCondition) -> Option<String> {
        match condition {
            Condition::Equals(name, value) => {
                Some(format!("{} = {}", self.name(name), self.value(value)))
            },
            Condition::NotEquals(name, value) => {
                Some(format!("{} <> {}", self.name(name), self.value(value)))
            },
            Condition::AttributeExists(name) => Some(format!("attribute_exists({})", self.name(name))),
            Condition::AttributeNotExists(name) => {
                Some(format!("attribute_not_exists({})", self.name(name)))
            },
            Condition::And(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .filter_map(|part| self.render(part))
                    .map(|expr| format!("({})", expr))
                    .collect();
                (!rendered.is_empty()).then(|| rendered.join(" AND "))
            },
        }
    }

    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<HashMap<String, DynamoValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

fn attribute_definition(key: &KeyDefinition) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(&key.name)
        .attribute_type(ScalarAttributeType::from(key.key_type.as_token()))
        .build()
        .map_err(|e| StoreError::InvalidSchema(e.to_string()))
}

fn key_schema(hash: &KeyDefinition, range: Option<&KeyDefinition>) -> Result<Vec<KeySchemaElement>> {
    let mut elements = vec![KeySchemaElement::builder()
        .attribute_name(&hash.name)
        .key_type(DynamoKeyType::Hash)
        .build()
        .map_err(|e| StoreError::InvalidSchema(e.to_string()))?];
    if let Some(range) = range {
        elements.push(
            KeySchemaElement::builder()
                .attribute_name(&range.name)
                .key_type(DynamoKeyType::Range)
                .build()
                .map_err(|e| StoreError::InvalidSchema(e.to_string()))?,
        );
    }
    Ok(elements)
}

fn limit_i32(limit: usize) -> Result<i32> {
    i32::try_from(limit)
        .ok()
        .filter(|l| *l > 0)
        .ok_or_else(|| StoreError::Validation(format!("invalid page limit {}", limit)))
}

#[async_trait]
impl StoreBackend for DynamoBackend {
    #[instrument(skip(self))]
    async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(output) => {
                let description = output.table();
                Ok(TableDescription {
                    table_name: table.to_string(),
                    item_count: description.and_then(|d| d.item_count()),
                    status: description
                        .and_then(|d| d.table_status())
                        .map(|s| s.as_str().to_string()),
                })
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) => Err(sdk_failure("DescribeTable", err)),
        }
    }

    #[instrument(skip(self, schema, indexes), fields(table = schema.table_name()))]
    async fn create_table(&self, schema: &StoreSchema, indexes: &[SecondaryIndex]) -> Result<()> {
        let mut definitions = vec![schema.hash_key().clone()];
        definitions.extend(schema.range_key().cloned());
        for index in indexes {
            definitions.push(index.hash_key.clone());
            definitions.extend(index.range_key.clone());
        }
        let mut seen = std::collections::HashSet::new();
        definitions.retain(|d| seen.insert(d.name.clone()));

        let mut request = self
            .client
            .create_table()
            .table_name(schema.table_name())
            .set_attribute_definitions(Some(
                definitions
                    .iter()
                    .map(attribute_definition)
                    .collect::<Result<Vec<_>>>()?,
            ))
            .set_key_schema(Some(key_schema(schema.hash_key(), schema.range_key())?))
            .billing_mode(BillingMode::PayPerRequest);

        for index in indexes {
            let gsi = GlobalSecondaryIndex::builder()
                .index_name(&index.name)
                .set_key_schema(Some(key_schema(&index.hash_key, index.range_key.as_ref())?))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .map_err(|e| StoreError::InvalidSchema(e.to_string()))?;
            request = request.global_secondary_indexes(gsi);
        }

        match request.send().await {
            Ok(_) => {
                info!("Created DynamoDB table: {}", schema.table_name());
                Ok(())
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception()) =>
            {
                Err(StoreError::TableExists(schema.table_name().to_string()))
            },
            Err(err) => Err(sdk_failure("CreateTable", err)),
        }
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let output = match self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_dynamo_item(key)))
            .consistent_read(true)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) => return Err(sdk_failure("GetItem", err)),
        };
        output.item.map(from_dynamo_item).transpose()
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let output = match self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_dynamo_item(key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) => return Err(sdk_failure("DeleteItem", err)),
        };
        output.attributes.map(from_dynamo_item).transpose()
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<NativeCondition>,
    ) -> Result<()> {
        let mut renderer = ExpressionRenderer::default();
        let expression = condition.as_ref().and_then(|c| renderer.render(c));

        let result = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(to_dynamo_item(item)))
            .set_condition_expression(expression)
            .set_expression_attribute_names(renderer.names())
            .set_expression_attribute_values(renderer.values())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::ConditionFailed)
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) => Err(sdk_failure("PutItem", err)),
        }
    }

    async fn update_item(
        &self,
        table: &str,
        key: Item,
        request: UpdateRequest,
    ) -> Result<Option<Item>> {
        let return_value = match request.return_values {
            ReturnValues::AllNew => ReturnValue::AllNew,
            ReturnValues::AllOld => ReturnValue::AllOld,
        };
        let names = (!request.names.is_empty()).then_some(request.names);
        let values = (!request.values.is_empty()).then(|| {
            request
                .values
                .into_iter()
                .map(|(placeholder, value)| (placeholder, to_dynamo(value)))
                .collect::<HashMap<_, _>>()
        });

        let output = match self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(to_dynamo_item(key)))
            .update_expression(request.expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values(return_value)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) if err.code() == Some("ValidationException") => {
                return Err(StoreError::Expression(
                    err.message().unwrap_or("invalid update expression").to_string(),
                ))
            },
            Err(err) => return Err(sdk_failure("UpdateItem", err)),
        };
        output.attributes.map(from_dynamo_item).transpose()
    }

    async fn scan_page(
        &self,
        table: &str,
        filter: Option<&NativeCondition>,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page> {
        let mut renderer = ExpressionRenderer::default();
        let expression = filter.and_then(|f| renderer.render(f));

        let output = match self
            .client
            .scan()
            .table_name(table)
            .limit(limit_i32(limit)?)
            .set_filter_expression(expression)
            .set_expression_attribute_names(renderer.names())
            .set_expression_attribute_values(renderer.values())
            .set_exclusive_start_key(exclusive_start_key.map(to_dynamo_item))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) => return Err(sdk_failure("Scan", err)),
        };

        Ok(Page {
            items: from_dynamo_items(output.items)?,
            last_evaluated_key: output.last_evaluated_key.map(from_dynamo_item).transpose()?,
        })
    }

    async fn query_page(
        &self,
        table: &str,
        query: &IndexQuery,
        limit: usize,
        exclusive_start_key: Option<Item>,
    ) -> Result<Page> {
        let output = match self
            .client
            .query()
            .table_name(table)
            .index_name(&query.index_name)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", &query.attribute)
            .expression_attribute_values(":v", to_dynamo(query.value.clone()))
            .limit(limit_i32(limit)?)
            .set_exclusive_start_key(exclusive_start_key.map(to_dynamo_item))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Err(StoreError::TableNotFound(table.to_string()))
            },
            Err(err) if err.code() == Some("ValidationException") => {
                return Err(StoreError::Validation(
                    err.message().unwrap_or("invalid index query").to_string(),
                ))
            },
            Err(err) => return Err(sdk_failure("Query", err)),
        };

        Ok(Page {
            items: from_dynamo_items(output.items)?,
            last_evaluated_key: output.last_evaluated_key.map(from_dynamo_item).transpose()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_put_conditions() {
        let mut renderer = ExpressionRenderer::default();
        let condition: NativeCondition = Condition::equals("s3_url", AttributeValue::S("a".into()))
            .and(Condition::equals("version", AttributeValue::number("2").unwrap()));

        let expression = renderer.render(&condition).unwrap();

        assert_eq!(expression, "(#n0 = :v0) AND (#n1 = :v1)");
        assert_eq!(renderer.names().unwrap()["#n0"], "s3_url");
        assert_eq!(renderer.values().unwrap()[":v1"], DynamoValue::N("2".into()));
    }

    #[test]
    fn test_render_reuses_name_placeholders() {
        let mut renderer = ExpressionRenderer::default();
        let condition: NativeCondition = Condition::exists("uuid")
            .and(Condition::not_equals("uuid", AttributeValue::S("x".into())));
        assert_eq!(
            renderer.render(&condition).unwrap(),
            "(attribute_exists(#n0)) AND (#n0 <> :v0)"
        );
        assert_eq!(renderer.names().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_conjunction_renders_nothing() {
        let mut renderer = ExpressionRenderer::default();
        assert!(renderer.render(&Condition::And(vec![])).is_none());
        assert!(renderer.names().is_none());
        assert!(renderer.values().is_none());
    }

    #[test]
    fn test_value_conversion_round_trip() {
        let mut nested = Item::new();
        nested.insert("n".into(), AttributeValue::number("1.5").unwrap());
        let value = AttributeValue::L(vec![
            AttributeValue::M(nested),
            AttributeValue::B(vec![1, 2]),
            AttributeValue::Null,
        ]);
        assert_eq!(from_dynamo(to_dynamo(value.clone())).unwrap(), value);
    }

    #[test]
    fn test_string_sets_become_lists() {
        let converted = from_dynamo(DynamoValue::Ss(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(
            converted,
            AttributeValue::L(vec![AttributeValue::S("a".into()), AttributeValue::S("b".into())])
        );
    }

    #[test]
    fn test_config_debug_redacts_keys() {
        let config = DynamoConfig::for_local("http://localhost:8000");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"local\""));
    }
}
