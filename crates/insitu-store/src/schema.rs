//! Table schema definitions
//!
//! A [`StoreSchema`] is validated once, when it is built, and is immutable
//! afterwards. Key type tokens follow the DynamoDB scalar types (`S`, `N`,
//! `B`); the spelled-out names `string`, `number` and `binary` are accepted
//! case-insensitively.

use crate::error::{Result, StoreError};
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    String,
    Number,
    Binary,
}

impl KeyType {
    /// DynamoDB scalar type token
    pub fn as_token(self) -> &'static str {
        match self {
            KeyType::String => "S",
            KeyType::Number => "N",
            KeyType::Binary => "B",
        }
    }

    /// Whether a stored value has this key type
    pub fn matches(self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (KeyType::String, AttributeValue::S(_))
                | (KeyType::Number, AttributeValue::N(_))
                | (KeyType::Binary, AttributeValue::B(_))
        )
    }
}

impl FromStr for KeyType {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "S" => Ok(KeyType::String),
            "N" => Ok(KeyType::Number),
            "B" => Ok(KeyType::Binary),
            other => match other.to_lowercase().as_str() {
                "string" => Ok(KeyType::String),
                "number" => Ok(KeyType::Number),
                "binary" => Ok(KeyType::Binary),
                _ => Err(StoreError::InvalidSchema(format!(
                    "invalid key type '{}', expected one of S, N, B",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Name and type of a key attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    pub name: String,
    pub key_type: KeyType,
}

impl KeyDefinition {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
        }
    }

    /// Build a definition from a type token such as `"S"` or `"number"`
    pub fn parse(name: impl Into<String>, key_type: &str) -> Result<Self> {
        Ok(Self::new(name, key_type.parse()?))
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, KeyType::String)
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidSchema(format!("{} name is empty", role)));
        }
        Ok(())
    }
}

/// Validated table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    table_name: String,
    hash_key: KeyDefinition,
    range_key: Option<KeyDefinition>,
}

impl StoreSchema {
    pub fn builder() -> StoreSchemaBuilder {
        StoreSchemaBuilder::default()
    }

    /// Schema with a string hash key and no range key
    pub fn with_string_hash_key(
        table_name: impl Into<String>,
        hash_key: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .table_name(table_name)
            .hash_key(hash_key, "S")
            .build()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn hash_key(&self) -> &KeyDefinition {
        &self.hash_key
    }

    pub fn range_key(&self) -> Option<&KeyDefinition> {
        self.range_key.as_ref()
    }

    /// Whether `name` is one of the table's primary key attributes
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.hash_key.name == name || self.range_key.as_ref().is_some_and(|r| r.name == name)
    }
}

/// Builder for [`StoreSchema`]; all validation happens in [`build`](Self::build)
#[derive(Debug, Default)]
pub struct StoreSchemaBuilder {
    table_name: Option<String>,
    hash_key: Option<(String, String)>,
    range_key: Option<(String, String)>,
}

impl StoreSchemaBuilder {
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn hash_key(mut self, name: impl Into<String>, key_type: impl Into<String>) -> Self {
        self.hash_key = Some((name.into(), key_type.into()));
        self
    }

    pub fn range_key(mut self, name: impl Into<String>, key_type: impl Into<String>) -> Self {
        self.range_key = Some((name.into(), key_type.into()));
        self
    }

    pub fn build(self) -> Result<StoreSchema> {
        let table_name = self
            .table_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| StoreError::InvalidSchema("missing table name".to_string()))?;

        let (hash_name, hash_type) = self
            .hash_key
            .ok_or_else(|| StoreError::InvalidSchema("missing hash key".to_string()))?;
        let hash_key = KeyDefinition::parse(hash_name, &hash_type)?;
        hash_key.validate("hash key")?;

        let range_key = match self.range_key {
            Some((name, key_type)) => {
                let range = KeyDefinition::parse(name, &key_type)?;
                range.validate("range key")?;
                if range.name == hash_key.name {
                    return Err(StoreError::InvalidSchema(format!(
                        "range key '{}' duplicates the hash key",
                        range.name
                    )));
                }
                Some(range)
            },
            None => None,
        };

        Ok(StoreSchema {
            table_name,
            hash_key,
            range_key,
        })
    }
}

/// Global secondary index; every index projects all attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub name: String,
    pub hash_key: KeyDefinition,
    pub range_key: Option<KeyDefinition>,
}

impl SecondaryIndex {
    pub fn new(name: impl Into<String>, hash_key: KeyDefinition) -> Self {
        Self {
            name: name.into(),
            hash_key,
            range_key: None,
        }
    }

    pub fn with_range_key(mut self, range_key: KeyDefinition) -> Self {
        self.range_key = Some(range_key);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidSchema("index name is empty".to_string()));
        }
        self.hash_key.validate("index hash key")?;
        if let Some(range) = &self.range_key {
            range.validate("index range key")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_tokens() {
        assert_eq!("S".parse::<KeyType>().unwrap(), KeyType::String);
        assert_eq!(
            "n".parse::<KeyType>().unwrap_err().to_string(),
            "Invalid schema: invalid key type 'n', expected one of S, N, B"
        );
        assert_eq!("Number".parse::<KeyType>().unwrap(), KeyType::Number);
        assert_eq!("BINARY".parse::<KeyType>().unwrap(), KeyType::Binary);
        assert!("BOOL".parse::<KeyType>().is_err());
    }

    #[test]
    fn test_builder_rejects_bad_key_type() {
        let err = StoreSchema::builder()
            .table_name("parquet_metadata_tbl")
            .hash_key("s3_url", "X")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));

        let err = StoreSchema::builder()
            .table_name("parquet_metadata_tbl")
            .hash_key("s3_url", "S")
            .range_key("version", "float")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));
    }

    #[test]
    fn test_builder_requires_table_and_hash_key() {
        assert!(matches!(
            StoreSchema::builder().hash_key("id", "S").build(),
            Err(StoreError::InvalidSchema(_))
        ));
        assert!(matches!(
            StoreSchema::builder().table_name("t").build(),
            Err(StoreError::InvalidSchema(_))
        ));
        assert!(matches!(
            StoreSchema::builder().table_name("  ").hash_key("id", "S").build(),
            Err(StoreError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_builder_with_range_key() {
        let schema = StoreSchema::builder()
            .table_name("events")
            .hash_key("device", "string")
            .range_key("seq", "N")
            .build()
            .unwrap();

        assert_eq!(schema.table_name(), "events");
        assert_eq!(schema.hash_key().key_type, KeyType::String);
        assert_eq!(schema.range_key().unwrap().key_type, KeyType::Number);
        assert!(schema.is_key_attribute("seq"));
        assert!(!schema.is_key_attribute("payload"));
    }

    #[test]
    fn test_range_key_must_differ_from_hash_key() {
        let err = StoreSchema::builder()
            .table_name("t")
            .hash_key("id", "S")
            .range_key("id", "N")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));
    }

    #[test]
    fn test_index_validation() {
        assert!(SecondaryIndex::new("uuid-index", KeyDefinition::string("uuid"))
            .validate()
            .is_ok());
        assert!(SecondaryIndex::new("", KeyDefinition::string("uuid"))
            .validate()
            .is_err());
    }
}
