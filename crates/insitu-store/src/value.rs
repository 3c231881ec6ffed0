//! Attribute values
//!
//! Two representations live here:
//!
//! - [`AttributeValue`]: the store-native form. Numbers are arbitrary
//!   precision decimals, exactly as a DynamoDB-style store keeps them.
//! - [`Value`]: the normalized form handed to callers. Every read path runs
//!   through [`normalize`], which walks lists and maps and turns integral
//!   decimals into [`Value::Int`] and everything else into [`Value::Float`].

use crate::error::{Result, StoreError};
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Store-native item
pub type Item = BTreeMap<String, AttributeValue>;

/// Normalized item returned by every read operation
pub type Record = BTreeMap<String, Value>;

/// Store-native attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    S(String),
    N(BigDecimal),
    B(Vec<u8>),
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Parse a decimal number as carried on the wire
    pub fn number(text: &str) -> Result<Self> {
        BigDecimal::from_str(text.trim())
            .map(AttributeValue::N)
            .map_err(|e| StoreError::Validation(format!("invalid number '{}': {}", text, e)))
    }

    pub fn as_number(&self) -> Option<&BigDecimal> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    /// Short type tag used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "NULL",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("null"),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::S(s) => f.write_str(s),
            AttributeValue::N(n) => write!(f, "{}", n),
            AttributeValue::B(b) => write!(f, "<{} bytes>", b.len()),
            AttributeValue::L(l) => write!(f, "<list of {}>", l.len()),
            AttributeValue::M(m) => write!(f, "<map of {}>", m.len()),
        }
    }
}

/// Normalized attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    String(String),
    Int(i64),
    Float(f64),
    Binary(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float, accepting both `Int` and `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert into the store-native form
    ///
    /// Fails for non-finite floats, which a decimal store cannot hold.
    pub fn into_attribute(self) -> Result<AttributeValue> {
        Ok(match self {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::String(s) => AttributeValue::S(s),
            Value::Int(i) => AttributeValue::N(BigDecimal::from(i)),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(StoreError::Validation(format!(
                        "cannot store non-finite number {}",
                        f
                    )));
                }
                AttributeValue::number(&f.to_string())?
            },
            Value::Binary(b) => AttributeValue::B(b),
            Value::List(values) => AttributeValue::L(
                values
                    .into_iter()
                    .map(Value::into_attribute)
                    .collect::<Result<_>>()?,
            ),
            Value::Map(map) => AttributeValue::M(into_item(map)?),
        })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

/// Convert a normalized record into a store-native item
pub fn into_item(record: Record) -> Result<Item> {
    record
        .into_iter()
        .map(|(name, value)| Ok((name, value.into_attribute()?)))
        .collect()
}

/// Recursively normalize a store-native value
pub fn normalize(value: AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => normalize_number(&n),
        AttributeValue::B(b) => Value::Binary(b),
        AttributeValue::L(values) => Value::List(values.into_iter().map(normalize).collect()),
        AttributeValue::M(map) => Value::Map(normalize_item(map)),
    }
}

/// Normalize every attribute of an item
pub fn normalize_item(item: Item) -> Record {
    item.into_iter()
        .map(|(name, value)| (name, normalize(value)))
        .collect()
}

fn normalize_number(n: &BigDecimal) -> Value {
    if n.with_scale(0) == *n {
        if let Some(i) = n.to_i64() {
            return Value::Int(i);
        }
    }
    // Round-trip through text; the decimal's own float conversion loses
    // precision on some versions.
    Value::Float(n.to_string().parse::<f64>().unwrap_or(f64::NAN))
}
