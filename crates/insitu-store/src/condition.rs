//! Condition expressions shared by conditional writes and scan filters

use crate::value::{AttributeValue, Item, Value};

/// A predicate over a single item's attributes
///
/// Generic over the value representation: callers build conditions with
/// normalized [`Value`]s and the store converts them to
/// [`NativeCondition`] before handing them to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<V = Value> {
    Equals(String, V),
    NotEquals(String, V),
    AttributeExists(String),
    AttributeNotExists(String),
    And(Vec<Condition<V>>),
}

/// Condition over store-native values
pub type NativeCondition = Condition<AttributeValue>;

impl<V> Condition<V> {
    pub fn equals(name: impl Into<String>, value: impl Into<V>) -> Self {
        Condition::Equals(name.into(), value.into())
    }

    pub fn not_equals(name: impl Into<String>, value: impl Into<V>) -> Self {
        Condition::NotEquals(name.into(), value.into())
    }

    pub fn exists(name: impl Into<String>) -> Self {
        Condition::AttributeExists(name.into())
    }

    pub fn not_exists(name: impl Into<String>) -> Self {
        Condition::AttributeNotExists(name.into())
    }

    /// Conjunction with another condition, flattening nested `And`s
    pub fn and(self, other: Condition<V>) -> Self {
        let mut parts = match self {
            Condition::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::And(parts)
    }

    /// Convert every value in the tree, stopping at the first failure
    pub fn try_map<W, E>(self, f: &mut impl FnMut(V) -> Result<W, E>) -> Result<Condition<W>, E> {
        Ok(match self {
            Condition::Equals(name, value) => Condition::Equals(name, f(value)?),
            Condition::NotEquals(name, value) => Condition::NotEquals(name, f(value)?),
            Condition::AttributeExists(name) => Condition::AttributeExists(name),
            Condition::AttributeNotExists(name) => Condition::AttributeNotExists(name),
            Condition::And(parts) => Condition::And(
                parts
                    .into_iter()
                    .map(|part| part.try_map(f))
                    .collect::<Result<_, E>>()?,
            ),
        })
    }
}

impl NativeCondition {
    /// Evaluate against an item; `None` is an absent item
    ///
    /// Equality on a missing attribute is false and inequality is true,
    /// matching how a DynamoDB condition expression treats them.
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let attribute = |name: &str| item.and_then(|i| i.get(name));
        match self {
            Condition::Equals(name, value) => attribute(name) == Some(value),
            Condition::NotEquals(name, value) => attribute(name) != Some(value),
            Condition::AttributeExists(name) => attribute(name).is_some(),
            Condition::AttributeNotExists(name) => attribute(name).is_none(),
            Condition::And(parts) => parts.iter().all(|part| part.evaluate(item)),
        }
    }
}
