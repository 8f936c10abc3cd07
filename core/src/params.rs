//! Request parameters.
//!
//! Parameters are a flat mapping of names to [`ParamValue`]s. Two parameter
//! sets are *shallow-equal* when they have the same names and each value is
//! equal at the top level: primitives compare by value, compound values
//! (arrays and objects) compare by identity of their shared allocation and
//! are never compared recursively.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single parameter value.
///
/// `PartialEq` is structural; the dedup rule uses [`ParamValue::shallow_eq`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// JSON `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(Number),
    /// String
    String(String),
    /// Array or object, shared by reference.
    ///
    /// Cloning a `Compound` keeps the same allocation, so clones stay
    /// shallow-equal to the original.
    Compound(Arc<Value>),
}

impl ParamValue {
    /// Top-level equality: by value for primitives, by identity for compounds.
    #[must_use]
    pub fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Compound(a), Self::Compound(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Render the value for use in a query string.
    ///
    /// Strings are emitted verbatim, compounds as compact JSON.
    #[must_use]
    pub fn to_query_value(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Compound(v) => v.to_string(),
        }
    }

    /// Convert back into a plain JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Compound(v) => (**v).clone(),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            compound @ (Value::Array(_) | Value::Object(_)) => Self::Compound(Arc::new(compound)),
        }
    }
}

impl From<Arc<Value>> for ParamValue {
    fn from(value: Arc<Value>) -> Self {
        match &*value {
            Value::Array(_) | Value::Object(_) => Self::Compound(value),
            primitive => Self::from(primitive.clone()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Compound(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// A flat set of named request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// Empty parameter set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Same names, and each value [`ParamValue::shallow_eq`] its counterpart.
    #[must_use]
    pub fn shallow_eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(name, value)| other.0.get(name).is_some_and(|o| value.shallow_eq(o)))
    }

    /// `(name, value)` pairs ready for a query string
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_query_value()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_primitives_compare_by_value() {
        let a = Params::new().with("x", 1).with("q", "rust").with("flag", true);
        let b = Params::new().with("flag", true).with("q", "rust").with("x", 1);
        assert!(a.shallow_eq(&b));

        let c = Params::new().with("x", 2).with("q", "rust").with("flag", true);
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn test_different_key_sets_are_not_equal() {
        let a = Params::new().with("x", 1);
        let b = Params::new().with("x", 1).with("y", 2);
        assert!(!a.shallow_eq(&b));
        assert!(!b.shallow_eq(&a));
        assert!(Params::new().shallow_eq(&Params::new()));
    }

    #[test]
    fn test_compounds_compare_by_identity() {
        let shared = ParamValue::from(json!({"page": 1}));
        let a = Params::new().with("filter", shared.clone());
        let b = Params::new().with("filter", shared);
        assert!(a.shallow_eq(&b));

        // Structurally identical, but a different allocation
        let c = Params::new().with("filter", json!({"page": 1}));
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn test_mixed_kinds_are_not_equal() {
        assert!(!ParamValue::from("1").shallow_eq(&ParamValue::from(1)));
        assert!(!ParamValue::Null.shallow_eq(&ParamValue::from(false)));
    }

    #[test]
    fn test_query_pairs() {
        let params = Params::new()
            .with("ids", json!([1, 2]))
            .with("q", "a b")
            .with("n", 3);
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("ids".to_string(), "[1,2]".to_string()),
                ("n".to_string(), "3".to_string()),
                ("q".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let params = Params::new().with("x", 1).with("tags", json!(["a"]));
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value, json!({"x": 1, "tags": ["a"]}));

        let back: Params = serde_json::from_value(value).unwrap();
        assert_eq!(back.len(), 2);
        assert!(matches!(back.get("tags"), Some(ParamValue::Compound(_))));
    }

    proptest! {
        #[test]
        fn prop_shallow_eq_is_reflexive_for_clones(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let params: Params = entries.into_iter().collect();
            prop_assert!(params.shallow_eq(&params.clone()));
        }

        #[test]
        fn prop_changing_one_value_breaks_equality(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..8),
            bump in 1i64..1000,
        ) {
            let params: Params = entries.clone().into_iter().collect();
            let (name, value) = entries.iter().next().map(|(k, v)| (k.clone(), *v)).unwrap();
            let mut changed = params.clone();
            changed.insert(name, value.wrapping_add(bump));
            prop_assert!(!params.shallow_eq(&changed));
        }
    }
}
