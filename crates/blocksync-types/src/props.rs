//! Block attributes and the normalization used when comparing them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl PropValue {
    /// Null or empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            PropValue::Null => true,
            PropValue::Text(s) => s.is_empty(),
            PropValue::Bool(_) | PropValue::Number(_) => false,
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Number(v.into())
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Number(v.into())
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Text(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Text(v)
    }
}

/// Flat attribute map. Ordered so serialization is canonical.
pub type Props = BTreeMap<String, PropValue>;

/// How props are normalized before comparison.
///
/// Editors tend to materialize defaults (`textColor: "default"`) on some
/// paths and omit them on others. Without normalization those would read as
/// changes on every pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropsPolicy {
    /// Entries equal to these values are dropped.
    pub defaults: Props,
}

impl Default for PropsPolicy {
    fn default() -> Self {
        let mut defaults = Props::new();
        defaults.insert("textColor".into(), "default".into());
        defaults.insert("backgroundColor".into(), "default".into());
        defaults.insert("textAlignment".into(), "left".into());
        Self { defaults }
    }
}

impl PropsPolicy {
    /// Policy that only drops blank values.
    pub fn without_defaults() -> Self {
        Self {
            defaults: Props::new(),
        }
    }

    /// Drop blank entries and entries equal to their configured default.
    pub fn normalize(&self, props: &Props) -> Props {
        props
            .iter()
            .filter(|(key, value)| !value.is_blank() && self.defaults.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Equality after normalization.
    pub fn props_eq(&self, a: &Props, b: &Props) -> bool {
        // Fast path: identical maps are equal under any policy.
        a == b || self.normalize(a) == self.normalize(b)
    }
}
