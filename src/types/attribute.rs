//! Namespaced, multi-valued attributes for objects and frames.
//!
//! An `AttributeStore` maps `(namespace, name)` to an `Attribute`, and each attribute
//! holds an ordered list of `AttributeValue`s. Repeated values under one key model
//! repeated detections (for example several classifier passes over the same object);
//! their index is insertion order and stays stable until the attribute is rewritten.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// The payload of a single attribute value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AttributeValueKind {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    FloatVector(Vec<f64>),
    String(String),
}

/// One value of an attribute plus the confidence of whoever produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttributeValue {
    #[serde(default)]
    pub confidence: Option<f32>,
    pub value: AttributeValueKind,
}

impl AttributeValue {
    pub fn new(value: AttributeValueKind, confidence: Option<f32>) -> Self {
        Self { confidence, value }
    }

    pub fn float_vector(values: Vec<f64>, confidence: Option<f32>) -> Self {
        Self::new(AttributeValueKind::FloatVector(values), confidence)
    }

    pub fn float(value: f64, confidence: Option<f32>) -> Self {
        Self::new(AttributeValueKind::Float(value), confidence)
    }

    pub fn integer(value: i64, confidence: Option<f32>) -> Self {
        Self::new(AttributeValueKind::Integer(value), confidence)
    }

    pub fn string(value: &str, confidence: Option<f32>) -> Self {
        Self::new(AttributeValueKind::String(value.to_owned()), confidence)
    }

    pub fn boolean(value: bool, confidence: Option<f32>) -> Self {
        Self::new(AttributeValueKind::Boolean(value), confidence)
    }

    /// The numeric vector view used by the C ABI. `None` for non-vector kinds.
    pub fn as_float_vector(&self) -> Option<&[f64]> {
        match &self.value {
            AttributeValueKind::FloatVector(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attribute {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub values: Vec<AttributeValue>,
    /// Free-form note about how the values were produced (model name, version ...).
    #[serde(default)]
    pub hint: Option<String>,
    /// Non-persistent attributes are working state and are dropped by
    /// `AttributeStore::clear_temporary`.
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_persistent() -> bool {
    true
}

impl Attribute {
    pub fn new(namespace: &str, name: &str, values: Vec<AttributeValue>) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            values,
            hint: None,
            persistent: true,
        }
    }

    pub fn temporary(namespace: &str, name: &str, values: Vec<AttributeValue>) -> Self {
        Self {
            persistent: false,
            ..Self::new(namespace, name, values)
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_owned());
        self
    }

    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }
}

/// Per-object (or per-frame) attribute table.
///
/// Serialized as a plain list of attributes because tuple keys do not map onto JSON
/// object keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    attributes: HashMap<(String, String), Attribute>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.get(namespace, name).is_some()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&Attribute> {
        self.attributes
            .get(&(namespace.to_owned(), name.to_owned()))
    }

    /// Returns the value at `index` under `(namespace, name)`, or `None` when the key
    /// is missing or `index` is past the end. Never mutates.
    pub fn get_value(&self, namespace: &str, name: &str, index: usize) -> Option<&AttributeValue> {
        self.get(namespace, name)
            .and_then(|attribute| attribute.values.get(index))
    }

    /// Inserts or rewrites an attribute, returning the one it replaced.
    pub fn set(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.attributes.insert(attribute.key(), attribute)
    }

    pub fn delete(&mut self, namespace: &str, name: &str) -> Option<Attribute> {
        self.attributes
            .remove(&(namespace.to_owned(), name.to_owned()))
    }

    /// All keys, sorted so callers get a deterministic listing.
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.attributes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys in `namespace`, optionally restricted to `names` (empty = any name).
    pub fn find(&self, namespace: &str, names: &[&str]) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self
            .attributes
            .keys()
            .filter(|(ns, name)| {
                ns == namespace && (names.is_empty() || names.contains(&name.as_str()))
            })
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Drops every non-persistent attribute.
    pub fn clear_temporary(&mut self) {
        self.attributes.retain(|_, attribute| attribute.persistent);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }
}

impl Serialize for AttributeStore {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut sorted: Vec<&Attribute> = self.attributes.values().collect();
        sorted.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        sorted.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeStore {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let list = Vec::<Attribute>::deserialize(deserializer)?;
        let mut store = AttributeStore::new();
        for attribute in list {
            store.set(attribute);
        }
        Ok(store)
    }
}
