//! Core data types of the document store: keys, property values and entities.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StorageError;

// ============================================================================
// Keys
// ============================================================================

/// Identity of a document: `(namespace, ancestor path, kind, name)`.
///
/// Keys with the same root ancestor form one strong-consistency group.
/// The derived ordering compares namespace, then parent path, then kind and
/// name, which gives a stable `__key__` order for queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    namespace: String,
    parent: Option<Box<Key>>,
    kind: String,
    name: String,
}

impl Key {
    /// Creates a named key, optionally nested under `parent`.
    ///
    /// The key inherits the namespace of its parent.
    #[must_use]
    pub fn name_key(kind: impl Into<String>, name: impl Into<String>, parent: Option<Key>) -> Self {
        let namespace = parent
            .as_ref()
            .map(|p| p.namespace.clone())
            .unwrap_or_default();
        Self {
            namespace,
            parent: parent.map(Box::new),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Moves the key (and its whole ancestor path) into `namespace`.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if let Some(parent) = self.parent.take() {
            self.parent = Some(Box::new(parent.with_namespace(namespace.clone())));
        }
        self.namespace = namespace;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Returns the top-most ancestor (the entity group root).
    #[must_use]
    pub fn root(&self) -> &Key {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Returns `true` if `ancestor` is this key or appears on its ancestor path.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}/")?;
        } else if !self.namespace.is_empty() {
            write!(f, "{}:", self.namespace)?;
        }
        write!(f, "{},{}", self.kind, self.name)
    }
}

// ============================================================================
// Values
// ============================================================================

/// A property value as understood by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(OffsetDateTime),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Array(_) => "array",
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) | Self::Double(_) => 1,
            Self::Timestamp(_) => 2,
            Self::Bool(_) => 3,
            Self::Bytes(_) => 4,
            Self::String(_) => 5,
            Self::Array(_) => 6,
        }
    }

    /// Total order used by filters and sort orders.
    ///
    /// Values of different types order by type first, then by content.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Double(b)) => (*a as f64).total_cmp(b),
            (Self::Double(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A named property of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
    /// Unindexed properties are stored but never match query filters.
    pub indexed: bool,
}

impl Property {
    /// Creates an indexed property.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            indexed: true,
        }
    }

    /// Marks the property as excluded from indexes.
    #[must_use]
    pub fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }
}

/// A document: a key plus a flat list of properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Key,
    pub properties: Vec<Property>,
}

impl Entity {
    #[must_use]
    pub fn new(key: Key, properties: Vec<Property>) -> Self {
        Self { key, properties }
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a property value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.property(name).map(|p| &p.value)
    }
}

/// Outcome of one key in a batch read.
#[derive(Debug)]
pub struct KeyedResult {
    pub key: Key,
    pub result: Result<Entity, StorageError>,
}

// ============================================================================
// Mutations
// ============================================================================

/// A single write applied by [`crate::DocumentStore::mutate`] or a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create; fails with `AlreadyExists` when the key is occupied.
    Insert(Entity),
    /// Replace; fails with `NotFound` when the key is vacant.
    Update(Entity),
    /// Create or replace.
    Upsert(Entity),
    /// Remove; absent keys are ignored.
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Self::Insert(e) | Self::Update(e) | Self::Upsert(e) => &e.key,
            Self::Delete(k) => k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_inherits_parent_namespace() {
        let parent = Key::name_key("ConsentRequest", "default", None).with_namespace("tenant");
        let child = Key::name_key("ConsentRequest", "challenge-1", Some(parent.clone()));

        assert_eq!(child.namespace(), "tenant");
        assert_eq!(child.parent(), Some(&parent));
        assert_eq!(child.root(), &parent);
        assert!(child.has_ancestor(&parent));
        assert!(child.has_ancestor(&child));
        assert_eq!(child.to_string(), "tenant:ConsentRequest,default/ConsentRequest,challenge-1");
    }

    #[test]
    fn test_with_namespace_rewrites_ancestors() {
        let parent = Key::name_key("JWK", "set", None);
        let child = Key::name_key("JWK", "kid", Some(parent)).with_namespace("ns");

        assert_eq!(child.namespace(), "ns");
        assert_eq!(child.parent().map(Key::namespace), Some("ns"));
    }

    #[test]
    fn test_value_ordering() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Ordering::Less);
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Ordering::Greater
        );
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(3).compare(&Value::Double(3.0)), Ordering::Equal);
    }

    #[test]
    fn test_entity_property_lookup() {
        let entity = Entity::new(
            Key::name_key("Group", "g1", None),
            vec![
                Property::new("m", Value::Array(vec![Value::from("alice")])),
                Property::new("v", 1_i64),
            ],
        );

        assert_eq!(entity.get("v").and_then(Value::as_int), Some(1));
        assert!(entity.get("missing").is_none());
        assert!(!Property::new("sess", Value::Bytes(vec![1])).unindexed().indexed);
    }
}
