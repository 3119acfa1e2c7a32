//! Query description types.
//!
//! A [`Query`] selects entities of one kind within one namespace, optionally
//! restricted to the descendants of an ancestor key. Ancestor queries are
//! strongly consistent; everything else may observe stale index state.

use crate::types::{Entity, Key, Value};
use std::cmp::Ordering;

/// Pseudo-property that orders or filters by entity key.
pub const KEY_PROPERTY: &str = "__key__";

/// Comparison operator of a property filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// A `property <op> value` restriction.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub property: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

/// A query over entities of a single kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub namespace: String,
    pub ancestor: Option<Key>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: String::new(),
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Restricts results to descendants of `ancestor` (strongly consistent).
    #[must_use]
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    #[must_use]
    pub fn filter(mut self, property: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            property: property.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Shorthand for an equality filter.
    #[must_use]
    pub fn eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(property, FilterOp::Eq, value)
    }

    #[must_use]
    pub fn order(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(Order {
            property: property.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn order_by_key(self) -> Self {
        self.order(KEY_PROPERTY, Direction::Ascending)
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns `true` if `entity` satisfies kind, namespace, ancestor and
    /// every filter of this query.
    ///
    /// Unindexed or missing properties never match. An array property
    /// matches when any of its elements satisfies the filter.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        let key = &entity.key;
        if key.kind() != self.kind || key.namespace() != self.namespace {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !key.has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters.iter().all(|filter| filter_matches(filter, entity))
    }

    /// Compares two matching entities according to the query orders, falling
    /// back to key order.
    #[must_use]
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        for order in &self.orders {
            let ordering = if order.property == KEY_PROPERTY {
                a.key.cmp(&b.key)
            } else {
                let left = a.get(&order.property).unwrap_or(&Value::Null);
                let right = b.get(&order.property).unwrap_or(&Value::Null);
                left.compare(right)
            };
            let ordering = match order.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.key.cmp(&b.key)
    }
}

fn filter_matches(filter: &Filter, entity: &Entity) -> bool {
    if filter.property == KEY_PROPERTY {
        return match &filter.value {
            Value::String(name) => filter.op.accepts(entity.key.name().cmp(name.as_str())),
            _ => false,
        };
    }
    let Some(property) = entity.property(&filter.property) else {
        return false;
    };
    if !property.indexed {
        return false;
    }
    match &property.value {
        Value::Array(items) => items
            .iter()
            .any(|item| filter.op.accepts(item.compare(&filter.value))),
        value => filter.op.accepts(value.compare(&filter.value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Property;

    fn group(name: &str, members: &[&str]) -> Entity {
        Entity::new(
            Key::name_key("Group", name, None),
            vec![Property::new(
                "m",
                Value::Array(members.iter().map(|m| Value::from(*m)).collect()),
            )],
        )
    }

    #[test]
    fn test_array_membership_filter() {
        let query = Query::new("Group").eq("m", "bob");
        assert!(query.matches(&group("a", &["alice", "bob"])));
        assert!(!query.matches(&group("b", &["alice"])));
    }

    #[test]
    fn test_unindexed_property_never_matches() {
        let entity = Entity::new(
            Key::name_key("OAuth2Access", "sig", None),
            vec![Property::new("sess", "x").unindexed()],
        );
        assert!(!Query::new("OAuth2Access").eq("sess", "x").matches(&entity));
    }

    #[test]
    fn test_ancestor_and_namespace() {
        let root = Key::name_key("ConsentRequest", "default", None).with_namespace("ns");
        let child = Entity::new(
            Key::name_key("ConsentRequest", "c1", Some(root.clone())),
            Vec::new(),
        );

        assert!(Query::new("ConsentRequest")
            .namespace("ns")
            .ancestor(root)
            .matches(&child));
        assert!(!Query::new("ConsentRequest").matches(&child));
    }

    #[test]
    fn test_descending_order() {
        let query = Query::new("JWK").order("created_at", Direction::Descending);
        let older = Entity::new(Key::name_key("JWK", "a", None), vec![Property::new("created_at", 1_i64)]);
        let newer = Entity::new(Key::name_key("JWK", "b", None), vec![Property::new("created_at", 2_i64)]);
        assert_eq!(query.compare(&newer, &older), Ordering::Less);
    }
}
