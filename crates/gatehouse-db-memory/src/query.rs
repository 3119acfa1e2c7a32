//! Query execution over a snapshot of matching entities.

use crate::storage::StoredEntity;
use gatehouse_storage::Query;

/// Sorts `matched` by the query orders and applies offset and limit.
///
/// Filtering has already happened in the snapshot.
pub(crate) fn execute(query: &Query, mut matched: Vec<StoredEntity>) -> Vec<StoredEntity> {
    matched.sort_by(|a, b| query.compare(&a.entity, &b.entity));

    let limit = query.limit.unwrap_or(usize::MAX);
    matched.into_iter().skip(query.offset).take(limit).collect()
}
