//! Subject groups.

use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_auth::{AuthError, AuthResult, Group, GroupManager};
use gatehouse_storage::{DocumentStore, Key, Mutation, Query, run_in_transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::codec::{self, Field, Loaded, Migration, Record};
use crate::error::StorageResultExt;
use crate::keys::{Kind, KeyScheme};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GroupRecord {
    pub id: String,
    /// Stored as an array so that membership is queryable.
    pub members: Vec<String>,
}

impl Record for GroupRecord {
    const NAME: &'static str = "group";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[Field::<Self>::list("m", |r| &mut r.members)];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.id = key.name().to_string();
    }
}

impl From<GroupRecord> for Group {
    fn from(record: GroupRecord) -> Self {
        Group::new(record.id, record.members)
    }
}

/// Appends `subjects`, rejecting any that is already a member.
fn add_members(members: &mut Vec<String>, subjects: &[String]) -> AuthResult<()> {
    for subject in subjects {
        if members.contains(subject) {
            return Err(AuthError::already_exists(format!(
                "{subject} is already a group member"
            )));
        }
        members.push(subject.clone());
    }
    Ok(())
}

/// Removes `subjects`; returns whether anything changed.
fn remove_members(members: &mut Vec<String>, subjects: &[String]) -> bool {
    let before = members.len();
    members.retain(|m| !subjects.contains(m));
    members.len() != before
}

// =============================================================================
// Group Manager
// =============================================================================

/// Group storage on a document store.
pub struct DatastoreGroupManager {
    store: Arc<dyn DocumentStore>,
    keys: KeyScheme,
}

impl DatastoreGroupManager {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, keys: KeyScheme) -> Self {
        Self { store, keys }
    }

    /// Runs a group listing, writing back upgraded records in one batch.
    async fn execute(&self, query: Query) -> AuthResult<Vec<Group>> {
        let entities = self
            .store
            .run_query(&query)
            .await
            .context("list groups")?;

        let mut upgrades = Vec::new();
        let mut groups = Vec::with_capacity(entities.len());
        for entity in &entities {
            let Loaded {
                mut record,
                pending_upgrade,
            } = codec::load::<GroupRecord>(entity)?;
            if pending_upgrade {
                upgrades.push(Mutation::Update(codec::to_entity(entity.key.clone(), &mut record)?));
            }
            groups.push(Group::from(record));
        }

        if !upgrades.is_empty() {
            debug!(count = upgrades.len(), "writing back upgraded groups");
            self.store
                .mutate(upgrades)
                .await
                .context("upgrade groups")?;
        }
        Ok(groups)
    }
}

#[async_trait]
impl GroupManager for DatastoreGroupManager {
    #[instrument(skip(self, group), fields(group_id = %group.id))]
    async fn create_group(&self, group: &Group) -> AuthResult<Group> {
        let mut record = GroupRecord {
            id: if group.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                group.id.clone()
            },
            members: group.members.clone(),
        };

        let entity = codec::to_entity(self.keys.group(&record.id), &mut record)?;
        self.store
            .mutate(vec![Mutation::Insert(entity)])
            .await
            .context("create group")?;
        Ok(record.into())
    }

    #[instrument(skip(self))]
    async fn get_group(&self, id: &str) -> AuthResult<Group> {
        let key = self.keys.group(id);
        let entity = self.store.get(&key).await.context("get group")?;
        let Loaded {
            mut record,
            pending_upgrade,
        } = codec::load::<GroupRecord>(&entity)?;

        if pending_upgrade {
            let upgraded = codec::to_entity(key, &mut record)?;
            self.store
                .mutate(vec![Mutation::Update(upgraded)])
                .await
                .context("upgrade group")?;
        }
        Ok(record.into())
    }

    #[instrument(skip(self))]
    async fn delete_group(&self, id: &str) -> AuthResult<()> {
        self.store
            .delete(&self.keys.group(id))
            .await
            .context("delete group")
    }

    #[instrument(skip(self, subjects), fields(count = subjects.len()))]
    async fn add_group_members(&self, id: &str, subjects: &[String]) -> AuthResult<()> {
        let key = self.keys.group(id);

        run_in_transaction(self.store.as_ref(), |tx| {
            let key = key.clone();
            let subjects = subjects.to_vec();
            Box::pin(async move {
                let entity = tx.get(&key).await.context("get group")?;
                let mut record = codec::load::<GroupRecord>(&entity)?.record;
                add_members(&mut record.members, &subjects)?;

                let entity = codec::to_entity(key, &mut record)?;
                tx.mutate(vec![Mutation::Update(entity)]);
                Ok::<_, AuthError>(())
            })
        })
        .await
    }

    #[instrument(skip(self, subjects), fields(count = subjects.len()))]
    async fn remove_group_members(&self, id: &str, subjects: &[String]) -> AuthResult<()> {
        let key = self.keys.group(id);

        run_in_transaction(self.store.as_ref(), |tx| {
            let key = key.clone();
            let subjects = subjects.to_vec();
            Box::pin(async move {
                let entity = tx.get(&key).await.context("get group")?;
                let mut record = codec::load::<GroupRecord>(&entity)?.record;
                if remove_members(&mut record.members, &subjects) {
                    let entity = codec::to_entity(key, &mut record)?;
                    tx.mutate(vec![Mutation::Update(entity)]);
                }
                Ok::<_, AuthError>(())
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_groups_by_member(&self, subject: &str, limit: usize, offset: usize) -> AuthResult<Vec<Group>> {
        let query = self
            .keys
            .query(Kind::Group)
            .eq("m", subject)
            .limit(limit)
            .offset(offset);
        self.execute(query).await
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, limit: usize, offset: usize) -> AuthResult<Vec<Group>> {
        let query = self.keys.query(Kind::Group).limit(limit).offset(offset);
        self.execute(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_members_rejects_duplicates() {
        let mut members = subjects(&["alice"]);
        add_members(&mut members, &subjects(&["bob"])).unwrap();
        assert_eq!(members, subjects(&["alice", "bob"]));

        let err = add_members(&mut members, &subjects(&["carol", "alice"])).unwrap_err();
        assert!(err.is_already_exists());

        let err = add_members(&mut subjects(&[]), &subjects(&["dave", "dave"])).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_remove_members_reports_change() {
        let mut members = subjects(&["alice", "bob"]);
        assert!(!remove_members(&mut members, &subjects(&["carol"])));
        assert!(remove_members(&mut members, &subjects(&["alice"])));
        assert_eq!(members, subjects(&["bob"]));
    }
}
