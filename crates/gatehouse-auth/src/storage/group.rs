use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Group;

/// Storage of subject groups.
#[async_trait]
pub trait GroupManager: Send + Sync {
    /// Stores a new group, generating an id when it has none.
    async fn create_group(&self, group: &Group) -> AuthResult<Group>;

    async fn get_group(&self, id: &str) -> AuthResult<Group>;

    async fn delete_group(&self, id: &str) -> AuthResult<()>;

    /// # Errors
    ///
    /// Returns `AlreadyExists` if any subject is already a member.
    async fn add_group_members(&self, id: &str, subjects: &[String]) -> AuthResult<()>;

    async fn remove_group_members(&self, id: &str, subjects: &[String]) -> AuthResult<()>;

    async fn find_groups_by_member(&self, subject: &str, limit: usize, offset: usize) -> AuthResult<Vec<Group>>;

    async fn list_groups(&self, limit: usize, offset: usize) -> AuthResult<Vec<Group>>;
}
