//! Profile row store collaborator.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ProfileAvatarRef;

/// Read access to the avatar columns of the profile table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Rows for `ids` as visible to the current credentials. Row policies may hide some.
    async fn by_ids(&self, ids: &[String]) -> Result<Vec<ProfileAvatarRef>>;

    /// Rows for `ids` through the elevated lookup that bypasses row policies.
    ///
    /// Deployments without the lookup report an error.
    async fn privileged_by_ids(&self, ids: &[String]) -> Result<Vec<ProfileAvatarRef>>;

    /// One page of the full table, ordered by id.
    async fn page(&self, offset: usize, limit: usize) -> Result<Vec<ProfileAvatarRef>>;
}
