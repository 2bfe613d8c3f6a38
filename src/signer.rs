//! Object signing collaborator.

use async_trait::async_trait;

use crate::error::{AvatarError, Result};
use crate::types::AvatarPath;

/// One entry of a bulk signing response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedObject {
    /// Key the backend says this entry belongs to, when it echoes one back.
    pub path: Option<String>,
    pub signed_url: Option<String>,
}

/// Issues time-limited read URLs for avatar objects.
///
/// Bulk support is a property of the backend, fixed when it is constructed: callers read
/// [`ObjectSigner::supports_bulk`] once and never probe `sign_many` speculatively.
#[async_trait]
pub trait ObjectSigner: Send + Sync {
    /// Sign one object key for `ttl_seconds`.
    async fn sign(&self, path: &AvatarPath, ttl_seconds: u64) -> Result<String>;

    fn supports_bulk(&self) -> bool {
        false
    }

    /// Sign many keys in one round trip, one entry per key.
    async fn sign_many(&self, paths: &[AvatarPath], ttl_seconds: u64) -> Result<Vec<SignedObject>> {
        let _ = (paths, ttl_seconds);
        Err(AvatarError::BulkSigningUnsupported)
    }
}
