//! Avatar URL resolution over the signing and profile collaborators.
//!
//! Every public method here is best effort: collaborator errors are logged and surface as an
//! empty string, `None` or an empty map, never as an `Err`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::cache::{CacheStats, SignedUrlCache, cache_key};
use crate::path::normalize_avatar_path;
use crate::prober::CapabilityProber;
use crate::profiles::ProfileStore;
use crate::signer::{ObjectSigner, SignedObject};
use crate::types::{AvatarPath, AvatarResolution, CapabilityState, ProfileAvatarRef, UpdatedAt};
use crate::version::with_version;

/// Maximum number of keys sent in one bulk signing request.
pub const BULK_SIGN_CHUNK: usize = 200;

/// Rows fetched per request when reading the whole profile table.
pub const ALL_USERS_PAGE_SIZE: usize = 1000;

/// A profile row whose avatar reference survived normalization.
struct PendingRow<'a> {
    id: &'a str,
    path: AvatarPath,
    updated_at: Option<&'a UpdatedAt>,
}

/// Resolves avatar references to signed, version-stamped URLs.
///
/// Owns the signed URL cache and the privileged-lookup prober; build one per process and
/// share it behind an [`Arc`].
pub struct AvatarService {
    signer: Arc<dyn ObjectSigner>,
    profiles: Arc<dyn ProfileStore>,
    bulk_signing: bool,
    cache: SignedUrlCache,
    prober: CapabilityProber,
}

impl AvatarService {
    /// Builds a service, reading the signer's bulk capability once.
    pub fn new(signer: Arc<dyn ObjectSigner>, profiles: Arc<dyn ProfileStore>) -> Self {
        let bulk_signing = signer.supports_bulk();
        debug!("Avatar service created (bulk signing: {bulk_signing})");
        Self {
            signer,
            profiles,
            bulk_signing,
            cache: SignedUrlCache::new(),
            prober: CapabilityProber::new(),
        }
    }

    /// Disables bulk signing even when the signer offers it.
    #[must_use]
    pub fn with_bulk_signing(mut self, enabled: bool) -> Self {
        self.bulk_signing = enabled && self.signer.supports_bulk();
        self
    }

    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = SignedUrlCache::with_capacity(capacity);
        self
    }

    #[must_use]
    pub fn bulk_signing(&self) -> bool {
        self.bulk_signing
    }

    #[must_use]
    pub fn privileged_lookup_state(&self) -> CapabilityState {
        self.prober.state()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Signed URL for one avatar reference, or an empty string when none is available.
    pub async fn get_signed_avatar(&self, path: &str, ttl_seconds: u64) -> String {
        self.resolve_avatar(path, ttl_seconds)
            .await
            .into_url_or_empty()
    }

    /// Resolves one avatar reference, reporting which outcome was reached.
    pub async fn resolve_avatar(&self, path: &str, ttl_seconds: u64) -> AvatarResolution {
        let Some(path) = normalize_avatar_path(Some(path)) else {
            return AvatarResolution::NotFound;
        };
        self.resolve_path(&path, ttl_seconds).await
    }

    async fn resolve_path(&self, path: &AvatarPath, ttl_seconds: u64) -> AvatarResolution {
        let key = cache_key(path, ttl_seconds);
        if let Some(url) = self.cache.get(&key).await {
            return AvatarResolution::Resolved(url);
        }

        match self.signer.sign(path, ttl_seconds).await {
            Ok(url) if !url.is_empty() => {
                self.cache.set(key, url.clone()).await;
                AvatarResolution::Resolved(url)
            }
            Ok(_) => {
                warn!("Signer returned no URL for {path}");
                AvatarResolution::Unavailable
            }
            Err(e) => {
                warn!("Failed to sign avatar {path}: {e}");
                AvatarResolution::Unavailable
            }
        }
    }

    /// Signed URL stamped with the avatar's last update, or `None` when nothing could be signed.
    pub async fn get_versioned_avatar_src(
        &self,
        path: Option<&str>,
        updated_at: Option<&UpdatedAt>,
        ttl_seconds: u64,
    ) -> Option<String> {
        let url = self.get_signed_avatar(path?, ttl_seconds).await;
        if url.is_empty() {
            return None;
        }
        Some(with_version(&url, updated_at))
    }

    /// Forgets every cached URL for `path`, e.g. after the avatar was replaced.
    pub async fn invalidate_avatar(&self, path: &str) {
        self.cache.invalidate(path).await;
    }

    /// Signs avatars for a set of profile rows, keyed by row id.
    ///
    /// Rows without a usable path, and rows the signer had no URL for, are left out.
    pub async fn bulk_sign_rows(
        &self,
        rows: &[ProfileAvatarRef],
        ttl_seconds: u64,
    ) -> HashMap<String, String> {
        let pending: Vec<PendingRow<'_>> = rows
            .iter()
            .filter_map(|row| {
                normalize_avatar_path(row.avatar_path.as_deref()).map(|path| PendingRow {
                    id: &row.id,
                    path,
                    updated_at: row.avatar_updated_at.as_ref(),
                })
            })
            .collect();

        if pending.is_empty() {
            return HashMap::new();
        }

        let resolved = if self.bulk_signing {
            self.sign_in_chunks(&pending, ttl_seconds).await
        } else {
            self.sign_each(&pending, ttl_seconds).await
        };

        debug!(
            "Signed {} of {} avatar rows ({} without a path)",
            resolved.len(),
            pending.len(),
            rows.len() - pending.len()
        );
        resolved
    }

    async fn sign_in_chunks(
        &self,
        pending: &[PendingRow<'_>],
        ttl_seconds: u64,
    ) -> HashMap<String, String> {
        let mut resolved = HashMap::with_capacity(pending.len());

        for (index, chunk) in pending.chunks(BULK_SIGN_CHUNK).enumerate() {
            let paths: Vec<AvatarPath> = chunk.iter().map(|row| row.path.clone()).collect();

            let signed = match self.signer.sign_many(&paths, ttl_seconds).await {
                Ok(signed) => signed,
                Err(e) => {
                    warn!(
                        "Bulk signing chunk {index} ({} paths) failed: {e}",
                        paths.len()
                    );
                    continue;
                }
            };

            let Some(urls) = align_signed(&paths, signed) else {
                warn!("Bulk signing chunk {index} returned entries that cannot be matched to paths");
                continue;
            };

            for (row, url) in chunk.iter().zip(urls) {
                let Some(url) = url.filter(|url| !url.is_empty()) else {
                    continue;
                };
                self.cache
                    .set(cache_key(&row.path, ttl_seconds), url.clone())
                    .await;
                resolved.insert(row.id.to_string(), with_version(&url, row.updated_at));
            }
        }

        resolved
    }

    async fn sign_each(
        &self,
        pending: &[PendingRow<'_>],
        ttl_seconds: u64,
    ) -> HashMap<String, String> {
        let results = join_all(
            pending
                .iter()
                .map(|row| self.resolve_path(&row.path, ttl_seconds)),
        )
        .await;

        pending
            .iter()
            .zip(results)
            .filter_map(|(row, resolution)| match resolution {
                AvatarResolution::Resolved(url) => {
                    Some((row.id.to_string(), with_version(&url, row.updated_at)))
                }
                _ => None,
            })
            .collect()
    }

    /// Signed avatars for the given users, keyed by user id.
    ///
    /// Tries the privileged lookup first unless it already failed in this process, then falls
    /// back to a direct read that row policies may narrow.
    pub async fn bulk_signed_by_user_ids(
        &self,
        user_ids: &[String],
        ttl_seconds: u64,
    ) -> HashMap<String, String> {
        let mut seen: HashSet<&String> = HashSet::with_capacity(user_ids.len());
        let ids: Vec<String> = user_ids
            .iter()
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .cloned()
            .collect();

        if ids.is_empty() {
            return HashMap::new();
        }

        if self.prober.should_attempt() {
            match self.profiles.privileged_by_ids(&ids).await {
                Ok(rows) => {
                    self.prober.mark_available();
                    debug!(
                        "Privileged lookup returned {} of {} profiles",
                        rows.len(),
                        ids.len()
                    );
                    return self.bulk_sign_rows(&rows, ttl_seconds).await;
                }
                Err(e) => {
                    if e.is_capability_missing() {
                        info!("Privileged avatar lookup not available: {e}");
                    } else {
                        warn!("Privileged avatar lookup failed: {e}");
                    }
                    self.prober.mark_unavailable();
                }
            }
        }

        match self.profiles.by_ids(&ids).await {
            Ok(rows) => {
                if rows.len() < ids.len() {
                    debug!(
                        "Direct read returned {} of {} profiles",
                        rows.len(),
                        ids.len()
                    );
                }
                self.bulk_sign_rows(&rows, ttl_seconds).await
            }
            Err(e) => {
                warn!("Failed to read avatar references: {e}");
                HashMap::new()
            }
        }
    }

    /// Signed avatars for every profile, keyed by user id.
    ///
    /// Reads the table page by page with the caller's own credentials; a failed page ends
    /// the scan and whatever was read so far is signed.
    pub async fn bulk_signed_all_users(&self, ttl_seconds: u64) -> HashMap<String, String> {
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            match self.profiles.page(offset, ALL_USERS_PAGE_SIZE).await {
                Ok(page) => {
                    let fetched = page.len();
                    rows.extend(page);
                    if fetched < ALL_USERS_PAGE_SIZE {
                        break;
                    }
                    offset += ALL_USERS_PAGE_SIZE;
                }
                Err(e) => {
                    warn!("Stopped reading profiles at offset {offset}: {e}");
                    break;
                }
            }
        }

        info!("Read {} profiles for avatar signing", rows.len());
        self.bulk_sign_rows(&rows, ttl_seconds).await
    }
}

/// Lines up a bulk response with the requested paths.
///
/// Entries are matched by the path the backend echoes back. When any entry lacks one, the
/// response is read positionally, which is only trusted when the lengths agree.
fn align_signed(paths: &[AvatarPath], signed: Vec<SignedObject>) -> Option<Vec<Option<String>>> {
    if !signed.is_empty() && signed.iter().all(|entry| entry.path.is_some()) {
        let by_path: HashMap<String, Option<String>> = signed
            .into_iter()
            .filter_map(|entry| entry.path.map(|path| (path, entry.signed_url)))
            .collect();
        return Some(
            paths
                .iter()
                .map(|path| by_path.get(path.as_str()).cloned().flatten())
                .collect(),
        );
    }

    if signed.len() != paths.len() {
        return None;
    }
    Some(signed.into_iter().map(|entry| entry.signed_url).collect())
}
