//! Common types used throughout the avatar resolver.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default validity window for signed avatar URLs, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Storage key of an avatar object, relative to the avatar bucket.
///
/// Only [`crate::path::normalize_avatar_path`] builds these, so the key is never empty and
/// never carries a leading bucket segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AvatarPath(String);

impl AvatarPath {
    pub(crate) fn new_unchecked(path: String) -> Self {
        AvatarPath(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AvatarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AvatarPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Last-modified marker of an avatar, as stored on the profile row.
///
/// Postgres hands back ISO-8601 strings; older rows and RPC results may carry an epoch number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdatedAt {
    Iso(String),
    Epoch(f64),
}

impl From<&str> for UpdatedAt {
    fn from(value: &str) -> Self {
        UpdatedAt::Iso(value.to_string())
    }
}

impl From<String> for UpdatedAt {
    fn from(value: String) -> Self {
        UpdatedAt::Iso(value)
    }
}

impl From<f64> for UpdatedAt {
    fn from(value: f64) -> Self {
        UpdatedAt::Epoch(value)
    }
}

impl From<i64> for UpdatedAt {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        UpdatedAt::Epoch(value as f64)
    }
}

/// Avatar reference read from the profile store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAvatarRef {
    pub id: String,
    #[serde(default)]
    pub avatar_path: Option<String>,
    #[serde(default)]
    pub avatar_updated_at: Option<UpdatedAt>,
}

impl ProfileAvatarRef {
    pub fn new(
        id: impl Into<String>,
        avatar_path: Option<&str>,
        avatar_updated_at: Option<UpdatedAt>,
    ) -> Self {
        Self {
            id: id.into(),
            avatar_path: avatar_path.map(str::to_string),
            avatar_updated_at,
        }
    }
}

/// Outcome of resolving a single avatar path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarResolution {
    /// A signed URL, from the cache or freshly issued
    Resolved(String),
    /// The reference was empty after normalization
    NotFound,
    /// The signer failed or returned no URL
    Unavailable,
}

impl AvatarResolution {
    /// Returns the URL when resolved.
    pub fn url(&self) -> Option<&str> {
        match self {
            AvatarResolution::Resolved(url) => Some(url),
            _ => None,
        }
    }

    /// Consumes the resolution, yielding an empty string for anything but a resolved URL.
    pub fn into_url_or_empty(self) -> String {
        match self {
            AvatarResolution::Resolved(url) => url,
            _ => String::new(),
        }
    }
}

/// Whether the privileged avatar lookup works in this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityState {
    Unknown,
    Available,
    Unavailable,
}

/// Selects the object signing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StorageBackend {
    Supabase,
    S3,
}
