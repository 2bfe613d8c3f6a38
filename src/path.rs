//! Canonical storage keys for avatar references.

use crate::types::AvatarPath;

/// Bucket-name prefixes that older uploads stored in front of the object key.
const BUCKET_PREFIXES: [&str; 2] = ["avatar/", "avatars/"];

/// Strip a redundant bucket prefix from a stored avatar reference.
///
/// Returns `None` for absent or empty input, and for a reference that is nothing but a prefix.
#[must_use]
pub fn normalize_avatar_path(raw: Option<&str>) -> Option<AvatarPath> {
    let raw = raw?;
    let stripped = BUCKET_PREFIXES
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix))
        .unwrap_or(raw);

    if stripped.is_empty() {
        return None;
    }

    Some(AvatarPath::new_unchecked(stripped.to_string()))
}
