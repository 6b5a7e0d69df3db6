//! Startup manifest resolution.
//!
//! The host package's metadata carries the manifest path under the
//! well-known key `embra.application.manifest`. The raw value may embed
//! `${expansion_dir}`, a deferred reference to the expansion-storage root
//! that only becomes known at run time. Resolution substitutes the token,
//! then confirms the file actually exists; a nonexistent path is never
//! handed downstream.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::BootstrapError;
use crate::paths::StorageLocations;

/// Host metadata key carrying the raw manifest reference.
pub const MANIFEST_METADATA_KEY: &str = "embra.application.manifest";

/// Placeholder token denoting the expansion-storage root.
pub const EXPANSION_DIR_TOKEN: &str = "${expansion_dir}";

/// A manifest path confirmed to exist on disk, plus its parent directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedManifest {
    /// Absolute path of the manifest file.
    pub path: PathBuf,
    /// The manifest's parent directory.
    pub dir: PathBuf,
}

/// Substitute every occurrence of [`EXPANSION_DIR_TOKEN`] in `raw`.
///
/// A reference without the token is returned unchanged, so substitution is
/// idempotent on an already-substituted path. Partial or ambiguous token
/// text is not recognized and passes through literally; the stale text
/// then fails the existence check instead of silently misresolving.
pub fn expand_expansion_dir(raw: &str, expansion_dir: &Path) -> String {
    raw.replace(EXPANSION_DIR_TOKEN, &expansion_dir.to_string_lossy())
}

/// Resolve the raw manifest reference against the available storage
/// locations.
///
/// Fails with [`BootstrapError::ManifestUnset`] when no reference was
/// supplied, or when the reference needs the expansion directory and none
/// is available. Fails with [`BootstrapError::ManifestNotExists`] when the
/// substituted path is not present on disk.
pub fn resolve(
    raw: Option<&str>,
    locations: &StorageLocations,
) -> Result<ResolvedManifest, BootstrapError> {
    let raw = match raw {
        Some(value) if !value.is_empty() => value,
        _ => return Err(BootstrapError::ManifestUnset),
    };

    let substituted = if raw.contains(EXPANSION_DIR_TOKEN) {
        let expansion = locations
            .expansion_dir()
            .ok_or(BootstrapError::ManifestUnset)?;
        let expanded = expand_expansion_dir(raw, expansion);
        debug!(
            raw,
            expanded = expanded.as_str(),
            "substituted expansion directory into manifest reference"
        );
        expanded
    } else {
        raw.to_string()
    };

    let path = PathBuf::from(substituted);
    if !path.exists() {
        return Err(BootstrapError::ManifestNotExists(path));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok(ResolvedManifest { path, dir })
}
