//! Storage location facts.
//!
//! An Embra application's files may be installed in one of several places:
//! the app-private data directory, external app storage, or expansion-asset
//! storage. The locations are computed once per bootstrap run and passed
//! explicitly into the sequencer; nothing downstream discovers them on its
//! own.

use std::path::{Path, PathBuf};

/// Location of the bootstrap configuration file inside the private
/// data directory.
pub const BOOTSTRAP_CONFIG_RELPATH: &str = "engine/bootstrap.ini";

/// The set of storage locations available on this device.
///
/// Immutable once computed. The private directory is always present;
/// external and expansion storage may be absent, and callers must handle
/// absence explicitly rather than defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocations {
    /// App-exclusive data directory. Always present.
    pub internal_data_dir: PathBuf,
    /// External app storage root, absent when external storage is
    /// unavailable.
    pub external_data_dir: Option<PathBuf>,
    /// Expansion-asset storage root. May not exist on disk until first
    /// access; absent when external storage is unavailable.
    pub expansion_dir: Option<PathBuf>,
}

impl StorageLocations {
    /// Build locations from directories supplied by the host shell.
    pub fn new(
        internal_data_dir: PathBuf,
        external_data_dir: Option<PathBuf>,
        expansion_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            internal_data_dir,
            external_data_dir,
            expansion_dir,
        }
    }

    /// Derive locations for a desktop run of the launcher.
    ///
    /// Internal storage maps to the per-user data directory, external
    /// storage to the local-data directory. Falls back to the current
    /// directory when the platform reports no user directories. Expansion
    /// storage has no desktop equivalent and stays absent unless the
    /// caller supplies one.
    pub fn for_desktop(app_name: &str) -> Self {
        let fallback = || {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        };
        let internal = dirs::data_dir()
            .map(|d| d.join(app_name))
            .unwrap_or_else(fallback);
        let external = dirs::data_local_dir().map(|d| d.join(app_name));
        Self {
            internal_data_dir: internal,
            external_data_dir: external,
            expansion_dir: None,
        }
    }

    /// Default location of `bootstrap.ini` for these locations.
    pub fn bootstrap_config_path(&self) -> PathBuf {
        self.internal_data_dir.join(BOOTSTRAP_CONFIG_RELPATH)
    }

    /// The expansion-storage root, if available.
    pub fn expansion_dir(&self) -> Option<&Path> {
        self.expansion_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_under_internal_dir() {
        let locations = StorageLocations::new(PathBuf::from("/data/app"), None, None);
        assert_eq!(
            locations.bootstrap_config_path(),
            PathBuf::from("/data/app/engine/bootstrap.ini")
        );
    }

    #[test]
    fn test_desktop_locations_have_internal_dir() {
        let locations = StorageLocations::for_desktop("embra");
        assert!(!locations.internal_data_dir.as_os_str().is_empty());
        assert!(locations.expansion_dir.is_none());
    }

    #[test]
    fn test_expansion_dir_accessor() {
        let locations = StorageLocations::new(
            PathBuf::from("/data/app"),
            Some(PathBuf::from("/storage/app")),
            Some(PathBuf::from("/storage/obb/app")),
        );
        assert_eq!(
            locations.expansion_dir(),
            Some(Path::new("/storage/obb/app"))
        );
    }
}
