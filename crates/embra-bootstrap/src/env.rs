//! Environment propagation.
//!
//! The resolved path facts are handed to the engine through process
//! environment variables, the one channel the engine can read without
//! depending on the host shell. Each write goes through the platform
//! primitive and is verified by reading the value back. Writes are
//! independent: one fact failing never stops the others, and re-setting a
//! key to the same value is always safe, so repeat bootstrap attempts
//! (host re-creation) just overwrite.
//!
//! The variables are written once per bootstrap attempt and never cleared;
//! the engine reads them only after its main module is loaded.

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::manifest::ResolvedManifest;
use crate::paths::StorageLocations;

/// Absolute path of the resolved application manifest.
pub const APP_MANIFEST_PATH: &str = "APP_MANIFEST_PATH";

/// Parent directory of the resolved application manifest.
pub const APP_MANIFEST_DIR: &str = "APP_MANIFEST_DIR";

/// App-private data directory root.
pub const APP_INTERNAL_DATA_DIR: &str = "APP_INTERNAL_DATA_DIR";

/// External app storage root.
pub const APP_EXTERNAL_DATA_DIR: &str = "APP_EXTERNAL_DATA_DIR";

/// The facts handed to the engine.
#[derive(Debug, Clone)]
pub struct EnvironmentFacts {
    /// Value for [`APP_MANIFEST_PATH`].
    pub manifest_path: PathBuf,
    /// Value for [`APP_MANIFEST_DIR`].
    pub manifest_dir: PathBuf,
    /// Value for [`APP_INTERNAL_DATA_DIR`].
    pub internal_data_dir: PathBuf,
    /// Value for [`APP_EXTERNAL_DATA_DIR`], absent when external storage
    /// is unavailable.
    pub external_data_dir: Option<PathBuf>,
}

impl EnvironmentFacts {
    /// Assemble the facts from a resolved manifest and the storage
    /// locations.
    pub fn from_parts(manifest: &ResolvedManifest, locations: &StorageLocations) -> Self {
        Self {
            manifest_path: manifest.path.clone(),
            manifest_dir: manifest.dir.clone(),
            internal_data_dir: locations.internal_data_dir.clone(),
            external_data_dir: locations.external_data_dir.clone(),
        }
    }
}

/// Outcome of propagating one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    /// Written and verified by read-back.
    Set,
    /// The fact had no value (absent external storage).
    Skipped,
    /// The write or its verification failed.
    Failed,
}

/// Per-fact propagation record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PropagationEntry {
    /// Environment variable name.
    pub key: &'static str,
    /// What happened to it.
    pub status: FactStatus,
}

/// Result of a [`set_all`] run, one entry per fact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PropagationReport {
    /// Entries in write order.
    pub entries: Vec<PropagationEntry>,
}

impl PropagationReport {
    /// Status of a single key, if it was attempted.
    pub fn status(&self, key: &str) -> Option<FactStatus> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.status)
    }

    /// Whether the manifest-path fact specifically was set. The engine
    /// cannot start without it, so the sequencer treats this one as fatal.
    pub fn manifest_path_set(&self) -> bool {
        self.status(APP_MANIFEST_PATH) == Some(FactStatus::Set)
    }
}

/// Write all four facts into the process environment.
///
/// Each fact is attempted independently; failures are recorded and logged
/// but never abort the remaining writes.
pub fn set_all(facts: &EnvironmentFacts) -> PropagationReport {
    let values = [
        (APP_MANIFEST_PATH, Some(&facts.manifest_path)),
        (APP_MANIFEST_DIR, Some(&facts.manifest_dir)),
        (APP_INTERNAL_DATA_DIR, Some(&facts.internal_data_dir)),
        (APP_EXTERNAL_DATA_DIR, facts.external_data_dir.as_ref()),
    ];

    let mut entries = Vec::with_capacity(values.len());
    for (key, value) in values {
        let status = match value {
            None => {
                debug!(key, "skipping environment fact with no value");
                FactStatus::Skipped
            }
            Some(path) => {
                let value = path.to_string_lossy();
                if set_env_var(key, &value) {
                    debug!(key, value = value.as_ref(), "environment fact set");
                    FactStatus::Set
                } else {
                    warn!(key, value = value.as_ref(), "environment fact write failed");
                    FactStatus::Failed
                }
            }
        };
        entries.push(PropagationEntry { key, status });
    }

    PropagationReport { entries }
}

/// Set one process environment variable and verify it by read-back.
///
/// Returns `false` when the write is rejected by the platform or the
/// read-back does not return the written value.
pub fn set_env_var(name: &str, value: &str) -> bool {
    if !platform_set_env(name, value) {
        return false;
    }
    match std::env::var_os(name) {
        Some(read_back) => read_back.to_string_lossy() == value,
        None => false,
    }
}

#[cfg(unix)]
fn platform_set_env(name: &str, value: &str) -> bool {
    use std::ffi::CString;

    let (Ok(c_name), Ok(c_value)) = (CString::new(name), CString::new(value)) else {
        return false;
    };
    // 1 means overwrite an existing value.
    unsafe { libc::setenv(c_name.as_ptr(), c_value.as_ptr(), 1) == 0 }
}

#[cfg(not(unix))]
fn platform_set_env(name: &str, value: &str) -> bool {
    if name.is_empty() || name.contains('=') || name.contains('\0') || value.contains('\0') {
        return false;
    }
    std::env::set_var(name, value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn facts(temp: &std::path::Path) -> EnvironmentFacts {
        EnvironmentFacts {
            manifest_path: temp.join("app.manifest"),
            manifest_dir: temp.to_path_buf(),
            internal_data_dir: temp.join("internal"),
            external_data_dir: Some(temp.join("external")),
        }
    }

    #[test]
    #[serial]
    fn test_set_env_var_read_back() {
        assert!(set_env_var("EMBRA_TEST_VAR", "expected-value"));
        assert_eq!(
            std::env::var("EMBRA_TEST_VAR").unwrap(),
            "expected-value"
        );
    }

    #[test]
    #[serial]
    fn test_set_env_var_rejects_nul() {
        assert!(!set_env_var("EMBRA_TEST_NUL", "bad\0value"));
    }

    #[test]
    #[serial]
    fn test_set_all_sets_every_fact() {
        let temp = tempfile::tempdir().unwrap();
        let report = set_all(&facts(temp.path()));

        assert!(report.manifest_path_set());
        assert_eq!(report.status(APP_MANIFEST_DIR), Some(FactStatus::Set));
        assert_eq!(report.status(APP_INTERNAL_DATA_DIR), Some(FactStatus::Set));
        assert_eq!(report.status(APP_EXTERNAL_DATA_DIR), Some(FactStatus::Set));
        assert_eq!(
            std::env::var(APP_MANIFEST_PATH).unwrap(),
            temp.path().join("app.manifest").to_string_lossy()
        );
    }

    #[test]
    #[serial]
    fn test_set_all_twice_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let first = set_all(&facts(temp.path()));
        let value_after_first = std::env::var(APP_MANIFEST_PATH).unwrap();

        let second = set_all(&facts(temp.path()));
        let value_after_second = std::env::var(APP_MANIFEST_PATH).unwrap();

        assert!(first.manifest_path_set() && second.manifest_path_set());
        assert_eq!(value_after_first, value_after_second);
    }

    #[test]
    #[serial]
    fn test_absent_external_dir_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let mut f = facts(temp.path());
        f.external_data_dir = None;

        let report = set_all(&f);
        assert_eq!(
            report.status(APP_EXTERNAL_DATA_DIR),
            Some(FactStatus::Skipped)
        );
        // The other three still go through.
        assert!(report.manifest_path_set());
    }
}
