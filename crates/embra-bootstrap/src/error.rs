//! Bootstrap error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

use crate::linker::LibraryRole;
use crate::loader::LoadError;

/// Errors that can abort or degrade a bootstrap run.
///
/// Every variant except `EnvironmentWriteFailed` is fatal to the sequencer;
/// an environment write failure is recovered locally unless the failed key
/// is the manifest path, which the engine cannot start without.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// No configuration file exists at the expected path.
    #[error("bootstrap config not found: {0}")]
    ConfigMissing(PathBuf),

    /// The configuration file loaded but a required key is absent or empty.
    #[error("bootstrap config is missing required key {key}")]
    ConfigKeyMissing {
        /// The key that was required.
        key: &'static str,
    },

    /// A shared library failed to load.
    #[error("failed to load {which} library")]
    LibraryLoadFailed {
        /// Which library in the load plan failed.
        which: LibraryRole,
        /// The underlying loader error.
        #[source]
        source: LoadError,
    },

    /// No manifest reference was supplied, or the expansion-storage
    /// placeholder could not be substituted.
    #[error("application manifest reference is not set")]
    ManifestUnset,

    /// The resolved manifest path does not exist on disk.
    #[error("application manifest does not exist: {0}")]
    ManifestNotExists(PathBuf),

    /// A process environment variable could not be written and verified.
    #[error("failed to set environment variable {key}")]
    EnvironmentWriteFailed {
        /// The environment variable name.
        key: &'static str,
    },

    /// The bootstrap library's prepare call returned no main-module path.
    #[error("bootstrap library could not resolve a main module path")]
    MainModuleResolutionFailed,
}
