//! Bootstrap configuration file.
//!
//! A small line-oriented `KEY=VALUE` file, conventionally
//! `engine/bootstrap.ini` under the private data directory. It names the
//! absolute paths of the shared runtime library and the engine's bootstrap
//! library. `#` starts a comment; unknown keys are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::BootstrapError;

/// Key naming the shared runtime library path.
pub const RUNTIME_LIB_KEY: &str = "RUNTIME_LIB_PATH";

/// Key naming the bootstrap library path.
pub const BOOTSTRAP_LIB_KEY: &str = "BOOTSTRAP_LIB_PATH";

/// Errors from loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No readable file exists at the given path. A structurally
    /// unreadable file is folded into this variant as well.
    #[error("bootstrap config not found at {0}")]
    NotFound(PathBuf),

    /// A non-comment line has no `=` separator.
    #[error("malformed config line {line}: {text:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line text.
        text: String,
    },
}

/// Parsed key/value configuration.
///
/// Lives for a single bootstrap run and is discarded once the libraries it
/// names are loaded.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    entries: HashMap<String, String>,
}

impl BootstrapConfig {
    /// Load and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut entries = HashMap::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
                line: idx + 1,
                text: raw_line.to_string(),
            })?;
            // Last occurrence wins, matching java.util.Properties semantics
            // the deploy tooling was written against.
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { entries })
    }

    /// Look up a key. Returns `None` when the key is absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a required key.
    ///
    /// An absent or empty value is a terminal bootstrap failure for the
    /// caller; required keys are never defaulted.
    pub fn require(&self, key: &'static str) -> Result<&str, BootstrapError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(BootstrapError::ConfigKeyMissing { key }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WELL_FORMED: &str = "\
# Embra bootstrap configuration
RUNTIME_LIB_PATH=/data/app/engine/libembra_runtime.so
BOOTSTRAP_LIB_PATH=/data/app/engine/libembra_bootstrap.so
";

    #[test]
    fn test_parse_well_formed() {
        let config = BootstrapConfig::parse(WELL_FORMED).unwrap();
        assert_eq!(
            config.get(RUNTIME_LIB_KEY),
            Some("/data/app/engine/libembra_runtime.so")
        );
        assert_eq!(
            config.get(BOOTSTRAP_LIB_KEY),
            Some("/data/app/engine/libembra_bootstrap.so")
        );
    }

    #[test]
    fn test_get_returns_exact_stored_value() {
        let config =
            BootstrapConfig::parse("KEY = value with spaces \nOTHER=1\n").unwrap();
        assert_eq!(config.get("KEY"), Some("value with spaces"));
        assert_eq!(config.get("OTHER"), Some("1"));
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let config = BootstrapConfig::parse("\n# comment\n  \nA=1\n").unwrap();
        assert_eq!(config.get("A"), Some("1"));
        assert_eq!(config.get("# comment"), None);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let config = BootstrapConfig::parse("EXTRA_KEY=whatever\n").unwrap();
        assert_eq!(config.get("EXTRA_KEY"), Some("whatever"));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let config = BootstrapConfig::parse("A=1\nA=2\n").unwrap();
        assert_eq!(config.get("A"), Some("2"));
    }

    #[test]
    fn test_malformed_line_is_parse_error() {
        let result = BootstrapConfig::parse("A=1\nnot a pair\n");
        assert!(matches!(result, Err(ConfigError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = BootstrapConfig::load(Path::new("/does/not/exist/bootstrap.ini"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WELL_FORMED.as_bytes()).unwrap();
        let config = BootstrapConfig::load(file.path()).unwrap();
        assert!(config.get(RUNTIME_LIB_KEY).is_some());
    }

    #[test]
    fn test_require_missing_key() {
        let config = BootstrapConfig::parse("RUNTIME_LIB_PATH=/lib/librt.so\n").unwrap();
        assert!(config.require(RUNTIME_LIB_KEY).is_ok());
        assert!(matches!(
            config.require(BOOTSTRAP_LIB_KEY),
            Err(BootstrapError::ConfigKeyMissing {
                key: BOOTSTRAP_LIB_KEY
            })
        ));
    }

    #[test]
    fn test_require_empty_value_is_missing() {
        let config = BootstrapConfig::parse("RUNTIME_LIB_PATH=\n").unwrap();
        assert!(matches!(
            config.require(RUNTIME_LIB_KEY),
            Err(BootstrapError::ConfigKeyMissing { .. })
        ));
    }
}
