//! The library-load sequencer.
//!
//! Drives the whole bootstrap once, synchronously, top to bottom:
//!
//! ```text
//! Init -> RuntimeLoaded -> BootstrapLoaded -> ManifestResolved
//!      -> EnvironmentSet -> MainModuleLoaded
//! ```
//!
//! A failure in any step aborts the remaining steps and is reported with
//! the state it failed in; there are no automatic retries. The one
//! permitted state skip is the degraded fallback: when the configuration
//! file itself cannot be loaded, the sequencer loads the bundled main
//! module straight away so a functional engine stays bootable on a device
//! with no writable configuration yet.

use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::{BootstrapConfig, ConfigError, RUNTIME_LIB_KEY};
use crate::env::{self, EnvironmentFacts, PropagationReport};
use crate::error::BootstrapError;
use crate::linker::{EngineLinker, LibraryRole, LibrarySource, LoadPlan};
use crate::manifest::{self, ResolvedManifest};
use crate::paths::StorageLocations;

/// States of the bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    /// Nothing loaded yet.
    Init,
    /// The shared runtime library is resident.
    RuntimeLoaded,
    /// The bootstrap library is resident.
    BootstrapLoaded,
    /// The startup manifest path is resolved and confirmed on disk.
    ManifestResolved,
    /// The path facts are in the process environment.
    EnvironmentSet,
    /// Terminal success: the main engine module is resident.
    MainModuleLoaded,
    /// Terminal failure.
    Failed,
}

/// Machine-readable failure reasons, one per failing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The shared runtime library could not be loaded.
    RuntimeLibraryUnavailable,
    /// The bootstrap library could not be loaded.
    BootstrapLibraryUnavailable,
    /// The manifest reference was unset or the resolved path absent.
    ManifestUnresolved,
    /// The manifest-path environment fact could not be propagated.
    ManifestPathPropagationFailed,
    /// The main module could not be resolved or loaded.
    MainModuleUnavailable,
}

impl FailureReason {
    /// The wire string for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::RuntimeLibraryUnavailable => "runtime-library-unavailable",
            FailureReason::BootstrapLibraryUnavailable => "bootstrap-library-unavailable",
            FailureReason::ManifestUnresolved => "manifest-unresolved",
            FailureReason::ManifestPathPropagationFailed => "manifest-path-propagation-failed",
            FailureReason::MainModuleUnavailable => "main-module-unavailable",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a bootstrap run needs, passed explicitly by the host.
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    /// Location of the bootstrap configuration file.
    pub config_path: PathBuf,
    /// Raw manifest reference from host metadata, possibly containing the
    /// expansion-storage placeholder. Absent when the host declared none.
    pub manifest_ref: Option<String>,
    /// Storage locations computed for this run.
    pub locations: StorageLocations,
}

impl BootstrapRequest {
    /// Build a request with the conventional config location under the
    /// private data directory.
    pub fn new(locations: StorageLocations, manifest_ref: Option<String>) -> Self {
        let config_path = locations.bootstrap_config_path();
        Self {
            config_path,
            manifest_ref,
            locations,
        }
    }

    /// Override the configuration file location.
    pub fn with_config_path(mut self, config_path: PathBuf) -> Self {
        self.config_path = config_path;
        self
    }
}

/// The observable outcome of a bootstrap run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BootstrapReport {
    /// Terminal state: `MainModuleLoaded` or `Failed`.
    pub phase: BootstrapPhase,
    /// On failure, the state the sequencer was in when it failed.
    pub failed_in: Option<BootstrapPhase>,
    /// On failure, the machine-readable reason.
    pub failure: Option<FailureReason>,
    /// Human-readable detail for the diagnostic log.
    pub detail: Option<String>,
    /// The resolved manifest, when resolution was reached and succeeded.
    pub manifest: Option<ResolvedManifest>,
    /// Per-fact environment propagation results, when propagation ran.
    pub propagation: Option<PropagationReport>,
    /// Whether the bundled fallback path was taken.
    pub degraded: bool,
}

impl BootstrapReport {
    /// Whether the run ended in `MainModuleLoaded`.
    pub fn succeeded(&self) -> bool {
        self.phase == BootstrapPhase::MainModuleLoaded
    }

    fn failed(failed_in: BootstrapPhase, reason: FailureReason, error: &BootstrapError) -> Self {
        Self {
            phase: BootstrapPhase::Failed,
            failed_in: Some(failed_in),
            failure: Some(reason),
            detail: Some(error.to_string()),
            manifest: None,
            propagation: None,
            degraded: false,
        }
    }
}

/// Run the bootstrap sequence once.
///
/// Never retries; the caller reports the returned state and reason. Safe
/// to call again on a later host re-creation: already-resident libraries
/// and already-set environment values are simply confirmed.
pub fn run(request: &BootstrapRequest, linker: &mut dyn EngineLinker) -> BootstrapReport {
    info!(config = %request.config_path.display(), "starting bootstrap sequence");

    let config = match BootstrapConfig::load(&request.config_path) {
        Ok(config) => config,
        Err(cause) => {
            let reported = match cause {
                ConfigError::NotFound(path) => BootstrapError::ConfigMissing(path).to_string(),
                parse @ ConfigError::Parse { .. } => parse.to_string(),
            };
            warn!(cause = %reported, "bootstrap config unavailable, trying bundled main module");
            return run_degraded(linker, &reported);
        }
    };

    // Required keys are checked before any library is loaded.
    let plan = match LoadPlan::from_config(&config) {
        Ok(plan) => plan,
        Err(cause) => {
            let reason = match &cause {
                BootstrapError::ConfigKeyMissing { key } if *key == RUNTIME_LIB_KEY => {
                    FailureReason::RuntimeLibraryUnavailable
                }
                _ => FailureReason::BootstrapLibraryUnavailable,
            };
            error!(%cause, %reason, "bootstrap config incomplete");
            return BootstrapReport::failed(BootstrapPhase::Init, reason, &cause);
        }
    };

    let mut phase = BootstrapPhase::Init;
    for step in &plan.steps {
        if let Err(source) = linker.load(step.role, &step.candidates) {
            let cause = BootstrapError::LibraryLoadFailed {
                which: step.role,
                source,
            };
            let reason = reason_for_role(step.role);
            error!(%cause, %reason, "library load failed");
            return BootstrapReport::failed(phase, reason, &cause);
        }
        phase = match step.role {
            LibraryRole::Runtime => BootstrapPhase::RuntimeLoaded,
            LibraryRole::Bootstrap => BootstrapPhase::BootstrapLoaded,
            LibraryRole::MainModule => BootstrapPhase::MainModuleLoaded,
        };
        info!(role = %step.role, "library loaded");
    }

    let manifest = match manifest::resolve(request.manifest_ref.as_deref(), &request.locations) {
        Ok(manifest) => manifest,
        Err(cause) => {
            error!(%cause, "manifest resolution failed");
            return BootstrapReport::failed(phase, FailureReason::ManifestUnresolved, &cause);
        }
    };
    info!(manifest = %manifest.path.display(), "manifest resolved");
    phase = BootstrapPhase::ManifestResolved;

    let facts = EnvironmentFacts::from_parts(&manifest, &request.locations);
    let propagation = env::set_all(&facts);
    if !propagation.manifest_path_set() {
        let cause = BootstrapError::EnvironmentWriteFailed {
            key: env::APP_MANIFEST_PATH,
        };
        error!(%cause, "manifest path fact did not propagate");
        let mut report = BootstrapReport::failed(
            phase,
            FailureReason::ManifestPathPropagationFailed,
            &cause,
        );
        report.manifest = Some(manifest);
        report.propagation = Some(propagation);
        return report;
    }
    phase = BootstrapPhase::EnvironmentSet;

    let main_module_path = match linker.prepare_main_module(&manifest.path) {
        Ok(Some(path)) => path,
        Ok(None) => {
            let cause = BootstrapError::MainModuleResolutionFailed;
            error!(%cause, "bootstrap library returned no main module path");
            let mut report =
                BootstrapReport::failed(phase, FailureReason::MainModuleUnavailable, &cause);
            report.manifest = Some(manifest);
            report.propagation = Some(propagation);
            return report;
        }
        Err(source) => {
            let cause = BootstrapError::LibraryLoadFailed {
                which: LibraryRole::MainModule,
                source,
            };
            error!(%cause, "prepare call into bootstrap library failed");
            let mut report =
                BootstrapReport::failed(phase, FailureReason::MainModuleUnavailable, &cause);
            report.manifest = Some(manifest);
            report.propagation = Some(propagation);
            return report;
        }
    };

    let candidates = [LibrarySource::Absolute(main_module_path.clone())];
    if let Err(source) = linker.load(LibraryRole::MainModule, &candidates) {
        let cause = BootstrapError::LibraryLoadFailed {
            which: LibraryRole::MainModule,
            source,
        };
        error!(%cause, "main module load failed");
        let mut report =
            BootstrapReport::failed(phase, FailureReason::MainModuleUnavailable, &cause);
        report.manifest = Some(manifest);
        report.propagation = Some(propagation);
        return report;
    }

    info!(main_module = %main_module_path.display(), "bootstrap complete");
    BootstrapReport {
        phase: BootstrapPhase::MainModuleLoaded,
        failed_in: None,
        failure: None,
        detail: None,
        manifest: Some(manifest),
        propagation: Some(propagation),
        degraded: false,
    }
}

/// The fallback taken when no configuration could be loaded at all: load
/// the bundled main module and skip straight to the terminal state. No
/// manifest is resolved and no environment facts are propagated.
fn run_degraded(linker: &mut dyn EngineLinker, cause: &str) -> BootstrapReport {
    let plan = LoadPlan::degraded();
    let step = &plan.steps[0];
    match linker.load(step.role, &step.candidates) {
        Ok(()) => {
            info!("bundled main module loaded, continuing degraded");
            BootstrapReport {
                phase: BootstrapPhase::MainModuleLoaded,
                failed_in: None,
                failure: None,
                detail: Some(cause.to_string()),
                manifest: None,
                propagation: None,
                degraded: true,
            }
        }
        Err(source) => {
            let cause = BootstrapError::LibraryLoadFailed {
                which: LibraryRole::MainModule,
                source,
            };
            error!(%cause, "bundled fallback load failed");
            let mut report = BootstrapReport::failed(
                BootstrapPhase::Init,
                FailureReason::MainModuleUnavailable,
                &cause,
            );
            report.degraded = true;
            report
        }
    }
}

fn reason_for_role(role: LibraryRole) -> FailureReason {
    match role {
        LibraryRole::Runtime => FailureReason::RuntimeLibraryUnavailable,
        LibraryRole::Bootstrap => FailureReason::BootstrapLibraryUnavailable,
        LibraryRole::MainModule => FailureReason::MainModuleUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_wire_strings() {
        assert_eq!(
            FailureReason::RuntimeLibraryUnavailable.as_str(),
            "runtime-library-unavailable"
        );
        assert_eq!(
            FailureReason::BootstrapLibraryUnavailable.as_str(),
            "bootstrap-library-unavailable"
        );
        assert_eq!(
            FailureReason::ManifestUnresolved.as_str(),
            "manifest-unresolved"
        );
        assert_eq!(
            FailureReason::ManifestPathPropagationFailed.as_str(),
            "manifest-path-propagation-failed"
        );
        assert_eq!(
            FailureReason::MainModuleUnavailable.as_str(),
            "main-module-unavailable"
        );
    }

    #[test]
    fn test_report_serializes_reason_as_wire_string() {
        let report = BootstrapReport::failed(
            BootstrapPhase::Init,
            FailureReason::RuntimeLibraryUnavailable,
            &BootstrapError::ConfigKeyMissing {
                key: RUNTIME_LIB_KEY,
            },
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"runtime-library-unavailable\""));
        assert!(json.contains("\"failed\""));
    }

    #[test]
    fn test_request_uses_conventional_config_path() {
        let locations =
            StorageLocations::new(PathBuf::from("/data/app"), None, None);
        let request = BootstrapRequest::new(locations, None);
        assert_eq!(
            request.config_path,
            PathBuf::from("/data/app/engine/bootstrap.ini")
        );
    }
}
