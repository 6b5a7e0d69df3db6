//! Library load planning and the engine linker seam.
//!
//! A [`LoadPlan`] is the ordered sequence of library-load steps derived
//! from the bootstrap configuration. Order is an invariant, not a
//! preference: the bootstrap library's symbols depend on the runtime
//! library being resident, and the main module's on both, so each step
//! must succeed before the next is attempted.
//!
//! [`EngineLinker`] is the seam the sequencer drives. [`NativeLinker`] is
//! the production implementation over [`Library`]; tests substitute their
//! own.

use std::fmt;
use std::os::raw::{c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{BootstrapConfig, BOOTSTRAP_LIB_KEY, RUNTIME_LIB_KEY};
use crate::error::BootstrapError;
use crate::loader::{Library, LoadError};

/// Bundled identity of the main engine module, used by the degraded
/// fallback when no configuration is present.
pub const BUNDLED_MAIN_MODULE: &str = "embra_main_module";

/// Symbol the bootstrap library must export: takes the NUL-terminated
/// manifest path, returns the main-module library path or NULL. The
/// returned string is owned by the bootstrap library and stays valid until
/// the next call.
pub const PREPARE_SYMBOL: &str = "embra_bootstrap_prepare";

/// Entry symbol of the main engine module.
pub const MAIN_ENTRY_SYMBOL: &str = "embra_main_entry";

type PrepareFn = unsafe extern "C" fn(*const c_char) -> *const c_char;
type MainEntryFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Which library a load step concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryRole {
    /// The shared runtime library (loaded first).
    Runtime,
    /// The engine's bootstrap library.
    Bootstrap,
    /// The main engine module (loaded last).
    MainModule,
}

impl fmt::Display for LibraryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryRole::Runtime => write!(f, "runtime"),
            LibraryRole::Bootstrap => write!(f, "bootstrap"),
            LibraryRole::MainModule => write!(f, "main module"),
        }
    }
}

/// One place a library may be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// An absolute path resolved at bootstrap time.
    Absolute(PathBuf),
    /// A well-known identity resolved through the system loader's own
    /// search, i.e. the copy packaged in the application archive.
    Bundled(String),
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySource::Absolute(path) => write!(f, "{}", path.display()),
            LibrarySource::Bundled(identity) => write!(f, "bundled:{}", identity),
        }
    }
}

/// One step of a load plan: a library identity and the candidate sources
/// to try in order.
#[derive(Debug, Clone)]
pub struct LoadStep {
    /// Which library this step loads.
    pub role: LibraryRole,
    /// Sources to try, in order.
    pub candidates: Vec<LibrarySource>,
}

/// The ordered load steps for a bootstrap run.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Steps in required execution order.
    pub steps: Vec<LoadStep>,
}

impl LoadPlan {
    /// Build the runtime-then-bootstrap plan from a loaded configuration.
    ///
    /// Both required keys are checked up front so a missing key is
    /// reported before any library is loaded.
    pub fn from_config(config: &BootstrapConfig) -> Result<Self, BootstrapError> {
        let runtime_path = config.require(RUNTIME_LIB_KEY)?;
        let bootstrap_path = config.require(BOOTSTRAP_LIB_KEY)?;
        Ok(Self {
            steps: vec![
                LoadStep {
                    role: LibraryRole::Runtime,
                    candidates: vec![LibrarySource::Absolute(PathBuf::from(runtime_path))],
                },
                LoadStep {
                    role: LibraryRole::Bootstrap,
                    candidates: vec![LibrarySource::Absolute(PathBuf::from(bootstrap_path))],
                },
            ],
        })
    }

    /// The single-step fallback plan used when no configuration is
    /// present: load the bundled main module and nothing else.
    pub fn degraded() -> Self {
        Self {
            steps: vec![LoadStep {
                role: LibraryRole::MainModule,
                candidates: vec![LibrarySource::Bundled(BUNDLED_MAIN_MODULE.to_string())],
            }],
        }
    }
}

/// The sequencer's view of library loading.
pub trait EngineLinker {
    /// Load the library for `role`, trying `candidates` in order.
    ///
    /// Loading an already-resident role is a no-op; the process-wide
    /// loader state makes repeat loads idempotent.
    fn load(&mut self, role: LibraryRole, candidates: &[LibrarySource]) -> Result<(), LoadError>;

    /// Call into the loaded bootstrap library to prepare the engine from
    /// the resolved manifest. Returns the main-module library path, or
    /// `None` when the manifest could not be prepared.
    fn prepare_main_module(&mut self, manifest_path: &Path)
        -> Result<Option<PathBuf>, LoadError>;
}

/// Production linker over the platform dynamic loader.
///
/// Keeps every loaded library resident for its own lifetime; the host
/// holds the linker for the life of the process.
#[derive(Default)]
pub struct NativeLinker {
    runtime: Option<Library>,
    bootstrap: Option<Library>,
    main_module: Option<Library>,
}

impl NativeLinker {
    /// Create a linker with no libraries resident.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, role: LibraryRole) -> &mut Option<Library> {
        match role {
            LibraryRole::Runtime => &mut self.runtime,
            LibraryRole::Bootstrap => &mut self.bootstrap,
            LibraryRole::MainModule => &mut self.main_module,
        }
    }

    fn open_first(candidates: &[LibrarySource]) -> Result<Library, LoadError> {
        let mut last_error = LoadError::PlatformError("empty candidate list".to_string());
        for candidate in candidates {
            let attempt = match candidate {
                LibrarySource::Absolute(path) => Library::open(path),
                LibrarySource::Bundled(identity) => Library::open_bundled(identity),
            };
            match attempt {
                Ok(library) => {
                    info!(library = library.name(), "loaded library");
                    return Ok(library);
                }
                Err(error) => {
                    debug!(candidate = %candidate, %error, "load candidate failed");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    /// Invoke the main module's entry function.
    ///
    /// `host` is an opaque pointer handed through to the engine, null for
    /// a plain desktop run.
    pub fn run_main_entry(&self, host: *mut c_void) -> Result<i32, LoadError> {
        let main_module = self
            .main_module
            .as_ref()
            .ok_or_else(|| LoadError::NotLoaded(LibraryRole::MainModule.to_string()))?;
        let entry: MainEntryFn = unsafe { main_module.get(MAIN_ENTRY_SYMBOL)? };
        Ok(unsafe { entry(host) })
    }
}

impl EngineLinker for NativeLinker {
    fn load(&mut self, role: LibraryRole, candidates: &[LibrarySource]) -> Result<(), LoadError> {
        let slot = self.slot(role);
        if let Some(resident) = slot {
            debug!(%role, library = resident.name(), "library already resident");
            return Ok(());
        }
        let library = Self::open_first(candidates)?;
        *slot = Some(library);
        Ok(())
    }

    fn prepare_main_module(
        &mut self,
        manifest_path: &Path,
    ) -> Result<Option<PathBuf>, LoadError> {
        let bootstrap = self
            .bootstrap
            .as_ref()
            .ok_or_else(|| LoadError::NotLoaded(LibraryRole::Bootstrap.to_string()))?;

        let manifest = manifest_path
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", manifest_path)))?;
        let c_manifest = std::ffi::CString::new(manifest)
            .map_err(|e| LoadError::InvalidPath(format!("{}: {}", manifest, e)))?;

        let prepare: PrepareFn = unsafe { bootstrap.get(PREPARE_SYMBOL)? };
        let result = unsafe { prepare(c_manifest.as_ptr()) };
        if result.is_null() {
            return Ok(None);
        }

        let path = unsafe { std::ffi::CStr::from_ptr(result) }
            .to_string_lossy()
            .into_owned();
        if path.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(path)))
    }
}
