//! Dynamic library loading.
//!
//! Cross-platform handles for the engine's shared libraries (.so, .dylib,
//! .dll). Libraries can be opened from an absolute path resolved at
//! bootstrap time, or by their bundled identity, letting the system
//! loader's own search find the copy packaged inside the application
//! archive.
//!
//! Engine libraries are loaded with global symbol visibility because each
//! later library in the load plan links against symbols of the earlier
//! ones, and they stay resident for the life of the process: handles are
//! never closed. The underlying loader guards against double-loading, so
//! repeat opens of the same path are cheap and safe.

use std::path::Path;
use thiserror::Error;

#[cfg(unix)]
use std::ffi::{CStr, CString};

/// Errors that can occur while loading a library or resolving a symbol.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or rejected by the platform loader.
    #[error("library not found: {path}")]
    NotFound {
        /// Path or identity that was attempted, with loader detail.
        path: String,
    },

    /// Symbol not found in a loaded library.
    #[error("symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found.
        symbol: String,
        /// Library the lookup ran against.
        library: String,
    },

    /// A library required for this call has not been loaded.
    #[error("library not loaded: {0}")]
    NotLoaded(String),

    /// Path or symbol name could not cross the FFI boundary.
    #[error("invalid name or path: {0}")]
    InvalidPath(String),

    /// Platform-specific error.
    #[error("platform error: {0}")]
    PlatformError(String),
}

/// A loaded, resident dynamic library.
///
/// There is deliberately no `Drop`: once an engine library is loaded its
/// symbols are live process-wide and unloading is never correct.
pub struct Library {
    handle: LibraryHandle,
    name: String,
}

impl Library {
    /// Load a library from an absolute path.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Unix**: `dlopen(RTLD_NOW | RTLD_GLOBAL)`. Global visibility is
    ///   required so the bootstrap library can resolve runtime-library
    ///   symbols, and the main module both of theirs.
    /// - **Windows**: `LoadLibraryW`.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let name = path
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path)))?
            .to_string();
        let handle = LibraryHandle::load(&name)?;
        Ok(Library { handle, name })
    }

    /// Load a library by its bundled identity, e.g. `embra_main_module`
    /// for `libembra_main_module.so`.
    ///
    /// The identity is expanded to the platform's library file name and
    /// handed to the system loader without a directory component, so the
    /// loader searches its default locations, which include the libraries
    /// packaged inside the application archive.
    pub fn open_bundled(identity: &str) -> Result<Self, LoadError> {
        let name = platform_library_name(identity);
        let handle = LibraryHandle::load(&name)?;
        Ok(Library { handle, name })
    }

    /// Get a function pointer by name.
    ///
    /// # Safety
    ///
    /// The caller must ensure the symbol exists with a signature matching
    /// `T`. The returned pointer is valid for the life of the process
    /// because libraries are never unloaded.
    pub unsafe fn get<T>(&self, symbol: &str) -> Result<T, LoadError> {
        self.handle.symbol(symbol, &self.name)
    }

    /// The path or file name this library was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Map a bundled identity to the platform's library file name.
pub fn platform_library_name(identity: &str) -> String {
    #[cfg(target_os = "macos")]
    return format!("lib{}.dylib", identity);
    #[cfg(all(unix, not(target_os = "macos")))]
    return format!("lib{}.so", identity);
    #[cfg(windows)]
    return format!("{}.dll", identity);
}

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, Android)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(name: &str) -> Result<Self, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::InvalidPath(format!("{}: {}", name, e)))?;

        // RTLD_NOW: fail here, not on first call into the library.
        // RTLD_GLOBAL: later engine libraries link against this one.
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };

        if handle.is_null() {
            let error = unsafe {
                let err_ptr = libc::dlerror();
                if err_ptr.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                }
            };
            return Err(LoadError::NotFound {
                path: format!("{}: {}", name, error),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_name: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::InvalidPath(format!("{}: {}", name, e)))?;

        // Clear any stale error state before the lookup.
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        let err_ptr = libc::dlerror();
        if !err_ptr.is_null() {
            let error = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{}: {}", lib_name, error),
            });
        }

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_name.to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(name: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound {
                path: format!("{} (error code: {})", name, error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_name: &str) -> Result<T, LoadError> {
        use std::ffi::CString;

        let c_name = CString::new(name)
            .map_err(|e| LoadError::InvalidPath(format!("{}: {}", name, e)))?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            let error = GetLastError();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{} (error code: {})", lib_name, error),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const std::os::raw::c_char,
    ) -> *mut std::ffi::c_void;
    fn GetLastError() -> u32;
}
