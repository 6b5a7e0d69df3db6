//! C ABI host shim for the Embra bootstrap layer.
//!
//! The managed application shell cannot link Rust directly; it calls this
//! shim across the foreign-function boundary. The API follows these
//! principles:
//!
//! - ABI-stable (only C-compatible types cross the boundary)
//! - Strings in are NUL-terminated UTF-8; strings out are freed with
//!   [`embra_host_string_free`]
//! - All state lives in one process-wide host cell behind a mutex, since
//!   library loading has global, non-reentrant side effects
//!
//! The shell supplies the storage locations explicitly; the shim never
//! discovers them on its own. A second bootstrap call after a success
//! returns the recorded result instead of re-running; re-running after a
//! failure is allowed, so a re-created host component can try again.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{error, info};

use embra_bootstrap::env::set_env_var;
use embra_bootstrap::{
    run, BootstrapReport, BootstrapRequest, FailureReason, NativeLinker, StorageLocations,
};

/// Bootstrap completed; the main module is loaded.
pub const EMBRA_OK: c_int = 0;

/// A required argument was null or not valid UTF-8.
pub const EMBRA_ERR_INVALID_ARGS: c_int = -1;

/// The requested call needs a library that is not loaded.
pub const EMBRA_ERR_NOT_LOADED: c_int = -2;

struct HostCell {
    linker: NativeLinker,
    report: Option<BootstrapReport>,
}

static HOST: Lazy<Mutex<HostCell>> = Lazy::new(|| {
    Mutex::new(HostCell {
        linker: NativeLinker::new(),
        report: None,
    })
});

fn reason_code(reason: FailureReason) -> c_int {
    match reason {
        FailureReason::RuntimeLibraryUnavailable => 1,
        FailureReason::BootstrapLibraryUnavailable => 2,
        FailureReason::ManifestUnresolved => 3,
        FailureReason::ManifestPathPropagationFailed => 4,
        FailureReason::MainModuleUnavailable => 5,
    }
}

fn report_code(report: &BootstrapReport) -> c_int {
    match report.failure {
        None => EMBRA_OK,
        Some(reason) => reason_code(reason),
    }
}

/// Null stays absent; a non-null pointer must be valid UTF-8.
unsafe fn utf8_or_null<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr).to_str().map(Some).map_err(|_| ())
}

/// Set one process environment variable, verified by read-back.
///
/// The shell-side primitive behind its own environment writes, kept
/// identical in semantics to the propagator's so either side may set a
/// value first.
///
/// # Safety
///
/// `name` and `value` must be NUL-terminated strings or null.
#[no_mangle]
pub unsafe extern "C" fn embra_host_set_env(name: *const c_char, value: *const c_char) -> bool {
    let (Ok(Some(name)), Ok(Some(value))) = (utf8_or_null(name), utf8_or_null(value)) else {
        return false;
    };
    set_env_var(name, value)
}

/// Run the bootstrap sequence once.
///
/// `internal_data_dir` is required. `config_path`, `manifest_ref`,
/// `external_data_dir` and `expansion_dir` may be null: a null config
/// path means the conventional `engine/bootstrap.ini` under the private
/// data directory, a null manifest reference means the host metadata had
/// none.
///
/// Returns [`EMBRA_OK`] on success, a positive per-reason code on
/// bootstrap failure, or [`EMBRA_ERR_INVALID_ARGS`]. The full report is
/// available from [`embra_host_report_json`].
///
/// # Safety
///
/// Every non-null pointer must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn embra_host_bootstrap(
    config_path: *const c_char,
    manifest_ref: *const c_char,
    internal_data_dir: *const c_char,
    external_data_dir: *const c_char,
    expansion_dir: *const c_char,
) -> c_int {
    let (Ok(config_path), Ok(manifest_ref), Ok(internal), Ok(external), Ok(expansion)) = (
        utf8_or_null(config_path),
        utf8_or_null(manifest_ref),
        utf8_or_null(internal_data_dir),
        utf8_or_null(external_data_dir),
        utf8_or_null(expansion_dir),
    ) else {
        return EMBRA_ERR_INVALID_ARGS;
    };
    let Some(internal) = internal else {
        return EMBRA_ERR_INVALID_ARGS;
    };

    let mut host = HOST.lock();
    if let Some(report) = &host.report {
        if report.succeeded() {
            info!("bootstrap already completed, returning recorded result");
            return report_code(report);
        }
    }

    let locations = StorageLocations::new(
        PathBuf::from(internal),
        external.map(PathBuf::from),
        expansion.map(PathBuf::from),
    );
    let mut request = BootstrapRequest::new(locations, manifest_ref.map(str::to_string));
    if let Some(config_path) = config_path {
        request = request.with_config_path(PathBuf::from(config_path));
    }

    let report = run(&request, &mut host.linker);
    let code = report_code(&report);
    host.report = Some(report);
    code
}

/// The most recent bootstrap report as a JSON string, or null when no
/// bootstrap has run. Free with [`embra_host_string_free`].
///
/// # Safety
///
/// The returned pointer must be freed exactly once.
#[no_mangle]
pub unsafe extern "C" fn embra_host_report_json() -> *mut c_char {
    let host = HOST.lock();
    let Some(report) = &host.report else {
        return std::ptr::null_mut();
    };
    serde_json::to_string(report)
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Free a string returned by this shim.
///
/// # Safety
///
/// `s` must have come from this shim and not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn embra_host_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Invoke the loaded main module's entry function with an opaque host
/// pointer, returning its status.
///
/// Returns [`EMBRA_ERR_NOT_LOADED`] when bootstrap has not loaded a main
/// module.
///
/// # Safety
///
/// `host_handle` is passed through to the engine untouched and may be
/// null.
#[no_mangle]
pub unsafe extern "C" fn embra_host_run_main_entry(host_handle: *mut c_void) -> c_int {
    let host = HOST.lock();
    match host.linker.run_main_entry(host_handle) {
        Ok(status) => status,
        Err(cause) => {
            error!(%cause, "main entry unavailable");
            EMBRA_ERR_NOT_LOADED
        }
    }
}
