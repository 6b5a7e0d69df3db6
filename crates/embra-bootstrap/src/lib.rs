//! Bootstrap layer for the Embra engine.
//!
//! Before any engine code runs, the host shell must work out where the
//! engine's shared libraries and its startup manifest physically live,
//! load the libraries in dependency order, and hand the engine a resolved
//! set of path facts through process environment variables. This crate is
//! that layer:
//!
//! - [`paths`] computes the storage locations available on the device
//! - [`config`] loads the `bootstrap.ini`-style configuration naming the
//!   runtime and bootstrap libraries
//! - [`manifest`] resolves the startup manifest reference, substituting
//!   the expansion-storage placeholder and checking existence
//! - [`env`] propagates the resolved facts into the process environment
//! - [`loader`] and [`linker`] load shared libraries with a bundled
//!   fallback and drive the cross-boundary prepare call
//! - [`sequencer`] orders the whole run as a single state machine
//!
//! The sequence runs once per process under normal operation, fully
//! synchronously, and never retries. Repeat runs (host re-creation) are
//! safe: library loads and environment writes are idempotent.

pub mod config;
pub mod env;
pub mod error;
pub mod linker;
pub mod loader;
pub mod manifest;
pub mod paths;
pub mod sequencer;

pub use config::BootstrapConfig;
pub use env::{EnvironmentFacts, PropagationReport};
pub use error::BootstrapError;
pub use linker::{EngineLinker, LibraryRole, LibrarySource, LoadPlan, NativeLinker};
pub use loader::{Library, LoadError};
pub use manifest::ResolvedManifest;
pub use paths::StorageLocations;
pub use sequencer::{run, BootstrapPhase, BootstrapReport, BootstrapRequest, FailureReason};
