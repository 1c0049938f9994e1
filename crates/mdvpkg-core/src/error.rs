//! The shared error taxonomy surfaced across the daemon.
//!
//! Every crate above this one extends this enum with `#[from]`
//! conversions rather than inventing a parallel error hierarchy, so that
//! the D-Bus boundary has a single place to map an error onto a
//! `(code, message)` pair.

use std::path::PathBuf;
use thiserror::Error;

/// The result type used throughout mdvpkg.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from §7 of the specification.
#[derive(Debug, Error)]
pub enum Error {
    /// The URPMI configuration file could not be parsed.
    #[error("invalid configuration at {path}: {message}")]
    ConfigInvalid {
        /// Path to the offending configuration file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The URPMI configuration file does not exist.
    #[error("configuration file missing: {path}")]
    ConfigMissing {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// `PackageIndex::get` found no entry for the given key.
    #[error("unknown package: {name}.{arch}")]
    UnknownPackage {
        /// Package name.
        name: String,
        /// Package architecture.
        arch: String,
    },

    /// A mutating call was made by a session that does not own the
    /// target `PackageList`.
    #[error("caller does not own this package list")]
    NotOwner,

    /// `install()` called on a Package that is already fully installed
    /// with no upgrade candidate.
    #[error("package is already installed: {name}.{arch}")]
    AlreadyInstalled {
        /// Package name.
        name: String,
        /// Package architecture.
        arch: String,
    },

    /// `remove()` called on a Package with no installed version.
    #[error("package is not installed: {name}.{arch}")]
    NothingToRemove {
        /// Package name.
        name: String,
        /// Package architecture.
        arch: String,
    },

    /// An action was requested on a Package already mid-transaction.
    #[error("package {name}.{arch} already has an action in progress")]
    InProgressConflict {
        /// Package name.
        name: String,
        /// Package architecture.
        arch: String,
    },

    /// `no_action()` called on a Package whose current action is
    /// resolver-derived (`auto-install`/`auto-remove`).
    #[error("cannot clear an auto-selected action on {name}.{arch}")]
    ActionRequired {
        /// Package name.
        name: String,
        /// Package architecture.
        arch: String,
    },

    /// `process_actions()` called with no install/remove action selected.
    #[error("no pending actions to process")]
    NoAction,

    /// The external resolver process returned an `ERROR` record or
    /// exited with a non-zero status.
    #[error("resolver error: {message}")]
    ResolverError {
        /// Diagnostic reported by (or inferred about) the resolver.
        message: String,
    },

    /// The backend child process died, produced a pipe error, sent an
    /// unrecognized response line, or emitted an `EXCEPTION` tag.
    #[error("backend error: {message}")]
    BackendError {
        /// Diagnostic describing the failure.
        message: String,
    },

    /// A method was invoked on a `Task` while it was in a lifecycle
    /// state that does not support it.
    #[error("task is in state {state:?} and cannot {attempted}")]
    TaskBadState {
        /// The task's current lifecycle state, stringified by the
        /// caller to avoid a dependency cycle on `mdvpkg-task`.
        state: String,
        /// A short description of the rejected operation.
        attempted: String,
    },

    /// `get(index)` was called with `index >= size()`.
    #[error("index {index} is out of range (size {size})")]
    IndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Current list size.
        size: u32,
    },

    /// Wrapped I/O failure, carrying the path that was being operated
    /// on for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build an [`Error::Io`] with path context, mirroring the
    /// teacher's `ConfigError::io(path, err)` convenience constructors.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
