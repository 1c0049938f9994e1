//! URPMI configuration grammar, media block model, and the filesystem
//! watch that drives reconfiguration.
//!
//! [`ConfigWatcher`] is the spec's leaf collaborator: it parses the
//! configuration file into a [`grammar::UrpmiConfig`] and yields a stream
//! of reload signals distinguishing a modify (re-configure and re-load)
//! from a delete/move (clear the media set).

#![allow(clippy::module_name_repetitions)]

pub mod env;
pub mod grammar;
mod watcher;

pub use env::EnvConfig;
pub use grammar::{ConfigBlock, HostVars, MediaEntry, ThreeState, UrpmiConfig};
pub use mdvpkg_core::{Error, Result};
pub use watcher::ConfigEvent;

use std::path::{Path, PathBuf};
use watcher::FileWatch;

/// Reloading a configuration file produced one of these outcomes.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// The file was re-read and re-parsed successfully.
    Reconfigured(UrpmiConfig),
    /// The file was deleted or moved away; the media set is now empty.
    Cleared,
}

/// Parses the URPMI configuration file and watches it for changes.
///
/// Grounded on spec §4.1's "config reload" paragraph: a modify event
/// re-parses and returns the fresh [`UrpmiConfig`]; a delete/move event
/// returns [`ReloadOutcome::Cleared`] without touching anything on disk.
pub struct ConfigWatcher {
    path: PathBuf,
    vars: HostVars,
    watch: FileWatch,
}

impl ConfigWatcher {
    /// Parse `path` once and start watching its containing directory.
    ///
    /// # Errors
    /// [`Error::ConfigMissing`] if the file does not exist;
    /// [`Error::ConfigInvalid`] on a grammar violation or a failure to
    /// establish the filesystem watch.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, UrpmiConfig)> {
        let path = path.into();
        let vars = HostVars::from_system();
        let config = read_and_parse(&path, &vars)?;
        let watch = FileWatch::new(&path)?;
        Ok((Self { path, vars, watch }, config))
    }

    /// Wait for the next filesystem event and react to it.
    ///
    /// Returns `None` once the underlying watch stream ends (the watched
    /// directory itself was removed, for instance).
    pub async fn next_reload(&mut self) -> Option<Result<ReloadOutcome>> {
        let event = self.watch.recv().await?;
        Some(match event {
            ConfigEvent::Modified => read_and_parse(&self.path, &self.vars).map(ReloadOutcome::Reconfigured),
            ConfigEvent::Removed => Ok(ReloadOutcome::Cleared),
        })
    }
}

fn read_and_parse(path: &Path, vars: &HostVars) -> Result<UrpmiConfig> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::ConfigMissing { path: path.to_path_buf() }
        } else {
            Error::io(path, err)
        }
    })?;
    grammar::parse(path, &contents, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_config_missing() {
        let err = read_and_parse(Path::new("/nonexistent/urpmi.cfg"), &HostVars::from_system()).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }

    #[test]
    fn invalid_file_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urpmi.cfg");
        std::fs::write(&path, "main { bogus }\n").unwrap();
        let err = read_and_parse(&path, &HostVars::from_system()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }
}
