//! Filesystem watch on the configuration file, bridging `notify`'s
//! callback-based API into a `tokio_stream::Stream` the rest of the
//! daemon can poll like any other suspension point (spec §5: "the
//! watcher fires on the same scheduling context as the rest of the
//! core").
//!
//! Grounded on `notify`'s own recommended debounced-watcher pattern (see
//! also `examples/vercel-turborepo`'s `turborepo-filewatch`, which bridges
//! the same callback API into an async channel); the callback-to-channel
//! bridge itself follows `libretto-downloader::progress`'s pattern of
//! turning a synchronous callback into an async `Stream`.

use mdvpkg_core::{Error, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A change observed on the watched configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The file was created or its contents changed.
    Modified,
    /// The file was deleted or moved away.
    Removed,
}

/// Watches the directory containing a file and reports
/// modify/delete/move events on that file specifically; events for
/// sibling files in the same directory are dropped.
pub struct FileWatch {
    // Held only to keep the OS watch alive; never read after construction.
    _watcher: RecommendedWatcher,
    stream: UnboundedReceiverStream<ConfigEvent>,
}

impl FileWatch {
    /// Start watching `config_path`'s parent directory.
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if the watch could not be
    /// established (e.g. the parent directory does not exist).
    pub fn new(config_path: &Path) -> Result<Self> {
        let target = config_path
            .file_name()
            .ok_or_else(|| Error::ConfigInvalid {
                path: config_path.to_path_buf(),
                message: "configuration path has no file name".to_string(),
            })?
            .to_owned();
        let watch_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = raw_tx.send(event);
        })
        .map_err(|err| watch_error(config_path, &err))?;
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .map_err(|err| watch_error(config_path, &err))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let Ok(event) = event else { continue };
                if !event.paths.iter().any(|p| p.file_name() == Some(target.as_os_str())) {
                    continue;
                }
                let mapped = match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => Some(ConfigEvent::Modified),
                    EventKind::Remove(_) => Some(ConfigEvent::Removed),
                    EventKind::Other | EventKind::Access(_) | EventKind::Any => None,
                };
                if let Some(mapped) = mapped
                    && tx.send(mapped).is_err()
                {
                    break;
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            stream: UnboundedReceiverStream::new(rx),
        })
    }

    /// Consume the watcher, yielding its event stream.
    #[must_use]
    pub fn into_stream(self) -> UnboundedReceiverStream<ConfigEvent> {
        self.stream
    }

    /// Wait for the next event without consuming the watcher.
    pub async fn recv(&mut self) -> Option<ConfigEvent> {
        use tokio_stream::StreamExt;
        self.stream.next().await
    }
}

fn watch_error(path: &Path, err: &notify::Error) -> Error {
    Error::ConfigInvalid {
        path: path.to_path_buf(),
        message: format!("failed to watch configuration directory: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn reports_modify_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("urpmi.cfg");
        std::fs::write(&config_path, "{ update }\n").unwrap();

        let watcher = FileWatch::new(&config_path).unwrap();
        let mut stream = watcher.into_stream();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&config_path).unwrap();
            writeln!(f, "# touch").unwrap();
        }
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for modify event");
        assert_eq!(event, Some(ConfigEvent::Modified));
    }
}
