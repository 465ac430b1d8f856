//! Service definitions watcher for change notifications.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Watcher, RecursiveMode, Event, RecommendedWatcher, Config};
use tokio::sync::mpsc;

/// A watcher that monitors the service definitions file for changes.
///
/// Every modification is forwarded as a unit notification; the reconciler
/// re-reads the store itself, so notifications may be coalesced freely.
pub struct DefinitionsWatcher {
    path: PathBuf,
    change_tx: mpsc::Sender<()>,
}

impl DefinitionsWatcher {
    /// Create a new watcher that notifies on `change_tx`.
    pub fn new(path: &Path, change_tx: mpsc::Sender<()>) -> Self {
        Self {
            path: path.to_path_buf(),
            change_tx,
        }
    }

    /// Start watching the file. The returned watcher must be kept alive.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors replacing the file via rename are still observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let relevant = event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                    if relevant && (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                        tracing::info!("Service definitions changed, requesting reload");
                        // A full channel already holds a pending reload.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Definitions watcher started");
        Ok(watcher)
    }
}
