//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// A watcher that monitors the configuration file for changes.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by renaming a temporary file over the original keep working.
pub struct ConfigWatcher {
    path: PathBuf,
    last: Mutex<Option<ProxyConfig>>,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// `current` is the configuration already running; an event that
    /// reloads an identical file is not forwarded.
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(
        path: &Path,
        current: Option<ProxyConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                last: Mutex::new(current),
                update_tx,
            },
            update_rx,
        )
    }

    /// Reload the file and forward it if it changed.
    ///
    /// Returns true when a new configuration was sent.
    pub fn reload(&self) -> bool {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
                return false;
            }
        };

        let mut last = self.last.lock();
        if last.as_ref() == Some(&config) {
            tracing::debug!(path = %self.path.display(), "Config unchanged, skipping reload");
            return false;
        }

        if self.update_tx.send(config.clone()).is_err() {
            return false;
        }
        *last = Some(config);
        true
    }

    fn is_relevant(&self, event: &Event) -> bool {
        let kind_matches =
            event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
        kind_matches
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if self.is_relevant(&event) => {
                    tracing::info!(path = %self.path.display(), "Config file change detected, reloading");
                    self.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?directory, "Config watcher started");
        Ok(watcher)
    }
}
