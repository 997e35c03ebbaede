//! Configuration file watcher feeding policy reloads
//!
//! Polls the file's modification time and publishes each changed filter
//! configuration on a `tokio::sync::watch` channel. [`PolicyStore::watch`]
//! is the usual consumer.
//!
//! [`PolicyStore::watch`]: crate::filter::store::PolicyStore::watch

use super::loader::ConfigLoader;
use super::schema::{Config, FilterConfig};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How often the file's modification time is checked.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Watches one configuration file for changes.
pub struct ConfigWatcher {
    config_path: PathBuf,
    watcher_config: WatcherConfig,
    /// Modification time of the last successfully loaded file
    last_modified: Option<SystemTime>,
    /// Modification time of the last file that failed to load
    last_failed: Option<SystemTime>,
    sender: watch::Sender<FilterConfig>,
}

/// Result of reading a file whose modification time changed
type FileChange = (SystemTime, Result<Config>);

impl ConfigWatcher {
    /// Create a watcher, loading the file once for the initial configuration.
    pub fn new<P: AsRef<Path>>(config_path: P, watcher_config: WatcherConfig) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let initial = ConfigLoader::load_from_file(&config_path)?;
        let last_modified = modified_time(&config_path);
        let (sender, _) = watch::channel(initial.filter);

        Ok(Self {
            config_path,
            watcher_config,
            last_modified,
            last_failed: None,
            sender,
        })
    }

    /// Receiver for configuration changes; the current value is marked seen.
    pub fn subscribe(&self) -> watch::Receiver<FilterConfig> {
        self.sender.subscribe()
    }

    /// Filter configuration most recently published.
    pub fn current(&self) -> FilterConfig {
        self.sender.borrow().clone()
    }

    /// Check the file once.
    ///
    /// Returns true if a changed filter configuration was published. A file
    /// that cannot be read or parsed is logged and read again on the next
    /// poll, even if its modification time stays the same.
    pub fn poll(&mut self) -> bool {
        let change = read_if_changed(&self.config_path, self.last_modified);
        self.apply(change)
    }

    fn apply(&mut self, change: Option<FileChange>) -> bool {
        let Some((modified, loaded)) = change else {
            return false;
        };

        let filter = match loaded {
            Ok(config) => config.filter,
            Err(e) => {
                if self.last_failed == Some(modified) {
                    debug!(path = ?self.config_path, error = %e, "Config file still unreadable");
                } else {
                    warn!(path = ?self.config_path, error = %e, "Ignoring unreadable config change");
                }
                self.last_failed = Some(modified);
                return false;
            }
        };
        self.last_modified = Some(modified);
        self.last_failed = None;

        let published = self.sender.send_if_modified(|current| {
            if *current == filter {
                false
            } else {
                *current = filter;
                true
            }
        });
        if published {
            info!(path = ?self.config_path, "Config change published");
        }
        published
    }

    /// Poll on the configured interval until the handle is stopped.
    ///
    /// File access runs on the blocking pool.
    pub fn start(mut self) -> WatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let poll_interval = self.watcher_config.poll_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let path = self.config_path.clone();
                        let last_modified = self.last_modified;
                        match tokio::task::spawn_blocking(move || {
                            read_if_changed(&path, last_modified)
                        })
                        .await
                        {
                            Ok(change) => {
                                self.apply(change);
                            }
                            Err(e) => warn!(error = %e, "Config poll task failed"),
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!(path = ?self.config_path, "Config watcher stopped");
        });

        WatcherHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Load the file if its modification time differs from `last_modified`
fn read_if_changed(path: &Path, last_modified: Option<SystemTime>) -> Option<FileChange> {
    let Some(modified) = modified_time(path) else {
        debug!(path = ?path, "Config file not readable, skipping poll");
        return None;
    };
    if last_modified == Some(modified) {
        return None;
    }
    Some((modified, ConfigLoader::load_from_file(path)))
}

/// Running watcher task. Stopping it closes the change channel.
pub struct WatcherHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
