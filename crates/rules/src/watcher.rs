//! File Watcher (§4.3): watches the rule file's parent directory and
//! debounces reloads, grounded on the original's `ConfigWatcher`
//! (cancel-pending-then-reschedule debounce, verify-then-reload).

use crate::store::RuleStore;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use sp_domain::{Error, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running {
    _watcher: RecommendedWatcher,
    tx: mpsc::UnboundedSender<()>,
    debounce_task: JoinHandle<()>,
}

pub struct FileWatcher {
    store: Arc<RuleStore>,
    path: PathBuf,
    filename: OsString,
    debounce: Duration,
    running: parking_lot::Mutex<Option<Running>>,
}

impl FileWatcher {
    pub fn new(store: Arc<RuleStore>, debounce: Duration) -> Self {
        let path = store.path().to_path_buf();
        let filename = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        Self {
            store,
            path,
            filename,
            debounce,
            running: parking_lot::Mutex::new(None),
        }
    }

    /// Start watching. Returns an error if already running, or if the
    /// target file does not exist yet (§4.3: nothing to watch for).
    pub fn start(&self) -> Result<()> {
        let mut guard = self.running.lock();
        if guard.is_some() {
            return Err(Error::InternalError("file watcher is already running".into()));
        }
        if !self.path.exists() {
            return Err(Error::InvalidConfiguration(format!(
                "rule file not found: {}",
                self.path.display()
            )));
        }
        let parent = self.path.parent().unwrap_or_else(|| std::path::Path::new("."));

        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let filename = self.filename.clone();
        let notify_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(filename.as_os_str()));
                    if relevant {
                        let _ = notify_tx.send(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            }
        })
        .map_err(|e| Error::InternalError(format!("failed to create file watcher: {e}")))?;
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(|e| Error::InternalError(format!("failed to watch {}: {e}", parent.display())))?;

        let debounce_task = tokio::spawn(debounce_loop(self.store.clone(), self.path.clone(), self.debounce, rx));

        *guard = Some(Running { _watcher: watcher, tx, debounce_task });
        tracing::info!(path = %self.path.display(), debounce_ms = self.debounce.as_millis(), "rule file watcher started");
        Ok(())
    }

    /// Idempotent: stopping an already-stopped watcher is a no-op.
    pub fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(r) = running {
            r.debounce_task.abort();
            tracing::info!("rule file watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Manually trigger a debounced reload, for testing (§4.3).
    pub fn trigger_reload(&self) {
        let guard = self.running.lock();
        match &*guard {
            Some(r) => {
                let _ = r.tx.send(());
            }
            None => {
                if let Err(e) = self.store.reload() {
                    tracing::error!(error = %e, "manual rule reload failed");
                }
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn debounce_loop(
    store: Arc<RuleStore>,
    path: PathBuf,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    let mut pending: Option<JoinHandle<()>> = None;
    while rx.recv().await.is_some() {
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let store = store.clone();
        let path = path.clone();
        pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !path.exists() {
                tracing::warn!(path = %path.display(), "rule file disappeared during debounce, skipping reload");
                return;
            }
            if let Err(e) = store.reload() {
                tracing::error!(error = %e, "rule file reload failed; previous snapshot remains active");
            } else {
                tracing::info!(path = %path.display(), "rule file reloaded");
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_pattern::PatternEngine;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn trigger_reload_without_start_reloads_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: []\n").unwrap();
        let store = Arc::new(RuleStore::load(&path, Arc::new(PatternEngine::new())).unwrap());
        let watcher = FileWatcher::new(store, Duration::from_millis(10));
        assert!(!watcher.is_running());
        watcher.trigger_reload();
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: []\n").unwrap();
        let store = Arc::new(RuleStore::load(&path, Arc::new(PatternEngine::new())).unwrap());
        let watcher = FileWatcher::new(store, Duration::from_millis(10));
        watcher.start().unwrap();
        assert!(watcher.start().is_err());
        watcher.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: []\n").unwrap();
        let store = Arc::new(RuleStore::load(&path, Arc::new(PatternEngine::new())).unwrap());
        let watcher = FileWatcher::new(store, Duration::from_millis(10));
        watcher.start().unwrap();
        watcher.stop();
        watcher.stop();
        let _ = StdDuration::from_millis(1);
    }

    #[tokio::test]
    async fn debounced_reload_picks_up_file_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: []\n").unwrap();
        let store = Arc::new(RuleStore::load(&path, Arc::new(PatternEngine::new())).unwrap());
        let watcher = FileWatcher::new(store.clone(), Duration::from_millis(20));
        watcher.start().unwrap();

        std::fs::write(
            &path,
            "rules:\n  - id: R1\n    priority: 1\n    action: deny\n    conditions:\n      tool_name: Bash\n",
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get_all().len(), 1);
        watcher.stop();
    }
}
