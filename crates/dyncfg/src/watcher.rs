//! Filesystem watching for the event-driven detection strategy.
//!
//! [`SourceWatcher`] wraps a `notify` watcher around a single source path and
//! exposes its events as a debounced async stream. Rapid successive events on
//! the same source are coalesced so one editor save or mounted-volume update
//! triggers one reload.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{ConfigResult, DynConfigError};

/// Default window in which repeat events on a source are coalesced.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// A change observed on a watched source.
#[derive(Debug, Clone)]
pub struct SourceChange {
    /// Path the event was reported for. For directory sources this is the
    /// changed file inside the directory.
    pub path: PathBuf,
    /// When the change was observed.
    pub at: Instant,
}

/// Debounced filesystem watcher bound to one source path.
pub struct SourceWatcher {
    // Held only to keep the native watch registration alive.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    debounce: Duration,
    last_event: Option<Instant>,
}

impl SourceWatcher {
    /// Start watching a file or directory with the default debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Watch`] if the native watcher cannot be
    /// created or the path cannot be registered.
    pub fn watch(path: &Path) -> ConfigResult<Self> {
        Self::watch_with_debounce(path, DEFAULT_DEBOUNCE)
    }

    /// Start watching with an explicit debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Watch`] if the native watcher cannot be
    /// created or the path cannot be registered.
    pub fn watch_with_debounce(path: &Path, debounce: Duration) -> ConfigResult<Self> {
        let (tx, rx) = mpsc::channel(64);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // Channel may be closed when the watcher is being torn down.
                let _ = tx.blocking_send(event);
            }
        })
        .map_err(|e| DynConfigError::watch(e.to_string()))?;

        let mode = if path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path, mode)
            .map_err(|e| DynConfigError::watch(format!("{}: {e}", path.display())))?;

        Ok(Self {
            _watcher: watcher,
            rx,
            debounce,
            last_event: None,
        })
    }

    /// Wait for the next relevant change, applying debouncing.
    ///
    /// Returns `None` once the underlying event channel closes.
    pub async fn next(&mut self) -> Option<SourceChange> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(change) = self.filter(event) {
                return Some(change);
            }
        }
    }

    fn filter(&mut self, event: Event) -> Option<SourceChange> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
            _ => return None,
        }
        let path = event.paths.first()?.clone();

        let now = Instant::now();
        if let Some(last) = self.last_event {
            if now.duration_since(last) < self.debounce {
                return None;
            }
        }
        self.last_event = Some(now);

        Some(SourceChange { path, at: now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    #[test]
    fn test_watch_missing_path_fails() {
        let result = SourceWatcher::watch(Path::new("/nonexistent/app.properties"));
        assert!(matches!(result, Err(DynConfigError::Watch(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_detects_file_modification() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("app.properties");
        fs::write(&file, "a=1\n").unwrap();

        let mut watcher = SourceWatcher::watch_with_debounce(&file, Duration::from_millis(50))
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        fs::write(&file, "a=2\n").unwrap();

        match timeout(Duration::from_secs(2), watcher.next()).await {
            Ok(Some(change)) => {
                let canonical = change.path.canonicalize().unwrap_or(change.path);
                assert_eq!(canonical, file.canonicalize().unwrap());
            }
            Ok(None) => {}
            // Filesystem events can be unreliable in CI.
            Err(_) => {}
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_debounce_coalesces_bursts() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("app.properties");
        fs::write(&file, "a=1\n").unwrap();

        let mut watcher =
            SourceWatcher::watch_with_debounce(&file, Duration::from_secs(5)).unwrap();
        sleep(Duration::from_millis(100)).await;

        for i in 0..5 {
            fs::write(&file, format!("a={i}\n")).unwrap();
        }

        let first = timeout(Duration::from_secs(2), watcher.next()).await;
        if first.is_err() {
            // No event delivered at all; nothing further to assert.
            return;
        }

        // Everything after the first event falls inside the debounce window.
        let second = timeout(Duration::from_millis(300), watcher.next()).await;
        assert!(second.is_err());
    }
}
