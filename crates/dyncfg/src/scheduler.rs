//! Change watch/poll scheduler.
//!
//! Runs one background task per source descriptor. Under the WATCH strategy
//! each task drains a debounced [`SourceWatcher`]; under POLL each task ticks
//! at the configured frequency and fingerprints the resolved pairs to detect
//! content changes. Every detection triggers a full re-merge on the notifying
//! task.
//!
//! With a custom executor the scheduler retains every task handle plus a
//! shutdown channel, so termination can stop them: graceful signal, bounded
//! wait, forced abort. Without one, tasks are spawned detached on the ambient
//! runtime and cannot be stopped, which is why termination is unsupported in
//! that mode.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ConfigResult;
use crate::handler::{dispatch, HandlerRegistration};
use crate::merge::{build_snapshot, Snapshot};
use crate::params::{InitParams, Strategy};
use crate::source::SourceDescriptor;
use crate::watcher::SourceWatcher;

/// Bounded wait before still-running tasks are forcibly aborted.
pub(crate) const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_millis(1000);

/// Everything a detection task needs to rebuild and publish the snapshot.
pub(crate) struct ReloadContext {
    sources: Vec<SourceDescriptor>,
    include_sys_env_props: bool,
    snapshot: Arc<ArcSwapOption<Snapshot>>,
    handlers: Vec<HandlerRegistration>,
    // Serializes concurrent reloads from multiple source tasks so a slower
    // merge can never overwrite a newer one.
    reload_guard: Mutex<()>,
    // Set at termination; reloads on a closed context never publish.
    closed: AtomicBool,
}

impl ReloadContext {
    pub(crate) fn new(
        sources: Vec<SourceDescriptor>,
        include_sys_env_props: bool,
        snapshot: Arc<ArcSwapOption<Snapshot>>,
        handlers: Vec<HandlerRegistration>,
    ) -> Self {
        Self {
            sources,
            include_sys_env_props,
            snapshot,
            handlers,
            reload_guard: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Mark the context terminated. Detection tasks drained afterwards may
    /// still finish a cycle; their reloads become no-ops.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Rebuild the snapshot from scratch, swap it in, and notify handlers.
    ///
    /// A failing rebuild leaves the previous snapshot untouched; detection
    /// continues unaffected.
    pub(crate) fn reload(&self) {
        let _guard = self.reload_guard.lock();
        if self.closed.load(Ordering::Acquire) {
            debug!("reload skipped, context is closed");
            return;
        }
        match build_snapshot(&self.sources, self.include_sys_env_props) {
            Ok(map) => {
                let map = Arc::new(map);
                self.snapshot.store(Some(map.clone()));
                info!(entries = map.len(), "configuration reloaded");
                dispatch(&self.handlers, &map);
            }
            Err(e) => {
                warn!(error = %e, "configuration reload failed, keeping previous snapshot");
            }
        }
    }
}

/// Owner of the detection tasks started for a custom-executor build.
pub(crate) struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    daemon_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start detection for every source.
    ///
    /// Returns `Some` scheduler when the build requested a custom executor,
    /// `None` when the tasks were spawned detached on the ambient runtime.
    ///
    /// # Errors
    ///
    /// Fails if a watcher cannot be registered. All watchers are created
    /// before any task spawns, so a failure leaves nothing running.
    pub(crate) fn start(
        params: &InitParams,
        ctx: &Arc<ReloadContext>,
    ) -> ConfigResult<Option<Arc<Self>>> {
        let mut watchers = Vec::new();
        if params.strategy == Strategy::Watch {
            for source in &params.sources {
                watchers.push(SourceWatcher::watch(source.path())?);
            }
        }

        if params.use_custom_executor {
            let (shutdown_tx, _) = broadcast::channel(1);
            let mut handles = Vec::with_capacity(params.sources.len());

            match params.strategy {
                Strategy::Watch => {
                    for watcher in watchers {
                        let rx = shutdown_tx.subscribe();
                        let ctx = ctx.clone();
                        handles.push(tokio::spawn(watch_loop(watcher, ctx, Some(rx))));
                    }
                }
                Strategy::Poll => {
                    for source in &params.sources {
                        let rx = shutdown_tx.subscribe();
                        let ctx = ctx.clone();
                        let primed = prime_fingerprint(source);
                        let source = source.clone();
                        let every = params.frequency.interval();
                        handles.push(tokio::spawn(poll_loop(source, every, ctx, primed, Some(rx))));
                    }
                }
            }

            let scheduler = Arc::new(Self {
                shutdown_tx,
                handles: Mutex::new(handles),
                daemon_handle: Mutex::new(None),
            });

            if params.run_as_daemon {
                let hook = scheduler.clone();
                let handle = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("termination signal received, stopping change scheduler");
                        hook.shutdown(DEFAULT_SHUTDOWN_WAIT).await;
                    }
                });
                *scheduler.daemon_handle.lock() = Some(handle);
            }

            info!(
                sources = params.sources.len(),
                strategy = %params.strategy,
                "change scheduler started with custom executor"
            );
            Ok(Some(scheduler))
        } else {
            match params.strategy {
                Strategy::Watch => {
                    for watcher in watchers {
                        let ctx = ctx.clone();
                        tokio::spawn(watch_loop(watcher, ctx, None));
                    }
                }
                Strategy::Poll => {
                    for source in &params.sources {
                        let ctx = ctx.clone();
                        let primed = prime_fingerprint(source);
                        let source = source.clone();
                        let every = params.frequency.interval();
                        tokio::spawn(poll_loop(source, every, ctx, primed, None));
                    }
                }
            }
            info!(
                sources = params.sources.len(),
                strategy = %params.strategy,
                "change scheduler started on ambient executor"
            );
            Ok(None)
        }
    }

    /// Graceful-then-forced shutdown: signal every task, wait up to `wait`
    /// for each to finish, abort whatever is still running.
    pub(crate) async fn shutdown(&self, wait: Duration) {
        if let Some(hook) = self.daemon_handle.lock().take() {
            hook.abort();
        }
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + wait;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("detection task did not stop within the wait window, aborting");
                handle.abort();
            }
        }
        info!("change scheduler stopped");
    }
}

async fn watch_loop(
    mut watcher: SourceWatcher,
    ctx: Arc<ReloadContext>,
    shutdown: Option<broadcast::Receiver<()>>,
) {
    match shutdown {
        Some(mut rx) => loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("watch task received shutdown signal");
                    break;
                }
                change = watcher.next() => match change {
                    Some(change) => {
                        debug!(path = %change.path.display(), "source change observed");
                        ctx.reload();
                    }
                    None => break,
                },
            }
        },
        None => {
            while let Some(change) = watcher.next().await {
                debug!(path = %change.path.display(), "source change observed");
                ctx.reload();
            }
        }
    }
}

/// Fingerprint of the content the initial merge consumed. Computed before
/// the poll task spawns so any later mutation is seen as a change.
fn prime_fingerprint(source: &SourceDescriptor) -> Option<u64> {
    source.resolve().ok().as_deref().map(fingerprint)
}

async fn poll_loop(
    source: SourceDescriptor,
    every: Duration,
    ctx: Arc<ReloadContext>,
    mut last: Option<u64>,
    shutdown: Option<broadcast::Receiver<()>>,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    match shutdown {
        Some(mut rx) => loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("poll task received shutdown signal");
                    break;
                }
                _ = interval.tick() => poll_once(&source, &ctx, &mut last),
            }
        },
        None => loop {
            interval.tick().await;
            poll_once(&source, &ctx, &mut last);
        },
    }
}

fn poll_once(source: &SourceDescriptor, ctx: &ReloadContext, last: &mut Option<u64>) {
    match source.resolve() {
        Ok(pairs) => {
            let current = fingerprint(&pairs);
            if *last != Some(current) {
                debug!(path = %source.path().display(), "poll detected source change");
                *last = Some(current);
                ctx.reload();
            }
        }
        Err(e) => warn!(
            path = %source.path().display(),
            error = %e,
            "poll could not resolve source"
        ),
    }
}

fn fingerprint(pairs: &[(String, String)]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    pairs.hash(&mut hasher);
    hasher.finish()
}
