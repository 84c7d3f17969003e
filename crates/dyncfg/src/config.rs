//! The dynamic configuration engine: lifecycle management and typed access.
//!
//! [`DynamicConfig`] owns the lifecycle state machine and the current
//! snapshot. State transitions (build, terminate) are serialized by one
//! coarse mutex; the snapshot itself lives in a separate atomically-swapped
//! cell so readers never block, and never observe a partially merged view.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{info, trace};

use crate::error::{ConfigResult, DynConfigError};
use crate::handler::{ChangeHandler, HandlerRegistration};
use crate::merge::{build_snapshot, Snapshot};
use crate::params::{InitParams, PollFrequency, Strategy};
use crate::scheduler::{ReloadContext, Scheduler, DEFAULT_SHUTDOWN_WAIT};
use crate::source::{dedup_paths, SourceDescriptor};
use crate::value::FromConfigValue;

/// Result of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The engine was initialized by this call.
    Initialized,
    /// The engine was already initialized; the call was a no-op.
    AlreadyInitialized,
}

/// State owned by an initialized engine.
struct Active {
    params: InitParams,
    details: String,
    ctx: Arc<ReloadContext>,
    /// Present only when the build requested a custom executor.
    scheduler: Option<Arc<Scheduler>>,
}

/// A continuously up-to-date configuration view over ordered sources.
///
/// Construct an instance (or use [`DynamicConfig::global`]), initialize it
/// once through the [builder](DynamicConfig::builder), and read from it on
/// any thread. Source changes are detected in the background and swapped in
/// atomically; registered change handlers run after every successful reload.
///
/// Building requires an ambient tokio runtime: detection runs on background
/// tasks.
pub struct DynamicConfig {
    state: Mutex<Option<Active>>,
    snapshot: Arc<ArcSwapOption<Snapshot>>,
}

impl DynamicConfig {
    /// Create a new, uninitialized engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            snapshot: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// The process-wide shared instance.
    ///
    /// A compatibility convenience; passing an owned instance explicitly is
    /// the primary design.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<DynamicConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Create a builder for initializing an engine.
    #[must_use]
    pub fn builder() -> DynamicConfigBuilder {
        DynamicConfigBuilder::new()
    }

    /// Whether the engine is currently initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Descriptive summary of the active build parameters.
    ///
    /// Stable across redundant build attempts.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] if the engine is not
    /// initialized.
    pub fn init_details(&self) -> ConfigResult<String> {
        let state = self.state.lock();
        state
            .as_ref()
            .map(|active| active.details.clone())
            .ok_or(DynConfigError::Uninitialized)
    }

    /// Terminate the engine and return it to the uninitialized state,
    /// allowing re-initialization within the same process.
    ///
    /// Performs a graceful-then-forced shutdown of the owned detection
    /// tasks: stop signal, bounded wait (1000ms), forced abort.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] if not initialized, or
    /// [`DynConfigError::UnsupportedTermination`] if the build did not
    /// request a custom executor: ambient detection tasks are not owned by
    /// the engine and cannot be safely stopped.
    pub async fn terminate(&self) -> ConfigResult<()> {
        let active = {
            let mut state = self.state.lock();
            let active = state.as_ref().ok_or(DynConfigError::Uninitialized)?;
            if !active.params.use_custom_executor {
                return Err(DynConfigError::UnsupportedTermination);
            }
            state.take()
        };
        if let Some(active) = active {
            active.ctx.close();
            if let Some(scheduler) = active.scheduler {
                scheduler.shutdown(DEFAULT_SHUTDOWN_WAIT).await;
            }
        }
        // Cleared only once the detection tasks are drained; a reload landing
        // during the shutdown wait must not outlive termination.
        self.snapshot.store(None);
        info!("dynamic config terminated");
        Ok(())
    }

    /// Look up a key and coerce its value to `T`.
    ///
    /// Returns `Ok(None)` when the key (after trimming) is blank or absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization and
    /// [`DynConfigError::TypeMismatch`] when the stored string cannot
    /// represent `T`.
    pub fn get<T: FromConfigValue>(&self, key: &str) -> ConfigResult<Option<T>> {
        let snapshot = self.current()?;
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }
        match snapshot.get(key) {
            None => Ok(None),
            Some(raw) => T::from_config_value(raw)
                .map(Some)
                .ok_or_else(|| DynConfigError::type_mismatch(key, raw, T::TYPE_NAME)),
        }
    }

    /// String value of `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization.
    pub fn value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get(key)
    }

    /// Boolean value of `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization or
    /// [`DynConfigError::TypeMismatch`] on an uncoercible value.
    pub fn bool_value(&self, key: &str) -> ConfigResult<Option<bool>> {
        self.get(key)
    }

    /// 32-bit integer value of `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization or
    /// [`DynConfigError::TypeMismatch`] on an uncoercible value.
    pub fn int_value(&self, key: &str) -> ConfigResult<Option<i32>> {
        self.get(key)
    }

    /// 64-bit integer value of `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization or
    /// [`DynConfigError::TypeMismatch`] on an uncoercible value.
    pub fn long_value(&self, key: &str) -> ConfigResult<Option<i64>> {
        self.get(key)
    }

    /// Floating-point value of `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization or
    /// [`DynConfigError::TypeMismatch`] on an uncoercible value.
    pub fn double_value(&self, key: &str) -> ConfigResult<Option<f64>> {
        self.get(key)
    }

    /// Value of `key`, or the supplied default. Never fails.
    ///
    /// Falls back to the default when the engine is uninitialized, the key
    /// is absent, the stored value cannot be coerced, or (for strings) the
    /// stored value is blank. Failures are logged at trace detail only.
    pub fn get_or_default<T: FromConfigValue>(&self, key: &str, default: T) -> T {
        match self.get::<T>(key) {
            Ok(Some(value)) if !value.is_blank() => value,
            Ok(_) => {
                trace!(key, "key absent or blank, returning default");
                default
            }
            Err(e) => {
                trace!(key, error = %e, "lookup failed, returning default");
                default
            }
        }
    }

    /// An immutable copy of the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::Uninitialized`] before initialization.
    pub fn config_as_map(&self) -> ConfigResult<Snapshot> {
        Ok(self.current()?.as_ref().clone())
    }

    fn current(&self) -> ConfigResult<Arc<Snapshot>> {
        self.snapshot
            .load_full()
            .ok_or(DynConfigError::Uninitialized)
    }

    /// Serialized initialization; called by the builder.
    fn initialize(&self, builder: DynamicConfigBuilder) -> ConfigResult<BuildOutcome> {
        let mut state = self.state.lock();
        if state.is_some() {
            info!("dynamic config is already initialized");
            return Ok(BuildOutcome::AlreadyInitialized);
        }

        let mut sources = Vec::new();
        for path in dedup_paths(builder.sources) {
            sources.push(SourceDescriptor::new(path)?);
        }

        let params = InitParams {
            include_sys_env_props: builder.include_sys_env_props,
            use_custom_executor: builder.use_custom_executor,
            run_as_daemon: builder.run_as_daemon,
            strategy: builder.strategy,
            frequency: builder.frequency,
            sources,
        };

        let initial = build_snapshot(&params.sources, params.include_sys_env_props)?;

        let ctx = Arc::new(ReloadContext::new(
            params.sources.clone(),
            params.include_sys_env_props,
            self.snapshot.clone(),
            builder.handlers,
        ));

        // Published before detection starts; a reload racing past this point
        // can only replace it with equal or fresher content.
        self.snapshot.store(Some(Arc::new(initial)));
        let scheduler = match Scheduler::start(&params, &ctx) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                self.snapshot.store(None);
                return Err(e);
            }
        };

        let details = params.details();
        info!(details = %details, "dynamic config initialized");
        *state = Some(Active {
            params,
            details,
            ctx,
            scheduler,
        });
        Ok(BuildOutcome::Initialized)
    }
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder capturing the initialization parameters of a [`DynamicConfig`].
///
/// # Example
///
/// ```no_run
/// use dyncfg::{DynamicConfig, PollFrequency, Strategy};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), dyncfg::DynConfigError> {
/// let config = DynamicConfig::new();
/// DynamicConfig::builder()
///     .use_custom_executor()
///     .strategy(Strategy::Poll)
///     .frequency(PollFrequency::High)
///     .sources(["/etc/app/service.properties"])
///     .build_on(&config)?;
///
/// let timeout = config.get_or_default("service.timeout", 30i64);
/// # let _ = timeout;
/// config.terminate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DynamicConfigBuilder {
    include_sys_env_props: bool,
    use_custom_executor: bool,
    run_as_daemon: bool,
    strategy: Strategy,
    frequency: PollFrequency,
    sources: Vec<PathBuf>,
    handlers: Vec<HandlerRegistration>,
}

impl DynamicConfigBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include process environment variables in the merge at the lowest
    /// precedence; file sources always override them.
    #[must_use]
    pub fn include_sys_env_props(mut self) -> Self {
        self.include_sys_env_props = true;
        self
    }

    /// Give the engine ownership of its detection tasks. Only builds that
    /// request this can later be terminated.
    #[must_use]
    pub fn use_custom_executor(mut self) -> Self {
        self.use_custom_executor = true;
        self
    }

    /// Bind scheduler shutdown to normal process termination. Only
    /// meaningful together with [`use_custom_executor`](Self::use_custom_executor).
    #[must_use]
    pub fn run_as_daemon(mut self) -> Self {
        self.run_as_daemon = true;
        self
    }

    /// Add one source file or directory. Earlier sources win on key
    /// collisions; duplicates are dropped.
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Add multiple source files or directories, in precedence order.
    #[must_use]
    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Select the change-detection strategy. Default is [`Strategy::Watch`].
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Select the polling frequency used under [`Strategy::Poll`]. Default
    /// is [`PollFrequency::Medium`].
    #[must_use]
    pub fn frequency(mut self, frequency: PollFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Register a named change-handler factory. A fresh handler is
    /// constructed per reload; registering the same name twice keeps the
    /// first factory.
    #[must_use]
    pub fn handler<F, H>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ChangeHandler + 'static,
    {
        self.handler_registration(HandlerRegistration::new(name, factory))
    }

    /// Register a prepared [`HandlerRegistration`]. Duplicate names collapse.
    #[must_use]
    pub fn handler_registration(mut self, registration: HandlerRegistration) -> Self {
        if !self
            .handlers
            .iter()
            .any(|existing| existing.name() == registration.name())
        {
            self.handlers.push(registration);
        }
        self
    }

    /// Register several prepared handler registrations.
    #[must_use]
    pub fn handlers<I>(mut self, registrations: I) -> Self
    where
        I: IntoIterator<Item = HandlerRegistration>,
    {
        for registration in registrations {
            self = self.handler_registration(registration);
        }
        self
    }

    /// Initialize the process-wide [`DynamicConfig::global`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if any source path does not exist or detection
    /// resources cannot be allocated; the engine stays uninitialized and
    /// nothing keeps running.
    pub fn build(self) -> ConfigResult<BuildOutcome> {
        self.build_on(DynamicConfig::global())
    }

    /// Initialize the given engine instance.
    ///
    /// A no-op returning [`BuildOutcome::AlreadyInitialized`] if the engine
    /// is already initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if any source path does not exist or detection
    /// resources cannot be allocated; the engine stays uninitialized and
    /// nothing keeps running.
    pub fn build_on(self, config: &DynamicConfig) -> ConfigResult<BuildOutcome> {
        config.initialize(self)
    }
}
