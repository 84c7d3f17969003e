//! Initialization parameters: detection strategy, poll frequency, and the
//! frozen settings captured by a successful build.

use std::fmt;
use std::time::Duration;

use crate::source::SourceDescriptor;

/// Strategy used to detect changes on configuration sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Event-driven: a filesystem watcher pushes a notification as soon as a
    /// source changes. This is the default.
    #[default]
    Watch,
    /// Fixed-interval pull: each source is re-checked at the configured
    /// [`PollFrequency`].
    Poll,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watch => write!(f, "WATCH"),
            Self::Poll => write!(f, "POLL"),
        }
    }
}

/// Polling interval used when the strategy is [`Strategy::Poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollFrequency {
    /// Poll every 2 seconds.
    High,
    /// Poll every 10 seconds. This is the default.
    #[default]
    Medium,
    /// Poll every 30 seconds.
    Low,
}

impl PollFrequency {
    /// The polling interval in seconds.
    #[must_use]
    pub fn secs(self) -> u64 {
        match self {
            Self::High => 2,
            Self::Medium => 10,
            Self::Low => 30,
        }
    }

    /// The polling interval as a [`Duration`].
    #[must_use]
    pub fn interval(self) -> Duration {
        Duration::from_secs(self.secs())
    }
}

/// Parameters frozen at build time.
///
/// Captured once by a successful build and immutable afterwards; redundant
/// build attempts never alter them.
#[derive(Debug, Clone)]
pub struct InitParams {
    /// Whether process environment variables participate in the merge at the
    /// lowest precedence.
    pub include_sys_env_props: bool,
    /// Whether the scheduler owns its background tasks, enabling explicit
    /// termination.
    pub use_custom_executor: bool,
    /// Whether scheduler shutdown is bound to normal process termination.
    /// Only meaningful together with a custom executor.
    pub run_as_daemon: bool,
    /// Change-detection strategy.
    pub strategy: Strategy,
    /// Polling frequency; effective only under [`Strategy::Poll`].
    pub frequency: PollFrequency,
    /// Ordered, deduplicated source descriptors. Earlier sources win on key
    /// collisions.
    pub sources: Vec<SourceDescriptor>,
}

impl InitParams {
    /// Human-readable summary of the active parameters.
    #[must_use]
    pub fn details(&self) -> String {
        let frequency = match self.strategy {
            Strategy::Watch => "N/A".to_string(),
            Strategy::Poll => format!("{} seconds", self.frequency.secs()),
        };
        let sources: Vec<String> = self
            .sources
            .iter()
            .map(|s| s.path().display().to_string())
            .collect();
        format!(
            "includeSysEnvProps: {}, useCustomExecutor: {}, runAsDaemon: {}, \
             strategy: {}, pollingFrequency: {}, configFileSources: [{}]",
            self.include_sys_env_props,
            self.use_custom_executor,
            self.run_as_daemon,
            self.strategy,
            frequency,
            sources.join(", ")
        )
    }
}
