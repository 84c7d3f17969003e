//! Dynamic multi-source configuration with hot reload for containerized
//! services.
//!
//! This crate assembles one continuously up-to-date configuration view from
//! multiple ordered sources (property files or directories of property
//! files). After a one-time build it keeps watching or polling the sources,
//! rebuilds the merged view on every change, swaps it in atomically, and
//! notifies registered change handlers, all without a process restart. That
//! fits services whose configuration is delivered as mounted, mutable files.
//!
//! - Ordered merge with precedence: the earliest listed source wins on key
//!   collisions; later sources only fill keys absent so far. Environment
//!   variables, when included, participate at the lowest precedence.
//! - Two detection strategies: [`Strategy::Watch`] (event-driven, default)
//!   and [`Strategy::Poll`] at a fixed [`PollFrequency`].
//! - Lock-free reads: the snapshot is an immutable map behind an atomically
//!   swapped reference; accessors never block on reloads.
//! - Typed access with defaults: [`DynamicConfig::get`] and friends coerce
//!   stored strings, [`DynamicConfig::get_or_default`] never fails.
//!
//! # Example
//!
//! ```no_run
//! use dyncfg::{DynamicConfig, HandlerRegistration, Strategy};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), dyncfg::DynConfigError> {
//! let config = DynamicConfig::new();
//! DynamicConfig::builder()
//!     .use_custom_executor()
//!     .sources(["/etc/app/overrides.properties", "/etc/app/defaults"])
//!     .handler("log-reload", || {
//!         |cfg: &std::collections::HashMap<String, String>| {
//!             println!("configuration reloaded, {} entries", cfg.len());
//!         }
//!     })
//!     .build_on(&config)?;
//!
//! let url = config.get_or_default("service.url", "http://localhost".to_string());
//! let retries = config.get_or_default("service.retries", 3i32);
//! # let _ = (url, retries);
//!
//! config.terminate().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Builds that do not request a custom executor rely on ambient execution
//! resources and cannot be terminated; see
//! [`DynamicConfig::terminate`].

#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod merge;
mod params;
mod scheduler;
mod source;
mod value;
mod watcher;

pub use config::{BuildOutcome, DynamicConfig, DynamicConfigBuilder};
pub use error::{ConfigResult, DynConfigError};
pub use handler::{ChangeHandler, HandlerFactory, HandlerRegistration};
pub use merge::{build_snapshot, merge_pairs, Snapshot};
pub use params::{InitParams, PollFrequency, Strategy};
pub use source::{parse_properties, SourceDescriptor};
pub use value::FromConfigValue;
pub use watcher::{SourceChange, SourceWatcher, DEFAULT_DEBOUNCE};
