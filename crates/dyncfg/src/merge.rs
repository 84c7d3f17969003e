//! Source merge engine.
//!
//! Combines per-source key/value sets into one snapshot honoring list-order
//! precedence: a key is inserted only if no earlier source defined it, so
//! the earliest source always wins on collisions. Environment variables, when
//! included, are applied last and therefore at the lowest precedence. Every
//! merge is a full rebuild; snapshots are never patched in place.

use std::collections::HashMap;
use std::env;

use tracing::debug;

use crate::error::ConfigResult;
use crate::source::SourceDescriptor;

/// An immutable point-in-time merged configuration mapping.
pub type Snapshot = HashMap<String, String>;

/// Build a snapshot from the ordered sources, optionally backfilled with
/// process environment variables.
///
/// # Errors
///
/// Returns an error if any source cannot be resolved. No partial snapshot is
/// produced in that case.
pub fn build_snapshot(
    sources: &[SourceDescriptor],
    include_sys_env_props: bool,
) -> ConfigResult<Snapshot> {
    let mut resolved = Vec::with_capacity(sources.len());
    for source in sources {
        resolved.push(source.resolve()?);
    }
    let env = include_sys_env_props.then(|| env::vars().collect::<Vec<_>>());
    let snapshot = merge_pairs(&resolved, env.as_deref());
    debug!(
        sources = sources.len(),
        entries = snapshot.len(),
        "built configuration snapshot"
    );
    Ok(snapshot)
}

/// Merge already-resolved per-source pairs, earliest source winning, with an
/// optional lowest-precedence environment layer.
#[must_use]
pub fn merge_pairs(per_source: &[Vec<(String, String)>], env: Option<&[(String, String)]>) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for pairs in per_source {
        fill_absent(&mut snapshot, pairs.iter().cloned());
    }
    if let Some(env_pairs) = env {
        fill_absent(&mut snapshot, env_pairs.iter().cloned());
    }
    snapshot
}

/// Insert only keys not already present.
fn fill_absent(snapshot: &mut Snapshot, pairs: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in pairs {
        snapshot.entry(key).or_insert(value);
    }
}
