//! Change handlers and their dispatch after a successful reload.
//!
//! Handlers are registered as named factories: each reload constructs a fresh
//! handler instance per registration and invokes it with the latest merged
//! mapping. No handler state carries across reloads. A handler that panics
//! during construction or execution is logged and isolated; it never aborts
//! the reload or the remaining handlers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

/// Callback invoked with the latest merged configuration after each reload.
pub trait ChangeHandler: Send {
    /// React to the latest configuration. Side effects only.
    fn on_change(&self, config: &HashMap<String, String>);
}

impl<F> ChangeHandler for F
where
    F: Fn(&HashMap<String, String>) + Send,
{
    fn on_change(&self, config: &HashMap<String, String>) {
        self(config);
    }
}

/// Factory producing a fresh handler instance per dispatch.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn ChangeHandler> + Send + Sync>;

/// A named handler registration.
///
/// The name is the registration identity: registering two handlers under the
/// same name keeps only the first.
#[derive(Clone)]
pub struct HandlerRegistration {
    name: String,
    factory: HandlerFactory,
}

impl HandlerRegistration {
    /// Create a registration from a name and a handler constructor.
    pub fn new<F, H>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ChangeHandler + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move || Box::new(factory())),
        }
    }

    /// The registration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Construct and invoke every registered handler with the given snapshot.
pub(crate) fn dispatch(registrations: &[HandlerRegistration], config: &HashMap<String, String>) {
    for registration in registrations {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let handler = (registration.factory)();
            handler.on_change(config);
        }));
        match outcome {
            Ok(()) => debug!(handler = registration.name(), "change handler executed"),
            Err(_) => error!(handler = registration.name(), "change handler panicked"),
        }
    }
}
