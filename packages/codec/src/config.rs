//! Per-class configuration and out-of-band notification hooks.

use std::fmt;
use std::sync::Arc;

use propmap_core::Value;

/// An out-of-band report raised while converting.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub message: String,
    pub class: String,
    pub prop: String,
    /// The instance's `_id`, when the class declares one and it is set.
    pub id: Option<Value>,
    /// Owning project to route the report to; `None` for framework-level.
    pub project: Option<String>,
}

/// Receives reports that don't interrupt the conversion, or that accompany
/// an error with a notification to whoever owns the data.
pub trait Notifier: Send + Sync {
    /// A required prop was nil on serialize, but had already been nil when
    /// the instance was loaded.
    fn info(&self, notice: &Notice);

    /// A required prop was deserialized from nil. Called once for the owning
    /// project (when the class has an owner) and once framework-level.
    fn hard_assert(&self, notice: &Notice);
}

/// Default notifier: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, notice: &Notice) {
        tracing::info!(
            class = %notice.class,
            prop = %notice.prop,
            id = ?notice.id,
            "{}",
            notice.message
        );
    }

    fn hard_assert(&self, notice: &Notice) {
        tracing::error!(
            class = %notice.class,
            prop = %notice.prop,
            project = ?notice.project,
            "{}",
            notice.message
        );
    }
}

/// Settings shared by a class and its compiled converters.
///
/// # Example
///
/// ```rust
/// use propmap_codec::{Configuration, TracingNotifier};
///
/// let config = Configuration::new().with_notifier(TracingNotifier);
/// # let _ = config;
/// ```
#[derive(Clone)]
pub struct Configuration {
    notifier: Arc<dyn Notifier>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Share one notifier between several classes.
    pub fn with_shared_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            notifier: Arc::new(TracingNotifier),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration").finish_non_exhaustive()
    }
}
