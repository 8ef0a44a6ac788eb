//! Narration of schema changes.
//!
//! Every structural change the builder makes is described to a
//! [`SchemaLogger`] before it is issued. Logging returns nothing, so a logger
//! can never fail a run.

use tracing::info;

/// Receives a human-readable line per structural change.
pub trait SchemaLogger: Send + Sync {
    /// Records one schema-build message.
    fn log_schema_build(&self, message: &str);
}

/// Forwards narration to `tracing` at INFO level under the
/// `oxide_sync::schema` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SchemaLogger for TracingLogger {
    fn log_schema_build(&self, message: &str) {
        info!(target: "oxide_sync::schema", "{}", message);
    }
}

/// Discards all narration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl SchemaLogger for NoopLogger {
    fn log_schema_build(&self, _message: &str) {}
}

/// Joins names for a log line, or "nothing" when empty.
pub(crate) fn join_names<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let joined = names.into_iter().collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "nothing".to_string()
    } else {
        joined
    }
}
