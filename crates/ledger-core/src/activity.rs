//! Human-readable activity log.
//!
//! Recording is infallible from the caller's point of view: implementations
//! swallow their own I/O errors so a broken log never stops mining.

use tracing::info;

pub trait ActivityLog: Send + Sync {
    fn record(&self, line: &str);
}

/// Emits activity lines as `tracing` events under the `activity` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, line: &str) {
        info!(target: "activity", "{line}");
    }
}

impl<F> ActivityLog for F
where
    F: Fn(&str) + Send + Sync,
{
    fn record(&self, line: &str) {
        self(line)
    }
}
