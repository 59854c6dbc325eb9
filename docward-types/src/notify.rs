//! Fire-and-forget alert channel.

use tracing::warn;

/// Receives operator alerts.
///
/// Implementations must not block and must swallow their own delivery
/// failures; callers never learn whether a message arrived.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "docward::alert", "{message}");
    }
}
