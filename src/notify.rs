//! Transient user notifications.

use std::sync::Mutex;

use metrics::counter;
use tracing::{info, warn};

use crate::{
    metrics::{NOTIFY_ERROR, NOTIFY_SUCCESS},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

/// Sink for short-lived messages about the outcome of an action.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl dyn Notifier + '_ {
    pub fn success(&self, message: impl Into<String>) {
        counter!(NOTIFY_SUCCESS).increment(1);
        self.notify(Notification {
            level: Level::Success,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        counter!(NOTIFY_ERROR).increment(1);
        self.notify(Notification {
            level: Level::Error,
            message: message.into(),
        });
    }

    /// Announce how an action ended and hand its result back unchanged.
    ///
    /// Errors show their own message when they have one, `failure` otherwise.
    pub fn outcome<T>(
        &self,
        result: Result<T>,
        success: impl FnOnce(&T) -> String,
        failure: &str,
    ) -> Result<T> {
        match &result {
            Ok(value) => self.success(success(value)),
            Err(e) => self.error(e.user_message(failure)),
        }
        result
    }
}

/// Prints notifications to stderr, as toasts for a terminal.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    #[expect(clippy::print_stderr, reason = "notifications are user-facing output")]
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => {
                info!(message = %notification.message, "notify");
                eprintln!("[ok] {}", notification.message);
            }
            Level::Error => {
                warn!(message = %notification.message, "notify");
                eprintln!("[error] {}", notification.message);
            }
        }
    }
}

/// Keeps every notification in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Drain what has been recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|mut seen| std::mem::take(&mut *seen))
            .unwrap_or_default()
    }

    /// Messages of the drained notifications at `level`.
    pub fn take_messages(&self, level: Level) -> Vec<String> {
        self.take()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}
