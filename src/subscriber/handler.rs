use std::fmt::Display;
use std::sync::Mutex;

use tracing::warn;

use crate::utils::AmqpError;

/// Receives the body of every message forwarded by a subscription.
///
/// Returning `Err` marks that one message as failed; delivery of later
/// messages continues.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, body: String) -> Result<(), String>;
}

impl<F, E> MessageHandler for F
where
    F: Fn(String) -> Result<(), E> + Send + Sync + 'static,
    E: Display,
{
    fn handle(&self, body: String) -> Result<(), String> {
        self(body).map_err(|e| e.to_string())
    }
}

/// Collects failures that cannot be returned to the caller of `listen`.
pub trait ErrorSink: Send + Sync {
    fn report(&self, queue: &str, error: &AmqpError);
}

/// Logs each failure as a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, queue: &str, error: &AmqpError) {
        warn!(queue, error = %error, "Subscription error");
    }
}

/// Keeps every reported failure in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.errors.lock().ok().and_then(|e| e.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.errors.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, queue: &str, error: &AmqpError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(format!("{queue}: {error}"));
        }
    }
}
