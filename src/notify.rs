//! Toast notifications raised by user-initiated attachment operations.

use std::sync::{Mutex, PoisonError};

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Error,
}

/// A transient, non-blocking notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub body: Option<String>,
}

impl Toast {
    /// An error toast with a title and optional detail line.
    pub fn error(title: impl Into<String>, body: Option<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            title: title.into(),
            body,
        }
    }
}

/// Sink for toasts. Implementations must not block.
pub trait Toaster: Send + Sync {
    fn show(&self, toast: Toast);
}

/// Writes toasts to the log. Used by the CLI.
#[derive(Debug, Default)]
pub struct TracingToaster;

impl Toaster for TracingToaster {
    fn show(&self, toast: Toast) {
        let body = toast.body.as_deref().unwrap_or("");
        match toast.level {
            ToastLevel::Error => tracing::warn!(title = %toast.title, body, "toast"),
        }
    }
}

/// Keeps every toast in memory so callers can inspect them afterwards.
#[derive(Debug, Default)]
pub struct ToastRecorder {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All toasts shown so far.
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded toasts.
    pub fn take(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Toaster for ToastRecorder {
    fn show(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}
