use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// A source error tied to the browser path it was requested under
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorWithLocation {
    pub message: String,
    pub browser_path: String,
    pub file_path: PathBuf,
    pub line: usize,
    pub column: usize,
    pub code_frame: Option<String>,
}

/// Logging sink handed to the dev server and its plugins.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
    fn debug(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn group(&self);
    fn group_end(&self);
    fn log_syntax_error(&self, error: &ErrorWithLocation);
}

/// `Logger` on top of `tracing`. Groups indent the messages logged inside them.
#[derive(Debug, Default)]
pub struct TracingLogger {
    depth: AtomicUsize,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&self, message: &str) -> String {
        format!("{}{}", "  ".repeat(self.depth.load(Ordering::Relaxed)), message)
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        info!("{}", self.indent(message));
    }

    fn debug(&self, message: &str) {
        debug!("{}", self.indent(message));
    }

    fn warn(&self, message: &str) {
        warn!("⚠️  {}", self.indent(message));
    }

    fn error(&self, message: &str) {
        error!("❌ {}", self.indent(message));
    }

    fn group(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn group_end(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
    }

    fn log_syntax_error(&self, err: &ErrorWithLocation) {
        error!(
            "❌ {} in {}:{}:{}",
            err.message, err.browser_path, err.line, err.column
        );
        if let Some(frame) = &err.code_frame {
            error!("\n{}", frame);
        }
    }
}
