use chrono::Local;
use image::RgbaImage;
use tracing::{error, info};

/// Receives timestamped log lines.
pub type LogCallback = Box<dyn Fn(&str) + Send>;
/// Receives `(current, total, status)`; `total` is [`INDETERMINATE`] for endless runs.
pub type ProgressCallback = Box<dyn Fn(usize, i64, &str) + Send>;
/// Receives an error message and, when enabled, a capture of the screen.
pub type ErrorCallback = Box<dyn Fn(&str, Option<&RgbaImage>) + Send>;

/// Progress total meaning "no upper bound".
pub const INDETERMINATE: i64 = -1;

/// Observer callbacks, all optional. Invoked synchronously on the worker thread.
#[derive(Default)]
pub(crate) struct Reporter {
    on_log: Option<LogCallback>,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl Reporter {
    pub(crate) fn set(
        &mut self,
        log: Option<LogCallback>,
        progress: Option<ProgressCallback>,
        error: Option<ErrorCallback>,
    ) {
        self.on_log = log;
        self.on_progress = progress;
        self.on_error = error;
    }

    pub(crate) fn log(&self, message: &str) {
        info!(target: "macroflow::runtime", "{message}");
        if let Some(cb) = &self.on_log {
            let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
            cb(&line);
        }
    }

    pub(crate) fn progress(&self, current: usize, total: i64, status: &str) {
        if let Some(cb) = &self.on_progress {
            cb(current, total, status);
        }
    }

    pub(crate) fn error(&self, message: &str, screenshot: Option<&RgbaImage>) {
        error!(target: "macroflow::runtime", "{message}");
        self.log(&format!("❌ 에러: {message}"));
        if let Some(cb) = &self.on_error {
            cb(message, screenshot);
        }
    }
}
