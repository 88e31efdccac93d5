use crate::constants::DEFAULT_LOG_FILTER;
use crate::main_helper::{Args, LogFormat};
use std::panic;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// Installs the global subscriber: env filter, rolling file log, span traces.
///
/// The returned guard must be held for the life of the process or buffered
/// log lines are lost.
pub fn init_tracing(args: &Args) -> std::io::Result<WorkerGuard> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_LOG_FILTER.into(),
    };

    std::fs::create_dir_all(&args.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&args.log_dir, "tutorstream.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(guard)
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Per-session stream counters, logged once when the session ends.
#[derive(Debug, Default)]
pub struct StreamMetric {
    pub lines: usize,
    pub ignored_lines: usize,
    pub fragments: usize,
    pub empty_fragments: usize,
    pub appended_chars: usize,
}

impl StreamMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&mut self, kind: &crate::payload::LineKind) {
        self.lines += 1;
        match kind {
            crate::payload::LineKind::Ignorable => self.ignored_lines += 1,
            crate::payload::LineKind::Sentinel => {}
            crate::payload::LineKind::Fragment(text) if text.is_empty() => {
                self.fragments += 1;
                self.empty_fragments += 1;
            }
            crate::payload::LineKind::Fragment(text) => {
                self.fragments += 1;
                self.appended_chars += text.chars().count();
            }
        }
    }

    pub fn log_summary(&self, state: crate::session::SessionState) {
        info!(
            target: "flight_recorder",
            "[STREAM END] State: {:?} | Lines: {} (ignored {}) | Fragments: {} (empty {}) | Text: {} chars",
            state,
            self.lines,
            self.ignored_lines,
            self.fragments,
            self.empty_fragments,
            self.appended_chars
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::LineKind;

    #[test]
    fn metric_counts_line_kinds() {
        let mut metric = StreamMetric::new();
        metric.record_line(&LineKind::Ignorable);
        metric.record_line(&LineKind::Fragment(String::new()));
        metric.record_line(&LineKind::Fragment("αβ".to_string()));
        metric.record_line(&LineKind::Sentinel);

        assert_eq!(metric.lines, 4);
        assert_eq!(metric.ignored_lines, 1);
        assert_eq!(metric.fragments, 2);
        assert_eq!(metric.empty_fragments, 1);
        assert_eq!(metric.appended_chars, 2);
    }
}
