//! Structured logging setup shared by every `basis-*` binary.
//!
//! Mirrors the original's async `spdlog` pattern — a non-blocking file sink
//! plus a clean, colorized stdout stream — using `tracing`/`tracing-appender`
//! instead: [`init`] installs both layers and returns the
//! [`tracing_appender::non_blocking::WorkerGuard`] the caller must keep alive
//! for the duration of the process (dropping it stops the background writer
//! and file logging goes silent).

use colored::*;
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// A custom tracing event formatter for colorizing log output based on level.
///
/// This formatter is designed to provide clean, user-facing output where the
/// entire log line is colored according to its severity level, without any
/// extra metadata like timestamps or log levels printed.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer fields first so the whole line can be colored at once;
        // format_fields writes straight to the real writer otherwise.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        // Apply color based on the event's log level.
        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        // Write the colored line to the actual output.
        writeln!(writer, "{}", colored_output)
    }
}

/// Installs the process-wide `tracing` subscriber: a colorized stdout layer
/// (the original's clean user-facing console output) and, if `log_dir` is
/// given, a non-blocking daily-rolling file layer alongside it.
///
/// Level comes from `RUST_LOG` (standard `EnvFilter` syntax) if set,
/// otherwise from `verbosity` (`0` = info, `1` = debug, `2+` = trace) per
/// spec.md §6.4's "log level from environment (standard level string)".
/// Returns the file layer's guard, which the caller must hold for the
/// lifetime of `main()`.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .event_format(ColorizedFormatter)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "basis.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter())
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stdout_layer).with(file_layer).init();
    guard
}