//! Logging initialization

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Initialize logging based on CLI arguments.
///
/// Diagnostics go to stderr so they never mix with the transcript on
/// stdout. The returned guard flushes the log file and must outlive the
/// program's work.
pub fn init(args: &Args) -> Result<Option<WorkerGuard>> {
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_writer, guard) = match args.log_file {
        Some(ref log_file) => {
            let file = std::fs::File::create(log_file)
                .with_context(|| format!("Failed to create log file: {}", log_file.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    match args.log_format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(args.verbose >= 2)
                    .with_thread_ids(args.verbose >= 3)
                    .with_file(args.verbose >= 3)
                    .with_line_number(args.verbose >= 3),
            );

            match file_writer {
                Some(writer) => subscriber
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init(),
                None => subscriber.init(),
            }
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr));

            match file_writer {
                Some(writer) => subscriber
                    .with(fmt::layer().json().with_writer(writer))
                    .init(),
                None => subscriber.init(),
            }
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr));

            match file_writer {
                Some(writer) => subscriber
                    .with(fmt::layer().compact().with_ansi(false).with_writer(writer))
                    .init(),
                None => subscriber.init(),
            }
        }
    }

    Ok(guard)
}
