#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! `tracing` output into the crashcause log file.
//!
//! Every event is written to the console and appended to `logs/latest.log`
//! as one line:
//!
//! ```text
//! 19/10/2026 03:04:05 PM [my_app::catalogue] [INFO] Loaded catalogue books=12
//! ```
//!
//! The file is flushed after each event, so the log is complete up to the
//! last event if the process dies.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crashcause::{CrashConfig, CrashContext};
//!
//! let context = Arc::new(CrashContext::new(CrashConfig::from_env("MyApp", "1.0")));
//! crashcause_tracing::init(context.logs()).expect("failed to set up logging");
//!
//! tracing::info!(books = 12, "Loaded catalogue");
//! ```
//!
//! Pass the [`LogFiles`] owned by the context the crash handler uses. The
//! log is rotated once, when it is first opened; a second `LogFiles` for the
//! same directory would archive the log this subscriber is writing to.
//!
//! To add the file output to a subscriber you build yourself, use
//! [`file_layer`].
//!
//! # Environment Variables
//!
//! - `CRASHCAUSE_LOG` - An [`EnvFilter`] directive string. Defaults to `info`.

use core::fmt;
use std::io;

use chrono::Local;
use crashcause::{
    error::LogError,
    log_file::{LogFiles, LogWriter, LogWriterGuard},
};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        FmtContext, MakeWriter,
        format::{DefaultFields, FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt as _,
    registry::LookupSpan,
    util::{SubscriberInitExt as _, TryInitError},
};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "CRASHCAUSE_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Timestamp layout at the start of each line.
pub const TIME_FORMAT: &str = "%d/%m/%Y %I:%M:%S %p";

/// Failure to set up logging.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The log file could not be opened.
    #[error(transparent)]
    Log(#[from] LogError),
    /// A global subscriber is already installed.
    #[error(transparent)]
    Subscriber(#[from] TryInitError),
}

/// Formats events as `time [target] [LEVEL] message fields`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
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
        let metadata = event.metadata();
        write!(
            writer,
            "{} [{}] [{}] ",
            Local::now().format(TIME_FORMAT),
            metadata.target(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Hands out locked handles to an open log file.
///
/// Each event is formatted into a buffer first and then written through one
/// handle, so lines from different threads never interleave.
#[derive(Clone, Debug)]
pub struct LogFileMakeWriter {
    writer: LogWriter,
}

impl LogFileMakeWriter {
    /// Wraps an open log file.
    pub fn new(writer: LogWriter) -> Self {
        Self { writer }
    }
}

impl<'a> MakeWriter<'a> for LogFileMakeWriter {
    type Writer = LogWriterGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.lock()
    }
}

/// A formatting layer that appends to `writer` in the [`LineFormat`].
pub fn file_layer<S>(
    writer: &LogWriter,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, LineFormat, LogFileMakeWriter>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_writer(LogFileMakeWriter::new(writer.clone()))
}

/// The filter from [`LOG_ENV`], or [`DEFAULT_DIRECTIVES`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs a global subscriber writing to standard error and to `writer`.
pub fn try_init(writer: &LogWriter) -> Result<(), TryInitError> {
    let console = tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file_layer(writer))
        .try_init()
}

/// Opens the log (rotating the previous one) and installs the global
/// subscriber.
///
/// Rotation happens before the subscriber is installed; its own events only
/// reach a subscriber that was already present.
pub fn init(logs: &LogFiles) -> Result<&LogWriter, InitError> {
    let writer = logs.open()?;
    try_init(writer)?;
    tracing::info!(path = %writer.path().display(), "Logging initialized");
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDateTime;
    use crashcause::{CrashConfig, CrashContext};
    use tracing_subscriber::Registry;

    use super::*;

    #[test]
    fn test_events_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogFiles::new(dir.path(), "# Test 1.0 - LogFile");
        let writer = logs.open().unwrap();

        let subscriber = Registry::default().with(file_layer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "catalogue", books = 12, "Loaded catalogue");
            tracing::warn!(target: "catalogue", "Shelf missing");
        });

        let contents = fs::read_to_string(logs.latest_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "# Test 1.0 - LogFile");
        assert!(lines[1].starts_with("# Log opened on date "));

        let (time, rest) = lines[2].split_at(22);
        NaiveDateTime::parse_from_str(time, TIME_FORMAT).unwrap();
        assert_eq!(rest, " [catalogue] [INFO] Loaded catalogue books=12");
        assert!(lines[3].ends_with(" [catalogue] [WARN] Shelf missing"));
    }

    #[test]
    fn test_context_log_is_shared_with_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let context = CrashContext::new(CrashConfig {
            working_dir: dir.path().to_path_buf(),
            ..CrashConfig::new("Test", "1.0")
        });
        fs::create_dir_all(context.logs().log_dir()).unwrap();
        fs::write(context.logs().latest_path(), "# Test 1.0 - LogFile\n").unwrap();

        let writer = context.logs().open().unwrap();
        let subscriber = Registry::default().with(file_layer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "catalogue", "Loaded catalogue");
        });

        // Opening again, as the crash handler does, keeps the same file.
        let again = context.logs().open().unwrap();
        again.write_line("Crash report saved").unwrap();
        assert_eq!(again.path(), writer.path());

        let archives = fs::read_dir(context.logs().log_dir())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "zip")
            })
            .count();
        assert_eq!(archives, 1);

        let contents = fs::read_to_string(context.logs().latest_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].ends_with(" [catalogue] [INFO] Loaded catalogue"));
        assert_eq!(lines[3], "Crash report saved");
    }

    #[test]
    fn test_concurrent_events_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogFiles::new(dir.path(), "# Test 1.0 - LogFile");
        let writer = logs.open().unwrap();
        let dispatch = tracing::Dispatch::new(Registry::default().with(file_layer(writer)));

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let dispatch = dispatch.clone();
                scope.spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        for line in 0..50 {
                            tracing::info!(target: "worker", worker, line, "tick");
                        }
                    });
                });
            }
        });

        let contents = fs::read_to_string(logs.latest_path()).unwrap();
        let events: Vec<&str> = contents.lines().skip(2).collect();
        assert_eq!(events.len(), 200);
        assert!(
            events
                .iter()
                .all(|line| line.contains(" [worker] [INFO] tick worker="))
        );
    }
}
