//! Turning an uncaught failure into a saved and displayed report.
//!
//! [`CrashHandler::handle_uncaught`] runs four stages in order: build the
//! snapshot, render the text, save it under `crash-reports/` and append it
//! to `logs/latest.log`, then hand it to the [`ReportDisplay`]. Every stage
//! runs isolated; an `Err` and a panic are treated alike.
//!
//! | Stage fails | Outcome |
//! |---|---|
//! | build, render | emergency path, exit status [`ExitStatus::ReportFailure`] |
//! | persist, log append | failure dumped, report still displayed |
//! | display | emergency path, exit status [`ExitStatus::DisplayFailure`] |
//! | emergency path itself | exit status [`ExitStatus::EmergencyFailure`] |
//!
//! The emergency path dumps both the new and the original failure plus the
//! thread stacks through a [`LogSink`], schedules a forced termination after
//! the configured grace period, tells the display, and then terminates.

use core::fmt;
use std::{
    io::{self, Write as _},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, Thread},
};

use tracing::{error, info};

use crate::{
    BoxError,
    context::CrashContext,
    error::HandlerError,
    failure::Failure,
    report::CrashReport,
    snapshot::{FailureSnapshot, thread_name},
    threads::ThreadStacks as _,
    trace::{LogSink, TraceSink, Visited, write_trace},
};

/// Message passed to [`ReportDisplay::show_fatal`] by the emergency path.
pub const FATAL_MESSAGE: &str = "Error while creating crash report";

/// Name of the thread that forces termination after the grace period.
pub const WATCHDOG_THREAD_NAME: &str = "crash-watchdog";

/// Reserved process exit statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitStatus {
    /// Building or rendering the report failed.
    ReportFailure = -3,
    /// Displaying the report failed.
    DisplayFailure = -4,
    /// The emergency path itself failed.
    EmergencyFailure = -5,
}

impl ExitStatus {
    /// The numeric process exit code.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit status {}", self.code())
    }
}

/// A stage of report handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Capturing the snapshot.
    Build,
    /// Producing the report text.
    Render,
    /// Saving the report file.
    Persist,
    /// Handing the report to the display.
    Display,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "building the report",
            Self::Render => "rendering the report",
            Self::Persist => "saving the report",
            Self::Display => "displaying the report",
        })
    }
}

/// Where the handler currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandlerState {
    /// Waiting for a failure.
    Idle,
    /// Capturing the snapshot.
    BuildingSnapshot,
    /// Rendering the text.
    Rendering,
    /// Saving the report file.
    Persisting,
    /// Waiting on the display.
    Displaying,
    /// In the emergency path; the process is going down.
    FatalFallback,
}

impl HandlerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::BuildingSnapshot,
            2 => Self::Rendering,
            3 => Self::Persisting,
            4 => Self::Displaying,
            _ => Self::FatalFallback,
        }
    }
}

/// The user-facing side of crash handling.
pub trait ReportDisplay: 'static + Send + Sync {
    /// Whether a graphical front end is present. Decides the platform type.
    fn is_graphical(&self) -> bool {
        false
    }

    /// Presents the finished report.
    fn show_report(&self, text: &str, snapshot: &FailureSnapshot) -> Result<(), BoxError>;

    /// Tells the user that no report could be produced.
    fn show_fatal(&self, message: &str) {
        let _ = message;
    }
}

/// Prints reports to standard error.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleDisplay;

impl ReportDisplay for ConsoleDisplay {
    fn show_report(&self, text: &str, _snapshot: &FailureSnapshot) -> Result<(), BoxError> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(text.as_bytes())?;
        stderr.flush()?;
        Ok(())
    }

    fn show_fatal(&self, message: &str) {
        let _ = writeln!(io::stderr().lock(), "{message}");
    }
}

/// Ends the process.
pub trait Terminate: 'static + Send + Sync {
    /// Terminates with `status`. Implementations used outside of tests do not
    /// return.
    fn terminate(&self, status: ExitStatus);
}

/// Calls [`std::process::exit`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, status: ExitStatus) {
        std::process::exit(status.code())
    }
}

/// The result of a successfully handled failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandledReport {
    /// The rendered report.
    pub text: String,
    /// Where the report was saved, if saving succeeded.
    pub path: Option<PathBuf>,
}

/// Handles uncaught failures.
///
/// One failure is handled at a time. A failure arriving while another is being
/// handled goes straight to the emergency path.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use crashcause::{
///     config::CrashConfig,
///     context::CrashContext,
///     failure::Failure,
///     handler::{ConsoleDisplay, CrashHandler, HandlerState},
/// };
///
/// let dir = tempfile::tempdir()?;
/// let context = Arc::new(CrashContext::new(CrashConfig {
///     working_dir: dir.path().to_path_buf(),
///     ..CrashConfig::new("MyApp", "1.0")
/// }));
/// let handler = CrashHandler::new(context, ConsoleDisplay);
///
/// let handled = handler.handle_uncaught(&std::thread::current(), Failure::new("boom").into_shared())?;
/// assert!(handled.path.is_some_and(|path| path.exists()));
/// assert_eq!(handler.state(), HandlerState::Idle);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CrashHandler {
    context: Arc<CrashContext>,
    display: Arc<dyn ReportDisplay>,
    terminator: Arc<dyn Terminate>,
    state: AtomicU8,
}

impl CrashHandler {
    /// Creates a handler that terminates the process through
    /// [`ProcessExit`].
    pub fn new(context: Arc<CrashContext>, display: impl ReportDisplay) -> Self {
        Self {
            context,
            display: Arc::new(display),
            terminator: Arc::new(ProcessExit),
            state: AtomicU8::new(HandlerState::Idle as u8),
        }
    }

    /// Replaces the terminator.
    #[must_use]
    pub fn with_terminator(mut self, terminator: impl Terminate) -> Self {
        self.terminator = Arc::new(terminator);
        self
    }

    /// The context reports are built against.
    pub fn context(&self) -> &Arc<CrashContext> {
        &self.context
    }

    /// The current state.
    pub fn state(&self) -> HandlerState {
        HandlerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn enter(&self, state: HandlerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Builds, renders, saves and displays a report for `failure`, raised on
    /// `thread`.
    ///
    /// On success the handler is idle again, unless another failure took the
    /// emergency path in the meantime. On failure the emergency path
    /// has run and the terminator has been called; the returned error names
    /// the stage and the exit status.
    pub fn handle_uncaught(
        &self,
        thread: &Thread,
        failure: Arc<Failure>,
    ) -> Result<HandledReport, HandlerError> {
        let idle = HandlerState::Idle as u8;
        let building = HandlerState::BuildingSnapshot as u8;
        if self
            .state
            .compare_exchange(idle, building, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let busy = Failure::new(format!(
                "Failure raised while the crash handler was {:?}",
                self.state()
            ))
            .into_shared();
            return Err(self.emergency(
                Stage::Build,
                &busy,
                thread,
                &failure,
                ExitStatus::ReportFailure,
            ));
        }

        info!(thread = %thread_name(thread), failure = %failure, "Handling uncaught failure");

        let graphical = self.display.is_graphical();
        let report = match attempt(|| {
            Ok(CrashReport::build(
                &self.context,
                Arc::clone(&failure),
                thread.clone(),
                graphical,
            ))
        }) {
            Ok(report) => report,
            Err(new) => {
                return Err(self.emergency(
                    Stage::Build,
                    &new,
                    thread,
                    &failure,
                    ExitStatus::ReportFailure,
                ));
            }
        };

        self.enter(HandlerState::Rendering);
        let text = match attempt(|| Ok(report.render())) {
            Ok(text) => text,
            Err(new) => {
                return Err(self.emergency(
                    Stage::Render,
                    &new,
                    thread,
                    &failure,
                    ExitStatus::ReportFailure,
                ));
            }
        };

        self.enter(HandlerState::Persisting);
        let path = match attempt(|| report.persist(&text).map_err(BoxError::from)) {
            Ok(path) => {
                info!(path = %path.display(), "Crash report saved");
                Some(path)
            }
            Err(new) => {
                self.dump(Stage::Persist, &new, thread, &failure);
                None
            }
        };
        if let Err(new) = attempt(|| self.append_to_log(&text, path.as_deref())) {
            self.dump(Stage::Persist, &new, thread, &failure);
        }

        self.enter(HandlerState::Displaying);
        if let Err(new) = attempt(|| self.display.show_report(&text, report.snapshot())) {
            return Err(self.emergency(
                Stage::Display,
                &new,
                thread,
                &failure,
                ExitStatus::DisplayFailure,
            ));
        }

        // A nested failure raised while displaying leaves the handler in the
        // fatal state.
        let _ = self.state.compare_exchange(
            HandlerState::Displaying as u8,
            HandlerState::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(HandledReport { text, path })
    }

    /// Appends the report to `logs/latest.log`, opening the log if nothing
    /// has yet.
    fn append_to_log(&self, text: &str, path: Option<&Path>) -> Result<(), BoxError> {
        let writer = self.context.logs().open()?;
        let mut out = writer.lock();
        out.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            out.write_all(b"\n")?;
        }
        match path {
            Some(path) => writeln!(out, "Crash report saved to {}", path.display())?,
            None => writeln!(out, "Crash report could not be saved")?,
        }
        Ok(())
    }

    /// Writes both traces and the thread stacks to the emergency sink.
    fn dump(&self, stage: Stage, new: &Arc<Failure>, thread: &Thread, original: &Arc<Failure>) {
        let mut sink = LogSink::detect();
        sink.write_line(&format!("Error while {stage}:"));
        write_trace(new, &mut sink, &mut Visited::default());
        sink.write_line("Original failure:");
        write_trace(original, &mut sink, &mut Visited::default());

        match self.context.thread_stacks().collect(thread, original) {
            Ok(stacks) => {
                for stack in stacks {
                    sink.write_line(&format!("Thread: {}", stack.name));
                    for frame in &stack.frames {
                        sink.write_line(&format!("\tat {frame}"));
                    }
                }
            }
            Err(error) => sink.write_line(&format!("Thread stacks unavailable: {error}")),
        }
    }

    fn emergency(
        &self,
        stage: Stage,
        new: &Arc<Failure>,
        thread: &Thread,
        original: &Arc<Failure>,
        status: ExitStatus,
    ) -> HandlerError {
        self.enter(HandlerState::FatalFallback);
        error!(%stage, %status, failure = %new, "Crash handling failed");

        let dumped = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dump(stage, new, thread, original);
            self.schedule_termination(status);
            self.display.show_fatal(FATAL_MESSAGE);
        }));
        let status = match dumped {
            Ok(()) => status,
            Err(_) => {
                let _ = writeln!(io::stderr().lock(), "Emergency crash handling failed");
                ExitStatus::EmergencyFailure
            }
        };

        error!(%status, "Terminating");
        self.terminator.terminate(status);
        HandlerError { stage, status }
    }

    fn schedule_termination(&self, status: ExitStatus) {
        let terminator = Arc::clone(&self.terminator);
        let grace_period = self.context.config().grace_period;
        let spawned = thread::Builder::new()
            .name(WATCHDOG_THREAD_NAME.to_owned())
            .spawn(move || {
                thread::sleep(grace_period);
                terminator.terminate(status);
            });
        if let Err(error) = spawned {
            error!(%error, "Could not schedule forced termination");
        }
    }
}

impl fmt::Debug for CrashHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashHandler")
            .field("context", &self.context)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Runs one stage; an `Err` or a panic becomes the failure to report.
fn attempt<T>(stage: impl FnOnce() -> Result<T, BoxError>) -> Result<T, Arc<Failure>> {
    match panic::catch_unwind(AssertUnwindSafe(stage)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Failure::from_dyn_error(&*error)),
        Err(payload) => Err(Failure::from_panic(&*payload, None).into_shared()),
    }
}
