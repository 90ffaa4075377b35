#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Stack capture and a panic hook for crashcause.
//!
//! [`capture`] walks the current stack into crashcause [`Frame`]s, hiding the
//! capture machinery at the top and the runtime start-up code at the bottom.
//! [`install_panic_hook`] routes every panic into a [`CrashHandler`], with the
//! panicking thread's frames attached.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crashcause::{CrashConfig, CrashContext, CrashHandler, handler::ConsoleDisplay};
//!
//! let context = Arc::new(CrashContext::new(CrashConfig::from_env("MyApp", "1.0")));
//! let handler = Arc::new(CrashHandler::new(context, ConsoleDisplay));
//! crashcause_backtrace::install_panic_hook(handler);
//!
//! // From here on, any panic produces a crash report.
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Disables filtering and shows full paths
//! - `CRASHCAUSE_BACKTRACE=full_paths` - Shows full file paths
//!
//! # Debugging symbols in release builds
//!
//! Frames only carry symbols and source locations if the binary has debug
//! information:
//!
//! ```toml
//! [profile.release]
//! strip = false
//! # You can also set this to "line-tables-only" for smaller binaries
//! debug = true
//! ```

use std::{
    panic::{self, PanicHookInfo},
    sync::{Arc, OnceLock},
    thread,
};

use backtrace::BytesOrWideString;
use crashcause::{CrashHandler, Failure, Frame};
use tracing::error;

/// Name of the thread the panic hook runs the crash handler on.
///
/// Panics on this thread are left to the previous hook; the handler catches
/// them itself.
pub const HANDLER_THREAD_NAME: &str = "crash-handler";

/// Which frames [`capture`] keeps.
///
/// # Examples
///
/// ```rust
/// use crashcause_backtrace::BacktraceFilter;
///
/// let filter = BacktraceFilter {
///     // Show only the most relevant 10 frames
///     max_entry_count: 10,
///     ..BacktraceFilter::DEFAULT
/// };
/// ```
#[derive(Copy, Clone, Debug)]
pub struct BacktraceFilter {
    /// Crates whose frames are dropped while they are at the top of the
    /// stack. Names use underscores, as in paths (`crashcause_backtrace`).
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose frames are dropped while they are at the bottom of the
    /// stack.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of frames to keep.
    pub max_entry_count: usize,
    /// Whether to keep absolute file paths instead of shortening them.
    pub show_full_path: bool,
}

impl BacktraceFilter {
    /// Default filter settings.
    pub const DEFAULT: Self = Self {
        skipped_initial_crates: &[
            "backtrace",
            "crashcause",
            "crashcause_backtrace",
            "core",
            "std",
            "alloc",
            "__rustc",
        ],
        skipped_final_crates: &["std", "core", "alloc"],
        max_entry_count: 64,
        show_full_path: false,
    };

    /// Keeps every frame.
    pub const UNFILTERED: Self = Self {
        skipped_initial_crates: &[],
        skipped_final_crates: &[],
        max_entry_count: usize::MAX,
        show_full_path: true,
    };

    /// [`DEFAULT`](Self::DEFAULT), adjusted by `RUST_BACKTRACE` and
    /// `CRASHCAUSE_BACKTRACE`.
    pub fn from_env() -> Self {
        let env_options = CrashcauseEnvOptions::get();
        if env_options.rust_backtrace_full {
            Self {
                show_full_path: env_options.show_full_path,
                ..Self::UNFILTERED
            }
        } else {
            Self {
                show_full_path: env_options.show_full_path,
                ..Self::DEFAULT
            }
        }
    }
}

impl Default for BacktraceFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug)]
struct CrashcauseEnvOptions {
    rust_backtrace_full: bool,
    show_full_path: bool,
}

impl CrashcauseEnvOptions {
    fn get() -> &'static Self {
        static CRASHCAUSE_FLAGS: OnceLock<CrashcauseEnvOptions> = OnceLock::new();

        CRASHCAUSE_FLAGS.get_or_init(|| {
            let rust_backtrace_full =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            let mut show_full_path = rust_backtrace_full;
            if let Some(var) = std::env::var_os("CRASHCAUSE_BACKTRACE") {
                for v in var.to_string_lossy().split(',') {
                    if v.eq_ignore_ascii_case("full_paths") {
                        show_full_path = true;
                    }
                }
            }
            CrashcauseEnvOptions {
                rust_backtrace_full,
                show_full_path,
            }
        })
    }
}

/// File path information for a stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FramePath {
    raw_path: String,
    crate_name: Option<String>,
    short_path: Option<String>,
}

impl FramePath {
    fn new(path: BytesOrWideString<'_>) -> Self {
        Self::parse(&path.to_str_lossy())
    }

    fn parse(raw_path: &str) -> Self {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // Matches Rust standard library paths:
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // Matches Cargo registry paths:
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        // Backslashes would defeat both patterns on Windows.
        let normalized = raw_path.replace('\\', "/");
        let known = std_regex
            .captures(&normalized)
            .or_else(|| registry_regex.captures(&normalized))
            .and_then(|captures| captures.get(1));

        match known {
            Some(crate_capture) => Self {
                raw_path: raw_path.to_owned(),
                crate_name: Some(crate_capture.as_str().replace('-', "_")),
                short_path: Some(normalized[crate_capture.start()..].to_owned()),
            },
            None => Self {
                raw_path: raw_path.to_owned(),
                crate_name: None,
                short_path: std::env::current_dir().ok().and_then(|dir| {
                    std::path::Path::new(raw_path)
                        .strip_prefix(dir)
                        .ok()
                        .map(|relative| relative.display().to_string())
                }),
            },
        }
    }

    fn display(&self, show_full_path: bool) -> &str {
        match &self.short_path {
            Some(short_path) if !show_full_path => short_path,
            _ => &self.raw_path,
        }
    }
}

/// The crate a demangled symbol belongs to: its first path segment.
///
/// `<alloc::boxed::Box<F> as core::ops::FnOnce>::call_once` belongs to `alloc`.
fn symbol_crate(symbol: &str) -> Option<&str> {
    let start = symbol.find(|c: char| c == '_' || unicode_ident::is_xid_start(c))?;
    let rest = &symbol[start..];
    let end = rest
        .find(|c: char| !unicode_ident::is_xid_continue(c))
        .unwrap_or(rest.len());
    rest[end..].starts_with("::").then(|| &rest[..end])
}

// Process start-up symbols below `main`.
fn is_runtime_entry(symbol: &str) -> bool {
    matches!(
        symbol,
        "main"
            | "_start"
            | "__libc_start_main"
            | "__libc_start_call_main"
            | "__libc_start_main_impl"
    )
}

/// Captures the current stack, most recent frame first.
///
/// Frames without a symbol name are dropped.
pub fn capture(filter: &BacktraceFilter) -> Vec<Frame> {
    let mut initial_filtering = !filter.skipped_initial_crates.is_empty();
    let mut entries: Vec<(Option<String>, Frame)> = Vec::new();

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            let Some(sym) = symbol.name() else {
                return;
            };
            if entries.len() >= filter.max_entry_count {
                return;
            }

            let sym_demangled = format!("{sym:#}");
            let frame_path = symbol.filename_raw().map(FramePath::new);
            let crate_name = frame_path
                .as_ref()
                .and_then(|path| path.crate_name.clone())
                .or_else(|| symbol_crate(&sym_demangled).map(str::to_owned));

            if initial_filtering {
                if crate_name
                    .as_deref()
                    .is_some_and(|name| filter.skipped_initial_crates.contains(&name))
                {
                    return;
                }
                initial_filtering = false;
            }

            let mut captured = Frame::new(sym_demangled);
            if let Some(frame_path) = &frame_path {
                captured = captured.with_file(frame_path.display(filter.show_full_path));
            }
            if let Some(lineno) = symbol.lineno() {
                captured = captured.with_line(lineno);
            }
            entries.push((crate_name, captured));
        });

        entries.len() < filter.max_entry_count
    });

    while entries.last().is_some_and(|(crate_name, frame)| {
        is_runtime_entry(frame.symbol())
            || crate_name
                .as_deref()
                .is_some_and(|name| filter.skipped_final_crates.contains(&name))
    }) {
        entries.pop();
    }

    entries.into_iter().map(|(_, frame)| frame).collect()
}

/// Builds the failure for a panic: payload message, location and the frames
/// of the panicking thread.
pub fn failure_from_panic(info: &PanicHookInfo<'_>, filter: &BacktraceFilter) -> Arc<Failure> {
    Failure::from_panic(info.payload(), info.location())
        .with_frames(capture(filter))
        .into_shared()
}

/// Installs a panic hook that reports every panic through `handler`, using
/// [`BacktraceFilter::from_env`].
pub fn install_panic_hook(handler: Arc<CrashHandler>) {
    install_panic_hook_with_filter(handler, BacktraceFilter::from_env());
}

/// Installs a panic hook that reports every panic through `handler`.
///
/// The handler runs on a dedicated thread named [`HANDLER_THREAD_NAME`], so
/// that panics raised while handling are caught by the handler instead of
/// aborting the process. Panics on that thread are passed to the previously
/// installed hook.
pub fn install_panic_hook_with_filter(handler: Arc<CrashHandler>, filter: BacktraceFilter) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let origin = thread::current();
        if origin.name() == Some(HANDLER_THREAD_NAME) {
            previous(info);
            return;
        }

        let failure = failure_from_panic(info, &filter);
        let handler = Arc::clone(&handler);
        let spawned = thread::Builder::new()
            .name(HANDLER_THREAD_NAME.to_owned())
            .spawn(move || handler.handle_uncaught(&origin, failure));

        match spawned.map(thread::JoinHandle::join) {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(err))) => error!(%err, "Crash handler gave up"),
            Ok(Err(_)) => error!("Crash handler thread panicked"),
            Err(err) => {
                error!(%err, "Could not start the crash handler thread");
                previous(info);
            }
        }
    }));
}
