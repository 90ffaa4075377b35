#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Deterministic, human-readable crash reports.
//!
//! ## Overview
//!
//! This crate turns an unhandled failure, together with the thread it escaped
//! from, into a plain-text crash report, saves the report to disk and hands it
//! to whatever front end the application has. Independent subsystems can
//! contribute extra report sections without knowing about each other, and the
//! application log is rotated into compressed archives on every start.
//!
//! The pieces, roughly in the order a crash flows through them:
//!
//! - [`failure`]: the [`Failure`] graph (message, frames, cause, suppressed
//!   failures), built from any [`std::error::Error`] or panic payload.
//! - [`descriptor`]: a [`FailureDescriptor`] lets a failure override the report
//!   description and bring its own sections.
//! - [`trace`]: renders a failure graph with shared-frame elision and cycle
//!   detection, into a string or line by line into a log.
//! - [`registry`]: the priority-ordered [`SectionRegistry`] of contributed
//!   sections.
//! - [`report`]: [`CrashReport`] captures a [`FailureSnapshot`] and renders
//!   the full text.
//! - [`handler`]: [`CrashHandler`] runs build, render, save and display, with
//!   an emergency path and reserved exit statuses when any of that fails.
//! - [`log_file`]: `logs/latest.log` with rotation into `log_<date>_<ts>.zip`.
//!
//! Companion crates add stack capture and a panic hook
//! (`crashcause-backtrace`) and a `tracing` subscriber writing into the log
//! file (`crashcause-tracing`).
//!
//! ## Quick example
//!
//! ```
//! use std::sync::Arc;
//!
//! use crashcause::prelude::*;
//!
//! let dir = tempfile::tempdir()?;
//! let context = Arc::new(CrashContext::new(CrashConfig {
//!     working_dir: dir.path().to_path_buf(),
//!     ..CrashConfig::new("Library", "0.1.0")
//! }));
//! context.logs().open()?;
//!
//! context.registry().register_fn(
//!     "Open Books",
//!     10,
//!     |_: &FailureSnapshot| -> Result<String, BoxError> { Ok("Dune\nEmma".into()) },
//! );
//!
//! let retry = Failure::new("retry failed").into_shared();
//! let cause = Failure::new("permission denied").into_shared();
//! let failure = Failure::new("disk full")
//!     .with_suppressed(retry)
//!     .with_cause(cause)
//!     .into_shared();
//!
//! let handler = CrashHandler::new(Arc::clone(&context), ConsoleDisplay);
//! let handled = handler.handle_uncaught(&std::thread::current(), failure)?;
//! assert!(handled.text.contains("\tSuppressed: retry failed\n"));
//! assert!(handled.text.contains("\t-- Open Books --\n\t\tDune\n\t\tEmma\n"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Features
//!
//! - Deterministic trace layout: `Suppressed: ` failures are indented one
//!   level, `Caused by: ` keeps the level of its parent, frames shared with the
//!   enclosing trace collapse into `... N more`.
//! - Cycle-safe: a failure may be its own ancestor. Repeats are printed as
//!   `[CIRCULAR REFERENCE: ...]`.
//! - Isolation: a section provider that errors or panics is replaced by a
//!   notice; the rest of the report is unaffected.
//! - Crash-safe logging: every log line is flushed immediately, and rotation
//!   finishes before the first line of the new log is written.

pub mod config;
pub mod context;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod failure;
pub mod handler;
pub mod log_file;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod section;
pub mod snapshot;
pub mod threads;
pub mod trace;

pub use self::{
    config::CrashConfig,
    context::CrashContext,
    descriptor::FailureDescriptor,
    error::BoxError,
    failure::{Failure, Frame},
    handler::{CrashHandler, ExitStatus, HandlerState},
    registry::SectionRegistry,
    report::CrashReport,
    snapshot::FailureSnapshot,
};
