//! Rendering a failure and everything it links to as a plain-text trace.
//!
//! The output of [`render_trace`] follows a fixed layout:
//!
//! ```text
//! io::Error: disk full
//! 	at app::save(save.rs:12)
//! 	at app::main(main.rs:3)
//! 	Suppressed: cleanup failed
//! 		at app::cleanup(cleanup.rs:7)
//! 		... 1 more
//! Caused by: permission denied
//! 	at fs::open(fs.rs:40)
//! 	... 1 more
//! ```
//!
//! Frames a nested failure shares with the tail of its enclosing failure are
//! collapsed into a single `... N more` line. A failure that was already
//! printed is replaced by a `[CIRCULAR REFERENCE: ...]` marker, so cyclic
//! graphs always terminate.
//!
//! The walk uses an explicit work list rather than recursion, so arbitrarily
//! long cause chains cannot exhaust the stack.

mod sink;

use core::fmt::{self, Write as _};
use std::sync::Arc;

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;

pub use self::sink::{LogSink, TraceSink};
use crate::failure::{Failure, Frame};

/// One level of nesting.
pub const INDENT: &str = "\t";
/// Caption of a suppressed failure.
pub const SUPPRESSED_CAPTION: &str = "Suppressed: ";
/// Caption of a cause.
pub const CAUSE_CAPTION: &str = "Caused by: ";

/// The set of failures already printed during one rendering.
///
/// Membership is by identity (allocation address), never by value.
#[derive(Default, Debug, Clone)]
pub struct Visited {
    seen: HashSet<usize, FxBuildHasher>,
}

impl Visited {
    fn key(failure: &Failure) -> usize {
        core::ptr::from_ref(failure).addr()
    }

    /// Records `failure`; returns `false` if it had been recorded before.
    pub fn insert(&mut self, failure: &Failure) -> bool {
        self.seen.insert(Self::key(failure))
    }

    /// Whether `failure` has been recorded.
    pub fn contains(&self, failure: &Failure) -> bool {
        self.seen.contains(&Self::key(failure))
    }

    /// Number of distinct failures recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Splits `trace` into the frames to print and the number of trailing frames
/// it shares with `enclosing`.
///
/// Returns `(unique, in_common)` where `unique + in_common == trace.len()`.
///
/// ```
/// use crashcause::{failure::Frame, trace::shared_tail};
///
/// let main = Frame::new("app::main");
/// let outer = [Frame::new("app::save"), main.clone()];
/// let inner = [Frame::new("fs::open"), Frame::new("app::save"), main];
/// assert_eq!(shared_tail(&inner, &outer), (1, 2));
/// ```
pub fn shared_tail(trace: &[Frame], enclosing: &[Frame]) -> (usize, usize) {
    let mut unique = trace.len();
    let mut remaining = enclosing.len();
    while unique > 0 && remaining > 0 && trace[unique - 1] == enclosing[remaining - 1] {
        unique -= 1;
        remaining -= 1;
    }
    (unique, trace.len() - unique)
}

/// Renders `failure` and its linked failures into a new string.
///
/// Every line, including the last, ends with `\n`.
pub fn render_trace(failure: &Arc<Failure>) -> String {
    let mut out = String::new();
    write_trace(failure, &mut out, &mut Visited::default());
    out
}

struct Enclosed {
    failure: Arc<Failure>,
    enclosing: Arc<Failure>,
    caption: &'static str,
    depth: usize,
}

/// Reusable line buffer; writing into a `String` cannot fail.
struct Lines<'a> {
    sink: &'a mut dyn TraceSink,
    line: String,
}

impl Lines<'_> {
    fn emit(&mut self, depth: usize, args: fmt::Arguments<'_>) {
        self.line.clear();
        for _ in 0..depth {
            self.line.push_str(INDENT);
        }
        let _ = self.line.write_fmt(args);
        self.sink.write_line(&self.line);
    }
}

/// Renders `failure` into `sink`, recording every printed failure in
/// `visited`.
///
/// The root is always printed in full. Nested failures already present in
/// `visited` are replaced by a circular-reference marker.
pub fn write_trace(failure: &Arc<Failure>, sink: &mut dyn TraceSink, visited: &mut Visited) {
    let mut lines = Lines {
        sink,
        line: String::new(),
    };

    visited.insert(failure);
    lines.emit(0, format_args!("{failure}"));
    for frame in failure.frames() {
        lines.emit(1, format_args!("at {frame}"));
    }

    let mut pending = Vec::new();
    push_enclosed(&mut pending, failure, 0);

    while let Some(Enclosed {
        failure,
        enclosing,
        caption,
        depth,
    }) = pending.pop()
    {
        if !visited.insert(&failure) {
            lines.emit(1, format_args!("[CIRCULAR REFERENCE: {failure}]"));
            continue;
        }

        let trace = failure.frames();
        let (unique, in_common) = shared_tail(trace, enclosing.frames());

        lines.emit(depth, format_args!("{caption}{failure}"));
        for frame in &trace[..unique] {
            lines.emit(depth + 1, format_args!("at {frame}"));
        }
        if in_common != 0 {
            lines.emit(depth + 1, format_args!("... {in_common} more"));
        }

        push_enclosed(&mut pending, &failure, depth);
    }
}

// The work list is a stack: pushing the cause first and the suppressed
// failures in reverse prints suppressed failures in order, then the cause.
fn push_enclosed(pending: &mut Vec<Enclosed>, parent: &Arc<Failure>, depth: usize) {
    if let Some(cause) = parent.cause() {
        pending.push(Enclosed {
            failure: Arc::clone(cause),
            enclosing: Arc::clone(parent),
            caption: CAUSE_CAPTION,
            depth,
        });
    }
    for suppressed in parent.suppressed().into_iter().rev() {
        pending.push(Enclosed {
            failure: suppressed,
            enclosing: Arc::clone(parent),
            caption: SUPPRESSED_CAPTION,
            depth: depth + 1,
        });
    }
}
