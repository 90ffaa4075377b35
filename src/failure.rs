//! Failures: the error values a crash report is built around.
//!
//! A [`Failure`] is a node in a (possibly cyclic) graph: it has at most one
//! cause and any number of suppressed failures, each of which is another
//! shared [`Failure`]. The cause can be set after construction and suppressed
//! failures can be appended at any time, so a failure may end up being its own
//! ancestor. Consumers that walk the graph must track visited nodes by
//! identity; see [`Visited`](crate::trace::Visited).

use std::{
    any::Any,
    borrow::Cow,
    error::Error,
    fmt,
    panic::Location,
    sync::{Arc, OnceLock},
};

use crate::descriptor::FailureDescriptor;

/// Upper bound on how many cause links are followed when walking a chain
/// that is not protected by a visited set.
pub(crate) const MAX_CAUSE_DEPTH: usize = 1024;

/// A single stack frame of a [`Failure`].
///
/// Frames compare by value, which is what common-frame elision relies on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    symbol: String,
    file: Option<String>,
    line: Option<u32>,
}

impl Frame {
    /// Creates a frame for the given symbol with no source location.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            file: None,
            line: None,
        }
    }

    /// Sets the source file of the frame.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Sets the source line of the frame.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// The (demangled) symbol of the frame.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The source file, if known.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The source line, if known.
    pub fn line(&self) -> Option<u32> {
        self.line
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}({file}:{line})", self.symbol),
            (Some(file), None) => write!(f, "{}({file})", self.symbol),
            (None, _) => write!(f, "{}(Unknown Source)", self.symbol),
        }
    }
}

/// An error value together with its frames, cause and suppressed failures.
///
/// Failures are shared through [`Arc`]; two failures are the *same* failure
/// only if they are the same allocation. Two distinct failures with identical
/// text are never conflated.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use crashcause::failure::{Failure, Frame};
///
/// let cause = Failure::new("permission denied").into_shared();
/// let failure = Failure::new("disk full")
///     .with_kind("io::Error")
///     .with_frames([Frame::new("app::save").with_file("save.rs").with_line(12)])
///     .with_cause(cause)
///     .into_shared();
///
/// assert_eq!(failure.to_string(), "io::Error: disk full");
/// assert!(failure.cause().is_some());
/// ```
pub struct Failure {
    kind: Option<Cow<'static, str>>,
    message: Option<String>,
    frames: Vec<Frame>,
    cause: OnceLock<Arc<Failure>>,
    suppressed: spin::RwLock<Vec<Arc<Failure>>>,
    descriptor: Option<FailureDescriptor>,
}

impl Failure {
    /// Creates a failure carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        let mut failure = Self::empty();
        failure.message = Some(message.into());
        failure
    }

    /// Creates a failure without kind, message or frames.
    pub fn empty() -> Self {
        Self {
            kind: None,
            message: None,
            frames: Vec::new(),
            cause: OnceLock::new(),
            suppressed: spin::RwLock::new(Vec::new()),
            descriptor: None,
        }
    }

    /// Sets the kind (usually a type name) shown before the message.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<Cow<'static, str>>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Appends stack frames, most recent first.
    #[must_use]
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = Frame>) -> Self {
        self.frames.extend(frames);
        self
    }

    /// Sets the cause, replacing any cause set earlier on this builder.
    #[must_use]
    pub fn with_cause(mut self, cause: Arc<Failure>) -> Self {
        self.cause = OnceLock::from(cause);
        self
    }

    /// Appends a suppressed failure.
    #[must_use]
    pub fn with_suppressed(self, suppressed: Arc<Failure>) -> Self {
        self.suppressed.write().push(suppressed);
        self
    }

    /// Attaches a [`FailureDescriptor`].
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: FailureDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Moves the failure behind an [`Arc`].
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Sets the cause of an already shared failure.
    ///
    /// The cause can be set once. If a cause is already present the rejected
    /// value is handed back.
    pub fn set_cause(&self, cause: Arc<Failure>) -> Result<(), Arc<Failure>> {
        self.cause.set(cause)
    }

    /// Appends a suppressed failure to an already shared failure.
    pub fn add_suppressed(&self, suppressed: Arc<Failure>) {
        self.suppressed.write().push(suppressed);
    }

    /// The kind of the failure, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The message of the failure, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The stack frames, most recent first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The cause of the failure, if any.
    pub fn cause(&self) -> Option<&Arc<Failure>> {
        self.cause.get()
    }

    /// A copy of the current list of suppressed failures.
    pub fn suppressed(&self) -> Vec<Arc<Failure>> {
        self.suppressed.read().clone()
    }

    /// The attached descriptor, if any.
    pub fn descriptor(&self) -> Option<&FailureDescriptor> {
        self.descriptor.as_ref()
    }

    /// Builds a failure from an error and its `source()` chain.
    ///
    /// The root failure's kind is the type name of `E`; every source becomes a
    /// cause. The chain is cut after a fixed number of links.
    pub fn from_error<E: Error>(error: &E) -> Arc<Self> {
        Self::chain_from(Some(core::any::type_name::<E>()), error)
    }

    /// Like [`from_error`](Self::from_error) for a type-erased error; the root
    /// failure carries no kind.
    pub fn from_dyn_error(error: &(dyn Error + 'static)) -> Arc<Self> {
        Self::chain_from(None, error)
    }

    fn chain_from(kind: Option<&'static str>, error: &dyn Error) -> Arc<Self> {
        let mut messages = vec![error.to_string()];
        let mut source = error.source();
        while let Some(current) = source
            && messages.len() < MAX_CAUSE_DEPTH
        {
            messages.push(current.to_string());
            source = current.source();
        }

        let mut cause: Option<Arc<Failure>> = None;
        for message in messages.drain(1..).rev() {
            let mut failure = Failure::new(message);
            if let Some(cause) = cause.take() {
                failure = failure.with_cause(cause);
            }
            cause = Some(failure.into_shared());
        }

        let root_message = messages.pop().unwrap_or_default();
        let mut root = Failure::new(root_message);
        if let Some(kind) = kind {
            root = root.with_kind(kind);
        }
        if let Some(cause) = cause {
            root = root.with_cause(cause);
        }
        root.into_shared()
    }

    /// Builds a failure from a panic payload and the location it was raised
    /// at. Frames are left for the caller to add.
    pub fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
        let kind = match location {
            Some(location) => Cow::Owned(format!("panicked at {location}")),
            None => Cow::Borrowed("panic"),
        };
        Failure::new(panic_message(payload)).with_kind(kind)
    }
}

/// Extracts the message of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> Cow<'_, str> {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        Cow::Borrowed(message.as_str())
    } else {
        Cow::Borrowed("Box<dyn Any>")
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.message) {
            (Some(kind), Some(message)) => write!(f, "{kind}: {message}"),
            (Some(kind), None) => f.write_str(kind),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("unknown failure"),
        }
    }
}

// Long cause chains would otherwise be dropped recursively.
impl Drop for Failure {
    fn drop(&mut self) {
        let mut next = self.cause.take();
        while let Some(cause) = next {
            next = Arc::into_inner(cause).and_then(|mut inner| inner.cause.take());
        }
    }
}

// Causes and suppressed failures are printed by their text only: the graph may
// contain cycles.
impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("frames", &self.frames.len())
            .field("cause", &self.cause().map(|cause| cause.to_string()))
            .field("suppressed", &self.suppressed.read().len())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    static_assertions::assert_impl_all!(Failure: Send, Sync);

    #[derive(Debug, thiserror::Error)]
    #[error("could not save settings")]
    struct SaveError {
        #[source]
        source: io::Error,
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::new("app::main").with_file("main.rs").with_line(3);
        assert_eq!(frame.to_string(), "app::main(main.rs:3)");
        assert_eq!(Frame::new("app::main").to_string(), "app::main(Unknown Source)");
        assert_eq!(
            Frame::new("app::main").with_file("main.rs").to_string(),
            "app::main(main.rs)"
        );
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(Failure::new("boom").to_string(), "boom");
        assert_eq!(
            Failure::new("boom").with_kind("Oops").to_string(),
            "Oops: boom"
        );
        assert_eq!(Failure::empty().with_kind("Oops").to_string(), "Oops");
        assert_eq!(Failure::empty().to_string(), "unknown failure");
    }

    #[test]
    fn test_cause_can_be_set_once() {
        let failure = Failure::new("outer").into_shared();
        let first = Failure::new("first").into_shared();
        let second = Failure::new("second").into_shared();

        assert!(failure.set_cause(first).is_ok());
        let rejected = failure.set_cause(Arc::clone(&second));
        assert!(rejected.is_err_and(|cause| Arc::ptr_eq(&cause, &second)));
        assert_eq!(failure.cause().map(|c| c.to_string()).as_deref(), Some("first"));
    }

    #[test]
    fn test_self_cause_is_allowed() {
        let failure = Failure::new("loop").into_shared();
        failure.set_cause(Arc::clone(&failure)).unwrap();
        let cause = failure.cause().unwrap();
        assert!(Arc::ptr_eq(cause, &failure));
        // Debug must not recurse through the cycle.
        assert!(format!("{failure:?}").contains("loop"));
    }

    #[test]
    fn test_from_error_follows_sources() {
        let error = SaveError {
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        let failure = Failure::from_error(&error);

        assert!(failure.kind().unwrap().ends_with("SaveError"));
        assert_eq!(failure.message(), Some("could not save settings"));
        let cause = failure.cause().unwrap();
        assert_eq!(cause.to_string(), "permission denied");
        assert!(cause.kind().is_none());
        assert!(cause.cause().is_none());
    }

    #[test]
    fn test_from_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Failure::from_panic(&*payload, None).to_string(), "panic: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(&*payload), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "Box<dyn Any>");
    }
}
