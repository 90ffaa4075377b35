//! Report sections: named blocks of text appended after the trace.
//!
//! Two kinds of sections exist:
//!
//! - The fixed [`BuiltinSection`]s, always printed in the same order.
//! - Contributed sections, implemented with [`SectionProvider`] and registered
//!   in a [`SectionRegistry`](crate::registry::SectionRegistry). Those are
//!   printed inside the `Providers Information` built-in section.
//!
//! A section that fails, either by returning an error or by panicking, is
//! replaced by a short notice and the report continues.

mod builtin;

use std::panic::{self, AssertUnwindSafe};

use triomphe::Arc;
use unsize::CoerceUnsize;

pub use self::builtin::{BuiltinSection, SECTION_SKIPPED};
use crate::{BoxError, failure::panic_message, snapshot::FailureSnapshot};

/// Produces the text of a contributed section.
///
/// Implemented for every `Fn(&FailureSnapshot) -> Result<String, BoxError>`
/// closure that is `Send + Sync + 'static`.
///
/// # Examples
///
/// ```
/// use crashcause::{BoxError, section::SectionProvider, snapshot::FailureSnapshot};
///
/// struct LoadedPlugins(Vec<String>);
///
/// impl SectionProvider for LoadedPlugins {
///     fn provide(&self, _snapshot: &FailureSnapshot) -> Result<String, BoxError> {
///         Ok(self.0.join("\n"))
///     }
/// }
/// ```
pub trait SectionProvider: 'static + Send + Sync {
    /// Returns the section text. Lines are separated by `\n`.
    fn provide(&self, snapshot: &FailureSnapshot) -> Result<String, BoxError>;
}

impl<F> SectionProvider for F
where
    F: Fn(&FailureSnapshot) -> Result<String, BoxError> + 'static + Send + Sync,
{
    fn provide(&self, snapshot: &FailureSnapshot) -> Result<String, BoxError> {
        self(snapshot)
    }
}

/// A type-erased, shareable section provider.
///
/// Registering the same `SharedSectionProvider` twice under the same id and
/// priority is a no-op.
pub type SharedSectionProvider = Arc<dyn SectionProvider>;

/// Erases the type of a [`SectionProvider`].
pub fn section_provider(provider: impl SectionProvider) -> SharedSectionProvider {
    Arc::new(provider).unsize(unsize::Coercion!(to dyn SectionProvider))
}

/// Runs a section body, turning a panic into an error.
pub(crate) fn isolate(
    body: impl FnOnce() -> Result<String, BoxError>,
) -> Result<String, BoxError> {
    panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(panic_message(&*payload).into_owned().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_catches_panics() {
        let result = isolate(|| panic!("provider exploded"));
        assert_eq!(result.unwrap_err().to_string(), "provider exploded");
    }

    #[test]
    fn test_isolate_passes_errors_through() {
        let result = isolate(|| Err("nope".into()));
        assert_eq!(result.unwrap_err().to_string(), "nope");
    }
}
