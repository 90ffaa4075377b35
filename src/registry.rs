//! The priority-ordered set of contributed report sections.

use core::{cmp::Ordering, fmt::Write as _};

use tracing::{info, warn};
use triomphe::Arc;

use crate::{
    section::{SectionProvider, SharedSectionProvider, isolate, section_provider},
    snapshot::FailureSnapshot,
};

/// A contributed section together with where it sorts.
#[derive(Clone)]
pub struct RegisteredSection {
    id: String,
    priority: u32,
    provider: SharedSectionProvider,
}

impl RegisteredSection {
    /// The display name of the section.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The priority, already clamped to be non-negative.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// The provider producing the section text.
    pub fn provider(&self) -> &SharedSectionProvider {
        &self.provider
    }

    // Higher priority first, then id ascending.
    fn order(&self, priority: u32, id: &str) -> Ordering {
        priority
            .cmp(&self.priority)
            .then_with(|| self.id.as_str().cmp(id))
    }
}

impl core::fmt::Debug for RegisteredSection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisteredSection")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// An ordered set of contributed sections.
///
/// Iteration order is by descending priority, then ascending id. Negative
/// priorities are clamped to zero. Registering the exact same provider under
/// the same id and priority again has no effect; every other registration is
/// kept, including distinct providers sharing an id and priority.
///
/// The registry is safe to use from several threads; readers get a copy of
/// the current contents.
///
/// # Examples
///
/// ```
/// use crashcause::{BoxError, registry::SectionRegistry, snapshot::FailureSnapshot};
///
/// let registry = SectionRegistry::new();
/// registry.register_fn("Low", -5, |_: &FailureSnapshot| -> Result<String, BoxError> {
///     Ok("low".into())
/// });
/// registry.register_fn("High", 10, |_: &FailureSnapshot| -> Result<String, BoxError> {
///     Ok("high".into())
/// });
///
/// let ids: Vec<_> = registry
///     .sections_ordered()
///     .iter()
///     .map(|section| section.id().to_owned())
///     .collect();
/// assert_eq!(ids, ["High", "Low"]);
/// ```
#[derive(Default)]
pub struct SectionRegistry {
    sections: spin::RwLock<Vec<RegisteredSection>>,
}

impl SectionRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            sections: spin::RwLock::new(Vec::new()),
        }
    }

    /// Registers a shared provider. Returns `false` if this exact
    /// registration already exists.
    pub fn register(
        &self,
        id: impl Into<String>,
        priority: i32,
        provider: SharedSectionProvider,
    ) -> bool {
        let id = id.into();
        let priority = u32::try_from(priority).unwrap_or(0);
        info!(id = %id, priority, "Attempting to register crash section provider");

        let mut sections = self.sections.write();
        let start = sections.partition_point(|s| s.order(priority, &id) == Ordering::Less);
        let duplicate = sections[start..]
            .iter()
            .take_while(|s| s.order(priority, &id) == Ordering::Equal)
            .any(|s| Arc::ptr_eq(&s.provider, &provider));
        if duplicate {
            return false;
        }

        let end = sections.partition_point(|s| s.order(priority, &id) != Ordering::Greater);
        sections.insert(
            end,
            RegisteredSection {
                id,
                priority,
                provider,
            },
        );
        true
    }

    /// Registers any [`SectionProvider`], closures included.
    ///
    /// Every call creates a new shared provider, so it never counts as a
    /// duplicate.
    pub fn register_fn(
        &self,
        id: impl Into<String>,
        priority: i32,
        provider: impl SectionProvider,
    ) -> bool {
        self.register(id, priority, section_provider(provider))
    }

    /// A copy of the registered sections in iteration order.
    pub fn sections_ordered(&self) -> Vec<RegisteredSection> {
        self.sections.read().clone()
    }

    /// Number of registered sections.
    pub fn len(&self) -> usize {
        self.sections.read().len()
    }

    /// Whether no section is registered.
    pub fn is_empty(&self) -> bool {
        self.sections.read().is_empty()
    }

    /// Renders every registered section.
    ///
    /// Each section becomes a `\t-- id --` header followed by its lines, each
    /// indented by two tabs, and a blank line. Trailing blank lines of the
    /// output are dropped; empty output still gives one indented line. A
    /// provider that fails is replaced by a two-line notice.
    pub fn render_all(&self, snapshot: &FailureSnapshot) -> String {
        let mut out = String::new();
        for section in self.sections_ordered() {
            let _ = writeln!(out, "\t-- {} --", section.id);
            match isolate(|| section.provider.provide(snapshot)) {
                Ok(text) => {
                    for line in section_lines(&text) {
                        let _ = writeln!(out, "\t\t{line}");
                    }
                    out.push('\n');
                }
                Err(error) => {
                    warn!(id = %section.id, %error, "Section provider failed");
                    out.push_str(PROVIDER_SKIPPED);
                }
            }
        }
        out
    }
}

fn section_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return vec![""];
    }
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Written in place of a section whose provider failed.
pub const PROVIDER_SKIPPED: &str =
    "\tError occurred while obtaining provider information.\n\tProvider skipped.\n";

impl core::fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.sections.read().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxError;

    type ProviderResult = Result<String, BoxError>;

    fn constant(text: &'static str) -> SharedSectionProvider {
        section_provider(move |_: &FailureSnapshot| -> ProviderResult { Ok(text.to_owned()) })
    }

    fn ids(registry: &SectionRegistry) -> Vec<(String, u32)> {
        registry
            .sections_ordered()
            .into_iter()
            .map(|s| (s.id, s.priority))
            .collect()
    }

    #[test]
    fn test_ordering_by_priority_then_id() {
        let registry = SectionRegistry::new();
        registry.register("b", 5, constant("b"));
        registry.register("a", 5, constant("a"));
        registry.register("z", 100, constant("z"));
        registry.register("neg", -7, constant("neg"));

        assert_eq!(
            ids(&registry),
            [
                ("z".to_owned(), 100),
                ("a".to_owned(), 5),
                ("b".to_owned(), 5),
                ("neg".to_owned(), 0),
            ]
        );
    }

    #[test]
    fn test_same_provider_registered_once() {
        let registry = SectionRegistry::new();
        let provider = constant("x");
        assert!(registry.register("x", 1, provider.clone()));
        assert!(!registry.register("x", 1, provider.clone()));
        assert_eq!(registry.len(), 1);

        // A different priority is a different registration.
        assert!(registry.register("x", 2, provider));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_distinct_providers_with_same_key_are_kept() {
        let registry = SectionRegistry::new();
        assert!(registry.register("x", 1, constant("one")));
        assert!(registry.register("x", 1, constant("two")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_section_lines() {
        assert_eq!(section_lines(""), [""]);
        assert_eq!(section_lines("one"), ["one"]);
        assert_eq!(section_lines("one\n\ntwo\n\n"), ["one", "", "two"]);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = std::sync::Arc::new(SectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    for index in 0..50 {
                        registry.register(format!("{thread}-{index}"), index, constant("x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sections = registry.sections_ordered();
        assert_eq!(sections.len(), 400);
        assert!(sections.windows(2).all(|pair| {
            pair[0].order(pair[1].priority, &pair[1].id) != Ordering::Greater
        }));
    }
}
