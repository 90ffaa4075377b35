//! Descriptors let a failure contribute to the report it ends up in.
//!
//! A [`FailureDescriptor`] attached somewhere in a failure's cause chain can
//! override the report description and register extra sections. Only the
//! first descriptor found walking from the root towards the deepest cause is
//! used.

use core::fmt;

use crate::{
    failure::{Failure, MAX_CAUSE_DEPTH},
    section::{SectionProvider, SharedSectionProvider, section_provider},
    trace::Visited,
};

/// Priority at which descriptor sections are registered.
pub const DESCRIPTOR_SECTION_PRIORITY: i32 = 100;

/// Report contributions carried by a [`Failure`].
#[derive(Clone, Default)]
pub struct FailureDescriptor {
    description: Option<String>,
    sections: Vec<(String, SharedSectionProvider)>,
}

impl FailureDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the description that replaces the failure message in the report
    /// header.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a section that is registered when the report is built.
    #[must_use]
    pub fn with_section(self, id: impl Into<String>, provider: impl SectionProvider) -> Self {
        self.with_shared_section(id, section_provider(provider))
    }

    /// Adds an already shared section provider.
    #[must_use]
    pub fn with_shared_section(
        mut self,
        id: impl Into<String>,
        provider: SharedSectionProvider,
    ) -> Self {
        self.sections.push((id.into(), provider));
        self
    }

    /// The description override, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The sections to register, in insertion order.
    pub fn sections(&self) -> &[(String, SharedSectionProvider)] {
        &self.sections
    }
}

impl fmt::Debug for FailureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureDescriptor")
            .field("description", &self.description)
            .field(
                "sections",
                &self.sections.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Finds the first descriptor on the cause chain of `failure`.
///
/// Walks iteratively and stops at a repeated failure, so cyclic chains
/// terminate.
pub fn find_descriptor(failure: &Failure) -> Option<&FailureDescriptor> {
    let mut visited = Visited::default();
    let mut current = failure;
    for _ in 0..MAX_CAUSE_DEPTH {
        if !visited.insert(current) {
            return None;
        }
        if let Some(descriptor) = current.descriptor() {
            return Some(descriptor);
        }
        current = current.cause()?;
    }
    tracing::warn!(
        depth = MAX_CAUSE_DEPTH,
        "Cause chain too deep while looking for a failure descriptor"
    );
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_first_descriptor_wins() {
        let deep = Failure::new("deep")
            .with_descriptor(FailureDescriptor::new().with_description("deep description"))
            .into_shared();
        let middle = Failure::new("middle")
            .with_descriptor(FailureDescriptor::new().with_description("middle description"))
            .with_cause(deep)
            .into_shared();
        let root = Failure::new("root").with_cause(middle).into_shared();

        let descriptor = find_descriptor(&root).unwrap();
        assert_eq!(descriptor.description(), Some("middle description"));
    }

    #[test]
    fn test_cycle_without_descriptor_terminates() {
        let a = Failure::new("a").into_shared();
        let b = Failure::new("b").with_cause(Arc::clone(&a)).into_shared();
        a.set_cause(b).unwrap();

        assert!(find_descriptor(&a).is_none());
    }

    #[test]
    fn test_debug_lists_section_ids() {
        let descriptor = FailureDescriptor::new()
            .with_section(
                "Mod List",
                |_: &crate::snapshot::FailureSnapshot| -> Result<String, crate::BoxError> {
                    Ok(String::from("none"))
                },
            );
        assert!(format!("{descriptor:?}").contains("Mod List"));
    }
}
