//! The immutable record of one crash.

use std::{sync::Arc, thread::Thread};

use chrono::{DateTime, Local};

use crate::{environment::Environment, failure::Failure};

/// Everything known about a crash at the moment it was captured.
///
/// A snapshot is built once per crash and only read afterwards, except for a
/// single description override applied while the report is being built.
#[derive(Clone, Debug)]
pub struct FailureSnapshot {
    generated_at: DateTime<Local>,
    description: String,
    description_overridden: bool,
    failure: Arc<Failure>,
    thread: Thread,
    environment: Environment,
}

impl FailureSnapshot {
    /// Captures a snapshot now. The description starts out as the failure
    /// message.
    pub fn capture(failure: Arc<Failure>, thread: Thread, environment: Environment) -> Self {
        Self::capture_at(Local::now(), failure, thread, environment)
    }

    /// Captures a snapshot with an explicit timestamp.
    pub fn capture_at(
        generated_at: DateTime<Local>,
        failure: Arc<Failure>,
        thread: Thread,
        environment: Environment,
    ) -> Self {
        Self {
            generated_at,
            description: failure.message().unwrap_or_default().to_owned(),
            description_overridden: false,
            failure,
            thread,
            environment,
        }
    }

    /// Replaces the description.
    ///
    /// Only the first override takes effect, and only while the description is
    /// empty or still equal to the failure message. Returns whether the
    /// description changed.
    pub fn override_description(&mut self, description: impl Into<String>) -> bool {
        let untouched = self.description.is_empty()
            || Some(self.description.as_str()) == self.failure.message();
        if self.description_overridden || !untouched {
            return false;
        }
        self.description = description.into();
        self.description_overridden = true;
        true
    }

    /// When the snapshot was taken.
    pub fn generated_at(&self) -> DateTime<Local> {
        self.generated_at
    }

    /// The short description shown in the report header.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The root failure.
    pub fn failure(&self) -> &Arc<Failure> {
        &self.failure
    }

    /// The thread the failure escaped from.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// Display name of the originating thread; unnamed threads are shown by
    /// id.
    pub fn thread_name(&self) -> String {
        thread_name(&self.thread)
    }

    /// The detected environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

pub(crate) fn thread_name(thread: &Thread) -> String {
    match thread.name() {
        Some(name) => name.to_owned(),
        None => format!("{:?}", thread.id()),
    }
}
