//! Stacks of live threads, for the `Thread Stacks` section and the emergency
//! dump.

use std::thread::Thread;

use crate::{
    BoxError,
    failure::{Failure, Frame},
    snapshot::thread_name,
};

/// The stack of one thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadStack {
    /// Display name of the thread.
    pub name: String,
    /// Frames, most recent first.
    pub frames: Vec<Frame>,
}

/// Collects the stacks of the threads that are alive when a crash happens.
///
/// The standard library cannot walk other threads' stacks, so the default
/// implementation, [`FailingThreadStacks`], only reports the thread the failure
/// escaped from. Hosts with a richer runtime can plug in their own.
pub trait ThreadStacks: 'static + Send + Sync {
    /// Returns one entry per live thread.
    fn collect(&self, origin: &Thread, failure: &Failure) -> Result<Vec<ThreadStack>, BoxError>;
}

/// Reports the failing thread with the failure's own frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingThreadStacks;

impl ThreadStacks for FailingThreadStacks {
    fn collect(&self, origin: &Thread, failure: &Failure) -> Result<Vec<ThreadStack>, BoxError> {
        Ok(vec![ThreadStack {
            name: thread_name(origin),
            frames: failure.frames().to_vec(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_thread_is_reported() {
        let failure = Failure::new("boom").with_frames([Frame::new("app::run")]);
        let thread = std::thread::Builder::new()
            .name("worker-7".into())
            .spawn(std::thread::current)
            .unwrap()
            .join()
            .unwrap();

        let stacks = FailingThreadStacks.collect(&thread, &failure).unwrap();
        assert_eq!(
            stacks,
            [ThreadStack {
                name: "worker-7".into(),
                frames: vec![Frame::new("app::run")],
            }]
        );
    }
}
