//! The long-lived state the crash machinery works against.

use crate::{
    config::CrashConfig,
    log_file::LogFiles,
    registry::SectionRegistry,
    threads::{FailingThreadStacks, ThreadStacks},
};

/// Configuration, section registry, log files and thread-stack source,
/// created once at startup and shared with the handler.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use crashcause::{config::CrashConfig, context::CrashContext};
///
/// let dir = tempfile::tempdir()?;
/// let context = Arc::new(CrashContext::new(CrashConfig {
///     working_dir: dir.path().to_path_buf(),
///     ..CrashConfig::new("MyApp", "1.0")
/// }));
/// context.logs().open()?;
/// assert!(dir.path().join("logs/latest.log").exists());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CrashContext {
    config: CrashConfig,
    registry: SectionRegistry,
    logs: LogFiles,
    thread_stacks: Box<dyn ThreadStacks>,
}

impl CrashContext {
    /// Creates a context with an empty registry and the default thread-stack
    /// source.
    pub fn new(config: CrashConfig) -> Self {
        Self {
            logs: LogFiles::from_config(&config),
            registry: SectionRegistry::new(),
            thread_stacks: Box::new(FailingThreadStacks),
            config,
        }
    }

    /// Replaces the thread-stack source.
    #[must_use]
    pub fn with_thread_stacks(mut self, thread_stacks: impl ThreadStacks) -> Self {
        self.thread_stacks = Box::new(thread_stacks);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &CrashConfig {
        &self.config
    }

    /// The section registry.
    pub fn registry(&self) -> &SectionRegistry {
        &self.registry
    }

    /// The log files.
    pub fn logs(&self) -> &LogFiles {
        &self.logs
    }

    /// The thread-stack source.
    pub fn thread_stacks(&self) -> &dyn ThreadStacks {
        &*self.thread_stacks
    }
}

impl core::fmt::Debug for CrashContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CrashContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("logs", &self.logs)
            .finish_non_exhaustive()
    }
}
