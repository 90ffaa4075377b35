//! Commonly used items for convenient importing.
//!
//! ```rust
//! use crashcause::prelude::*;
//!
//! let registry = SectionRegistry::new();
//! registry.register_fn("Build", 0, |_: &FailureSnapshot| -> Result<String, BoxError> {
//!     Ok(String::from("release"))
//! });
//! assert_eq!(registry.len(), 1);
//! ```

pub use crate::{
    BoxError, CrashConfig, CrashContext, CrashHandler, CrashReport, ExitStatus, Failure,
    FailureDescriptor, FailureSnapshot, Frame, HandlerState, SectionRegistry,
    handler::{ConsoleDisplay, ReportDisplay, Terminate},
    section::SectionProvider,
};
