use core::fmt::Write as _;

use crate::{
    BoxError,
    context::CrashContext,
    failure::Frame,
    snapshot::FailureSnapshot,
    threads::ThreadStacks as _,
};

/// The sections every report carries, in the order they are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinSection {
    /// Frames above the first first-party frame.
    Head,
    /// The first first-party frame and everything below it.
    Initialization,
    /// Name and id of the failing thread.
    ThreadDetails,
    /// Stacks of the live threads.
    ThreadStacks,
    /// How many contributed sections are registered, and their ids.
    Providers,
    /// The contributed sections themselves.
    ProvidersInformation,
    /// Product, host and runtime facts.
    SystemDetails,
}

/// Written in place of a built-in section that failed.
pub const SECTION_SKIPPED: &str =
    "\tError occurred while obtaining section information.\n\tSection skipped.\n";

impl BuiltinSection {
    /// All sections in print order.
    pub const ALL: [Self; 7] = [
        Self::Head,
        Self::Initialization,
        Self::ThreadDetails,
        Self::ThreadStacks,
        Self::Providers,
        Self::ProvidersInformation,
        Self::SystemDetails,
    ];

    /// The section title.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Head => "Head",
            Self::Initialization => "Initialization",
            Self::ThreadDetails => "Thread Details",
            Self::ThreadStacks => "Thread Stacks",
            Self::Providers => "Providers",
            Self::ProvidersInformation => "Providers Information",
            Self::SystemDetails => "System details",
        }
    }

    /// Produces the section body.
    pub fn provide(
        self,
        context: &CrashContext,
        snapshot: &FailureSnapshot,
    ) -> Result<String, BoxError> {
        let mut out = String::new();
        match self {
            Self::Head => {
                let (head, _) = split_first_party(context, snapshot);
                out.push_str("Stacktrace:\n");
                write_frames(&mut out, head)?;
            }
            Self::Initialization => {
                let (_, initialization) = split_first_party(context, snapshot);
                out.push_str("Stacktrace:\n");
                write_frames(&mut out, initialization)?;
            }
            Self::ThreadDetails => {
                writeln!(out, "\tName: {}", snapshot.thread_name())?;
                writeln!(out, "\tId: {:?}", snapshot.thread().id())?;
            }
            Self::ThreadStacks => {
                let stacks = context
                    .thread_stacks()
                    .collect(snapshot.thread(), snapshot.failure())?;
                for stack in stacks {
                    writeln!(out, "\tThread: {}", stack.name)?;
                    out.push_str("\tStacktrace:\n");
                    for frame in &stack.frames {
                        writeln!(out, "\t\t{frame}")?;
                    }
                    out.push_str("\t\n");
                }
            }
            Self::Providers => {
                let sections = context.registry().sections_ordered();
                writeln!(out, "Providers amount: {}", sections.len())?;
                out.push_str("Providers list: ");
                for section in &sections {
                    write!(out, "{}, ", section.id())?;
                }
                out.push('\n');
            }
            Self::ProvidersInformation => {
                out = context.registry().render_all(snapshot);
            }
            Self::SystemDetails => {
                let environment = snapshot.environment();
                out.push_str("Details:\n");
                writeln!(
                    out,
                    "\t{} version: {}",
                    environment.product_name(),
                    environment.version()
                )?;
                writeln!(out, "\tOperating system: {}", environment.os().details())?;
                writeln!(out, "\tRuntime version: {}", environment.runtime())?;
                writeln!(out, "\tSoftware status: {}", environment.status())?;
                writeln!(out, "\tType: {}", environment.platform())?;
                writeln!(out, "\tCurrent language: {}", environment.locale())?;
                for (key, value) in environment.facts() {
                    writeln!(out, "\t{key}: {value}")?;
                }
            }
        }
        Ok(out)
    }
}

// Without a marker, or when no frame matches, everything is `Head`.
fn split_first_party<'a>(
    context: &CrashContext,
    snapshot: &'a FailureSnapshot,
) -> (&'a [Frame], &'a [Frame]) {
    let frames = snapshot.failure().frames();
    let split = context
        .config()
        .first_party_marker
        .as_deref()
        .and_then(|marker| {
            frames
                .iter()
                .position(|frame| frame.to_string().contains(marker))
        })
        .unwrap_or(frames.len());
    frames.split_at(split)
}

fn write_frames(out: &mut String, frames: &[Frame]) -> core::fmt::Result {
    for frame in frames {
        writeln!(out, "\t{frame}")?;
    }
    out.push('\n');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CrashConfig, environment::Environment, failure::Failure,
        registry::PROVIDER_SKIPPED,
    };

    fn context(marker: Option<&str>) -> CrashContext {
        CrashContext::new(CrashConfig {
            first_party_marker: marker.map(str::to_owned),
            ..CrashConfig::new("Biblio", "0.1")
        })
    }

    fn snapshot(context: &CrashContext) -> FailureSnapshot {
        let failure = Failure::new("boom")
            .with_frames([
                Frame::new("std::fs::write"),
                Frame::new("biblio::save").with_file("save.rs").with_line(9),
                Frame::new("biblio::main").with_file("main.rs").with_line(2),
            ])
            .into_shared();
        FailureSnapshot::capture(
            failure,
            std::thread::current(),
            Environment::detect(context.config(), false),
        )
    }

    #[test]
    fn test_head_and_initialization_split() {
        let context = context(Some("biblio::"));
        let snapshot = snapshot(&context);

        assert_eq!(
            BuiltinSection::Head.provide(&context, &snapshot).unwrap(),
            "Stacktrace:\n\tstd::fs::write(Unknown Source)\n\n"
        );
        assert_eq!(
            BuiltinSection::Initialization
                .provide(&context, &snapshot)
                .unwrap(),
            "Stacktrace:\n\tbiblio::save(save.rs:9)\n\tbiblio::main(main.rs:2)\n\n"
        );
    }

    #[test]
    fn test_head_without_marker_takes_everything() {
        let context = context(None);
        let snapshot = snapshot(&context);
        let initialization = BuiltinSection::Initialization
            .provide(&context, &snapshot)
            .unwrap();
        assert_eq!(initialization, "Stacktrace:\n\n");
    }

    #[test]
    fn test_providers_list() {
        let context = context(None);
        let snapshot = snapshot(&context);
        context
            .registry()
            .register_fn("Mods", 1, |_: &FailureSnapshot| -> Result<String, BoxError> {
                Ok("none".into())
            });
        context
            .registry()
            .register_fn("Broken", 0, |_: &FailureSnapshot| -> Result<String, BoxError> {
                Err("unavailable".into())
            });

        assert_eq!(
            BuiltinSection::Providers
                .provide(&context, &snapshot)
                .unwrap(),
            "Providers amount: 2\nProviders list: Mods, Broken, \n"
        );
        assert_eq!(
            BuiltinSection::ProvidersInformation
                .provide(&context, &snapshot)
                .unwrap(),
            format!("\t-- Mods --\n\t\tnone\n\n\t-- Broken --\n{PROVIDER_SKIPPED}")
        );
    }

    #[test]
    fn test_system_details_lists_facts_last() {
        let context = CrashContext::new(
            CrashConfig::new("Biblio", "0.1").with_fact("Library size", "12 books"),
        );
        let snapshot = snapshot(&context);
        let details = BuiltinSection::SystemDetails
            .provide(&context, &snapshot)
            .unwrap();

        assert!(details.starts_with("Details:\n\tBiblio version: 0.1\n"));
        assert!(details.contains("\tType: Server\n\tCurrent language: en_US\n"));
        assert!(details.ends_with("\tLibrary size: 12 books\n"));
    }

    #[test]
    fn test_thread_details() {
        let context = context(None);
        let snapshot = snapshot(&context);
        let details = BuiltinSection::ThreadDetails
            .provide(&context, &snapshot)
            .unwrap();
        assert!(details.starts_with(&format!("\tName: {}\n\tId: ", snapshot.thread_name())));
    }
}
