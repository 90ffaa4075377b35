//! Building, rendering and saving a crash report.

use core::fmt;
use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    thread::Thread,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

use crate::{
    context::CrashContext,
    descriptor::{DESCRIPTOR_SECTION_PRIORITY, find_descriptor},
    environment::Environment,
    error::PersistError,
    failure::Failure,
    section::{BuiltinSection, SECTION_SKIPPED, isolate},
    snapshot::FailureSnapshot,
    trace::render_trace,
};

/// Separates the trace from the sections.
pub const WALKTHROUGH_HEADER: &str = "A detailed walk-through of the error, its code path and all known details is as follows:\n\
     ----------------------------------------------------------------------------------------\n";

/// Timestamp layout of the `Time:` line.
pub const TIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y (UTC%:z)";

// The last entry is the fallback and is never picked at random.
const WITTY_COMMENTS: &[&str] = &[
    "Who set us up the TNT?",
    "Everything's going to plan. No, really, that was supposed to happen.",
    "Uh... Did I do that?",
    "Oops.",
    "Why did you do that?",
    "I feel sad now :(",
    "My bad.",
    "I'm sorry, Dave.",
    "I let you down. Sorry :(",
    "On the bright side, I bought you a teddy bear!",
    "Daisy, daisy...",
    "Oh - I know what I did wrong!",
    "Hey, that tickles! Hehehe!",
    "I blame the borrow checker.",
    "You should try our sister library, it never crashes. Probably.",
    "Don't be sad. I'll do better next time, I promise!",
    "Don't be sad, have a hug! <3",
    "I just don't know what went wrong :(",
    "Shall we play a game?",
    "Quite honestly, I wouldn't worry myself about that.",
    "I bet Cylons wouldn't have this problem.",
    "Sorry :(",
    "Surprise! Haha. Well, this is awkward.",
    "Would you like a cupcake?",
    "Hi. I'm the crash report, and I'm a crashaholic.",
    "Ooh. Shiny.",
    "This doesn't make any sense!",
    "Why is it breaking :(",
    "Don't do that.",
    "Ouch. That hurt :(",
    "You're mean.",
    "This is a token for 1 free hug. Redeem at your nearest maintainer: [~~HUG~~]",
    "There are four lights!",
    "But it works on my machine.",
    "Witty comment unavailable :(",
];

/// Picks a comment from the pool, seeded from the clock.
pub fn witty_comment() -> &'static str {
    let Some((fallback, pool)) = WITTY_COMMENTS.split_last() else {
        return "";
    };
    if pool.is_empty() {
        return fallback;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    let mut rng = StdRng::seed_from_u64(seed);
    pool.get(rng.random_range(0..pool.len()))
        .copied()
        .unwrap_or(fallback)
}

/// A crash report: a snapshot plus the context it renders against.
///
/// # Examples
///
/// ```
/// use crashcause::{
///     config::CrashConfig, context::CrashContext, failure::Failure, report::CrashReport,
/// };
///
/// let context = CrashContext::new(CrashConfig::new("MyApp", "1.0"));
/// let failure = Failure::new("disk full").into_shared();
/// let report = CrashReport::build(&context, failure, std::thread::current(), false);
///
/// let text = report.render();
/// assert!(text.starts_with("---- MyApp Crash Report ----\n// "));
/// assert!(text.contains("Description: disk full\n"));
/// assert!(report.file_name().starts_with("crash-server-"));
/// ```
pub struct CrashReport<'a> {
    context: &'a CrashContext,
    snapshot: FailureSnapshot,
}

impl<'a> CrashReport<'a> {
    /// Captures a snapshot of `failure`.
    ///
    /// If a [`FailureDescriptor`](crate::descriptor::FailureDescriptor) is found
    /// on the cause chain, its description overrides the failure message and
    /// its sections are registered in the context's registry before anything
    /// is rendered.
    pub fn build(
        context: &'a CrashContext,
        failure: Arc<Failure>,
        thread: Thread,
        graphical: bool,
    ) -> Self {
        let environment = Environment::detect(context.config(), graphical);
        let mut snapshot = FailureSnapshot::capture(Arc::clone(&failure), thread, environment);

        if let Some(descriptor) = find_descriptor(&failure) {
            if let Some(description) = descriptor.description() {
                snapshot.override_description(description);
            }
            for (id, provider) in descriptor.sections() {
                context
                    .registry()
                    .register(id.as_str(), DESCRIPTOR_SECTION_PRIORITY, provider.clone());
            }
        }

        Self { context, snapshot }
    }

    /// The captured snapshot.
    pub fn snapshot(&self) -> &FailureSnapshot {
        &self.snapshot
    }

    /// Renders the full report text.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// `crash-<platform>-<DD.MM.YYYY>-<epoch millis>.txt`.
    pub fn file_name(&self) -> String {
        let generated_at = self.snapshot.generated_at();
        format!(
            "crash-{}-{}-{}.txt",
            self.snapshot.environment().platform().as_lowercase(),
            generated_at.format("%d.%m.%Y"),
            generated_at.timestamp_millis()
        )
    }

    /// Writes `text` to `<working_dir>/crash-reports/<file name>`.
    pub fn persist(&self, text: &str) -> Result<PathBuf, PersistError> {
        let dir = self.context.config().report_dir();
        fs::create_dir_all(&dir).map_err(|source| PersistError {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(self.file_name());
        fs::write(&path, text).map_err(|source| PersistError {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Saved crash report");
        Ok(path)
    }
}

impl fmt::Display for CrashReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = &self.snapshot;
        writeln!(
            f,
            "---- {} Crash Report ----",
            snapshot.environment().product_name()
        )?;
        writeln!(f, "// {}", witty_comment())?;
        writeln!(f)?;
        writeln!(f, "Time: {}", snapshot.generated_at().format(TIME_FORMAT))?;
        writeln!(f, "Description: {}", snapshot.description())?;
        writeln!(f)?;
        f.write_str(&render_trace(snapshot.failure()))?;
        writeln!(f)?;
        f.write_str(WALKTHROUGH_HEADER)?;
        writeln!(f)?;

        for section in BuiltinSection::ALL {
            writeln!(f, "-- {} --", section.name())?;
            match isolate(|| section.provide(self.context, snapshot)) {
                Ok(text) => f.write_str(&text)?,
                Err(error) => {
                    warn!(section = section.name(), %error, "Built-in section failed");
                    f.write_str(SECTION_SKIPPED)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
