//! Destinations for rendered trace lines.

use std::io::{self, Write as _};

/// Receives trace output one line at a time.
///
/// Lines are passed without a trailing newline; the sink decides how to
/// terminate them.
pub trait TraceSink {
    /// Appends one line of output.
    fn write_line(&mut self, line: &str);
}

impl TraceSink for String {
    fn write_line(&mut self, line: &str) {
        self.push_str(line);
        self.push('\n');
    }
}

impl TraceSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// The sink used when a report cannot be produced normally.
///
/// Lines go to the active `tracing` subscriber if there is one, and to
/// standard error otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Emits every line as an `ERROR` event on the `crashcause::emergency`
    /// target.
    Tracing,
    /// Writes every line straight to standard error.
    Stderr,
}

impl LogSink {
    /// Picks [`LogSink::Tracing`] when a subscriber is active on the current
    /// thread, either installed globally or scoped with `with_default`.
    pub fn detect() -> Self {
        let active = tracing::dispatcher::get_default(|dispatch| {
            !dispatch.is::<tracing::subscriber::NoSubscriber>()
        });
        if active { Self::Tracing } else { Self::Stderr }
    }
}

impl TraceSink for LogSink {
    fn write_line(&mut self, line: &str) {
        match self {
            Self::Tracing => tracing::error!(target: "crashcause::emergency", "{line}"),
            Self::Stderr => {
                // Nothing sensible is left to do if stderr itself is gone.
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_subscriber_falls_back_to_stderr() {
        tracing::dispatcher::with_default(&tracing::Dispatch::none(), || {
            assert_eq!(LogSink::detect(), LogSink::Stderr);
        });
    }
}
