//! Configuration of the crash machinery.

use std::{path::PathBuf, sync::OnceLock, time::Duration};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::{
    environment::{Os, SoftwareStatus, StatusProbe},
    log_file::LogRetention,
};

/// Settings shared by the report builder, the log manager and the handler.
///
/// All fields are public; start from [`CrashConfig::new`] or
/// [`CrashConfig::from_env`] and override what you need.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use crashcause::{config::CrashConfig, log_file::LogRetention};
///
/// let config = CrashConfig {
///     grace_period: Duration::from_secs(2),
///     log_retention: LogRetention::KeepLatest(5),
///     first_party_marker: Some("my_app::".into()),
///     ..CrashConfig::new("MyApp", "1.2.0")
/// };
/// assert_eq!(config.log_dir(), config.working_dir.join("logs"));
/// ```
#[derive(Clone, Debug)]
pub struct CrashConfig {
    /// Product name, shown in the report banner and log header.
    pub product_name: String,
    /// Product version.
    pub version: String,
    /// Root directory for `logs/` and `crash-reports/`.
    pub working_dir: PathBuf,
    /// Substring identifying first-party frames, usually a crate path prefix
    /// such as `my_app::`. Splits the `Head` and `Initialization` sections.
    pub first_party_marker: Option<String>,
    /// Probes deciding the reported [`SoftwareStatus`].
    pub status_probes: Vec<StatusProbe>,
    /// Preferred locale for client platforms.
    pub locale: Option<String>,
    /// Extra `System details` entries, printed after the built-in ones.
    pub facts: IndexMap<String, String, FxBuildHasher>,
    /// How long the emergency path waits before forcing the process down.
    pub grace_period: Duration,
    /// How many rotated log archives to keep.
    pub log_retention: LogRetention,
}

impl CrashConfig {
    /// Default emergency grace period.
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

    /// Environment variable overriding the working directory.
    pub const HOME_VAR: &str = "CRASHCAUSE_HOME";
    /// Environment variable enabling the development status.
    pub const DEBUG_VAR: &str = "CRASHCAUSE_DEBUG";
    /// Environment variable overriding the locale.
    pub const LOCALE_VAR: &str = "CRASHCAUSE_LOCALE";

    /// A configuration with the OS default working directory and no probes.
    pub fn new(product_name: impl Into<String>, version: impl Into<String>) -> Self {
        let product_name = product_name.into();
        Self {
            working_dir: Os::current().working_dir(&product_name),
            product_name,
            version: version.into(),
            first_party_marker: None,
            status_probes: Vec::new(),
            locale: None,
            facts: IndexMap::default(),
            grace_period: Self::DEFAULT_GRACE_PERIOD,
            log_retention: LogRetention::default(),
        }
    }

    /// Like [`new`](Self::new), honouring the `CRASHCAUSE_*` environment
    /// variables.
    ///
    /// - `CRASHCAUSE_HOME` replaces the working directory.
    /// - `CRASHCAUSE_DEBUG`, when set to anything but `false`, reports the
    ///   development status.
    /// - `CRASHCAUSE_LOCALE` sets the client locale.
    ///
    /// The variables are read once per process.
    pub fn from_env(product_name: impl Into<String>, version: impl Into<String>) -> Self {
        let options = EnvOptions::get();
        let mut config = Self::new(product_name, version);
        if let Some(home) = &options.home {
            config.working_dir.clone_from(home);
        }
        config.locale.clone_from(&options.locale);
        config.status_probes.push(StatusProbe::env_flag(
            SoftwareStatus::Development,
            Self::DEBUG_VAR,
        ));
        config
    }

    /// Adds an extra `System details` entry.
    #[must_use]
    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }

    /// Adds a status probe.
    #[must_use]
    pub fn with_probe(mut self, probe: StatusProbe) -> Self {
        self.status_probes.push(probe);
        self
    }

    /// `<working_dir>/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.working_dir.join("logs")
    }

    /// `<working_dir>/crash-reports`.
    pub fn report_dir(&self) -> PathBuf {
        self.working_dir.join("crash-reports")
    }
}

#[derive(Debug)]
struct EnvOptions {
    home: Option<PathBuf>,
    locale: Option<String>,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static CRASHCAUSE_ENV: OnceLock<EnvOptions> = OnceLock::new();

        CRASHCAUSE_ENV.get_or_init(|| EnvOptions {
            home: std::env::var_os(CrashConfig::HOME_VAR)
                .filter(|var| !var.is_empty())
                .map(PathBuf::from),
            locale: std::env::var(CrashConfig::LOCALE_VAR)
                .ok()
                .filter(|var| !var.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrashConfig::new("Demo", "0.1");
        assert_eq!(config.grace_period, Duration::from_secs(10));
        assert_eq!(config.log_retention, LogRetention::Unlimited);
        assert!(config.status_probes.is_empty());
        assert_eq!(config.log_dir(), config.working_dir.join("logs"));
        assert_eq!(
            config.report_dir(),
            config.working_dir.join("crash-reports")
        );
    }

    #[test]
    fn test_facts_keep_insertion_order() {
        let config = CrashConfig::new("Demo", "0.1")
            .with_fact("Zeta", "1")
            .with_fact("Alpha", "2");
        let keys: Vec<_> = config.facts.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Zeta", "Alpha"]);
    }

    #[test]
    fn test_from_env_adds_debug_probe() {
        let config = CrashConfig::from_env("Demo", "0.1");
        assert!(
            config
                .status_probes
                .iter()
                .any(|probe| probe.status() == SoftwareStatus::Development)
        );
    }
}
