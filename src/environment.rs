//! Facts about the host and the running software, captured for the
//! `System details` section.

use core::fmt;
use std::{ffi::OsStr, path::PathBuf, sync::Arc};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::config::CrashConfig;

/// Version of the compiler the crate was built with.
pub const RUSTC_VERSION: &str = include_str!(concat!(env!("OUT_DIR"), "/rustc_version"));

/// Language reported by server platforms regardless of the host locale.
pub const SERVER_LOCALE: &str = "en_US";

/// The host operating system family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Os {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
    /// Linux, Android included.
    Linux,
    /// Any other Unix.
    Unix,
    /// Anything not recognised.
    Unknown,
}

impl Os {
    /// The operating system this process runs on.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            "linux" | "android" => Self::Linux,
            _ if std::env::consts::FAMILY == "unix" => Self::Unix,
            _ => Self::Unknown,
        }
    }

    /// The default per-user working directory for `product` on this OS.
    ///
    /// | OS | Directory |
    /// |---|---|
    /// | Windows | `%APPDATA%\.product` |
    /// | macOS | `~/Library/Application Support/product` |
    /// | Linux, Unix | `~/.product` |
    /// | Unknown | `~/product` |
    pub fn working_dir(self, product: &str) -> PathBuf {
        let product = product.to_lowercase();
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        match self {
            Self::Windows => dirs::data_dir()
                .unwrap_or(home)
                .join(format!(".{product}")),
            Self::MacOs => home
                .join("Library")
                .join("Application Support")
                .join(product),
            Self::Linux | Self::Unix => home.join(format!(".{product}")),
            Self::Unknown => home.join(product),
        }
    }

    /// A one-line description: name, architecture and OS family.
    pub fn details(self) -> String {
        format!(
            "{self} ({} architecture) family {}",
            std::env::consts::ARCH,
            std::env::consts::FAMILY
        )
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Windows => "Windows",
            Self::MacOs => "Mac OS",
            Self::Linux => "Linux",
            Self::Unix => "Unix",
            Self::Unknown => "Unknown",
        })
    }
}

/// How trustworthy the running build is, from most to least suspicious.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SoftwareStatus {
    /// A first-party integration layer is loaded.
    FirstPartyIntegration,
    /// A third-party integration layer is loaded.
    ThirdPartyIntegration,
    /// The distribution's own integrity marker is missing.
    Repackaged,
    /// Running with debug features enabled.
    Development,
    /// None of the above.
    Vanilla,
}

impl SoftwareStatus {
    /// The order in which probes are consulted. The first match wins.
    pub const PROBE_ORDER: [Self; 4] = [
        Self::FirstPartyIntegration,
        Self::ThirdPartyIntegration,
        Self::Repackaged,
        Self::Development,
    ];

    /// A human-readable description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::FirstPartyIntegration => "Definitely; first-party integration loaded",
            Self::ThirdPartyIntegration => "Very likely; third-party integration loaded",
            Self::Repackaged => "Probably not; integrity marker missing",
            Self::Development => "Development version",
            Self::Vanilla => "Client brand unchanged; unmodified",
        }
    }
}

impl fmt::Display for SoftwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One check contributing to the [`SoftwareStatus`].
#[derive(Clone)]
pub struct StatusProbe {
    status: SoftwareStatus,
    check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl StatusProbe {
    /// A probe that reports `status` when `check` returns `true`.
    pub fn new(status: SoftwareStatus, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            status,
            check: Arc::new(check),
        }
    }

    /// A probe with a fixed answer, for integrations known at startup.
    pub fn fixed(status: SoftwareStatus, present: bool) -> Self {
        Self::new(status, move || present)
    }

    /// Matches when `var` is set to anything but `false`, in any case.
    pub fn env_flag(status: SoftwareStatus, var: &'static str) -> Self {
        Self::new(status, move || {
            std::env::var_os(var).is_some_and(|value| flag_enabled(&value))
        })
    }

    /// Matches when `path` does not exist.
    pub fn missing_file(status: SoftwareStatus, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(status, move || !path.exists())
    }

    /// The status this probe reports.
    pub fn status(&self) -> SoftwareStatus {
        self.status
    }

    /// Runs the check.
    pub fn matches(&self) -> bool {
        (self.check)()
    }
}

impl fmt::Debug for StatusProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusProbe")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Evaluates `probes` in [`SoftwareStatus::PROBE_ORDER`].
///
/// Probes registered for [`SoftwareStatus::Vanilla`] are ignored.
pub fn detect_status(probes: &[StatusProbe]) -> SoftwareStatus {
    SoftwareStatus::PROBE_ORDER
        .into_iter()
        .find(|status| {
            probes
                .iter()
                .filter(|probe| probe.status == *status)
                .any(StatusProbe::matches)
        })
        .unwrap_or(SoftwareStatus::Vanilla)
}

/// Whether the process has an interactive, graphical front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformType {
    /// Graphical front end present.
    Client,
    /// Headless.
    Server,
}

impl PlatformType {
    /// Derives the platform from whether a graphical display is available.
    pub const fn from_graphical(graphical: bool) -> Self {
        if graphical { Self::Client } else { Self::Server }
    }

    /// Lowercase name, as used in report file names.
    pub const fn as_lowercase(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "Client",
            Self::Server => "Server",
        })
    }
}

/// Turns a POSIX locale string such as `de_DE.UTF-8@euro` into `de_DE`.
///
/// Returns `None` for the neutral `C` and `POSIX` locales.
pub fn normalize_locale(raw: &str) -> Option<String> {
    let name = raw.split(['.', '@']).next().unwrap_or_default().trim();
    match name {
        "" | "C" | "POSIX" => None,
        name => Some(name.replace('-', "_")),
    }
}

fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| normalize_locale(&value))
}

/// The language reported in the report.
///
/// Servers always report [`SERVER_LOCALE`]. Clients use the configured
/// locale, then the host locale, then [`SERVER_LOCALE`].
pub fn resolve_locale(platform: PlatformType, configured: Option<&str>) -> String {
    match platform {
        PlatformType::Server => SERVER_LOCALE.to_owned(),
        PlatformType::Client => configured
            .and_then(normalize_locale)
            .or_else(locale_from_env)
            .unwrap_or_else(|| SERVER_LOCALE.to_owned()),
    }
}

/// Everything the `System details` section prints.
#[derive(Clone, Debug)]
pub struct Environment {
    product_name: String,
    version: String,
    os: Os,
    runtime: String,
    status: SoftwareStatus,
    platform: PlatformType,
    locale: String,
    facts: IndexMap<String, String, FxBuildHasher>,
}

impl Environment {
    /// Detects the environment for a crash in a process configured with
    /// `config`.
    pub fn detect(config: &CrashConfig, graphical: bool) -> Self {
        let platform = PlatformType::from_graphical(graphical);
        Self {
            product_name: config.product_name.clone(),
            version: config.version.clone(),
            os: Os::current(),
            runtime: format!(
                "{}, {}-{}",
                RUSTC_VERSION.trim(),
                std::env::consts::ARCH,
                std::env::consts::OS
            ),
            status: detect_status(&config.status_probes),
            platform,
            locale: resolve_locale(platform, config.locale.as_deref()),
            facts: config.facts.clone(),
        }
    }

    /// The product name.
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// The product version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The host operating system.
    pub fn os(&self) -> Os {
        self.os
    }

    /// Compiler version and target.
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// The detected software status.
    pub fn status(&self) -> SoftwareStatus {
        self.status
    }

    /// Client or server.
    pub fn platform(&self) -> PlatformType {
        self.platform
    }

    /// The reported language.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Additional facts, in insertion order.
    pub fn facts(&self) -> &IndexMap<String, String, FxBuildHasher> {
        &self.facts
    }
}

fn flag_enabled(value: &OsStr) -> bool {
    !value.eq_ignore_ascii_case("false")
}
