//! The persistent log file and its rotation.
//!
//! All log output goes to `<working_dir>/logs/latest.log`. When the log is
//! opened and a previous `latest.log` exists, that file is compressed into
//! `log_<date>_<epoch-seconds>.zip` first, where `<date>` is recovered from the
//! file's own header. The new file starts with a two-line header:
//!
//! ```text
//! # MyApp 1.2.0 - LogFile
//! # Log opened on date 19.10.2026
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, LineWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use zip::{
    CompressionMethod,
    write::{FileOptions, ZipWriter},
};

use crate::{
    config::CrashConfig,
    error::{ConfigurationError, LogError},
};

/// Name of the active log file.
pub const LATEST_LOG: &str = "latest.log";
/// Header line prefix carrying the date the log was opened on.
pub const OPENED_ON_PREFIX: &str = "# Log opened on date ";
/// Date used in archive names when the header carries none.
pub const UNKNOWN_DATE: &str = "unknown";

/// How many rotated archives to keep in the log directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogRetention {
    /// Never delete archives.
    #[default]
    Unlimited,
    /// Keep at most this many archives, deleting the oldest first.
    KeepLatest(usize),
}

/// Owner of the log directory and the process-wide log writer.
///
/// [`open`](Self::open) rotates and opens the log exactly once; later calls
/// return the same writer. Nothing is written before the rotation has
/// completed.
pub struct LogFiles {
    working_dir: PathBuf,
    header: String,
    retention: LogRetention,
    writer: spin::Once<LogWriter>,
}

impl LogFiles {
    /// Creates a manager for `<working_dir>/logs`. Nothing touches the disk
    /// until [`open`](Self::open).
    pub fn new(working_dir: impl Into<PathBuf>, header: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            header: header.into(),
            retention: LogRetention::Unlimited,
            writer: spin::Once::new(),
        }
    }

    /// Creates a manager from a [`CrashConfig`].
    pub fn from_config(config: &CrashConfig) -> Self {
        Self {
            retention: config.log_retention,
            ..Self::new(
                config.working_dir.clone(),
                format!("# {} {} - LogFile", config.product_name, config.version),
            )
        }
    }

    /// `<working_dir>/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.working_dir.join("logs")
    }

    /// `<working_dir>/logs/latest.log`.
    pub fn latest_path(&self) -> PathBuf {
        self.log_dir().join(LATEST_LOG)
    }

    /// Prepares the directories, rotates the previous log and opens a fresh
    /// one. Only the first successful call does any work.
    pub fn open(&self) -> Result<&LogWriter, LogError> {
        self.writer.try_call_once(|| self.open_fresh(Local::now()))
    }

    /// The writer, if [`open`](Self::open) has succeeded.
    pub fn writer(&self) -> Option<&LogWriter> {
        self.writer.get()
    }

    fn open_fresh(&self, now: DateTime<Local>) -> Result<LogWriter, LogError> {
        create_dir(&self.working_dir, "working")?;
        let log_dir = self.log_dir();
        create_dir(&log_dir, "log")?;

        let latest = log_dir.join(LATEST_LOG);
        if latest.exists() {
            let archive = rotate(&log_dir, &latest, now)?;
            info!(archive = %archive.display(), "Archived previous log");
            prune_archives(&log_dir, self.retention)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&latest)?;
        let writer = LogWriter::new(file, latest);
        writer.write_line(&self.header)?;
        writer.write_line(&format!("{OPENED_ON_PREFIX}{}", now.format("%d.%m.%Y")))?;
        debug!(path = %writer.path().display(), "Opened log file");
        Ok(writer)
    }
}

impl core::fmt::Debug for LogFiles {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogFiles")
            .field("working_dir", &self.working_dir)
            .field("retention", &self.retention)
            .field("open", &self.writer.is_completed())
            .finish()
    }
}

fn create_dir(path: &Path, what: &'static str) -> Result<(), ConfigurationError> {
    fs::create_dir_all(path).map_err(|source| ConfigurationError {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the date a log was opened on from its header lines.
///
/// The last `# Log opened on date DD.MM.YYYY` line wins. Returns the date as
/// `YYYY-MM-DD`, or `None` when no well-formed line exists.
pub fn recover_date(reader: impl BufRead) -> io::Result<Option<String>> {
    let mut date = None;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        if let Some(rest) = line.trim_end().strip_prefix(OPENED_ON_PREFIX)
            && let Some(parsed) = parse_header_date(rest)
        {
            date = Some(parsed);
        }
    }
    Ok(date)
}

fn parse_header_date(text: &str) -> Option<String> {
    let mut parts = text.trim().split('.');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    let well_formed = parts.next().is_none()
        && [day, month, year]
            .iter()
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    well_formed.then(|| format!("{year}-{month}-{day}"))
}

/// Compresses `latest` into a new archive in `log_dir` and deletes it.
///
/// The archive name is `log_<date>_<epoch-seconds>.zip`; if that name is
/// taken, a numeric suffix is appended so no archive is ever overwritten.
pub fn rotate(log_dir: &Path, latest: &Path, now: DateTime<Local>) -> Result<PathBuf, LogError> {
    let date = recover_date(BufReader::new(File::open(latest)?))?
        .unwrap_or_else(|| UNKNOWN_DATE.to_owned());
    let (path, archive) = create_archive(log_dir, &date, now.timestamp())?;

    let mut zip = ZipWriter::new(archive);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(format!("log_{date}.log"), options)?;
    io::copy(&mut File::open(latest)?, &mut zip)?;
    zip.finish()?;

    fs::remove_file(latest)?;
    Ok(path)
}

fn create_archive(log_dir: &Path, date: &str, epoch: i64) -> io::Result<(PathBuf, File)> {
    const MAX_ATTEMPTS: u32 = 1000;

    for attempt in 0..MAX_ATTEMPTS {
        let name = match attempt {
            0 => format!("log_{date}_{epoch}.zip"),
            n => format!("log_{date}_{epoch}-{n}.zip"),
        };
        let path = log_dir.join(name);
        match File::create_new(&path) {
            Ok(file) => return Ok((path, file)),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(error),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free archive name for log_{date}_{epoch}.zip"),
    ))
}

fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("log_") && name.ends_with(".zip"))
}

/// Deletes the oldest archives beyond what `retention` allows.
pub fn prune_archives(log_dir: &Path, retention: LogRetention) -> io::Result<()> {
    let LogRetention::KeepLatest(keep) = retention else {
        return Ok(());
    };

    let mut archives = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if is_archive(&path) {
            let modified = fs::metadata(&path)?.modified()?;
            archives.push((modified, path));
        }
    }
    if archives.len() <= keep {
        return Ok(());
    }

    archives.sort();
    let excess = archives.len() - keep;
    for (_, path) in archives.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => debug!(archive = %path.display(), "Deleted old log archive"),
            Err(error) => warn!(archive = %path.display(), %error, "Could not delete old log archive"),
        }
    }
    Ok(())
}

/// A cloneable handle to the open log file.
///
/// Every write is flushed before the call returns, so the file is complete up
/// to the last line if the process dies right after.
#[derive(Clone)]
pub struct LogWriter {
    file: Arc<Mutex<LineWriter<File>>>,
    path: Arc<Path>,
}

impl LogWriter {
    fn new(file: File, path: PathBuf) -> Self {
        Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
            path: path.into(),
        }
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line and flushes.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.lock();
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    /// Locks the file for a sequence of writes. The guard flushes when
    /// dropped.
    ///
    /// A panic while another thread held the lock does not make the log
    /// unusable.
    pub fn lock(&self) -> LogWriterGuard<'_> {
        LogWriterGuard(self.file.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl core::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogWriter")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the log file; see [`LogWriter::lock`].
pub struct LogWriterGuard<'a>(MutexGuard<'a, LineWriter<File>>);

impl Write for LogWriterGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Drop for LogWriterGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_recover_date_last_header_wins() {
        let log = "# MyApp 1.0 - LogFile\n\
                   # Log opened on date 01.02.2024\n\
                   some line\n\
                   # Log opened on date 19.10.2026\n";
        assert_eq!(
            recover_date(Cursor::new(log)).unwrap().as_deref(),
            Some("2026-10-19")
        );
    }

    #[test]
    fn test_recover_date_ignores_malformed_headers() {
        let log = "# Log opened on date yesterday\n# Log opened on date 1.2\n";
        assert_eq!(recover_date(Cursor::new(log)).unwrap(), None);
        assert_eq!(recover_date(Cursor::new("")).unwrap(), None);
    }

    #[test]
    fn test_recover_date_tolerates_invalid_utf8() {
        let mut log = b"\xff\xfe garbage\n".to_vec();
        log.extend_from_slice(b"# Log opened on date 05.06.2025\r\n");
        assert_eq!(
            recover_date(Cursor::new(log)).unwrap().as_deref(),
            Some("2025-06-05")
        );
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogFiles::new(dir.path(), "# Test 0.1 - LogFile");
        let first = logs.open().unwrap().path().to_path_buf();
        let second = logs.open().unwrap().path().to_path_buf();
        assert_eq!(first, second);

        let archives = fs::read_dir(logs.log_dir())
            .unwrap()
            .filter(|entry| is_archive(&entry.as_ref().unwrap().path()))
            .count();
        assert_eq!(archives, 0);
    }

    #[test]
    fn test_archive_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_archive(dir.path(), "2026-10-19", 42).unwrap();
        let (second, _) = create_archive(dir.path(), "2026-10-19", 42).unwrap();
        assert!(first.ends_with("log_2026-10-19_42.zip"));
        assert!(second.ends_with("log_2026-10-19_42-1.zip"));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (index, name) in ["log_a_1.zip", "log_b_2.zip", "log_c_3.zip"]
            .iter()
            .enumerate()
        {
            let path = dir.path().join(name);
            fs::write(&path, b"zip").unwrap();
            let file = File::options().write(true).open(&path).unwrap();
            let modified = std::time::SystemTime::UNIX_EPOCH
                + std::time::Duration::from_secs(1_000 + index as u64);
            file.set_modified(modified).unwrap();
        }
        fs::write(dir.path().join(LATEST_LOG), b"current").unwrap();

        prune_archives(dir.path(), LogRetention::KeepLatest(1)).unwrap();

        let mut remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        remaining.sort();
        assert_eq!(remaining, ["latest.log", "log_c_3.zip"]);
    }
}
