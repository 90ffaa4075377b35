use std::{
    fs::{self, File},
    io::{Cursor, Read as _},
    path::{Path, PathBuf},
};

use crashcause::{
    CrashConfig,
    log_file::{LATEST_LOG, LogFiles, LogRetention, OPENED_ON_PREFIX, recover_date},
};
use zip::ZipArchive;

const HEADER: &str = "# Biblio 0.1 - LogFile";

fn archives(log_dir: &Path) -> Vec<PathBuf> {
    let mut archives: Vec<PathBuf> = fs::read_dir(log_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "zip"))
        .collect();
    archives.sort();
    archives
}

fn read_entry(archive: &Path, name: &str) -> String {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut contents = String::new();
    zip.by_name(name)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

#[test]
fn test_previous_log_is_archived_on_open() {
    let dir = tempfile::tempdir().unwrap();

    let first = LogFiles::new(dir.path(), HEADER);
    let writer = first.open().unwrap();
    for index in 0..100 {
        writer.write_line(&format!("line {index}")).unwrap();
    }
    let previous = fs::read_to_string(first.latest_path()).unwrap();
    drop(first);

    let second = LogFiles::new(dir.path(), HEADER);
    second.open().unwrap();

    let archives = archives(&second.log_dir());
    assert_eq!(archives.len(), 1);

    let date = recover_date(Cursor::new(&previous)).unwrap().unwrap();
    let archive_name = archives[0].file_name().unwrap().to_str().unwrap();
    assert!(archive_name.starts_with(&format!("log_{date}_")));
    assert_eq!(read_entry(&archives[0], &format!("log_{date}.log")), previous);

    let lines: Vec<String> = previous.lines().map(str::to_owned).collect();
    assert_eq!(lines.len(), 102);
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[101], "line 99");

    let fresh = fs::read_to_string(second.latest_path()).unwrap();
    let fresh: Vec<&str> = fresh.lines().collect();
    assert_eq!(fresh.len(), 2);
    assert_eq!(fresh[0], HEADER);
    assert!(fresh[1].starts_with(OPENED_ON_PREFIX));
}

#[test]
fn test_log_without_header_is_archived_as_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    fs::write(log_dir.join(LATEST_LOG), "written by something else\n").unwrap();

    LogFiles::new(dir.path(), HEADER).open().unwrap();

    let archives = archives(&log_dir);
    assert_eq!(archives.len(), 1);
    assert!(
        archives[0]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("log_unknown_")
    );
    assert_eq!(
        read_entry(&archives[0], "log_unknown.log"),
        "written by something else\n"
    );
}

#[test]
fn test_archives_accumulate_without_retention() {
    let dir = tempfile::tempdir().unwrap();
    for _ in 0..4 {
        LogFiles::new(dir.path(), HEADER).open().unwrap();
    }
    assert_eq!(archives(&dir.path().join("logs")).len(), 3);
}

#[test]
fn test_retention_caps_archives() {
    let dir = tempfile::tempdir().unwrap();
    let config = CrashConfig {
        working_dir: dir.path().to_path_buf(),
        log_retention: LogRetention::KeepLatest(2),
        ..CrashConfig::new("Biblio", "0.1")
    };
    for _ in 0..5 {
        LogFiles::from_config(&config).open().unwrap();
    }
    assert_eq!(archives(&config.log_dir()).len(), 2);
    assert!(config.log_dir().join(LATEST_LOG).exists());
}

#[test]
fn test_unwritable_working_dir_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();

    let error = LogFiles::new(&blocker, HEADER).open().unwrap_err();
    let message = error.to_string();
    assert!(message.starts_with("Unable to create working directory."));
    assert!(message.contains("read/write permissions"));
}
