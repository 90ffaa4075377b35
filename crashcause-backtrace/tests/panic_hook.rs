use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use crashcause::{
    BoxError, CrashConfig, CrashContext, CrashHandler, ExitStatus, FailureSnapshot, HandlerState,
    handler::{ReportDisplay, Terminate},
};
use crashcause_backtrace::{BacktraceFilter, install_panic_hook_with_filter};

#[derive(Clone, Default)]
struct RecordingDisplay {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl ReportDisplay for RecordingDisplay {
    fn show_report(&self, text: &str, snapshot: &FailureSnapshot) -> Result<(), BoxError> {
        self.reports
            .lock()
            .unwrap()
            .push((text.to_owned(), snapshot.thread_name()));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingTerminator {
    statuses: Arc<Mutex<Vec<ExitStatus>>>,
}

impl Terminate for RecordingTerminator {
    fn terminate(&self, status: ExitStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}

// The panic hook is process-global, so everything lives in one test.
#[test]
fn test_panics_become_crash_reports() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(CrashContext::new(CrashConfig {
        working_dir: dir.path().to_path_buf(),
        grace_period: Duration::from_millis(10),
        ..CrashConfig::new("HookTest", "0.0.1")
    }));
    let display = RecordingDisplay::default();
    let terminator = RecordingTerminator::default();
    let handler = Arc::new(
        CrashHandler::new(Arc::clone(&context), display.clone())
            .with_terminator(terminator.clone()),
    );
    install_panic_hook_with_filter(Arc::clone(&handler), BacktraceFilter::DEFAULT);

    let worker = thread::Builder::new()
        .name("worker".to_owned())
        .spawn(|| panic!("worker exploded"))
        .unwrap();
    assert!(worker.join().is_err());

    let reports = display.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let (text, thread_name) = &reports[0];
    assert_eq!(thread_name, "worker");
    assert!(text.starts_with("---- HookTest Crash Report ----\n"));
    assert!(text.contains("Description: worker exploded\n"));
    assert!(text.contains("\npanicked at "));
    assert!(text.contains(": worker exploded\n"));
    assert!(text.contains("-- Thread Details --\n\tName: worker\n"));

    assert_eq!(handler.state(), HandlerState::Idle);
    assert!(terminator.statuses.lock().unwrap().is_empty());
    assert_eq!(
        std::fs::read_dir(context.config().report_dir())
            .unwrap()
            .count(),
        1
    );
}
