//! Unit tests for the compile service.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kiln_protocol::{CacheError, ExitStatus, OutputFormat};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::cache::CacheRegistry;
use crate::frontend::{
    CompileContext, CompileReport, CompilerFrontend, FrontendError, SourceCheckFrontend,
};
use crate::process::ShutdownCause;
use crate::tests::support::{
    HealthEvent, MockIncrementalCache, RecordingHealthReporter, RecordingSink,
};

struct PanickingFrontend;

impl CompilerFrontend for PanickingFrontend {
    fn name(&self) -> &str {
        "panicking"
    }

    fn version(&self) -> &str {
        "0"
    }

    fn execute(
        &self,
        _arguments: &[String],
        _context: &mut CompileContext<'_>,
    ) -> Result<CompileReport, FrontendError> {
        panic!("front-end bug");
    }
}

/// Holds every call until released.
struct GatedFrontend {
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl CompilerFrontend for GatedFrontend {
    fn name(&self) -> &str {
        "gated"
    }

    fn version(&self) -> &str {
        "0"
    }

    fn execute(
        &self,
        _arguments: &[String],
        _context: &mut CompileContext<'_>,
    ) -> Result<CompileReport, FrontendError> {
        self.started
            .lock()
            .expect("started mutex")
            .send(())
            .expect("signal start");
        self.release
            .lock()
            .expect("release mutex")
            .recv()
            .expect("release");
        Ok(CompileReport::default())
    }
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    service: CompileService,
    reporter: Arc<RecordingHealthReporter>,
    sources: TempDir,
}

impl Fixture {
    fn source(&self, name: &str) -> String {
        self.sources.path().join(name).display().to_string()
    }
}

#[fixture]
fn fixture() -> Fixture {
    let sources = tempfile::tempdir().expect("temp dir");
    fs::write(sources.path().join("Good.kt"), "fun good() = 1\n").expect("write Good");
    fs::write(sources.path().join("Bad.kt"), "fun bad() = (1\n").expect("write Bad");
    let reporter = Arc::new(RecordingHealthReporter::default());
    let service = CompileService::new(Arc::new(SourceCheckFrontend::new()), reporter.clone());
    Fixture {
        service,
        reporter,
        sources,
    }
}

fn closing_cache(obsolete: &[&str]) -> MockIncrementalCache {
    let names: BTreeSet<String> = obsolete.iter().map(|name| (*name).to_owned()).collect();
    let mut cache = MockIncrementalCache::new();
    cache
        .expect_obsolete_package_parts()
        .returning(move || Ok(names.clone()));
    cache
        .expect_package_data()
        .returning(|name| Ok(format!("compiled {name}").into_bytes()));
    cache.expect_close().times(1).returning(|| Ok(()));
    cache
}

#[rstest]
fn clean_compilation_succeeds_without_records(fixture: Fixture) {
    let sink = RecordingSink::default();
    let outcome = fixture
        .service
        .compile(&[fixture.source("Good.kt")], &sink, OutputFormat::Plain);
    assert_eq!(outcome, CallOutcome::Completed(ExitStatus::Ok));
    assert!(sink.records().is_empty());
    assert_eq!(sink.outcomes(), vec![CallOutcome::Completed(ExitStatus::Ok)]);
    assert_eq!(fixture.reporter.completed_statuses(), vec![ExitStatus::Ok]);
}

#[rstest]
fn undelivered_status_fails_the_call(fixture: Fixture) {
    let sink = OutputSink::spawn(BrokenPipe, 4).expect("spawn sink");
    let outcome = fixture
        .service
        .compile(&[fixture.source("Good.kt")], &sink, OutputFormat::Plain);
    assert!(matches!(
        &outcome,
        CallOutcome::Failed { reason } if reason.contains("status not delivered")
    ));
    let events = fixture.reporter.events();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, HealthEvent::CallCompleted { .. }))
    );
    assert!(matches!(
        events.last(),
        Some(HealthEvent::CallFailed { kind, .. }) if kind == "compile"
    ));
}

#[rstest]
fn source_errors_end_with_compilation_error(fixture: Fixture) {
    let sink = RecordingSink::default();
    let bad = fixture.source("Bad.kt");
    let outcome = fixture
        .service
        .compile(&[bad.clone()], &sink, OutputFormat::Plain);
    assert_eq!(outcome.status(), Some(ExitStatus::CompilationError));
    assert_eq!(sink.records(), vec![format!("{bad}:1:13: error: unclosed '('\n")]);
}

#[rstest]
#[case::empty(Vec::new(), "empty arguments list")]
#[case::unknown_flag(vec!["--bogus".to_owned()], "--bogus")]
fn rejected_arguments_end_with_internal_error(
    fixture: Fixture,
    #[case] arguments: Vec<String>,
    #[case] mentioned: &str,
) {
    let sink = RecordingSink::default();
    let outcome = fixture
        .service
        .compile(&arguments, &sink, OutputFormat::Plain);
    assert_eq!(outcome, CallOutcome::Completed(ExitStatus::InternalError));
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records.iter().all(|record| record.contains(mentioned)));
}

#[rstest]
fn internal_errors_follow_the_requested_format(fixture: Fixture) {
    let sink = RecordingSink::default();
    let outcome = fixture.service.compile(&[], &sink, OutputFormat::Xml);
    assert_eq!(outcome.status(), Some(ExitStatus::InternalError));
    assert_eq!(
        sink.records(),
        vec!["<MESSAGE severity=\"EXCEPTION\">invalid arguments: empty arguments list</MESSAGE>\n"]
    );
}

#[rstest]
fn front_end_panics_become_internal_errors() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let service = CompileService::new(Arc::new(PanickingFrontend), reporter);
    let sink = RecordingSink::default();
    let outcome = service.compile(&["x".to_owned()], &sink, OutputFormat::Plain);
    assert_eq!(outcome.status(), Some(ExitStatus::InternalError));
    assert_eq!(sink.records(), vec!["exception: compiler front-end panicked\n"]);
}

#[rstest]
fn lost_sink_fails_the_call(fixture: Fixture) {
    let sink = RecordingSink::disconnected();
    let outcome = fixture
        .service
        .compile(&[fixture.source("Bad.kt")], &sink, OutputFormat::Plain);
    assert!(matches!(outcome, CallOutcome::Failed { .. }));
    assert!(matches!(
        fixture.reporter.events().last(),
        Some(HealthEvent::CallFailed { kind, .. }) if kind == "compile"
    ));
}

#[rstest]
fn incremental_calls_close_every_handle_once(fixture: Fixture) {
    let registry = CacheRegistry::from_iter([
        ("main".to_owned(), closing_cache(&["main.Bad"])),
        ("unused".to_owned(), {
            let mut cache = MockIncrementalCache::new();
            cache.expect_obsolete_package_parts().never();
            cache.expect_close().times(1).returning(|| Ok(()));
            cache
        }),
    ]);
    let sink = RecordingSink::default();
    let outcome = fixture.service.incremental_compile(
        &[fixture.source("Good.kt"), fixture.source("Bad.kt")],
        &registry,
        &sink,
        OutputFormat::Plain,
    );
    assert_eq!(outcome.status(), Some(ExitStatus::CompilationError));
    assert_eq!(sink.records().len(), 1);
    drop(registry);
}

#[rstest]
fn rejected_incremental_calls_still_close_handles(fixture: Fixture) {
    let registry = CacheRegistry::from_iter([("main".to_owned(), {
        let mut cache = MockIncrementalCache::new();
        cache.expect_obsolete_package_parts().never();
        cache.expect_close().times(1).returning(|| Ok(()));
        cache
    })]);
    let sink = RecordingSink::default();
    let outcome = fixture
        .service
        .incremental_compile(&[], &registry, &sink, OutputFormat::Plain);
    assert_eq!(outcome.status(), Some(ExitStatus::InternalError));
}

#[rstest]
fn lost_connection_on_close_fails_a_finished_call(fixture: Fixture) {
    let mut cache = MockIncrementalCache::new();
    cache
        .expect_obsolete_package_parts()
        .returning(|| Ok(BTreeSet::new()));
    cache
        .expect_package_data()
        .returning(|_| Ok(b"cached".to_vec()));
    cache
        .expect_close()
        .times(1)
        .returning(|| Err(CacheError::transport("peer gone")));
    let registry = CacheRegistry::from_iter([("main".to_owned(), cache)]);
    let sink = RecordingSink::default();
    let outcome = fixture.service.incremental_compile(
        &[fixture.source("Good.kt")],
        &registry,
        &sink,
        OutputFormat::Plain,
    );
    assert!(matches!(outcome, CallOutcome::Failed { reason } if reason.contains("peer gone")));
}

#[rstest]
fn transport_failure_mid_call_still_closes_handles(fixture: Fixture) {
    let mut cache = MockIncrementalCache::new();
    cache
        .expect_obsolete_package_parts()
        .times(1)
        .returning(|| Err(CacheError::transport("reset by peer")));
    cache.expect_package_data().never();
    cache
        .expect_close()
        .times(1)
        .returning(|| Err(CacheError::transport("reset by peer")));
    let registry = CacheRegistry::from_iter([("main".to_owned(), cache)]);
    let sink = RecordingSink::default();
    let outcome = fixture.service.incremental_compile(
        &[fixture.source("Good.kt")],
        &registry,
        &sink,
        OutputFormat::Plain,
    );
    assert!(matches!(outcome, CallOutcome::Failed { .. }));
    assert!(sink.records().is_empty());
}

#[rstest]
fn compiler_id_names_the_front_end(fixture: Fixture) {
    let (name, version) = fixture.service.compiler_id().expect("compiler id");
    assert_eq!(name, "kiln-source-check");
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
}

#[rstest]
fn shutdown_rejects_later_calls_and_notifies_once() {
    let (notifier, notifications) = mpsc::channel();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let service = CompileService::new(Arc::new(SourceCheckFrontend::new()), reporter.clone())
        .with_shutdown_notifier(notifier);

    service.shutdown().expect("first shutdown");
    service.shutdown().expect("repeated shutdown");
    assert!(!service.is_alive());
    assert_eq!(notifications.try_iter().collect::<Vec<_>>(), vec![ShutdownCause::Request]);
    assert!(matches!(service.compiler_id(), Err(DispatchError::ShuttingDown)));

    let sink = RecordingSink::default();
    let outcome = service.compile(&["Good.kt".to_owned()], &sink, OutputFormat::Plain);
    assert_eq!(outcome.status(), Some(ExitStatus::InternalError));
    assert_eq!(sink.records(), vec!["exception: compile service is shutting down\n"]);
    assert_eq!(
        reporter
            .events()
            .iter()
            .filter(|event| matches!(event, HealthEvent::ShutdownRequested(_)))
            .count(),
        1
    );
}

#[test]
fn drain_waits_for_running_calls_without_notifying() {
    let (started_tx, started) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let (notifier, notifications) = mpsc::channel();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let frontend = GatedFrontend {
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    };
    let service =
        CompileService::new(Arc::new(frontend), reporter.clone()).with_shutdown_notifier(notifier);
    let sink = RecordingSink::default();

    thread::scope(|scope| {
        let call = scope.spawn(|| service.compile(&["x".to_owned()], &sink, OutputFormat::Plain));
        started
            .recv_timeout(Duration::from_secs(2))
            .expect("call started");
        let drain = scope.spawn(|| service.drain());
        thread::sleep(Duration::from_millis(100));
        assert!(!drain.is_finished(), "drain should wait for the running call");

        release.send(()).expect("release call");
        assert_eq!(
            call.join().expect("call thread"),
            CallOutcome::Completed(ExitStatus::Ok)
        );
        drain.join().expect("drain thread").expect("drain");
    });

    assert_eq!(sink.outcomes(), vec![CallOutcome::Completed(ExitStatus::Ok)]);
    assert!(!service.is_alive());
    assert!(notifications.try_recv().is_err());
    assert_eq!(reporter.completed_statuses(), vec![ExitStatus::Ok]);
    assert!(
        !reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::ShutdownRequested(_)))
    );
}
