//! End-to-end runs through the local pipeline: delivery guarantees, scope
//! resolution, suppression, cancellation, and the write-lock protocol.

use codecheck_core::{
    EntityKey, FileListScope, FileOracle, LocalTool, Location, NamedScope, ProblemDescriptor,
    Profile, ScopeToolState, Severity, SeverityRegistrar, StaticToolRegistry, TextRange,
    ToolCapability, ToolDescriptor, ToolResult,
};
use codecheck_orchestration::{
    AnalysisSession, OrchestratorError, PipelineConfig, ResultSink, RunOptions,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Oracle over synthetic paths: nothing is binary or oversized; specific
/// (file, tool) pairs can be marked suppressed.
#[derive(Default)]
struct TestOracle {
    suppressed: Vec<(PathBuf, String)>,
}

impl FileOracle for TestOracle {
    fn is_binary(&self, _file: &Path) -> bool {
        false
    }

    fn is_too_large(&self, _file: &Path) -> bool {
        false
    }

    fn is_suppressed_at(&self, location: &Location, tool_id: &str) -> bool {
        self.suppressed
            .iter()
            .any(|(file, tool)| file == &location.file && tool == tool_id)
    }

    fn is_writable(&self, _file: &Path) -> bool {
        true
    }
}

/// Flags every file it sees, recording per-file visit counts.
struct CountingTool {
    visits: Arc<Mutex<HashMap<PathBuf, usize>>>,
    delay: Option<Duration>,
}

impl LocalTool for CountingTool {
    fn check_file(
        &self,
        file: &Path,
        _settings: &serde_json::Value,
        _batch: bool,
    ) -> ToolResult<Vec<ProblemDescriptor>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        *self.visits.lock().entry(file.to_path_buf()).or_insert(0) += 1;
        Ok(vec![ProblemDescriptor::new(
            Location::new(file, TextRange::new(0, 4)),
            "flagged",
            Severity::Warning,
        )])
    }
}

fn counting_registry(
    tool_id: &str,
    visits: Arc<Mutex<HashMap<PathBuf, usize>>>,
    delay: Option<Duration>,
) -> StaticToolRegistry {
    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        tool_id,
        ToolCapability::Local(Arc::new(CountingTool { visits, delay })),
    ));
    registry
}

fn initialized_profile(registry: &StaticToolRegistry) -> Arc<Profile> {
    let profile = Profile::new("test-profile");
    profile.initialize(registry, &SeverityRegistrar::new());
    Arc::new(profile)
}

fn files(count: usize) -> Vec<PathBuf> {
    (0..count).map(|i| PathBuf::from(format!("src/file_{i:04}.rs"))).collect()
}

fn small_pipeline() -> PipelineConfig {
    PipelineConfig {
        worker_count: 4,
        queue_capacity: 8,
    }
}

#[test]
fn test_no_loss_delivery_with_small_queue() {
    // N = 50 files through a queue of capacity 8: every file is processed
    // exactly once, none twice, none dropped.
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry("counter", visits.clone(), None);
    let profile = initialized_profile(&registry);
    let scope = Arc::new(FileListScope::new(files(50)));

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let handle = session
        .run_analysis(
            profile,
            scope,
            RunOptions {
                pipeline: small_pipeline(),
            },
        )
        .unwrap();
    let summary = handle.wait().unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.pipeline.files_scheduled, 50);
    assert_eq!(summary.pipeline.files_processed, 50);
    let visits = visits.lock();
    assert_eq!(visits.len(), 50);
    assert!(visits.values().all(|&count| count == 1));
}

#[test]
fn test_scoped_disable_produces_no_findings_in_scope() {
    // Tool enabled project-wide, disabled under "Tests": a run over both
    // files yields zero findings for the test file even though the tool
    // would flag it.
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry("t1", visits.clone(), None);
    let profile = initialized_profile(&registry);

    let tests_scope = Arc::new(NamedScope::with_patterns("Tests", &["**/tests/**"]).unwrap());
    let handle = profile.tool_for("t1", None).unwrap();
    profile
        .add_scope_state(
            "t1",
            ScopeToolState::new(Some(tests_scope), handle, false, Severity::Warning),
        )
        .unwrap();

    let file_a = PathBuf::from("src/main.rs");
    let file_b = PathBuf::from("crate/tests/it.rs");
    assert!(profile.is_tool_enabled("t1", Some(&file_a)));
    assert!(!profile.is_tool_enabled("t1", Some(&file_b)));

    let scope = Arc::new(FileListScope::new(vec![file_a.clone(), file_b.clone()]));
    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let run = session
        .run_analysis(Arc::new(profile.copy()), scope, RunOptions::default())
        .unwrap();
    run.wait().unwrap();

    let presentation = run.results().get("t1").unwrap();
    assert_eq!(
        presentation.problems_for(&EntityKey::File(file_a)).len(),
        1
    );
    assert!(presentation
        .problems_for(&EntityKey::File(file_b))
        .is_empty());
}

#[test]
fn test_suppressed_problems_never_aggregate() {
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry("t1", visits, None);
    let profile = initialized_profile(&registry);

    let suppressed_file = PathBuf::from("src/file_0001.rs");
    let oracle = TestOracle {
        suppressed: vec![(suppressed_file.clone(), "t1".to_string())],
    };

    let scope = Arc::new(FileListScope::new(files(4)));
    let session = AnalysisSession::new(Arc::new(oracle), false);
    let run = session
        .run_analysis(profile, scope, RunOptions::default())
        .unwrap();
    let summary = run.wait().unwrap();

    let presentation = run.results().get("t1").unwrap();
    assert!(presentation
        .problems_for(&EntityKey::File(suppressed_file))
        .is_empty());
    assert_eq!(summary.problems_found, 3);
}

#[test]
fn test_cancellation_keeps_partial_results() {
    // Cancel mid-run: wait() succeeds with `cancelled` set, the aggregate
    // holds a strict subset of files, and nothing is processed twice.
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry(
        "slow",
        visits.clone(),
        Some(Duration::from_millis(5)),
    );
    let profile = initialized_profile(&registry);
    let scope = Arc::new(FileListScope::new(files(500)));

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let run = session
        .run_analysis(
            profile,
            scope,
            RunOptions {
                pipeline: small_pipeline(),
            },
        )
        .unwrap();

    // Let a handful of files finish before cancelling.
    while visits.lock().len() < 10 {
        std::thread::sleep(Duration::from_millis(1));
    }
    run.cancel();
    let summary = run.wait().unwrap();

    assert!(summary.cancelled);
    assert!(summary.pipeline.files_processed < 500);
    let visits = visits.lock();
    assert!(visits.values().all(|&count| count == 1));
    let presentation = run.results().get("slow").unwrap();
    assert!(presentation.problem_count() <= visits.len());
}

#[test]
fn test_write_gate_pause_retries_without_duplication() {
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry(
        "slow",
        visits.clone(),
        Some(Duration::from_millis(2)),
    );
    let profile = initialized_profile(&registry);
    let scope = Arc::new(FileListScope::new(files(80)));

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let gate = session.write_gate().clone();
    let run = session
        .run_analysis(
            profile,
            scope,
            RunOptions {
                pipeline: small_pipeline(),
            },
        )
        .unwrap();

    while visits.lock().len() < 5 {
        std::thread::sleep(Duration::from_millis(1));
    }
    // An external writer interrupts; paused files retry after it finishes.
    gate.with_write(|| std::thread::sleep(Duration::from_millis(20)));

    let summary = run.wait().unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.pipeline.files_processed, 80);

    // A paused file may be re-run, but its findings must not double up.
    let presentation = run.results().get("slow").unwrap();
    for file in files(80) {
        assert_eq!(
            presentation.problems_for(&EntityKey::File(file)).len(),
            1,
        );
    }
}

#[test]
fn test_concurrent_run_is_rejected() {
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry(
        "slow",
        visits.clone(),
        Some(Duration::from_millis(5)),
    );
    let profile = initialized_profile(&registry);

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let run = session
        .run_analysis(
            profile.clone(),
            Arc::new(FileListScope::new(files(100))),
            RunOptions {
                pipeline: small_pipeline(),
            },
        )
        .unwrap();

    let second = session.run_analysis(
        profile,
        Arc::new(FileListScope::new(files(1))),
        RunOptions::default(),
    );
    assert!(matches!(
        second,
        Err(OrchestratorError::Precondition(_))
    ));

    run.cancel();
    run.wait().unwrap();
}

#[test]
fn test_uninitialized_profile_is_a_precondition_error() {
    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let result = session.run_analysis(
        Arc::new(Profile::new("raw")),
        Arc::new(FileListScope::new(files(1))),
        RunOptions::default(),
    );

    assert!(matches!(result, Err(OrchestratorError::Precondition(_))));
}

#[test]
fn test_tool_failure_is_isolated() {
    struct FailingTool;
    impl LocalTool for FailingTool {
        fn check_file(
            &self,
            file: &Path,
            _settings: &serde_json::Value,
            _batch: bool,
        ) -> ToolResult<Vec<ProblemDescriptor>> {
            if file.to_string_lossy().contains("file_0002") {
                return Err(codecheck_core::ToolError::Failed("boom".into()));
            }
            Ok(vec![ProblemDescriptor::new(
                Location::new(file, TextRange::new(0, 1)),
                "ok",
                Severity::Warning,
            )])
        }
    }

    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        "fragile",
        ToolCapability::Local(Arc::new(FailingTool)),
    ));
    let profile = initialized_profile(&registry);

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let run = session
        .run_analysis(
            profile,
            Arc::new(FileListScope::new(files(5))),
            RunOptions::default(),
        )
        .unwrap();
    let summary = run.wait().unwrap();

    // one pairing failed, the other four files still produced findings
    assert_eq!(summary.pipeline.tool_failures, 1);
    assert_eq!(summary.problems_found, 4);
    assert_eq!(summary.pipeline.files_processed, 5);
}

#[test]
fn test_sink_observes_problems_as_produced() {
    struct CountingSink {
        notified: AtomicUsize,
    }
    impl ResultSink for CountingSink {
        fn problems_added(
            &self,
            _tool_id: &str,
            _entity: &EntityKey,
            descriptors: &[Arc<ProblemDescriptor>],
        ) {
            self.notified.fetch_add(descriptors.len(), Ordering::SeqCst);
        }
    }

    let sink = Arc::new(CountingSink {
        notified: AtomicUsize::new(0),
    });
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let registry = counting_registry("t1", visits, None);
    let profile = initialized_profile(&registry);

    let session =
        AnalysisSession::new(Arc::new(TestOracle::default()), false).with_sink(sink.clone());
    let run = session
        .run_analysis(
            profile,
            Arc::new(FileListScope::new(files(12))),
            RunOptions::default(),
        )
        .unwrap();
    run.wait().unwrap();

    assert_eq!(sink.notified.load(Ordering::SeqCst), 12);
}

#[test]
fn test_global_simple_runs_in_local_pipeline() {
    let visits = Arc::new(Mutex::new(HashMap::new()));
    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        "global-simple",
        ToolCapability::GlobalSimple(Arc::new(CountingTool {
            visits: visits.clone(),
            delay: None,
        })),
    ));
    let profile = initialized_profile(&registry);

    let session = AnalysisSession::new(Arc::new(TestOracle::default()), false);
    let run = session
        .run_analysis(
            profile,
            Arc::new(FileListScope::new(files(6))),
            RunOptions::default(),
        )
        .unwrap();
    let summary = run.wait().unwrap();

    assert_eq!(summary.problems_found, 6);
    assert_eq!(visits.lock().len(), 6);
}
