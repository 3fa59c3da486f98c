//! Global tool passes: reference-graph construction, scope intersection,
//! the external-usages second pass, and graph-build failure semantics.

use codecheck_core::{
    AnalysisScope, DeclKind, Declaration, DeclarationProvider, EntityKey, FileListScope,
    FileOracle, GlobalTool, Location, NamedScope, ProblemDescriptor, Profile, RefGraph,
    ScopeToolState, Severity, SeverityRegistrar, StaticToolRegistry, TextRange, ToolCapability,
    ToolDescriptor, ToolResult,
};
use codecheck_orchestration::{AnalysisSession, OrchestratorError, RunOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct PlainOracle;

impl FileOracle for PlainOracle {
    fn is_binary(&self, _file: &Path) -> bool {
        false
    }
    fn is_too_large(&self, _file: &Path) -> bool {
        false
    }
    fn is_suppressed_at(&self, _location: &Location, _tool_id: &str) -> bool {
        false
    }
    fn is_writable(&self, _file: &Path) -> bool {
        true
    }
}

struct TableProvider {
    table: HashMap<PathBuf, Vec<Declaration>>,
    fail: bool,
}

impl DeclarationProvider for TableProvider {
    fn declarations_in(&self, file: &Path) -> ToolResult<Vec<Declaration>> {
        if self.fail {
            return Err(codecheck_core::ToolError::Failed("no declarations".into()));
        }
        Ok(self.table.get(file).cloned().unwrap_or_default())
    }
}

fn decl(name: &str, file: &str, refs: &[&str], entry: bool) -> Declaration {
    Declaration {
        qualified_name: name.to_string(),
        kind: DeclKind::Function,
        location: Location::new(file, TextRange::new(0, 1)),
        references: refs.iter().map(|r| r.to_string()).collect(),
        entry_point: entry,
    }
}

fn provider() -> TableProvider {
    let mut table = HashMap::new();
    table.insert(
        PathBuf::from("a.rs"),
        vec![decl("a::main", "a.rs", &["a::used"], true)],
    );
    table.insert(
        PathBuf::from("b.rs"),
        vec![
            decl("a::used", "b.rs", &[], false),
            decl("b::dead", "b.rs", &[], false),
        ],
    );
    TableProvider { table, fail: false }
}

/// Flags every declaration not reachable from an entry point.
struct DeadDeclTool;

impl GlobalTool for DeadDeclTool {
    fn needs_reference_graph(&self) -> bool {
        true
    }

    fn check_scope(
        &self,
        _scope: &dyn AnalysisScope,
        graph: Option<&RefGraph>,
        _settings: &serde_json::Value,
    ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>> {
        let graph = graph.ok_or_else(|| codecheck_core::ToolError::Failed("graph missing".into()))?;
        Ok(graph
            .entities()
            .filter(|entity| !graph.is_reachable(entity.id))
            .map(|entity| {
                (
                    EntityKey::Declaration(entity.name.clone()),
                    vec![ProblemDescriptor::new(
                        entity.location.clone(),
                        format!("declaration '{}' is never used", entity.name),
                        Severity::Warning,
                    )],
                )
            })
            .collect())
    }
}

fn dead_decl_profile() -> Arc<Profile> {
    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        "dead-declaration",
        ToolCapability::Global(Arc::new(DeadDeclTool)),
    ));
    let profile = Profile::new("global-test");
    profile.initialize(&registry, &SeverityRegistrar::new());
    Arc::new(profile)
}

fn two_file_scope() -> Arc<FileListScope> {
    Arc::new(FileListScope::new(vec![
        PathBuf::from("a.rs"),
        PathBuf::from("b.rs"),
    ]))
}

#[test]
fn test_global_tool_runs_over_reference_graph() {
    let session = AnalysisSession::new(Arc::new(PlainOracle), false)
        .with_provider(Arc::new(provider()));
    let run = session
        .run_analysis(dead_decl_profile(), two_file_scope(), RunOptions::default())
        .unwrap();
    let summary = run.wait().unwrap();

    assert_eq!(summary.problems_found, 1);
    let presentation = run.results().get("dead-declaration").unwrap();
    let problems =
        presentation.problems_for(&EntityKey::Declaration("b::dead".to_string()));
    assert_eq!(problems.len(), 1);
    assert!(problems[0].message.contains("b::dead"));
}

#[test]
fn test_graph_build_failure_is_fatal() {
    let session = AnalysisSession::new(Arc::new(PlainOracle), false).with_provider(Arc::new(
        TableProvider {
            table: HashMap::new(),
            fail: true,
        },
    ));
    let run = session
        .run_analysis(dead_decl_profile(), two_file_scope(), RunOptions::default())
        .unwrap();

    assert!(matches!(
        run.wait(),
        Err(OrchestratorError::GraphBuild(_))
    ));
}

#[test]
fn test_missing_provider_is_a_graph_build_error() {
    let session = AnalysisSession::new(Arc::new(PlainOracle), false);
    let run = session
        .run_analysis(dead_decl_profile(), two_file_scope(), RunOptions::default())
        .unwrap();

    assert!(matches!(
        run.wait(),
        Err(OrchestratorError::GraphBuild(_))
    ));
}

/// Counts invocations per pass and remembers whether the second pass ran.
struct ExternalUsagesTool {
    first_pass_files: AtomicUsize,
    external_pass_ran: AtomicBool,
}

impl GlobalTool for ExternalUsagesTool {
    fn check_scope(
        &self,
        scope: &dyn AnalysisScope,
        _graph: Option<&RefGraph>,
        _settings: &serde_json::Value,
    ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>> {
        self.first_pass_files
            .fetch_add(scope.enumerate().count(), Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn may_have_external_usages(&self) -> bool {
        true
    }

    fn check_external_usages(
        &self,
        _scope: &dyn AnalysisScope,
        _graph: Option<&RefGraph>,
        _settings: &serde_json::Value,
    ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>> {
        self.external_pass_ran.store(true, Ordering::SeqCst);
        Ok(vec![(
            EntityKey::Declaration("ext::usage".to_string()),
            vec![ProblemDescriptor::new(
                Location::new("outside.rs", TextRange::new(0, 1)),
                "used outside the analyzed scope",
                Severity::Warning,
            )],
        )])
    }
}

#[test]
fn test_external_usages_second_pass_merges_results() {
    let tool = Arc::new(ExternalUsagesTool {
        first_pass_files: AtomicUsize::new(0),
        external_pass_ran: AtomicBool::new(false),
    });
    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        "external-usages",
        ToolCapability::Global(tool.clone()),
    ));
    let profile = Profile::new("external-test");
    profile.initialize(&registry, &SeverityRegistrar::new());

    // A file-list scope is not the whole project, so the tool is flagged
    // for the second pass.
    let session = AnalysisSession::new(Arc::new(PlainOracle), false);
    let run = session
        .run_analysis(Arc::new(profile), two_file_scope(), RunOptions::default())
        .unwrap();
    let summary = run.wait().unwrap();

    assert!(tool.external_pass_ran.load(Ordering::SeqCst));
    assert_eq!(summary.problems_found, 1);
    let presentation = run.results().get("external-usages").unwrap();
    assert_eq!(
        presentation
            .problems_for(&EntityKey::Declaration("ext::usage".to_string()))
            .len(),
        1
    );
}

#[test]
fn test_global_tool_scope_intersection() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<PathBuf>::new()));

    struct ScopeRecorder {
        seen: Arc<parking_lot::Mutex<Vec<PathBuf>>>,
    }
    impl GlobalTool for ScopeRecorder {
        fn check_scope(
            &self,
            scope: &dyn AnalysisScope,
            _graph: Option<&RefGraph>,
            _settings: &serde_json::Value,
        ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>> {
            self.seen.lock().extend(scope.enumerate());
            Ok(Vec::new())
        }
    }

    let mut registry = StaticToolRegistry::new();
    registry.register(ToolDescriptor::new(
        "scope-recorder",
        ToolCapability::Global(Arc::new(ScopeRecorder { seen: seen.clone() })),
    ));
    let profile = Profile::new("intersection-test");
    profile.initialize(&registry, &SeverityRegistrar::new());

    // Disable the default state and add an enabled state under "Tests":
    // the tool must only see the intersection with that scope.
    let handle = {
        let p = &profile;
        p.tool_for("scope-recorder", None).unwrap()
    };
    let tests_scope = Arc::new(NamedScope::with_patterns("Tests", &["**/tests/**"]).unwrap());
    profile.set_tool_enabled("scope-recorder", false).unwrap();
    profile
        .add_scope_state(
            "scope-recorder",
            ScopeToolState::new(Some(tests_scope), handle, true, Severity::Warning),
        )
        .unwrap();

    let scope = Arc::new(FileListScope::new(vec![
        PathBuf::from("src/main.rs"),
        PathBuf::from("crate/tests/it.rs"),
    ]));
    let session = AnalysisSession::new(Arc::new(PlainOracle), false);
    let run = session
        .run_analysis(Arc::new(profile), scope, RunOptions::default())
        .unwrap();
    run.wait().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.as_slice(), &[PathBuf::from("crate/tests/it.rs")]);
}
