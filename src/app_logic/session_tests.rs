use super::session::{MessageSeverity, SessionError, SessionEvent, SolutionSession};

use crate::core::{
    AppSettings, CheckState, CoreFileEnumerator, FilterUpdate, NodeId, ProjectDescriptor,
    ResolutionError, SolutionResolverOperations, TreeEvent,
};
use crate::core::tokenizer_utils::SimpleWhitespaceTokenCounter;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

/*
 * Tests for `SolutionSession` from the `super::session` module. The resolver is
 * mocked so each test controls which projects a solution declares; project content
 * lives in a temporary directory and is enumerated with the real enumerator.
 */

// --- MockResolver ---
struct MockResolver {
    results: Mutex<Vec<Result<Vec<ProjectDescriptor>, ResolutionError>>>,
    resolved_paths: Mutex<Vec<PathBuf>>,
}

impl MockResolver {
    fn new() -> Self {
        MockResolver {
            results: Mutex::new(Vec::new()),
            resolved_paths: Mutex::new(Vec::new()),
        }
    }

    /* Queues the result of the next `resolve` call. */
    fn push_result(&self, result: Result<Vec<ProjectDescriptor>, ResolutionError>) {
        self.results.lock().unwrap().push(result);
    }
}

impl SolutionResolverOperations for MockResolver {
    fn resolve(&self, solution_path: &Path) -> Result<Vec<ProjectDescriptor>, ResolutionError> {
        self.resolved_paths
            .lock()
            .unwrap()
            .push(solution_path.to_path_buf());
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            return Err(ResolutionError::UnsupportedFormat(solution_path.to_path_buf()));
        }
        results.remove(0)
    }
}
// --- End MockResolver ---

struct Fixture {
    dir: TempDir,
    resolver: Arc<MockResolver>,
    session: SolutionSession,
}

impl Fixture {
    fn solution_path(&self) -> PathBuf {
        self.dir.path().join("Shop.sln")
    }

    fn node(&self, relative: &str) -> NodeId {
        let path = self.dir.path().join(relative);
        self.session
            .tree()
            .unwrap()
            .find_by_path(&path)
            .unwrap_or_else(|| panic!("no node for {relative}"))
    }

    fn project(&self, name: &str) -> NodeId {
        let tree = self.session.tree().unwrap();
        *tree
            .children(tree.root())
            .iter()
            .find(|id| tree.node(**id).name == name)
            .unwrap()
    }

    fn export_names(&self) -> Vec<String> {
        self.session
            .export_list()
            .files
            .iter()
            .map(|p| {
                p.strip_prefix(self.dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }
}

fn write(root: &Path, relative: &str, content: &str) -> io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn test_settings() -> AppSettings {
    AppSettings {
        max_file_size_bytes: 1000,
        filter_debounce_ms: 50,
        aggregation_debounce_ms: 20,
        status_message_ms: 100,
        ..AppSettings::default()
    }
}

/* Shop.sln next to global.json, with an `Api` and a `Web` project. `Api/Huge.cs` is over the size limit. */
fn setup_fixture() -> Fixture {
    crate::initialize_logging();
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "Shop.sln", "Microsoft Visual Studio Solution File\n").unwrap();
    write(root, "global.json", "{}\n").unwrap();
    write(root, "Api/Api.csproj", "<Project />\n").unwrap();
    write(root, "Api/Program.cs", "class Program {}\n").unwrap();
    write(root, "Api/Properties/launchSettings.json", "{}\n").unwrap();
    write(root, "Api/Services/OrderService.cs", "class OrderService {}\n").unwrap();
    write(root, "Api/Huge.cs", &"x".repeat(2000)).unwrap();
    write(root, "Web/Web.csproj", "<Project />\n").unwrap();
    write(root, "Web/wwwroot/app.js", "run();\n").unwrap();
    write(root, "Web/Pages/Index.cs", "class Index {}\n").unwrap();

    let resolver = Arc::new(MockResolver::new());
    resolver.push_result(Ok(vec![
        ProjectDescriptor {
            name: "Api".to_string(),
            manifest_path: root.join("Api/Api.csproj"),
        },
        ProjectDescriptor {
            name: "Web".to_string(),
            manifest_path: root.join("Web/Web.csproj"),
        },
    ]));
    let session = SolutionSession::new(
        resolver.clone(),
        Arc::new(CoreFileEnumerator::new()),
        test_settings(),
    );
    let mut fixture = Fixture {
        dir,
        resolver,
        session,
    };
    let solution = fixture.solution_path();
    fixture.session.load_solution(&solution).unwrap();
    fixture
}

#[test]
fn test_load_solution_builds_tree_and_reports_summary() {
    let mut fixture = setup_fixture();
    let summary = fixture.session.summary();
    assert_eq!(summary.projects, 2);
    assert_eq!(summary.excluded_files, 1);
    // Shop.sln, global.json, 4 Api files, 3 Web files.
    assert_eq!(summary.selectable_files, 9);

    let tree = fixture.session.tree().unwrap();
    let top: Vec<&str> = tree
        .children(tree.root())
        .iter()
        .map(|id| tree.node(*id).name.as_str())
        .collect();
    assert_eq!(top, vec!["Shop.sln", "global.json", "Api", "Web"]);

    let events = fixture.session.take_events();
    assert!(matches!(events[0], SessionEvent::TreeReplaced(s) if s == summary));
    assert_eq!(
        fixture.session.status().unwrap().severity,
        MessageSeverity::Information
    );
    assert_eq!(
        *fixture.resolver.resolved_paths.lock().unwrap(),
        vec![fixture.solution_path()]
    );
}

#[test]
fn test_failed_load_keeps_previous_tree() {
    let mut fixture = setup_fixture();
    let api = fixture.project("Api");
    fixture.session.set_checked(api, true, Instant::now()).unwrap();
    let version = fixture.session.tree().unwrap().version();

    fixture.resolver.push_result(Err(ResolutionError::Malformed(
        PathBuf::from("Broken.sln"),
        "garbage".to_string(),
    )));
    let result = fixture.session.load_solution(Path::new("Broken.sln"));

    assert!(matches!(result, Err(SessionError::Resolution(_))));
    let tree = fixture.session.tree().unwrap();
    assert_eq!(tree.version(), version);
    assert_eq!(tree.node(api).check_state(), CheckState::Checked);
    assert_eq!(tree.node(tree.root()).check_state(), CheckState::Indeterminate);
    assert_eq!(fixture.session.solution_path(), Some(fixture.solution_path().as_path()));
    assert_eq!(
        fixture.session.status().unwrap().severity,
        MessageSeverity::Error
    );
}

#[test]
fn test_burst_of_checks_yields_one_aggregation() {
    let mut fixture = setup_fixture();
    fixture.session.take_events();
    let start = Instant::now();

    let changed = fixture.session.check_visible_files(start).unwrap();
    assert_eq!(changed, 9);
    fixture.session.tick(start + Duration::from_millis(5));
    assert!(fixture.session.export_list().is_empty());

    fixture.session.tick(start + Duration::from_millis(25));
    let aggregations = fixture
        .session
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ExportListChanged { .. }))
        .count();
    assert_eq!(aggregations, 1);
    assert_eq!(fixture.session.export_list().len(), 9);
}

#[test]
fn test_export_order_follows_buckets_per_project() {
    let mut fixture = setup_fixture();
    let root = fixture.session.tree().unwrap().root();
    fixture.session.set_checked(root, true, Instant::now()).unwrap();
    fixture.session.flush();

    assert_eq!(
        fixture.export_names(),
        vec![
            "Shop.sln",
            "global.json",
            "Api/Api.csproj",
            "Api/Properties/launchSettings.json",
            "Api/Program.cs",
            "Api/Services/OrderService.cs",
            "Web/Web.csproj",
            "Web/wwwroot/app.js",
            "Web/Pages/Index.cs",
        ]
    );
    let huge = fixture.node("Api/Huge.cs");
    assert!(!fixture.session.tree().unwrap().node(huge).is_checked());
}

#[test]
fn test_checking_root_arms_aggregation() {
    let mut fixture = setup_fixture();
    fixture.session.take_events();
    let root = fixture.session.tree().unwrap().root();
    let start = Instant::now();
    fixture.session.set_checked(root, true, start).unwrap();
    fixture.session.tick(start + Duration::from_millis(25));

    let events = fixture.session.take_events();
    assert!(events.contains(&SessionEvent::Tree(TreeEvent::SubtreeCheckChanged(root))));
    assert!(events.contains(&SessionEvent::ExportListChanged {
        file_count: 9,
        total_bytes: fixture.session.export_list().total_bytes,
    }));
    assert_eq!(fixture.session.export_list().len(), 9);
}

#[test]
fn test_unchecking_removes_files_from_export_list() {
    let mut fixture = setup_fixture();
    let root = fixture.session.tree().unwrap().root();
    fixture.session.set_checked(root, true, Instant::now()).unwrap();
    fixture.session.flush();
    let web = fixture.project("Web");
    fixture.session.set_checked(web, false, Instant::now()).unwrap();
    fixture.session.flush();

    assert!(fixture.export_names().iter().all(|n| !n.starts_with("Web/")));
    let tree = fixture.session.tree().unwrap();
    assert_eq!(tree.node(root).check_state(), CheckState::Indeterminate);
}

#[test]
fn test_filter_then_check_visible_selects_only_matches() {
    let mut fixture = setup_fixture();
    let start = Instant::now();
    fixture.session.set_filter_text("service", start);

    fixture.session.tick(start + Duration::from_millis(10));
    assert_eq!(fixture.session.filter_text(), "service");
    fixture.session.flush();
    let filter_updates: Vec<FilterUpdate> = fixture
        .session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Filter(update) => Some(update),
            _ => None,
        })
        .collect();
    assert!(matches!(
        filter_updates.as_slice(),
        [FilterUpdate::Applied { term, .. }] if term == "service"
    ));

    fixture.session.check_visible_files(Instant::now()).unwrap();
    fixture.session.flush();
    assert_eq!(fixture.export_names(), vec!["Api/Services/OrderService.cs"]);

    let index = fixture.node("Web/Pages/Index.cs");
    assert!(!fixture.session.tree().unwrap().node(index).is_visible());
}

#[test]
fn test_clearing_filter_restores_visibility_and_expands_checked_ancestors() {
    let mut fixture = setup_fixture();
    fixture.session.set_filter_text("index", Instant::now());
    fixture.session.flush();
    fixture.session.check_visible_files(Instant::now()).unwrap();

    fixture.session.set_filter_text("   ", Instant::now());
    fixture.session.flush();

    let tree = fixture.session.tree().unwrap();
    assert!(tree.post_order().iter().all(|id| tree.node(*id).is_visible()));
    let pages = tree.parent(fixture.node("Web/Pages/Index.cs")).unwrap();
    assert!(tree.node(pages).is_expanded());
    assert!(tree.node(fixture.project("Web")).is_expanded());
    assert!(!tree.node(fixture.project("Api")).is_expanded());
}

#[test]
fn test_reload_discards_filter_result_for_old_tree() {
    let mut fixture = setup_fixture();
    fixture.session.set_filter_text("program", Instant::now());

    fixture.resolver.push_result(Ok(vec![ProjectDescriptor {
        name: "Api".to_string(),
        manifest_path: fixture.dir.path().join("Api/Api.csproj"),
    }]));
    let solution = fixture.solution_path();
    fixture.session.load_solution(&solution).unwrap();
    fixture.session.flush();

    // The filter text survives the reload and is applied to the new tree.
    let tree = fixture.session.tree().unwrap();
    assert!(tree.node(fixture.node("Api/Program.cs")).is_visible());
    assert!(!tree.node(fixture.node("Api/Api.csproj")).is_visible());
    assert_eq!(fixture.session.summary().projects, 1);
}

#[test]
fn test_export_to_file_writes_dump() {
    let mut fixture = setup_fixture();
    let program = fixture.node("Api/Program.cs");
    fixture.session.set_checked(program, true, Instant::now()).unwrap();

    // No flush: exporting settles the pending aggregation itself.
    let out = fixture.dir.path().join("out/dump.txt");
    fs::create_dir_all(out.parent().unwrap()).unwrap();
    let stats = fixture.session.export_to_file(&out).unwrap();
    assert_eq!(stats.files_written, 1);

    let dump = fs::read_to_string(&out).unwrap();
    assert!(dump.contains("// Solution: Shop.sln\n// Files: 1\n\n"));
    assert!(dump.ends_with("===== FILE: Api/Program.cs =====\nclass Program {}\n\n"));
}

#[test]
fn test_export_to_unwritable_destination_reports_error_and_keeps_selection() {
    let mut fixture = setup_fixture();
    let program = fixture.node("Api/Program.cs");
    fixture.session.set_checked(program, true, Instant::now()).unwrap();
    fixture.session.flush();

    let out = fixture.dir.path().join("missing/dir/dump.txt");
    let result = fixture.session.export_to_file(&out);
    assert!(matches!(result, Err(SessionError::Export(_))));
    assert_eq!(
        fixture.session.status().unwrap().severity,
        MessageSeverity::Error
    );
    assert_eq!(fixture.session.export_list().len(), 1);
    assert!(fixture.session.tree().unwrap().node(program).is_checked());
}

#[test]
fn test_status_message_expires() {
    let mut fixture = setup_fixture();
    assert!(fixture.session.status().is_some());
    fixture.session.take_events();

    fixture
        .session
        .tick(Instant::now() + Duration::from_millis(200));
    assert!(fixture.session.status().is_none());
    assert_eq!(fixture.session.take_events(), vec![SessionEvent::StatusCleared]);
}

#[test]
fn test_operations_without_solution() {
    crate::initialize_logging();
    let mut session = SolutionSession::new(
        Arc::new(MockResolver::new()),
        Arc::new(CoreFileEnumerator::new()),
        test_settings(),
    );
    assert!(matches!(
        session.set_checked(NodeId(0), true, Instant::now()),
        Err(SessionError::NoSolutionLoaded)
    ));
    assert!(matches!(
        session.export_to_clipboard(),
        Err(SessionError::NoSolutionLoaded)
    ));
    session.set_filter_text("abc", Instant::now());
    session.flush();
    assert_eq!(session.filter_text(), "abc");
}

#[test]
fn test_unknown_node_is_rejected() {
    let mut fixture = setup_fixture();
    let result = fixture
        .session
        .set_checked(NodeId(10_000), true, Instant::now());
    assert!(matches!(result, Err(SessionError::UnknownNode(NodeId(10_000)))));
}

#[test]
fn test_check_events_bubble_to_root() {
    let mut fixture = setup_fixture();
    fixture.session.take_events();
    let program = fixture.node("Api/Program.cs");
    fixture.session.set_checked(program, true, Instant::now()).unwrap();

    let root = fixture.session.tree().unwrap().root();
    let events = fixture.session.take_events();
    assert!(events.contains(&SessionEvent::Tree(TreeEvent::CheckStateChanged(program))));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Tree(TreeEvent::SubtreeCheckChanged(root)))
    );
}

#[test]
fn test_token_estimate_of_current_selection() {
    let mut fixture = setup_fixture();
    let program = fixture.node("Api/Program.cs");
    fixture.session.set_checked(program, true, Instant::now()).unwrap();
    let tokens = fixture
        .session
        .estimate_tokens(&SimpleWhitespaceTokenCounter::new())
        .unwrap();
    // Header lines: 4 + 3 + 3 words; marker: 4; content: 3.
    assert_eq!(tokens, 17);
}
