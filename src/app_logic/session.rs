/*
 * `SolutionSession` is the single owner of one loaded solution: the selection tree,
 * the filter engine, the aggregator and the export list derived from check state.
 * A presentation layer (the CLI here) calls its operations and polls `tick` from its
 * loop; everything it must react to is queued as `SessionEvent`s and collected with
 * `take_events`.
 *
 * Loading is all-or-nothing: the new tree replaces the old one only after the
 * solution was resolved successfully. Whole-operation failures are returned to the
 * caller and also shown as an error status message.
 */
use crate::core::aggregation::{ExportList, SelectionAggregator};
use crate::core::config::AppSettings;
use crate::core::debounce::Debouncer;
use crate::core::exporter::{
    ClipboardExportSink, DumpHeader, DumpStats, ExportError, ExportSink, FileExportSink,
};
use crate::core::file_enumerator::FileEnumeratorOperations;
use crate::core::filter_engine::{FilterEngine, FilterUpdate};
use crate::core::selection_tree::{NodeId, SelectionTree, TreeEvent};
use crate::core::solution_resolver::{ResolutionError, SolutionResolverOperations};
use crate::core::tokenizer_utils::{self, TokenCounterOperations};
use crate::core::tree_builder::{TreeBuilder, TreeSummary};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum SessionError {
    Resolution(ResolutionError),
    Export(ExportError),
    NoSolutionLoaded,
    UnknownNode(NodeId),
}

impl From<ResolutionError> for SessionError {
    fn from(err: ResolutionError) -> Self {
        SessionError::Resolution(err)
    }
}

impl From<ExportError> for SessionError {
    fn from(err: ExportError) -> Self {
        SessionError::Export(err)
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        SessionError::Export(ExportError::Write(err))
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Resolution(e) => write!(f, "Could not load solution: {e}"),
            SessionError::Export(e) => write!(f, "Export failed: {e}"),
            SessionError::NoSolutionLoaded => write!(f, "No solution is loaded"),
            SessionError::UnknownNode(id) => write!(f, "No tree node with id {}", id.0),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Resolution(e) => Some(e),
            SessionError::Export(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub severity: MessageSeverity,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TreeReplaced(TreeSummary),
    Tree(TreeEvent),
    Filter(FilterUpdate),
    ExportListChanged { file_count: usize, total_bytes: u64 },
    StatusChanged(StatusMessage),
    StatusCleared,
}

pub struct SolutionSession {
    resolver: Arc<dyn SolutionResolverOperations>,
    enumerator: Arc<dyn FileEnumeratorOperations>,
    settings: AppSettings,
    solution_path: Option<PathBuf>,
    tree: Option<SelectionTree>,
    summary: TreeSummary,
    filter_text: String,
    filter: FilterEngine,
    aggregator: SelectionAggregator,
    aggregation_debounce: Debouncer,
    export_list: ExportList,
    status: Option<StatusMessage>,
    status_expiry: Debouncer,
    events: Vec<SessionEvent>,
}

impl SolutionSession {
    pub fn new(
        resolver: Arc<dyn SolutionResolverOperations>,
        enumerator: Arc<dyn FileEnumeratorOperations>,
        settings: AppSettings,
    ) -> Self {
        SolutionSession {
            resolver,
            enumerator,
            filter: FilterEngine::new(settings.filter_debounce()),
            aggregator: SelectionAggregator::new(settings.bucket_rules()),
            aggregation_debounce: Debouncer::new(settings.aggregation_debounce()),
            status_expiry: Debouncer::new(settings.status_message_duration()),
            settings,
            solution_path: None,
            tree: None,
            summary: TreeSummary::default(),
            filter_text: String::new(),
            export_list: ExportList::default(),
            status: None,
            events: Vec::new(),
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn tree(&self) -> Option<&SelectionTree> {
        self.tree.as_ref()
    }

    pub fn solution_path(&self) -> Option<&Path> {
        self.solution_path.as_deref()
    }

    pub fn summary(&self) -> TreeSummary {
        self.summary
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn export_list(&self) -> &ExportList {
        &self.export_list
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn load_solution(&mut self, solution_path: &Path) -> Result<TreeSummary> {
        log::info!("SolutionSession: Loading {solution_path:?}.");
        let projects = match self.resolver.resolve(solution_path) {
            Ok(projects) => projects,
            Err(e) => {
                log::error!("SolutionSession: Failed to resolve {solution_path:?}: {e}");
                self.set_status(MessageSeverity::Error, format!("Could not load solution: {e}"));
                return Err(e.into());
            }
        };

        let (tree, summary) =
            TreeBuilder::new(self.enumerator.as_ref(), &self.settings).build(solution_path, &projects);

        self.filter.rebuild_index(&tree);
        self.aggregator.clear_cache();
        self.aggregation_debounce.cancel();
        self.export_list = ExportList::default();
        self.solution_path = Some(solution_path.to_path_buf());
        self.summary = summary;
        self.tree = Some(tree);
        self.events.push(SessionEvent::TreeReplaced(summary));
        self.events.push(SessionEvent::ExportListChanged {
            file_count: 0,
            total_bytes: 0,
        });

        if !self.filter_text.trim().is_empty() {
            self.filter.request(&self.filter_text, Instant::now());
        }

        let message = if summary.excluded_files > 0 {
            format!(
                "Loaded {} projects, {} files ({} over the size limit).",
                summary.projects,
                summary.selectable_files + summary.excluded_files,
                summary.excluded_files
            )
        } else {
            format!(
                "Loaded {} projects, {} files.",
                summary.projects, summary.selectable_files
            )
        };
        self.set_status(MessageSeverity::Information, message);
        Ok(summary)
    }

    /*
     * Checks or unchecks a node. Returns false when nothing changed (non-selectable
     * node, or the value was already set). A change schedules an aggregation.
     */
    pub fn set_checked(&mut self, id: NodeId, checked: bool, now: Instant) -> Result<bool> {
        let tree = self.tree.as_mut().ok_or(SessionError::NoSolutionLoaded)?;
        if tree.get(id).is_none() {
            return Err(SessionError::UnknownNode(id));
        }
        let changed = tree.set_checked(id, checked);
        self.pump_tree_events(now);
        Ok(changed)
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Result<()> {
        let tree = self.tree.as_mut().ok_or(SessionError::NoSolutionLoaded)?;
        if tree.get(id).is_none() {
            return Err(SessionError::UnknownNode(id));
        }
        tree.set_expanded(id, expanded);
        self.pump_tree_events(Instant::now());
        Ok(())
    }

    /* Records the filter text and schedules a debounced re-filter. */
    pub fn set_filter_text(&mut self, text: &str, now: Instant) {
        self.filter_text = text.to_string();
        if self.tree.is_some() {
            self.filter.request(text, now);
        }
    }

    /*
     * Checks every file that is currently visible and selectable. With an active
     * filter this selects the matches; without one it selects everything.
     */
    pub fn check_visible_files(&mut self, now: Instant) -> Result<usize> {
        let tree = self.tree.as_mut().ok_or(SessionError::NoSolutionLoaded)?;
        let candidates: Vec<NodeId> = tree
            .post_order()
            .into_iter()
            .filter(|id| {
                let node = tree.node(*id);
                node.is_file() && node.selectable && node.is_visible() && !node.is_checked()
            })
            .collect();
        let mut changed = 0;
        for id in candidates {
            if tree.set_checked(id, true) {
                changed += 1;
            }
        }
        log::debug!("SolutionSession: Checked {changed} visible files.");
        self.pump_tree_events(now);
        Ok(changed)
    }

    /* Advances the debounced work that is due at `now`. Never blocks. */
    pub fn tick(&mut self, now: Instant) {
        if let Some(tree) = self.tree.as_mut() {
            if let Some(update) = self.filter.poll(tree, now) {
                self.events.push(SessionEvent::Filter(update));
            }
        }
        self.pump_tree_events(now);
        if self.aggregation_debounce.fire_if_due(now) {
            self.rebuild_export_list();
        }
        if self.status_expiry.fire_if_due(now) && self.status.take().is_some() {
            self.events.push(SessionEvent::StatusCleared);
        }
    }

    /* Completes pending filter and aggregation work immediately, waiting for the filter scan. */
    pub fn flush(&mut self) {
        if let Some(tree) = self.tree.as_mut() {
            if let Some(update) = self.filter.flush(tree) {
                self.events.push(SessionEvent::Filter(update));
            }
        }
        self.pump_tree_events(Instant::now());
        if self.aggregation_debounce.fire_now() {
            self.rebuild_export_list();
        }
    }

    pub fn export_to_file(&mut self, destination: &Path) -> Result<DumpStats> {
        let sink = FileExportSink::new(destination.to_path_buf());
        let stats = self.export_with(&sink)?;
        self.set_status(
            MessageSeverity::Information,
            format!(
                "Exported {} files to {}.",
                self.export_list.len(),
                destination.display()
            ),
        );
        Ok(stats)
    }

    pub fn export_to_clipboard(&mut self) -> Result<DumpStats> {
        let stats = self.export_with(&ClipboardExportSink::new())?;
        self.set_status(
            MessageSeverity::Information,
            format!("Copied {} files to the clipboard.", self.export_list.len()),
        );
        Ok(stats)
    }

    /* Token estimate of the dump the current export list would produce. */
    pub fn estimate_tokens(&mut self, counter: &dyn TokenCounterOperations) -> Result<usize> {
        self.settle_export_list();
        let header = self.dump_header()?;
        Ok(tokenizer_utils::estimate_dump_tokens(
            counter,
            &self.export_list.files,
            &header,
        )?)
    }

    fn export_with(&mut self, sink: &dyn ExportSink) -> Result<DumpStats> {
        self.settle_export_list();
        let header = self.dump_header()?;
        match sink.export(&self.export_list.files, &header) {
            Ok(stats) => {
                if stats.read_failures > 0 {
                    log::warn!(
                        "SolutionSession: {} files could not be read during export.",
                        stats.read_failures
                    );
                }
                Ok(stats)
            }
            Err(e) => {
                log::error!("SolutionSession: Export failed: {e}");
                self.set_status(MessageSeverity::Error, format!("Export failed: {e}"));
                Err(e.into())
            }
        }
    }

    fn dump_header(&mut self) -> Result<DumpHeader> {
        match self.solution_path.as_deref() {
            Some(path) => Ok(DumpHeader::for_solution(path)),
            None => {
                self.set_status(MessageSeverity::Warning, "No solution is loaded.".to_string());
                Err(SessionError::NoSolutionLoaded)
            }
        }
    }

    /* An export always uses the check state as it is now, not a pending aggregation. */
    fn settle_export_list(&mut self) {
        if self.aggregation_debounce.fire_now() {
            self.rebuild_export_list();
        }
    }

    fn pump_tree_events(&mut self, now: Instant) {
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let root = tree.root();
        let mut selection_changed = false;
        for event in tree.drain_events() {
            if event == TreeEvent::SubtreeCheckChanged(root) {
                selection_changed = true;
            }
            self.events.push(SessionEvent::Tree(event));
        }
        if selection_changed {
            self.aggregation_debounce.arm(now);
        }
    }

    fn rebuild_export_list(&mut self) {
        let Some(tree) = self.tree.as_ref() else {
            return;
        };
        self.export_list = self.aggregator.aggregate(tree);
        self.events.push(SessionEvent::ExportListChanged {
            file_count: self.export_list.len(),
            total_bytes: self.export_list.total_bytes,
        });
    }

    fn set_status(&mut self, severity: MessageSeverity, text: String) {
        match severity {
            MessageSeverity::Error => log::error!("SolutionSession: Status: {text}"),
            MessageSeverity::Warning => log::warn!("SolutionSession: Status: {text}"),
            MessageSeverity::Information => log::info!("SolutionSession: Status: {text}"),
        }
        let message = StatusMessage { severity, text };
        self.status = Some(message.clone());
        self.status_expiry.arm(Instant::now());
        self.events.push(SessionEvent::StatusChanged(message));
    }
}
