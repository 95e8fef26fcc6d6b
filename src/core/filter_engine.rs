/*
 * Drives text filtering of the selection tree as a small state machine:
 *
 *   Idle -> Scheduled -> Computing -> Applied
 *
 * A request arms a debounce delay (Scheduled); further requests while Scheduled
 * restart it. When the delay expires, a non-blank term is handed to a worker thread
 * together with the shared `FlatIndex` snapshot and a cancel flag (Computing). A new
 * request while Computing raises the flag and drops the result channel, so a late
 * result is never seen. Results are applied to the live tree by the owner in `poll`,
 * and only when the snapshot version still equals the tree version.
 *
 * A blank term needs no scan and is applied directly on the owner thread: all nodes
 * become visible and expansion is reset to the ancestors of checked nodes.
 */
use crate::core::debounce::Debouncer;
use crate::core::flat_index::{FilterCancelled, FlatIndex, VisibilityResult};
use crate::core::selection_tree::SelectionTree;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    Idle,
    Scheduled,
    Computing,
    Applied,
}

/* What `poll` did this round, for the presentation layer. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    Applied { term: String, visible_nodes: usize },
    Cleared,
    Discarded,
}

type ScanOutcome = Result<VisibilityResult, FilterCancelled>;

struct InFlightScan {
    cancel: Arc<AtomicBool>,
    receiver: Receiver<ScanOutcome>,
    term: String,
}

pub struct FilterEngine {
    phase: FilterPhase,
    pending_term: String,
    active_term: String,
    debounce: Debouncer,
    index: Arc<FlatIndex>,
    in_flight: Option<InFlightScan>,
}

impl FilterEngine {
    pub fn new(debounce_delay: Duration) -> Self {
        FilterEngine {
            phase: FilterPhase::Idle,
            pending_term: String::new(),
            active_term: String::new(),
            debounce: Debouncer::new(debounce_delay),
            index: Arc::new(FlatIndex::default()),
            in_flight: None,
        }
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    /* The term whose results are currently applied to the tree. */
    pub fn active_term(&self) -> &str {
        &self.active_term
    }

    pub fn pending_term(&self) -> &str {
        &self.pending_term
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /*
     * Replaces the snapshot after the tree structure changed (a new solution was loaded).
     * Any in-flight scan belongs to the old tree and is cancelled together with it.
     */
    pub fn rebuild_index(&mut self, tree: &SelectionTree) {
        self.cancel_in_flight();
        self.index = Arc::new(FlatIndex::build(tree));
        self.debounce.cancel();
        self.pending_term.clear();
        self.active_term.clear();
        self.phase = FilterPhase::Idle;
    }

    pub fn request(&mut self, term: &str, now: Instant) {
        if self.phase == FilterPhase::Computing {
            log::debug!(
                "FilterEngine: Superseding in-flight scan for '{}'.",
                self.in_flight.as_ref().map_or("", |scan| scan.term.as_str())
            );
            self.cancel_in_flight();
        }
        self.pending_term = term.to_string();
        self.debounce.arm(now);
        self.phase = FilterPhase::Scheduled;
    }

    /*
     * Advances the state machine: starts the scan once the debounce has expired and
     * applies a finished scan. Never blocks.
     */
    pub fn poll(&mut self, tree: &mut SelectionTree, now: Instant) -> Option<FilterUpdate> {
        if self.phase == FilterPhase::Scheduled && self.debounce.fire_if_due(now) {
            if let Some(update) = self.start(tree) {
                return Some(update);
            }
        }
        if self.phase != FilterPhase::Computing {
            return None;
        }
        let outcome = match self.in_flight.as_ref().map(|scan| scan.receiver.try_recv()) {
            Some(Ok(outcome)) => outcome,
            Some(Err(TryRecvError::Empty)) => return None,
            Some(Err(TryRecvError::Disconnected)) | None => {
                log::warn!("FilterEngine: Filter worker went away without a result.");
                self.in_flight = None;
                self.phase = FilterPhase::Idle;
                return Some(FilterUpdate::Discarded);
            }
        };
        Some(self.finish(tree, outcome))
    }

    /*
     * Brings any pending request to completion, waiting for the worker if needed.
     * Used where there is no interactive loop to poll from.
     */
    pub fn flush(&mut self, tree: &mut SelectionTree) -> Option<FilterUpdate> {
        if self.phase == FilterPhase::Scheduled && self.debounce.fire_now() {
            if let Some(update) = self.start(tree) {
                return Some(update);
            }
        }
        if self.phase != FilterPhase::Computing {
            return None;
        }
        let outcome = match self.in_flight.as_ref().map(|scan| scan.receiver.recv()) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) | None => {
                log::warn!("FilterEngine: Filter worker went away without a result.");
                self.in_flight = None;
                self.phase = FilterPhase::Idle;
                return Some(FilterUpdate::Discarded);
            }
        };
        Some(self.finish(tree, outcome))
    }

    fn start(&mut self, tree: &mut SelectionTree) -> Option<FilterUpdate> {
        let term = self.pending_term.clone();
        if term.trim().is_empty() {
            apply_blank_filter(tree);
            self.active_term.clear();
            self.phase = FilterPhase::Applied;
            return Some(FilterUpdate::Cleared);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel();
        let index = Arc::clone(&self.index);
        let worker_cancel = Arc::clone(&cancel);
        let worker_term = term.clone();
        let spawned = thread::Builder::new()
            .name("filter-scan".to_string())
            .spawn(move || {
                let outcome = index.compute_visibility(&worker_term, &worker_cancel);
                // The receiver is gone when the scan was superseded.
                let _ = sender.send(outcome);
            });

        match spawned {
            Ok(_) => {
                log::trace!("FilterEngine: Started background scan for '{term}'.");
                self.in_flight = Some(InFlightScan {
                    cancel,
                    receiver,
                    term,
                });
                self.phase = FilterPhase::Computing;
                None
            }
            Err(e) => {
                log::warn!("FilterEngine: Could not spawn filter worker ({e}), scanning inline.");
                let outcome = self.index.compute_visibility(&term, &cancel);
                Some(self.finish(tree, outcome))
            }
        }
    }

    fn finish(&mut self, tree: &mut SelectionTree, outcome: ScanOutcome) -> FilterUpdate {
        self.in_flight = None;
        match outcome {
            Ok(result) if result.version == tree.version() && result.version == self.index.version() => {
                let visible_nodes = apply_visibility(tree, &self.index, &result);
                self.active_term = result.term.clone();
                self.phase = FilterPhase::Applied;
                log::debug!(
                    "FilterEngine: Applied filter '{}' ({visible_nodes} visible nodes).",
                    result.term
                );
                FilterUpdate::Applied {
                    term: result.term,
                    visible_nodes,
                }
            }
            Ok(result) => {
                log::debug!(
                    "FilterEngine: Dropping result for stale tree version {} (current {}).",
                    result.version,
                    tree.version()
                );
                self.phase = FilterPhase::Idle;
                FilterUpdate::Discarded
            }
            Err(FilterCancelled) => {
                self.phase = FilterPhase::Idle;
                FilterUpdate::Discarded
            }
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(scan) = self.in_flight.take() {
            scan.cancel.store(true, Ordering::Relaxed);
        }
        if self.phase == FilterPhase::Computing {
            self.phase = FilterPhase::Idle;
        }
    }
}

impl Drop for FilterEngine {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

/* Applies a scan result in snapshot order. Returns the number of visible nodes. */
fn apply_visibility(tree: &mut SelectionTree, index: &FlatIndex, result: &VisibilityResult) -> usize {
    let mut visible_nodes = 0;
    for (slot, visible) in result.visible.iter().copied().enumerate() {
        let id = index.node_at(slot);
        tree.set_visible(id, visible);
        if visible {
            tree.set_expanded(id, true);
            visible_nodes += 1;
        }
    }
    visible_nodes
}

/*
 * Shows every node and collapses everything except the ancestors of checked nodes, so
 * the user sees their selection without the whole tree open. The root stays expanded.
 */
pub fn apply_blank_filter(tree: &mut SelectionTree) {
    let mut keep_expanded: HashSet<_> = tree
        .checked_nodes()
        .into_iter()
        .flat_map(|id| tree.ancestors(id).collect::<Vec<_>>())
        .collect();
    keep_expanded.insert(tree.root());

    for id in tree.post_order() {
        tree.set_visible(id, true);
        tree.set_expanded(id, keep_expanded.contains(&id));
    }
}
