/*
 * The tri-state checkbox tree that backs the project browser.
 *
 * Nodes live in an arena (`Vec<TreeNode>`) and refer to each other through `NodeId`.
 * A node owns the ordered list of its children's ids; the parent link is a plain id
 * used only for upward propagation, so the ownership graph stays a strict tree and
 * the whole structure is dropped in one go when a new solution is loaded.
 *
 * All mutation happens on the owning thread. Observers are not called back during a
 * mutation; instead every change is queued as a `TreeEvent` and the owner drains the
 * queue once the mutation has finished.
 */
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_VERSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/*
 * Check value of a node. `Indeterminate` is only ever derived from children; the
 * public setter takes a `bool` so callers cannot request it.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    Checked,
    #[default]
    Unchecked,
    Indeterminate,
}

impl CheckState {
    fn from_bool(checked: bool) -> Self {
        if checked {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Project,
    Folder,
    File,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    /* Present for files only. */
    pub path: Option<PathBuf>,
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub tooltip: Option<String>,
    pub selectable: bool,
    check: CheckState,
    visible: bool,
    expanded: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TreeNode {
    pub fn folder(name: impl Into<String>, kind: NodeKind) -> Self {
        TreeNode {
            name: name.into(),
            path: None,
            kind,
            size: None,
            tooltip: None,
            selectable: true,
            check: CheckState::Unchecked,
            visible: true,
            expanded: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn file(name: impl Into<String>, path: PathBuf, size: Option<u64>) -> Self {
        TreeNode {
            path: Some(path),
            size,
            ..TreeNode::folder(name, NodeKind::File)
        }
    }

    /* Marks the node as excluded from selection, with an explanation for the UI. */
    pub fn excluded(mut self, tooltip: impl Into<String>) -> Self {
        self.selectable = false;
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn check_state(&self) -> CheckState {
        self.check
    }

    pub fn is_checked(&self) -> bool {
        self.check == CheckState::Checked
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/*
 * Outbound notifications, queued in mutation order and drained by the owner.
 * `SubtreeCheckChanged` is emitted for every ancestor of a changed node up to the root,
 * whether or not the ancestor's own value changed.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    CheckStateChanged(NodeId),
    SubtreeCheckChanged(NodeId),
    VisibilityChanged(NodeId),
    ExpansionChanged(NodeId),
}

#[derive(Debug)]
pub struct SelectionTree {
    nodes: Vec<TreeNode>,
    version: u64,
    events: Vec<TreeEvent>,
}

impl SelectionTree {
    /*
     * Creates a tree holding only the synthetic root. Every tree gets a fresh,
     * process-unique version so that derived snapshots can tell trees apart.
     */
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut root = TreeNode::folder(root_name, NodeKind::Root);
        root.expanded = true;
        SelectionTree {
            nodes: vec![root],
            version: NEXT_TREE_VERSION.fetch_add(1, Ordering::Relaxed),
            events: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /* Appends `node` as the last child of `parent`. */
    pub fn add_child(&mut self, parent: NodeId, mut node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /* Ancestors from the immediate parent up to and including the root. */
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /* Pre-order walk of the subtree rooted at `id`, excluding `id` itself. */
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        result
    }

    /* Post-order over the whole tree: every child precedes its parent. */
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root(), false)];
        while let Some((current, children_done)) = stack.pop() {
            if children_done {
                result.push(current);
                continue;
            }
            stack.push((current, true));
            for child in self.children(current).iter().rev() {
                stack.push((*child, false));
            }
        }
        result
    }

    pub fn find_by_path(&self, path: &Path) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.path.as_deref() == Some(path))
            .map(NodeId)
    }

    /*
     * Sets the check value of a node and propagates it.
     *
     * Returns false without doing anything when the node is not selectable or already
     * holds the requested value. Otherwise: every selectable descendant is forced to the
     * same value, ancestors are recomputed bottom-up until a level no longer changes,
     * and `SubtreeCheckChanged` is queued for the node and each ancestor up to the root.
     */
    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> bool {
        let node = &self.nodes[id.0];
        if !node.selectable {
            log::trace!("SelectionTree: Ignoring check change on non-selectable node {id:?}.");
            return false;
        }
        let target = CheckState::from_bool(checked);
        if node.check == target {
            return false;
        }

        self.nodes[id.0].check = target;
        self.events.push(TreeEvent::CheckStateChanged(id));

        for descendant in self.descendants(id) {
            let child = &mut self.nodes[descendant.0];
            if child.selectable && child.check != target {
                child.check = target;
                self.events.push(TreeEvent::CheckStateChanged(descendant));
            }
        }

        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            let derived = self.derive_from_children(ancestor);
            if derived == self.nodes[ancestor.0].check {
                break;
            }
            self.nodes[ancestor.0].check = derived;
            self.events.push(TreeEvent::CheckStateChanged(ancestor));
            current = self.parent(ancestor);
        }

        // The changed node itself starts the chain, so checking the root still signals.
        let chain: Vec<NodeId> = std::iter::once(id).chain(self.ancestors(id)).collect();
        self.events
            .extend(chain.into_iter().map(TreeEvent::SubtreeCheckChanged));
        true
    }

    /*
     * Value a parent should hold given its selectable children. A node without
     * selectable children keeps its current value, which is never Indeterminate.
     */
    fn derive_from_children(&self, id: NodeId) -> CheckState {
        let mut states = self.children(id).iter().filter_map(|child| {
            let node = &self.nodes[child.0];
            node.selectable.then_some(node.check)
        });
        let Some(first) = states.next() else {
            return match self.nodes[id.0].check {
                CheckState::Indeterminate => CheckState::Unchecked,
                other => other,
            };
        };
        if first == CheckState::Indeterminate {
            return CheckState::Indeterminate;
        }
        if states.all(|state| state == first) {
            first
        } else {
            CheckState::Indeterminate
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let node = &mut self.nodes[id.0];
        if node.visible != visible {
            node.visible = visible;
            self.events.push(TreeEvent::VisibilityChanged(id));
        }
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        let node = &mut self.nodes[id.0];
        if node.expanded != expanded {
            node.expanded = expanded;
            self.events.push(TreeEvent::ExpansionChanged(id));
        }
    }

    /* Ids of all checked nodes, in arena order. */
    pub fn checked_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_checked())
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }
}
