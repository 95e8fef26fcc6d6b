/*
 * Assembles a `SelectionTree` for a resolved solution.
 *
 * Layout: the synthetic root is named after the solution. Its first children are the
 * solution-level files (the solution descriptor itself plus configured well-known files
 * next to it), followed by one project node per `ProjectDescriptor`. Under a project,
 * candidate files are inserted in enumeration order, creating intermediate folder nodes
 * on first use. Files over the size limit become non-selectable nodes with a tooltip.
 */
use crate::core::config::{self, AppSettings};
use crate::core::file_enumerator::{CandidateFile, EnumerationRules, FileEnumeratorOperations};
use crate::core::selection_tree::{NodeId, NodeKind, SelectionTree, TreeNode};
use crate::core::solution_resolver::ProjectDescriptor;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub projects: usize,
    pub nodes: usize,
    pub selectable_files: usize,
    pub excluded_files: usize,
}

pub struct TreeBuilder<'a> {
    enumerator: &'a dyn FileEnumeratorOperations,
    settings: &'a AppSettings,
    rules: EnumerationRules,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(enumerator: &'a dyn FileEnumeratorOperations, settings: &'a AppSettings) -> Self {
        TreeBuilder {
            enumerator,
            settings,
            rules: settings.enumeration_rules(),
        }
    }

    pub fn build(
        &self,
        solution_path: &Path,
        projects: &[ProjectDescriptor],
    ) -> (SelectionTree, TreeSummary) {
        let root_name = solution_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| solution_path.to_string_lossy().into_owned());
        let mut tree = SelectionTree::new(root_name);
        let mut summary = TreeSummary::default();
        let root = tree.root();

        self.add_solution_level_files(&mut tree, solution_path, &mut summary);

        for project in projects {
            let project_node =
                tree.add_child(root, TreeNode::folder(project.name.clone(), NodeKind::Project));
            summary.projects += 1;
            self.populate_project(&mut tree, project_node, project, &mut summary);
        }

        summary.nodes = tree.len();
        log::info!(
            "TreeBuilder: Built tree with {} projects, {} nodes ({} selectable files, {} excluded).",
            summary.projects,
            summary.nodes,
            summary.selectable_files,
            summary.excluded_files
        );
        (tree, summary)
    }

    fn add_solution_level_files(
        &self,
        tree: &mut SelectionTree,
        solution_path: &Path,
        summary: &mut TreeSummary,
    ) {
        let root = tree.root();
        let size = fs::metadata(solution_path).ok().map(|m| m.len());
        self.add_file(tree, root, solution_path, size, summary);

        let Some(solution_dir) = solution_path.parent() else {
            return;
        };
        let entries = match fs::read_dir(solution_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("TreeBuilder: Cannot list solution directory {solution_dir:?}: {e}");
                return;
            }
        };
        let mut extra: Vec<CandidateFile> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path() != solution_path)
            .filter(|entry| config::is_solution_level_file(self.settings, &entry.path()))
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                metadata.is_file().then(|| CandidateFile {
                    path: entry.path(),
                    size_bytes: metadata.len(),
                })
            })
            .collect();
        extra.sort_by(|a, b| a.path.cmp(&b.path));
        for file in extra {
            self.add_file(tree, root, &file.path, Some(file.size_bytes), summary);
        }
    }

    fn populate_project(
        &self,
        tree: &mut SelectionTree,
        project_node: NodeId,
        project: &ProjectDescriptor,
        summary: &mut TreeSummary,
    ) {
        let project_dir = project.project_dir();
        let candidates = match self.enumerator.enumerate(project_dir, &self.rules) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!(
                    "TreeBuilder: Skipping content of project '{}': {e}",
                    project.name
                );
                return;
            }
        };

        let mut folders: HashMap<(NodeId, String), NodeId> = HashMap::new();
        let mut saw_manifest = false;
        for candidate in candidates {
            let relative = candidate
                .path
                .strip_prefix(project_dir)
                .unwrap_or(&candidate.path);
            let mut parent = project_node;
            if let Some(folder_path) = relative.parent() {
                for component in folder_path.components() {
                    let Component::Normal(segment) = component else {
                        continue;
                    };
                    let key = (parent, segment.to_string_lossy().into_owned());
                    parent = match folders.get(&key) {
                        Some(existing) => *existing,
                        None => {
                            let folder = TreeNode::folder(key.1.clone(), NodeKind::Folder);
                            let created = tree.add_child(parent, folder);
                            folders.insert(key, created);
                            created
                        }
                    };
                }
            }
            saw_manifest |= candidate.path == project.manifest_path;
            self.add_file(tree, parent, &candidate.path, Some(candidate.size_bytes), summary);
        }

        if !saw_manifest {
            // The manifest is always offered, even when its extension is not in the allow-list.
            let size = fs::metadata(&project.manifest_path).ok().map(|m| m.len());
            self.add_file(tree, project_node, &project.manifest_path, size, summary);
        }
    }

    fn add_file(
        &self,
        tree: &mut SelectionTree,
        parent: NodeId,
        path: &Path,
        size: Option<u64>,
        summary: &mut TreeSummary,
    ) -> NodeId {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut node = TreeNode::file(name, path.to_path_buf(), size);
        match size {
            Some(bytes) if self.rules.exceeds_size_limit(bytes) => {
                node = node.excluded(format!(
                    "Excluded by size limit ({bytes} bytes > {} bytes)",
                    self.rules.max_file_size
                ));
                summary.excluded_files += 1;
            }
            _ => summary.selectable_files += 1,
        }
        tree.add_child(parent, node)
    }
}
