/*
 * Turns the check state of a `SelectionTree` into the ordered export list.
 *
 * Solution-level files (checked file nodes directly under the root) come first. Each
 * project then contributes its checked files as one block, split into four buckets
 * (manifest, properties, web assets, everything else) that are sorted independently
 * and appended in that fixed order. A path is only ever emitted once across the whole
 * list; the first block that contains it wins.
 */
use crate::core::path_utils;
use crate::core::selection_tree::{NodeId, SelectionTree};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/* Classification rules for project content. Prefixes are matched case-insensitively. */
#[derive(Debug, Clone)]
pub struct BucketRules {
    pub manifest_extensions: Vec<String>,
    pub properties_prefix: String,
    pub web_root_prefix: String,
}

impl Default for BucketRules {
    fn default() -> Self {
        BucketRules {
            manifest_extensions: vec![
                ".csproj".to_string(),
                ".vbproj".to_string(),
                ".fsproj".to_string(),
                ".vcxproj".to_string(),
                ".sqlproj".to_string(),
            ],
            properties_prefix: "Properties/".to_string(),
            web_root_prefix: "wwwroot/".to_string(),
        }
    }
}

impl BucketRules {
    pub fn is_manifest(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.manifest_extensions
            .iter()
            .any(|ext| name.ends_with(&ext.to_lowercase()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    Manifest,
    Properties,
    Web,
    Rest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportList {
    pub files: Vec<PathBuf>,
    pub total_bytes: u64,
}

impl ExportList {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct SelectionAggregator {
    rules: BucketRules,
    size_cache: HashMap<PathBuf, u64>,
}

impl SelectionAggregator {
    pub fn new(rules: BucketRules) -> Self {
        SelectionAggregator {
            rules,
            size_cache: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &BucketRules {
        &self.rules
    }

    /* Forgets cached file sizes. Called when a new solution is loaded. */
    pub fn clear_cache(&mut self) {
        self.size_cache.clear();
    }

    pub fn aggregate(&mut self, tree: &SelectionTree) -> ExportList {
        let files = self.ordered_files(tree);
        let total_bytes: u64 = files.iter().map(|path| self.file_size(path)).sum();
        log::debug!(
            "SelectionAggregator: {} files selected for export ({total_bytes} bytes).",
            files.len()
        );
        ExportList { files, total_bytes }
    }

    /* The deterministic export order for the tree's current check state. */
    pub fn ordered_files(&self, tree: &SelectionTree) -> Vec<PathBuf> {
        let mut emitted: HashSet<PathBuf> = HashSet::new();
        let mut files: Vec<PathBuf> = Vec::new();
        let mut push_unique = |path: &Path, files: &mut Vec<PathBuf>| {
            if emitted.insert(path.to_path_buf()) {
                files.push(path.to_path_buf());
            }
        };

        let root = tree.root();
        for child in tree.children(root) {
            let node = tree.node(*child);
            if node.is_file() && node.is_checked() && node.selectable {
                if let Some(path) = &node.path {
                    push_unique(path, &mut files);
                }
            }
        }

        for project in tree.children(root) {
            if tree.node(*project).is_file() {
                continue;
            }
            let checked = checked_files_in(tree, *project);
            if checked.is_empty() {
                continue;
            }
            for path in self.order_project_block(&checked) {
                push_unique(&path, &mut files);
            }
        }
        files
    }

    /*
     * Orders one project's checked files. The base directory is the directory of the
     * project manifest when it is checked, else that of the first checked file.
     */
    fn order_project_block(&self, checked: &[PathBuf]) -> Vec<PathBuf> {
        let base_dir = checked
            .iter()
            .find(|path| self.rules.is_manifest(path))
            .or_else(|| checked.first())
            .and_then(|path| path.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut buckets: [Vec<(String, PathBuf)>; 4] = Default::default();
        for path in checked {
            let relative = path_utils::relative_display_path(path, &base_dir);
            let bucket = self.classify(path, &relative);
            buckets[bucket as usize].push((relative, path.clone()));
        }

        let [mut manifest, mut properties, mut web, mut rest] = buckets;
        manifest.sort_by(|(_, a), (_, b)| {
            compare_ignore_case(&a.to_string_lossy(), &b.to_string_lossy())
        });
        for bucket in [&mut properties, &mut web, &mut rest] {
            bucket.sort_by(|(a, _), (b, _)| compare_ignore_case(a, b));
        }

        manifest
            .into_iter()
            .chain(properties)
            .chain(web)
            .chain(rest)
            .map(|(_, path)| path)
            .collect()
    }

    pub fn classify(&self, path: &Path, relative: &str) -> Bucket {
        if self.rules.is_manifest(path) {
            Bucket::Manifest
        } else if starts_with_ignore_case(relative, &self.rules.properties_prefix) {
            Bucket::Properties
        } else if starts_with_ignore_case(relative, &self.rules.web_root_prefix) {
            Bucket::Web
        } else {
            Bucket::Rest
        }
    }

    fn file_size(&mut self, path: &Path) -> u64 {
        if let Some(size) = self.size_cache.get(path) {
            return *size;
        }
        match fs::metadata(path) {
            Ok(metadata) => {
                self.size_cache.insert(path.to_path_buf(), metadata.len());
                metadata.len()
            }
            Err(e) => {
                log::trace!("SelectionAggregator: No size for {path:?}: {e}");
                0
            }
        }
    }
}

/* Checked, selectable file nodes under `id` in tree order. */
fn checked_files_in(tree: &SelectionTree, id: NodeId) -> Vec<PathBuf> {
    tree.descendants(id)
        .into_iter()
        .map(|descendant| tree.node(descendant))
        .filter(|node| node.is_file() && node.selectable && node.is_checked())
        .filter_map(|node| node.path.clone())
        .collect()
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    !prefix.is_empty() && text.to_uppercase().starts_with(&prefix.to_uppercase())
}

/* Ordinal comparison with upper-case folding; equal keys fall back to raw ordinal. */
pub fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_uppercase()
        .cmp(&b.to_uppercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selection_tree::{NodeKind, TreeNode};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn add_file(tree: &mut SelectionTree, parent: NodeId, path: &str) -> NodeId {
        let name = Path::new(path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        tree.add_child(parent, TreeNode::file(name, PathBuf::from(path), Some(1)))
    }

    fn paths(list: &[PathBuf]) -> Vec<String> {
        list.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    }

    fn manifest_rules() -> BucketRules {
        BucketRules {
            manifest_extensions: vec![".manifest".to_string(), ".csproj".to_string()],
            ..BucketRules::default()
        }
    }

    #[test]
    fn test_buckets_are_emitted_in_fixed_order() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        add_file(&mut tree, project, "/p/Services/Thing.src");
        add_file(&mut tree, project, "/p/wwwroot/app.js");
        add_file(&mut tree, project, "/p/Properties/launch.json");
        add_file(&mut tree, project, "/p/App.manifest");
        tree.set_checked(project, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        assert_eq!(
            paths(&aggregator.ordered_files(&tree)),
            vec![
                "/p/App.manifest",
                "/p/Properties/launch.json",
                "/p/wwwroot/app.js",
                "/p/Services/Thing.src"
            ]
        );
    }

    #[test]
    fn test_buckets_are_sorted_case_insensitively_by_relative_path() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        add_file(&mut tree, project, "/p/zeta.cs");
        add_file(&mut tree, project, "/p/Alpha.cs");
        add_file(&mut tree, project, "/p/beta/Gamma.cs");
        add_file(&mut tree, project, "/p/properties/z.json");
        add_file(&mut tree, project, "/p/Properties/A.json");
        tree.set_checked(project, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        assert_eq!(
            paths(&aggregator.ordered_files(&tree)),
            vec![
                "/p/Properties/A.json",
                "/p/properties/z.json",
                "/p/Alpha.cs",
                "/p/beta/Gamma.cs",
                "/p/zeta.cs"
            ]
        );
    }

    #[test]
    fn test_base_dir_comes_from_checked_manifest() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        // First file lives in a sub folder; without the manifest the base would be /p/wwwroot.
        add_file(&mut tree, project, "/p/wwwroot/site.css");
        add_file(&mut tree, project, "/p/App.csproj");
        add_file(&mut tree, project, "/p/Code.cs");
        tree.set_checked(project, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        assert_eq!(
            paths(&aggregator.ordered_files(&tree)),
            vec!["/p/App.csproj", "/p/wwwroot/site.css", "/p/Code.cs"]
        );
    }

    #[test]
    fn test_solution_level_files_lead_and_unchecked_projects_are_skipped() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let sln = add_file(&mut tree, root, "/s/All.sln");
        let first = tree.add_child(root, TreeNode::folder("First", NodeKind::Project));
        add_file(&mut tree, first, "/s/first/a.cs");
        let second = tree.add_child(root, TreeNode::folder("Second", NodeKind::Project));
        let b = add_file(&mut tree, second, "/s/second/b.cs");
        tree.set_checked(b, true);
        tree.set_checked(sln, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        assert_eq!(
            paths(&aggregator.ordered_files(&tree)),
            vec!["/s/All.sln", "/s/second/b.cs"]
        );
    }

    #[test]
    fn test_shared_file_is_attributed_to_first_project() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let first = tree.add_child(root, TreeNode::folder("First", NodeKind::Project));
        add_file(&mut tree, first, "/s/first/z.cs");
        add_file(&mut tree, first, "/s/shared/Linked.cs");
        let second = tree.add_child(root, TreeNode::folder("Second", NodeKind::Project));
        add_file(&mut tree, second, "/s/shared/Linked.cs");
        add_file(&mut tree, second, "/s/second/a.cs");
        tree.set_checked(root, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        let files = aggregator.ordered_files(&tree);
        assert_eq!(
            paths(&files),
            vec!["/s/shared/Linked.cs", "/s/first/z.cs", "/s/second/a.cs"]
        );
    }

    #[test]
    fn test_non_selectable_files_never_exported() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        add_file(&mut tree, project, "/p/small.cs");
        tree.add_child(
            project,
            TreeNode::file("huge.cs", "/p/huge.cs".into(), Some(2000)).excluded("too large"),
        );
        tree.set_checked(root, true);

        let aggregator = SelectionAggregator::new(manifest_rules());
        assert_eq!(paths(&aggregator.ordered_files(&tree)), vec!["/p/small.cs"]);
    }

    #[test]
    fn test_repeated_aggregation_is_deterministic() {
        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        for name in ["c.cs", "B.cs", "a.cs", "Properties/x.json", "wwwroot/i.js"] {
            add_file(&mut tree, project, &format!("/p/{name}"));
        }
        tree.set_checked(project, true);

        let mut aggregator = SelectionAggregator::new(manifest_rules());
        let first = aggregator.aggregate(&tree);
        for _ in 0..5 {
            assert_eq!(aggregator.aggregate(&tree), first);
        }
    }

    #[test]
    fn test_total_bytes_counts_existing_files_only() -> std::io::Result<()> {
        let dir = tempdir()?;
        let present = dir.path().join("present.cs");
        File::create(&present)?.write_all(b"12345")?;
        let missing = dir.path().join("missing.cs");

        let mut tree = SelectionTree::new("Solution");
        let root = tree.root();
        let project = tree.add_child(root, TreeNode::folder("P", NodeKind::Project));
        tree.add_child(project, TreeNode::file("present.cs", present.clone(), None));
        tree.add_child(project, TreeNode::file("missing.cs", missing.clone(), None));
        tree.set_checked(project, true);

        let mut aggregator = SelectionAggregator::new(BucketRules::default());
        let list = aggregator.aggregate(&tree);
        assert_eq!(list.len(), 2);
        assert_eq!(list.total_bytes, 5);

        // Sizes are cached for the lifetime of the loaded solution.
        File::create(&present)?.write_all(b"1234567890")?;
        assert_eq!(aggregator.aggregate(&tree).total_bytes, 5);
        aggregator.clear_cache();
        assert_eq!(aggregator.aggregate(&tree).total_bytes, 10);
        Ok(())
    }

    #[test]
    fn test_compare_ignore_case_folds_to_upper() {
        assert_eq!(compare_ignore_case("abc", "ABD"), Ordering::Less);
        assert_eq!(compare_ignore_case("a_b", "aab"), Ordering::Greater);
        assert_eq!(compare_ignore_case("A", "a"), Ordering::Less);
    }
}
