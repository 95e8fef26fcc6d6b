/*
 * This module consolidates the core, UI-agnostic logic of the application: resolving
 * a solution into projects, enumerating project files, the tri-state selection tree,
 * the background filter, aggregation of checked files into an export order, and
 * writing the export dump. Abstractions at the I/O seams (`SolutionResolverOperations`,
 * `FileEnumeratorOperations`, `ConfigManagerOperations`, `TokenCounterOperations`)
 * let the session layer be tested with mocks.
 */
pub mod aggregation;
pub mod config;
pub mod debounce;
pub mod exporter;
pub mod file_enumerator;
pub mod filter_engine;
pub mod flat_index;
pub mod path_utils;
pub mod selection_tree;
pub mod solution_resolver;
pub mod tokenizer_utils;
pub mod tree_builder;

// Selection tree
pub use selection_tree::{CheckState, NodeId, NodeKind, SelectionTree, TreeEvent, TreeNode};

// Filtering
pub use debounce::Debouncer;
pub use filter_engine::{FilterEngine, FilterPhase, FilterUpdate};
pub use flat_index::{FilterCancelled, FlatIndex, VisibilityResult};

// Aggregation
pub use aggregation::{Bucket, BucketRules, ExportList, SelectionAggregator};

// Export
pub use exporter::{
    ClipboardExportSink, DumpHeader, DumpStats, ExportError, ExportSink, FileExportSink,
};

// Loading
pub use file_enumerator::{
    CandidateFile, CoreFileEnumerator, EnumerationRules, FileEnumeratorOperations,
    FileSystemError,
};
pub use solution_resolver::{
    CoreSolutionResolver, ProjectDescriptor, ResolutionError, SolutionResolverOperations,
};
pub use tree_builder::{TreeBuilder, TreeSummary};

// Configuration
pub use config::{AppSettings, ConfigError, ConfigManagerOperations, CoreConfigManager};

pub use tokenizer_utils::{CoreTikTokenCounter, TokenCounterOperations};
