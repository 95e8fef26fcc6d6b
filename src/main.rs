use clap::{ArgAction, Parser};
use simplelog::LevelFilter;
use solution_packer::app_logic::{SessionError, SolutionSession};
use solution_packer::core::config::{self, CoreConfigManager};
use solution_packer::core::{
    CheckState, CoreFileEnumerator, CoreSolutionResolver, CoreTikTokenCounter, NodeId,
    SelectionTree,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

/* Packs the checked files of a solution into one text dump. */
#[derive(Parser, Debug)]
#[command(name = "solution_packer", version, about)]
struct Cli {
    /// Solution (.sln, .slnx) or project manifest to open.
    solution: PathBuf,

    /// Only select files whose name or path contains this text (case-insensitive).
    #[arg(long, value_name = "TERM")]
    filter: Option<String>,

    /// Select every selectable file, even when a filter is given.
    #[arg(long)]
    all: bool,

    /// Write the dump to this file.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Copy the dump to the system clipboard.
    #[arg(long)]
    clipboard: bool,

    /// Print the visible part of the tree with check marks.
    #[arg(long)]
    tree: bool,

    /// Override the maximum size of a selectable file.
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Print a token estimate of the dump.
    #[arg(long)]
    estimate_tokens: bool,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    solution_packer::initialize_cli_logging(level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), SessionError> {
    let mut settings = config::load_settings_or_default(&CoreConfigManager::new());
    if let Some(max_size) = cli.max_size {
        settings.max_file_size_bytes = max_size;
    }
    let resolver = CoreSolutionResolver::new(settings.manifest_extensions.clone());
    let mut session = SolutionSession::new(
        Arc::new(resolver),
        Arc::new(CoreFileEnumerator::new()),
        settings,
    );

    let summary = session.load_solution(&cli.solution)?;
    log::info!(
        "Main: {} projects, {} selectable files, {} over the size limit.",
        summary.projects,
        summary.selectable_files,
        summary.excluded_files
    );

    let filter = cli.filter.as_deref().unwrap_or("");
    if !filter.trim().is_empty() {
        session.set_filter_text(filter, Instant::now());
        session.flush();
    }
    if cli.all || filter.trim().is_empty() {
        let root = session
            .tree()
            .map(SelectionTree::root)
            .ok_or(SessionError::NoSolutionLoaded)?;
        session.set_checked(root, true, Instant::now())?;
    } else {
        let checked = session.check_visible_files(Instant::now())?;
        log::info!("Main: {checked} files match '{filter}'.");
    }
    session.flush();

    if cli.tree {
        if let Some(tree) = session.tree() {
            print_tree(tree, tree.root(), 0);
        }
    }

    let export_list = session.export_list();
    println!(
        "{} files selected ({} bytes).",
        export_list.len(),
        export_list.total_bytes
    );

    if cli.estimate_tokens {
        let tokens = session.estimate_tokens(&CoreTikTokenCounter::new())?;
        println!("Estimated tokens: {tokens}");
    }

    let exporting = cli.output.is_some() || cli.clipboard;
    if let Some(output) = &cli.output {
        let stats = session.export_to_file(output)?;
        println!(
            "Wrote {} files to {} ({} unreadable).",
            stats.files_written,
            output.display(),
            stats.read_failures
        );
    }
    if cli.clipboard {
        let stats = session.export_to_clipboard()?;
        println!("Copied {} files to the clipboard.", stats.files_written);
    }
    if !exporting {
        for path in &session.export_list().files {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn print_tree(tree: &SelectionTree, id: NodeId, depth: usize) {
    let node = tree.node(id);
    if !node.is_visible() {
        return;
    }
    let mark = match node.check_state() {
        CheckState::Checked => "[x]",
        CheckState::Unchecked => "[ ]",
        CheckState::Indeterminate => "[-]",
    };
    let note = match &node.tooltip {
        Some(tooltip) if !node.selectable => format!("  ({tooltip})"),
        _ => String::new(),
    };
    println!("{}{mark} {}{note}", "  ".repeat(depth), node.name);
    for child in tree.children(id) {
        print_tree(tree, *child, depth + 1);
    }
}
