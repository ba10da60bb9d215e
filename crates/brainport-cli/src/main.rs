//! Brainport CLI
//!
//! - `import`: two-phase, resumable import of an exported knowledge graph
//! - `status`: offline progress report for a state directory
//! - `ping`: connection and credential check against the destination brain

use anyhow::{Context, Result};
use brainport_checkpoint::FileCheckpointStore;
use brainport_import::{ImportOptions, ImportReport, Importer};
use brainport_remote::{EndpointLayout, HttpGraphClient};
use brainport_source::{batch_file_path, load_batch_file, load_source_graph, SourceGraph};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod status;

use config::BrainportConfig;
use status::StatusReport;

const LOG_ENV: &str = "BRAINPORT_LOG";
const VERBOSE_FILTER: &str = "info,brainport=debug,brainport_source=debug,brainport_checkpoint=debug,brainport_remote=debug,brainport_import=debug";

#[derive(Parser)]
#[command(name = "brainport")]
#[command(
    author,
    version,
    about = "Brainport: resumable knowledge-graph import with ID remapping"
)]
struct Cli {
    /// JSON config file (every key optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging for brainport crates
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import thoughts, then links, resuming from the state directory.
    ///
    /// Safe to re-run: thoughts already in the ID mapping and links already
    /// in the ledger are skipped.
    Import(ImportArgs),

    /// Show how far an import has progressed (no network access).
    Status(StatusArgs),

    /// Check connectivity and credentials against the destination brain.
    Ping {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Service base URL, e.g. https://api.example.com/v1
    #[arg(long)]
    base_url: Option<String>,
    /// Destination brain id
    #[arg(long)]
    brain_id: Option<String>,
    /// Endpoint layout: nested (/brains/{id}/thoughts) or flat (/thoughts/{id})
    #[arg(long)]
    layout: Option<EndpointLayout>,
    /// Per-request timeout
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Import `import_batch_<BATCH>.json` from the batch dir instead of the full export
    batch: Option<u32>,
    /// Full export JSON
    #[arg(long)]
    source: Option<PathBuf>,
    /// Directory holding numbered batch files
    #[arg(long)]
    batch_dir: Option<PathBuf>,
    /// Checkpoint directory (ID mapping, progress, link ledger, failures)
    #[arg(long)]
    state_dir: Option<PathBuf>,
    #[command(flatten)]
    remote: RemoteArgs,
    /// Pause after every remote call
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Flush state after this many successful creates
    #[arg(long)]
    checkpoint_every: Option<usize>,
    /// Stop after this many thought attempts
    #[arg(long)]
    max_thoughts: Option<usize>,
    /// Stop after this many link attempts
    #[arg(long)]
    max_links: Option<usize>,
    /// Only import thoughts
    #[arg(long)]
    no_links: bool,
    /// Do not attach notes
    #[arg(long)]
    no_notes: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Full export JSON
    #[arg(long)]
    source: Option<PathBuf>,
    /// Checkpoint directory
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = cli
        .config
        .as_deref()
        .map(BrainportConfig::load)
        .transpose()?;
    let env = BrainportConfig::from_env(|key| std::env::var(key).ok());

    match cli.command {
        Commands::Import(args) => {
            let layer = import_layer(&args);
            let cfg = BrainportConfig::resolve(file, env, layer);
            cmd_import(&cfg, &args)?;
        }
        Commands::Status(args) => {
            let layer = BrainportConfig {
                source: args.source,
                state_dir: args.state_dir,
                ..Default::default()
            };
            let cfg = BrainportConfig::resolve(file, env, layer);
            cmd_status(&cfg)?;
        }
        Commands::Ping { remote } => {
            let cfg = BrainportConfig::resolve(file, env, remote_layer(&remote));
            cmd_ping(&cfg)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        std::env::var(LOG_ENV)
            .ok()
            .and_then(|spec| EnvFilter::try_new(spec).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn remote_layer(remote: &RemoteArgs) -> BrainportConfig {
    BrainportConfig {
        base_url: remote.base_url.clone(),
        brain_id: remote.brain_id.clone(),
        layout: remote.layout,
        timeout_secs: remote.timeout_secs,
        ..Default::default()
    }
}

fn import_layer(args: &ImportArgs) -> BrainportConfig {
    BrainportConfig {
        source: args.source.clone(),
        batch_dir: args.batch_dir.clone(),
        state_dir: args.state_dir.clone(),
        delay_ms: args.delay_ms,
        checkpoint_every: args.checkpoint_every,
        ..remote_layer(&args.remote)
    }
}

fn load_graph(cfg: &BrainportConfig, batch: Option<u32>) -> Result<(PathBuf, SourceGraph)> {
    match batch {
        Some(n) => {
            let path = batch_file_path(&cfg.batch_dir(), n);
            let graph = load_batch_file(&path)?;
            Ok((path, graph))
        }
        None => {
            let path = cfg.source_path();
            let graph = load_source_graph(&path)?;
            Ok((path, graph))
        }
    }
}

fn build_client(cfg: &BrainportConfig) -> Result<HttpGraphClient> {
    let key = config::api_key(|key| std::env::var(key).ok())?;
    let client_config = cfg.client_config(key)?;
    HttpGraphClient::new(client_config).context("failed to set up the service client")
}

// =============================================================================
// import
// =============================================================================

fn cmd_import(cfg: &BrainportConfig, args: &ImportArgs) -> Result<()> {
    let (path, graph) = load_graph(cfg, args.batch)?;
    let client = build_client(cfg)?;
    let state_dir = cfg.state_dir();
    let store = FileCheckpointStore::open(&state_dir)?;

    println!("{} {}", "Importing".green().bold(), path.display());
    if graph.is_partial() {
        println!(
            "  {} {} thoughts, {} links (batch)",
            "→".cyan(),
            graph.thoughts.len(),
            graph.links.len()
        );
    } else {
        println!(
            "  {} {} thoughts, {} links ({} orphaned)",
            "→".cyan(),
            graph.thoughts.len(),
            graph.links.len(),
            graph.orphan_links().len()
        );
    }
    println!("  {} state in {}", "→".cyan(), state_dir.display());

    let options = ImportOptions {
        checkpoint_every: cfg.checkpoint_every(),
        delay: cfg.delay(),
        max_thoughts: args.max_thoughts,
        max_links: args.max_links,
        import_links: !args.no_links,
        attach_notes: !args.no_notes,
    };
    tracing::debug!(?options, "import options");
    let mut importer = Importer::new(client, store.clone(), options)?;
    let report = importer.run(&graph)?;

    print_import_report(&report, &store);
    Ok(())
}

fn print_import_report(report: &ImportReport, store: &FileCheckpointStore) {
    println!();
    println!("{}", "Summary".bold());
    println!(
        "  thoughts: {} created, {} already mapped, {} failed, {} left for later",
        report.thoughts.created.to_string().green(),
        report.thoughts.already_mapped,
        report.thoughts.failed.to_string().red(),
        report.thoughts.not_attempted
    );
    println!(
        "  links:    {} created, {} already created, {} skipped ({} orphaned), {} failed, {} left for later",
        report.links.created.to_string().green(),
        report.links.already_created,
        report.links.skipped,
        report.links.orphaned,
        report.links.failed.to_string().red(),
        report.links.not_attempted
    );
    if report.notes.attached + report.notes.failed > 0 {
        println!(
            "  notes:    {} attached, {} failed",
            report.notes.attached,
            report.notes.failed
        );
    }
    println!("  phase:    {}", report.phase);

    if report.outstanding_failures > 0 {
        println!(
            "  {} {} failure(s) this run, {} outstanding in {}",
            "!".yellow().bold(),
            report.failures.len(),
            report.outstanding_failures,
            store.failures_path().display()
        );
    }

    let line = report.summary_line();
    if report.failed() == 0 {
        println!("{} {}", "✓".green().bold(), line);
    } else {
        println!("{} {}", "✗".red().bold(), line);
    }
}

// =============================================================================
// status
// =============================================================================

fn cmd_status(cfg: &BrainportConfig) -> Result<()> {
    let path = cfg.source_path();
    let graph = load_source_graph(&path)?;
    let store = FileCheckpointStore::new(cfg.state_dir());
    let report = StatusReport::collect(&graph, &store)?;

    println!("{} {}", "Status".green().bold(), path.display());
    if let Some(name) = &graph.brain_name {
        println!("  {} brain: {}", "→".cyan(), name);
    }
    println!(
        "  {} thoughts: {}/{} mapped ({:.1}%), {} remaining",
        "→".cyan(),
        report.thoughts_mapped,
        report.thoughts_total,
        report.percent_mapped(),
        report.thoughts_remaining()
    );
    println!(
        "  {} links:    {}/{} created, {} remaining, {} orphaned",
        "→".cyan(),
        report.links_created,
        report.links_total,
        report.links_remaining(&graph),
        report.orphan_links
    );
    println!("  {} notes:    {}", "→".cyan(), report.notes);
    println!("  {} phase:    {}", "→".cyan(), report.phase);
    if let Some(at) = report.updated_at {
        println!("  {} last checkpoint: {}", "→".cyan(), at.to_rfc3339());
    }
    if report.outstanding_failures > 0 {
        println!(
            "  {} {} outstanding failure(s) in {}",
            "!".yellow().bold(),
            report.outstanding_failures,
            store.failures_path().display()
        );
    }

    println!();
    println!("{}", "By entity type".bold());
    for (entity_type, count) in &report.entity_types {
        println!(
            "  {:<24} {:>6} total {:>6} mapped",
            entity_type, count.total, count.mapped
        );
    }

    Ok(())
}

// =============================================================================
// ping
// =============================================================================

fn cmd_ping(cfg: &BrainportConfig) -> Result<()> {
    let client = build_client(cfg)?;
    let brain = client
        .fetch_brain()
        .with_context(|| format!("failed to reach brain `{}`", client.config().brain_id))?;

    println!(
        "{} connected to {} ({})",
        "✓".green().bold(),
        brain.name.as_deref().unwrap_or("<unnamed brain>"),
        client.config().base_url
    );
    Ok(())
}
