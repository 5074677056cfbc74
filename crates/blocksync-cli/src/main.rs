//! blocksync command-line tools.
//!
//! Inspect and replay block-tree synchronization over JSON files. Results go
//! to stdout as JSON (or one rank key per line); logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! blocksync rank --after a0 --before a1 --count 3
//! blocksync flatten tree.json [--known stored.json]
//! blocksync build stored.json
//! blocksync diff stored.json tree.json
//! blocksync replay stored.json edit1.json edit2.json
//! blocksync --config blocksync.toml diff stored.json tree.json
//! ```
//!
//! `tree.json` holds an array of nested nodes, `stored.json` an array of flat
//! records as storage holds them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use blocksync_client::{MemoryGateway, PassReport, SharedTree, SyncConfig, SyncStatus, forward_snapshots, spawn_sync};
use blocksync_core::{StateIndex, build_tree, flatten_with, rank};
use blocksync_types::{DocumentId, FlatBlock, Node};

#[derive(Parser, Debug)]
#[command(name = "blocksync")]
#[command(about = "Inspect and replay block-tree synchronization")]
struct Args {
    /// Sync configuration (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate rank keys between two bounds
    Rank {
        /// Lower bound (exclusive)
        #[arg(long)]
        after: Option<String>,
        /// Upper bound (exclusive)
        #[arg(long)]
        before: Option<String>,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Flatten a nested tree into flat records
    Flatten {
        tree: PathBuf,
        /// Flat records whose ranks should be reused
        #[arg(long)]
        known: Option<PathBuf>,
    },
    /// Nest flat records into a tree
    Build { flat: PathBuf },
    /// Diff stored flat records against a tree
    Diff { flat: PathBuf, tree: PathBuf },
    /// Sync a sequence of trees into an in-memory store seeded with `flat`
    Replay {
        flat: PathBuf,
        #[arg(required = true)]
        trees: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SyncConfig::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => SyncConfig::default(),
    };

    match args.command {
        Command::Rank { after, before, count } => {
            for key in rank::allocate_n(after.as_deref(), before.as_deref(), count) {
                println!("{key}");
            }
            Ok(())
        }
        Command::Flatten { tree, known } => {
            let tree: Vec<Node> = read_json(&tree)?;
            let known = match known {
                Some(path) => StateIndex::from_blocks(read_json::<Vec<FlatBlock>>(&path)?),
                None => StateIndex::new(),
            };
            let flattened = flatten_with(&tree, &known);
            if flattened.skipped > 0 {
                warn!(skipped = flattened.skipped, "nodes left out");
            }
            print_json(&flattened.blocks)
        }
        Command::Build { flat } => {
            let blocks: Vec<FlatBlock> = read_json(&flat)?;
            print_json(&build_tree(&blocks))
        }
        Command::Diff { flat, tree } => {
            let baseline = StateIndex::from_blocks(read_json::<Vec<FlatBlock>>(&flat)?);
            let tree: Vec<Node> = read_json(&tree)?;
            let plan = config.diff_engine().diff(&baseline, &tree);
            if plan.skipped > 0 {
                warn!(skipped = plan.skipped, truncated = plan.truncated, "nodes left out");
            }
            print_json(&plan.diff)
        }
        Command::Replay { flat, trees } => replay(&config, &flat, &trees).await,
    }
}

#[derive(Serialize)]
struct ReplayOutput {
    passes: Vec<PassReport>,
    status: SyncStatus,
    blocks: Vec<FlatBlock>,
}

async fn replay(config: &SyncConfig, seed: &Path, trees: &[PathBuf]) -> Result<()> {
    let scope = DocumentId::from("replay");
    let gateway = Arc::new(MemoryGateway::new());
    gateway.seed(&scope, read_json(seed)?);

    let tree = SharedTree::default();
    let handle = spawn_sync(config, scope.clone(), Arc::new(tree.clone()), gateway.clone());
    let forwarder = forward_snapshots(gateway.subscribe(), handle.clone());
    // Answered once the initial load has replaced the tree.
    handle.status().await?;

    let mut passes = Vec::with_capacity(trees.len());
    for path in trees {
        let roots: Vec<Node> = read_json(path)?;
        tree.edit(|current| *current = roots);
        handle.notify_edit()?;
        let report = handle
            .flush()
            .await
            .with_context(|| format!("syncing {}", path.display()))?;
        info!(
            file = %path.display(),
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "replayed"
        );
        passes.push(report);
    }

    let status = handle.close().await?;
    forwarder.abort();
    print_json(&ReplayOutput {
        passes,
        status,
        blocks: gateway.blocks(&scope),
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
