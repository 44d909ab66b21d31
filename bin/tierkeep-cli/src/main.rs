//! Tierkeep CLI - operator command line interface
//!
//! Builds and inspects column indexes and seeds or inspects node records in
//! the local node store.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use tierkeep_common::{Config, ExpirationQuery, Node, NodeId};
use tierkeep_index::{ColumnIndex, ColumnIndexer};
use tierkeep_lifecycle::{NodeStore, RedbNodeStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tierkeep-cli")]
#[command(about = "Tierkeep operator CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/tierkeep/tierkeep.toml")]
    config: PathBuf,

    /// Data directory holding the node store (overrides [storage] data_dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Column index operations
    Index {
        #[command(subcommand)]
        action: IndexCommands,
    },
    /// Node record operations
    Node {
        #[command(subcommand)]
        action: NodeCommands,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCommands {
    /// Build a column index over a tab-delimited file
    Build {
        /// Source file
        input: PathBuf,
        /// Destination index file
        output: PathBuf,
        /// 1-based column to group on
        #[arg(short = 'n', long)]
        column: usize,
        /// Directory for the staging temp file (defaults to [index] temp_dir)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
        /// Write chunk size in bytes (multiple of 16)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print the records of an index
    Show {
        /// Index file
        index: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write the bytes of one group to stdout
    Group {
        /// Index file
        index: PathBuf,
        /// Indexed source file
        data: PathBuf,
        /// 0-based group number
        group: u64,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    /// Insert or replace a node
    Put {
        /// Node ID
        node_id: String,
        /// Location holding a replica (repeatable, in preference order)
        #[arg(short, long = "location")]
        locations: Vec<String>,
        /// Expire after <number>M|H|D, e.g. 30M or 7D
        #[arg(long)]
        expire: Option<String>,
    },
    /// List all nodes
    List,
    /// Show node details
    Show {
        /// Node ID
        node_id: String,
    },
    /// Delete a node
    Delete {
        /// Node ID
        node_id: String,
    },
    /// List nodes the reaper would expire right now
    Expired,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }

    match args.command {
        Commands::Index { action } => run_index(action, &config).await,
        Commands::Node { action } => run_node(action, &config).await,
    }
}

async fn run_index(action: IndexCommands, config: &Config) -> Result<()> {
    match action {
        IndexCommands::Build {
            input,
            output,
            column,
            temp_dir,
            chunk_size,
        } => {
            let mut indexer = ColumnIndexer::from_config(config);
            if let Some(dir) = temp_dir {
                indexer = indexer.with_temp_dir(dir);
            }
            if let Some(size) = chunk_size {
                indexer = indexer.with_chunk_size(size)?;
            }

            // Indexing is blocking file I/O
            let summary = tokio::task::spawn_blocking(move || {
                indexer.build_file(&input, column, &output)
            })
            .await??;

            println!(
                "{}",
                serde_json::json!({
                    "count": summary.count,
                    "format": summary.format.as_str(),
                })
            );
        }
        IndexCommands::Show { index, json } => {
            let index = ColumnIndex::open(&index)?;
            let records = index.records()?;
            if json {
                let rows: Vec<_> = records
                    .iter()
                    .map(|r| serde_json::json!({ "offset": r.offset, "length": r.length }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:>8}  {:>14}  {:>12}", "GROUP", "OFFSET", "LENGTH");
                for (i, r) in records.iter().enumerate() {
                    println!("{:>8}  {:>14}  {:>12}", i, r.offset, r.length);
                }
                println!("{} groups", records.len());
            }
        }
        IndexCommands::Group { index, data, group } => {
            let index = ColumnIndex::open(&index)?;
            let mut source = BufReader::new(
                File::open(&data).with_context(|| format!("failed to open {}", data.display()))?,
            );
            let bytes = index.read_group(&mut source, group)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn run_node(action: NodeCommands, config: &Config) -> Result<()> {
    let path = config.node_db_path();
    let store = RedbNodeStore::open(&path)
        .with_context(|| format!("failed to open node store {}", path.display()))?;

    match action {
        NodeCommands::Put {
            node_id,
            locations,
            expire,
        } => {
            let mut node = locations
                .into_iter()
                .fold(Node::new(node_id), |node, loc| node.with_location(loc));
            if let Some(spec) = expire {
                node = node.with_expiration_from(&spec, Utc::now())?;
            }
            store.put(&node)?;
            info!("Stored node {}", node.id);
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        NodeCommands::List => {
            let nodes = store.list()?;
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        NodeCommands::Show { node_id } => {
            let node = store.load(&NodeId::from(node_id)).await?;
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        NodeCommands::Delete { node_id } => {
            let id = NodeId::from(node_id);
            if !store.remove(&id)? {
                bail!("node {} not found", id);
            }
            println!("Deleted node {id}");
        }
        NodeCommands::Expired => {
            let nodes = store.find_expired(&ExpirationQuery::new(Utc::now())).await?;
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
    }
    Ok(())
}
