//! Variant manager command line tool
//!
//! Runs the variant manager against a scene described in JSON, using the
//! in-memory host. Useful to inspect a scene's variant sets and to watch a
//! preview job run end to end.
//!
//! ```bash
//! variant-manager scan scene.json --filter materials
//! variant-manager switch scene.json /Kitchen/table materials glass
//! RUST_LOG=debug variant-manager preview scene.json /Kitchen/table --latency 3
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use serde_json::json;

use variant_manager::{
    CaptureEvent, HostAdapter, ItemOutcome, ManagerConfig, MemoryHost, Result, VariantManager,
};

#[derive(Parser)]
#[command(name = "variant-manager")]
#[command(version)]
#[command(about = "Inspect, switch and preview scene graph variants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config, if any)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every node carrying variant sets
    Scan {
        /// Scene description (JSON)
        scene: PathBuf,

        /// Subtree to scan
        #[arg(long, default_value = "/")]
        root: String,

        /// Only show tree items matching this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Print the clipboard summary of one node
    Describe {
        scene: PathBuf,
        node: String,
    },

    /// Author a selection through a new override node
    Switch {
        scene: PathBuf,
        node: String,
        set: String,
        variant: String,
    },

    /// Capture a thumbnail of every variant of a node
    Preview {
        scene: PathBuf,
        node: String,

        /// Polls before each frame is ready (overrides the scene file)
        #[arg(long)]
        latency: Option<u32>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if e.requires_rescan() {
                info!("The scene changed underneath the command; rescan and retry");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::load_or_default()?,
    };

    match cli.command {
        Commands::Scan { scene, root, filter } => {
            let mut manager = open(&scene, config)?;
            let model = manager.scan(&root)?;
            info!("{} node(s) with variant sets under {}", model.len(), model.root());
            let tree = match filter {
                Some(text) => manager.filter(&text)?,
                None => manager.variant_tree()?,
            };
            print_json(&json!({ "model": manager.model(), "tree": tree }));
        }
        Commands::Describe { scene, node } => {
            let mut manager = open(&scene, config)?;
            manager.scan("/")?;
            println!("{}", manager.describe_node(&node)?);
        }
        Commands::Switch {
            scene,
            node,
            set,
            variant,
        } => {
            let mut manager = open(&scene, config)?;
            manager.scan("/")?;
            let record = manager.switch_variant(&node, &set, &variant)?;
            print_json(&json!({
                "override": record,
                "selections": composed_selections(manager.host(), &node),
            }));
        }
        Commands::Preview {
            scene,
            node,
            latency,
        } => {
            let mut manager = open(&scene, config)?;
            if let Some(polls) = latency {
                manager.host_mut().set_frame_latency(polls);
            }
            manager.scan("/")?;
            let purged = manager.purge_orphaned_previews()?;
            if purged > 0 {
                info!("Removed {} preview node(s) left by an earlier session", purged);
            }

            let job = manager.start_preview(&node)?;
            let interval = manager.config().poll_interval();
            loop {
                for event in manager.poll(Instant::now()) {
                    match event {
                        CaptureEvent::ThumbnailReady { selection, .. } => {
                            info!("Captured {}", selection)
                        }
                        CaptureEvent::ItemFailed {
                            selection, failure, ..
                        } => error!("{}", failure.into_error(&selection)),
                        CaptureEvent::JobFinished { .. } => {}
                    }
                }
                if !manager.is_capturing() {
                    break;
                }
                std::thread::sleep(interval);
            }

            let status = manager.job_status(job)?;
            let items: Vec<_> = status
                .items
                .iter()
                .map(|(selection, outcome)| {
                    let thumbnail = manager.thumbnails().peek(selection);
                    let outcome = match outcome {
                        ItemOutcome::Pending => "pending".to_string(),
                        ItemOutcome::Captured => "captured".to_string(),
                        ItemOutcome::Failed(failure) => failure.to_string(),
                    };
                    json!({
                        "selection": selection.to_string(),
                        "outcome": outcome,
                        "resolution": thumbnail.map(|t| [t.resolution.x, t.resolution.y]),
                        "bytes": thumbnail.map(|t| t.byte_size()),
                    })
                })
                .collect();
            print_json(&json!({
                "job": status.id,
                "node": status.node,
                "captured": status.captured(),
                "failed": status.failed(),
                "leaked_preview": status.leaked_preview,
                "items": items,
                "restored": composed_selections(manager.host(), &node),
            }));
        }
    }
    Ok(())
}

fn open(scene: &Path, config: ManagerConfig) -> Result<VariantManager<MemoryHost>> {
    let host = MemoryHost::load(scene)?;
    info!("Loaded scene {}", scene.display());
    Ok(VariantManager::new(host, config))
}

/// Composed `set -> selection` pairs of one node, as the host reports them
fn composed_selections(host: &MemoryHost, node: &str) -> Vec<(String, Option<String>)> {
    host.resolve(node)
        .map(|handle| {
            host.list_variant_sets(handle)
                .into_iter()
                .map(|set| (set.name, set.selection))
                .collect()
        })
        .unwrap_or_default()
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}
