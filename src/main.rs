use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use heroshot::pipeline::prep::PrepOptions;
use heroshot::pipeline::{self, RunOptions};
use heroshot::project::{Project, PROCESSED_MAX_SIZE};
use heroshot::RemoteConfig;

#[derive(Parser, Debug)]
#[command(name = "heroshot", version, about = "Product-visualization scene pipeline")]
struct Cli {
    /// Project root holding assets/, manifests/ and renders/
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct RemoteArgs {
    /// Control-socket host of the running 3D application
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Control-socket port
    #[arg(long, default_value_t = 9876)]
    port: u16,

    /// Write the generated script to a file instead of submitting it
    #[arg(long)]
    emit: Option<PathBuf>,
}

impl RemoteArgs {
    fn config(&self) -> RemoteConfig {
        RemoteConfig {
            host: self.host.clone(),
            port: self.port,
            ..RemoteConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a scene's reference photo
    Prep {
        scene: String,
        /// Maximum dimension for the resized image
        #[arg(long, default_value_t = PROCESSED_MAX_SIZE)]
        max_size: u32,
    },

    /// Produce one binary mask per semantic label
    Segment {
        scene: String,
        /// Object prompts, e.g. "gaming chair" "desk surface"
        #[arg(long, num_args = 1.., required = true)]
        labels: Vec<String>,
    },

    /// Produce one mesh per object and write the scene manifest
    Reconstruct {
        scene: String,
        /// Object names matching mask files, e.g. gaming_chair desk_surface
        #[arg(long, num_args = 1.., required = true)]
        objects: Vec<String>,
    },

    /// Report per-mask coverage for a scene
    Masks { scene: String },

    /// Compose the scene in the running 3D application
    Build {
        scene: String,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Skip the final render trigger
        #[arg(long)]
        no_render: bool,
    },

    /// Full pipeline: prep, segment, reconstruct, build
    Run {
        scene: String,
        /// Labels to segment; defaults to the manifest's recipe
        #[arg(long, num_args = 1..)]
        labels: Vec<String>,
        /// Objects to reconstruct; defaults to the manifest's objects
        #[arg(long, num_args = 1..)]
        objects: Vec<String>,
        #[arg(long, default_value_t = PROCESSED_MAX_SIZE)]
        max_size: u32,
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long)]
        no_render: bool,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let project = Project::new(&cli.root);

    match cli.command {
        Command::Prep { scene, max_size } => {
            pipeline::prep::prep_scene(&project, &scene, PrepOptions { max_size })?;
        }
        Command::Segment { scene, labels } => {
            pipeline::segment::run_segmentation(&project, &scene, &labels)?;
        }
        Command::Reconstruct { scene, objects } => {
            pipeline::reconstruct::run_reconstruction(&project, &scene, &objects)?;
        }
        Command::Masks { scene } => {
            for stats in heroshot::mask::scene_mask_summary(&project, &scene)? {
                let name = stats
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let flag = if stats.is_empty() { " (empty)" } else { "" };
                println!("  {}: {:.2}% non-zero{}", name, stats.fraction() * 100.0, flag);
            }
        }
        Command::Build {
            scene,
            remote,
            no_render,
        } => {
            pipeline::build_scene(
                &project,
                &scene,
                remote.config(),
                !no_render,
                remote.emit.as_ref(),
            )?;
        }
        Command::Run {
            scene,
            labels,
            objects,
            max_size,
            remote,
            no_render,
        } => {
            let options = RunOptions {
                labels,
                objects,
                prep: PrepOptions { max_size },
                remote: remote.config(),
                render: !no_render,
                emit: remote.emit.clone(),
            };
            pipeline::run_scene(&project, &scene, &options)?;
        }
    }

    Ok(())
}
