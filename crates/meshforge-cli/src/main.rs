//! MeshForge CLI - generative 3D asset jobs from the command line or over MCP

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{job, serve};
use meshforge_gen::{create_provider, ForgeConfig, JobKind};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "meshforge")]
#[command(about = "Create and track generative 3D asset jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Provider to use (meshy or mock); defaults to the configured provider
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP tool server on stdin/stdout
    Serve,

    /// Show the current credit balance
    Balance,

    /// Submit a generation job
    Create {
        /// Job type (text-to-3d, image-to-3d, multi-image-to-3d, remesh, retexture, rig, animate)
        kind: String,

        /// Job parameters as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Look up a job
    Job {
        /// Job ID
        id: String,

        /// Job type the ID belongs to
        #[arg(long = "type", value_parser = parse_kind)]
        kind: JobKind,

        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,
    },

    /// Stream a job's updates until it finishes
    Watch {
        /// Job ID
        id: String,

        /// Job type the ID belongs to
        #[arg(long = "type", value_parser = parse_kind)]
        kind: JobKind,
    },

    /// List the tools exposed by `serve`
    Tools,
}

fn parse_kind(s: &str) -> Result<JobKind, String> {
    s.parse().map_err(|_| {
        let valid: Vec<&str> = JobKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown job type '{}'; valid values: {}", s, valid.join(", "))
    })
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if let Commands::Tools = cli.command {
        return job::run_tools();
    }

    let config = ForgeConfig::load()?;
    let provider_name = cli
        .provider
        .unwrap_or_else(|| config.defaults.provider.clone());
    let provider = create_provider(&provider_name, &config)?;
    let poll_interval = Duration::from_secs(config.defaults.poll_interval_secs);

    match cli.command {
        Commands::Serve => serve::run(provider.as_ref()),
        Commands::Balance => job::run_balance(provider.as_ref()),
        Commands::Create { kind, args } => {
            job::run_create(provider.as_ref(), &kind, args.as_deref())
        }
        Commands::Job { id, kind, wait } => {
            job::run_job(provider.as_ref(), &id, kind, wait, poll_interval)
        }
        Commands::Watch { id, kind } => job::run_watch(provider.as_ref(), &id, kind),
        Commands::Tools => job::run_tools(),
    }
}
