mod adapter;
mod cmd;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bricksmith",
    about = "Plan, generate, and verify modules brick by brick via LLM sessions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .bricksmith/ or .git/)
    #[arg(long, global = true, env = "BRICKSMITH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: plan → resolve → generate → verify each brick
    Run {
        /// Module name (lowercase slug)
        module: String,

        /// Path to the module contract document
        #[arg(long)]
        contract: PathBuf,

        /// Path to the implementation spec document
        #[arg(long)]
        spec: PathBuf,

        /// Regenerate the plan even if one exists
        #[arg(long)]
        force: bool,

        /// Delete the stored plan before running
        #[arg(long)]
        refresh_plan: bool,
    },

    /// Generate and persist a plan without executing any bricks
    Plan {
        /// Module name (lowercase slug)
        module: String,

        /// Path to the module contract document
        #[arg(long)]
        contract: PathBuf,

        /// Path to the implementation spec document
        #[arg(long)]
        spec: PathBuf,

        /// Regenerate even if a plan exists
        #[arg(long)]
        force: bool,
    },

    /// Show the stored plan for a module
    Status {
        /// Module name (lowercase slug)
        module: String,

        /// Contract path, to check plan staleness
        #[arg(long)]
        contract: Option<PathBuf>,

        /// Spec path, to check plan staleness
        #[arg(long)]
        spec: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Run {
            module,
            contract,
            spec,
            force,
            refresh_plan,
        } => {
            match cmd::run::run(
                &root,
                &module,
                &contract,
                &spec,
                force,
                refresh_plan,
                cli.json,
            )
            .await
            {
                // Any terminal brick failure → non-zero exit
                Ok(full_success) => {
                    if !full_success {
                        std::process::exit(2);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Commands::Plan {
            module,
            contract,
            spec,
            force,
        } => cmd::plan::run(&root, &module, &contract, &spec, force, cli.json).await,
        Commands::Status {
            module,
            contract,
            spec,
        } => cmd::status::run(&root, &module, contract.as_deref(), spec.as_deref(), cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
