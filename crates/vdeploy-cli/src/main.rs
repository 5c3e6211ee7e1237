//! vdeploy - declarative deploy reconciler for virtual clusters

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod config;
mod error;
mod exit_codes;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "vdeploy")]
#[command(version)]
#[command(about = "Reconcile declared Helm charts and manifests into a virtual cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the declared deploy until it converges
    Run {
        /// Deploy configuration file
        #[arg(short, long, env = "VDEPLOY_CONFIG")]
        config: PathBuf,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Show the persisted deploy status
    Status {
        /// Name of the status record
        #[arg(long, default_value = vdeploy_kube::DEFAULT_STATUS_NAME)]
        name: String,

        /// Namespace of the status record
        #[arg(short, long, default_value = vdeploy_kube::DEFAULT_STATUS_NAMESPACE)]
        namespace: String,

        /// Annotation holding the encoded status
        #[arg(long, default_value = vdeploy_kube::DEFAULT_STATUS_ANNOTATION)]
        annotation: String,

        /// Kubeconfig to use instead of the default
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the manifests that would be applied
    Render {
        /// Deploy configuration file
        #[arg(short, long, env = "VDEPLOY_CONFIG")]
        config: PathBuf,
    },

    /// Print the config hash of each declared chart
    Hash {
        /// Deploy configuration file
        #[arg(short, long, env = "VDEPLOY_CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Token cancelled on ctrl-c
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            token.cancel();
        }
    });
    cancel
}

async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run { config, once } => {
            commands::run::run(&config, once, interrupt_token()).await
        }

        Commands::Status {
            name,
            namespace,
            annotation,
            kubeconfig,
            json,
        } => {
            let store = vdeploy_kube::StatusStoreConfig {
                name,
                namespace,
                annotation,
            };
            commands::status::run(store, kubeconfig.as_deref(), json).await
        }

        Commands::Render { config } => commands::render::run(&config),

        Commands::Hash { config } => commands::hash::run(&config),
    }
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))
        .and_then(|runtime| runtime.block_on(execute(cli.command)));

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
    std::process::exit(exit_codes::SUCCESS);
}
