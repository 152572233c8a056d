/// yap - declarative local Kubernetes clusters
///
/// One resource model and one apply/get/delete workflow for clusters
/// provisioned by kind, minikube, k3d or colima.
mod api;
mod cluster;
mod cmd;
mod encoding;
mod error;
mod exec;
mod visitor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cluster::{Controller, DockerConfigWriter};
use crate::cmd::apply::ApplyOptions;
use crate::cmd::create::CreateClusterOptions;
use crate::cmd::delete::DeleteOptions;
use crate::cmd::get::GetOptions;
use crate::cmd::printer::OutputFormat;
use crate::exec::ProcessRunner;

#[derive(Parser)]
#[command(name = "yap")]
#[command(about = "One provisioner to rule them all", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster
    Create {
        #[command(subcommand)]
        resource: CreateResource,
    },

    /// Apply a cluster config to the currently running clusters
    Apply {
        /// Files containing the clusters to apply; `-` reads stdin
        #[arg(short = 'f', long = "filename")]
        filenames: Vec<String>,

        #[arg(short, long, value_enum, default_value = "name")]
        output: OutputFormat,
    },

    /// Display one or many clusters
    Get {
        /// Resource type: cluster or clusters
        resource: String,

        /// Cluster names; all clusters when omitted
        names: Vec<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Delete a currently running cluster
    Delete {
        /// Files containing the clusters to delete; `-` reads stdin
        #[arg(short = 'f', long = "filename")]
        filenames: Vec<String>,

        /// If the requested object does not exist the command will return exit code 0
        #[arg(long)]
        ignore_not_found: bool,

        /// If 'true', objects will be deleted recursively
        #[arg(long, default_value = "false")]
        cascade: String,

        /// Resource type followed by names, e.g. `cluster kind`
        args: Vec<String>,
    },

    /// Make a cluster's kubeconfig usable from inside a docker container
    ConfigureContainer {
        /// Cluster name
        cluster: String,

        /// Container ID or name
        container: String,
    },
}

#[derive(Subcommand)]
enum CreateResource {
    /// Create a cluster with a product's defaults
    Cluster {
        /// kind, minikube, k3d or colima
        product: String,

        /// Cluster name; the product's default cluster name when omitted
        #[arg(long)]
        name: Option<String>,

        /// Minimum CPUs the cluster needs
        #[arg(long, default_value_t = 0)]
        min_cpus: u32,

        /// Kubernetes version, e.g. v1.27.3
        #[arg(long)]
        kubernetes_version: Option<String>,

        #[arg(short, long, value_enum, default_value = "name")]
        output: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries printed objects
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("yap={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    let controller = Controller::new(Arc::new(ProcessRunner::new()));

    if let Err(e) = run(cli.command, &ctx, &controller).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, ctx: &CancellationToken, controller: &Controller) -> Result<()> {
    let mut stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    match command {
        Commands::Create {
            resource:
                CreateResource::Cluster {
                    product,
                    name,
                    min_cpus,
                    kubernetes_version,
                    output,
                },
        } => {
            let options = CreateClusterOptions {
                product,
                name,
                min_cpus,
                kubernetes_version,
                output,
            };
            cmd::create::run(ctx, controller, &options, &mut stdout).await?;
        }
        Commands::Apply { filenames, output } => {
            let options = ApplyOptions { filenames, output };
            cmd::apply::run(ctx, controller, &options, &mut stdin, &mut stdout).await?;
        }
        Commands::Get {
            resource,
            names,
            output,
        } => {
            let options = GetOptions {
                resource,
                names,
                output,
            };
            cmd::get::run(ctx, controller, &options, &mut stdout).await?;
        }
        Commands::Delete {
            filenames,
            ignore_not_found,
            cascade,
            args,
        } => {
            let options = DeleteOptions {
                filenames,
                ignore_not_found,
                cascade,
            };
            cmd::delete::run(ctx, controller, &options, &args, &mut stdin, &mut stdout).await?;
        }
        Commands::ConfigureContainer { cluster, container } => {
            let writer = DockerConfigWriter::new(controller.runner());
            controller
                .modify_config_in_container(ctx, &cluster, &container, &writer)
                .await?;
            info!("✓ Container {} can now reach cluster {}", container, cluster);
        }
    }

    Ok(())
}
