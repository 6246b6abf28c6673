use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cluster;
mod commands;
mod config;
mod k8s;
mod logging;
mod notify;

use cluster::LifecycleEngine;
use commands::Command;
use notify::{ConsoleNotifier, Notify};

#[derive(Parser)]
#[command(name = "ksail")]
#[command(version = "0.1.0")]
#[command(about = "Provision and manage local Kind and K3d Kubernetes clusters")]
struct Cli {
    /// Path to the cluster spec file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    // One cancellation token governs all blocking work of the invocation.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let (_path, mut spec_file) = config::load_spec(cli.config.as_deref())?;

    // Flag overrides land before validation.
    if let Command::Create(args) = &cli.command {
        let flag_mirrors = commands::parse_mirror_flags(&args.mirror_registry);
        if !flag_mirrors.is_empty() {
            let from_spec = std::mem::take(&mut spec_file.spec.mirror_registries);
            spec_file.spec.mirror_registries = commands::merge_mirrors(from_spec, flag_mirrors);
        }
        if let Some(metrics_server) = args.metrics_server {
            spec_file.spec.metrics_server = metrics_server.into();
        }
    }

    let dist_config = config::load_distribution_config(
        spec_file.spec.distribution,
        &spec_file.spec.distribution_config_path,
    )?;

    let notifier: Arc<dyn Notify> = Arc::new(ConsoleNotifier);
    let mut engine =
        LifecycleEngine::new(spec_file, dist_config, notifier)?.with_cancellation(cancel);

    match cli.command {
        Command::Create(args) => engine.create(args.force).await?,
        Command::Delete(args) => engine.delete(args.delete_registry_volumes).await?,
        Command::Start => engine.start().await?,
        Command::Stop => engine.stop().await?,
        Command::Status => {
            engine.status().await?;
        }
        Command::List(args) => {
            for (distribution, names) in engine.list(args.all).await? {
                for name in names {
                    println!("{}\t{}", distribution, name);
                }
            }
        }
    }

    Ok(())
}
