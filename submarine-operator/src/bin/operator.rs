//! Submarine operator binary.
//!
//! Wires the informer watchers, work queue, and reconciler together against
//! a live cluster, and runs the worker pool until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::{Client, Config, CustomResourceExt};
use submarine_operator::cache::Caches;
use submarine_operator::charts::HelmCli;
use submarine_operator::controller::Controller;
use submarine_operator::crd::{IngressRoute, Submarine};
use submarine_operator::events::KubeEventRecorder;
use submarine_operator::informer::EventHandlers;
use submarine_operator::queue::WorkQueue;
use submarine_operator::reconciler::Reconciler;
use submarine_operator::store::Stores;
use submarine_operator::watch;

/// Operator for Submarine custom resources.
#[derive(Parser)]
#[command(name = "submarine-operator", version, about)]
struct Args {
    /// Use in-cluster service-account credentials instead of the local
    /// kubeconfig.
    #[arg(long)]
    incluster: bool,

    /// Number of concurrent reconcile workers.
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Directory holding the bundled sub-chart sources.
    #[arg(long, default_value = "charts")]
    charts_dir: PathBuf,

    /// Print the CRD manifests to stdout and exit.
    #[arg(long)]
    generate_crds: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("submarine_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.generate_crds {
        println!("---");
        println!("{}", serde_yaml::to_string(&Submarine::crd())?);
        println!("---");
        println!("{}", serde_yaml::to_string(&IngressRoute::crd())?);
        return Ok(());
    }

    tracing::info!("starting submarine operator");

    let config = if args.incluster {
        Config::incluster()?
    } else {
        Config::infer().await?
    };
    let client = Client::try_from(config)?;
    tracing::info!("connected to kubernetes cluster");

    let queue = WorkQueue::new();
    let caches = Caches::new();
    let handlers = Arc::new(EventHandlers::new(queue.clone(), caches.clone()));
    let watchers = watch::spawn_all(&client, &handlers);

    let reconciler = Arc::new(Reconciler::new(
        Stores::kube(&client),
        caches,
        Arc::new(KubeEventRecorder::new(client.clone())),
        Arc::new(HelmCli::default()),
        args.charts_dir,
    ));
    let controller = Controller::new(queue.clone(), reconciler);

    let shutdown_queue = queue.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown signal received, draining workers");
        shutdown_queue.shut_down();
    });

    controller.run(args.workers).await?;

    for watcher in watchers {
        watcher.abort();
    }
    tracing::info!("submarine operator stopped");
    Ok(())
}
