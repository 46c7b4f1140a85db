mod args;

use args::Args;

mod core;

use crate::core::{CoordinatorServer, MRCoordinator};

mod registry;

use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use registry::Registry;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;

fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<String>> {
    let mut inputs = Vec::new();
    for pattern in patterns {
        let entries =
            glob::glob(pattern).with_context(|| format!("bad input pattern `{pattern}`"))?;
        for entry in entries {
            inputs.push(entry?.to_string_lossy().into_owned());
        }
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    ensure!(args.n_reduce > 0, "need at least one reduce bucket");

    let inputs = expand_inputs(&args.inputs)?;
    ensure!(
        !inputs.is_empty(),
        "no input files matched {:?}",
        args.inputs
    );

    let registry = Registry::new(inputs, args.n_reduce, Duration::from_secs(args.lease_secs));
    let coordinator = MRCoordinator::new(registry);

    let addr = format!("[::1]:{}", args.port).parse()?;
    info!("coordinator listening on {}", addr);

    let shutdown = CancellationToken::new();
    let server = {
        let service = CoordinatorServer::new(coordinator.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            Server::builder()
                .add_service(service)
                .serve_with_shutdown(addr, shutdown.cancelled())
                .await
        })
    };

    while !coordinator.is_done().await {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    info!("job complete");

    // Let workers polling for work observe the exit sentinel before the
    // listener goes away.
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    server.await?.context("coordinator server failed")?;

    Ok(())
}
