use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod admission;
mod clusterquota;
mod config;
mod util;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), util::Error> {
    fleetquota_common::init();
    let config = Arc::new(Config::parse());

    fleetquota_common::metrics::spawn_metrics_server(config.metrics_port);

    let client = kube::Client::try_default().await?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        fleetquota_common::shutdown::shutdown_signal().await;
        signal_shutdown.cancel();
    });

    println!("{}", "fleetquota-operator starting up".green());
    fleetquota_common::signal_ready();

    let reconciler = tokio::spawn(clusterquota::run(client.clone(), config.clone(), shutdown.clone()));
    let webhook = tokio::spawn(admission::run(client, config, shutdown));

    let (reconciler_result, webhook_result) = tokio::join!(reconciler, webhook);

    reconciler_result.expect("reconciler task panicked")?;
    webhook_result.expect("admission webhook task panicked")?;

    println!("{}", "fleetquota-operator shut down cleanly".green());
    Ok(())
}
