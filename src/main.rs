use anyhow::Context;
use std::{future::IntoFuture, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info};

use sales_report_bot::{
    helpers::source, logging, ReportConfig, ReportService, ResendDispatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let config = ReportConfig::from_env().context("failed to load configuration")?;
    info!("Starting sales report bot with {:?}", config);

    let dispatcher = ResendDispatcher::from_config(&config);
    let service = Arc::new(ReportService::new(
        source::from_config(&config.source),
        dispatcher,
        config.output_dir.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Manual trigger listening on http://{}/report-run", config.listen_addr);

    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, service.clone().router())
        .with_graceful_shutdown(async move {
            let _ = server_rx.changed().await;
        })
        .into_future();

    let mut scheduler_rx = shutdown_rx;
    let scheduler = service.run_scheduled(config.interval, async move {
        let _ = scheduler_rx.changed().await;
    });

    let (served, ()) = tokio::join!(server, scheduler);
    served.context("http server failed")?;

    info!("Sales report bot stopped");
    Ok(())
}
