use std::sync::Arc;

use tokio::net::TcpListener;

use webhook_bots::bots::{echo, gplinks};
use webhook_bots::{AppConfig, ServiceContext, VERSION, logging, registry, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(AppConfig::from_env()?);
    logging::init(
        &config.logging,
        &config.log_dir(),
        &[echo::LOG_TARGET, gplinks::LOG_TARGET],
    )?;
    log::info!("webhook-bots {VERSION} starting, storage at {}", config.storage_path.display());

    let ctx = Arc::new(ServiceContext::new(config.clone()));
    let bots = if config.server.website_hostname.is_some() {
        registry(&ctx)
    } else {
        log::warn!("WEBSITE_HOSTNAME is not set, no bot will be started");
        Vec::new()
    };

    for bot in &bots {
        if let Err(err) = bot.register_webhook().await {
            log::error!(target: bot.log_target(), "webhook registration failed: {err}");
        }
    }

    let router = server::router(&bots);
    let listener = TcpListener::bind(config.server.bind_address).await?;
    log::info!(
        "listening on {} with {} bot(s)",
        config.server.bind_address,
        bots.len()
    );

    server::serve(listener, router, shutdown_signal()).await?;
    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("ctrl-c received, shutting down");
}
