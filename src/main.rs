use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use chatpay_bridge as bridge;
use chatpay_bridge::clients::{ChannelClient, GatewayClient, HttpGatewayClient, WhatsAppClient};
use chatpay_bridge::repositories::{OrderRepository, OrderStore};
use chatpay_bridge::services::{OrderFlow, UnconfiguredFlow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match bridge::config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Tracing is not up yet; make sure the missing setting reaches the operator
            eprintln!("chatpay-bridge: {}", e);
            return Err(e.into());
        }
    };
    bridge::config::init_tracing(cfg.log_level(), cfg.log_json);
    bridge::handlers::health::init_start_time();
    info!(config = ?cfg, "Configuration loaded");

    // Init DB
    let db_pool = bridge::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        bridge::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    } else {
        warn!("auto_migrate is off; the chat_orders table must already exist");
    }
    let db_arc = Arc::new(db_pool);

    // Collaborators
    let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(db_arc.clone()));
    let channel: Arc<dyn ChannelClient> = Arc::new(WhatsAppClient::new(
        &cfg.channel_api_base_url,
        &cfg.phone_id,
        cfg.channel_api_token.clone(),
    )?);
    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(
        cfg.gateway_validate_url(),
        cfg.gateway_timeout(),
    )?);
    let flow: Arc<dyn OrderFlow> = Arc::new(UnconfiguredFlow);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    // Compose shared app state
    let app_state = bridge::AppState::new(
        Arc::new(cfg),
        Some(db_arc),
        orders,
        channel,
        gateway,
        flow,
    );
    let app = bridge::app_router(app_state);

    // Bind and serve
    info!("chatpay-bridge listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chatpay-bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
