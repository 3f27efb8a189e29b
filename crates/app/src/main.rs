use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use voxlink_app::dispatch::HttpCollaboratorFactory;
use voxlink_app::relay::{self, RelayState};
use voxlink_app::session::{RegistryHealth, SessionRegistry};
use voxlink_foundation::{AppState, HealthMonitor, Settings, ShutdownHandler, StateManager};
use voxlink_telemetry::PipelineMetrics;

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "voxlink.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    tracing::info!("Starting VoxLink server v{}", env!("CARGO_PKG_VERSION"));

    let settings = Arc::new(Settings::load()?);
    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;

    let metrics = Arc::new(PipelineMetrics::default());
    let registry = Arc::new(SessionRegistry::new());

    let health_monitor = HealthMonitor::new(Duration::from_secs(10));
    health_monitor.register(Box::new(RegistryHealth::new(Arc::clone(&registry))));
    let _health_monitor = health_monitor.start();

    let relay_state = Arc::new(RelayState {
        settings: Arc::clone(&settings),
        metrics: Arc::clone(&metrics),
        registry: Arc::clone(&registry),
        collaborators: Arc::new(HttpCollaboratorFactory::new(
            settings.dispatch.clone(),
            Arc::clone(&metrics),
        )),
    });
    let app = relay::router(relay_state);

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    state_manager.transition(AppState::Running)?;
    tracing::info!(addr = %bind_addr, "Voice endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .context("Server error")?;

    state_manager.transition(AppState::Stopping)?;
    state_manager.transition(AppState::Stopped)?;
    tracing::info!("VoxLink server stopped");
    Ok(())
}
