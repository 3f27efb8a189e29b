use clap::Parser;
use tracing_subscriber::EnvFilter;

use voxlink_foundation::Settings;

/// Connects the wearable to the VoxLink backend.
#[derive(Parser, Debug)]
#[command(name = "voxlink-runtime", version)]
struct Args {
    /// Device MAC address or advertised name (overrides configuration)
    #[arg(long)]
    device: Option<String>,

    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long)]
    backend_url: Option<String>,

    /// User identifier for the voice session
    #[arg(long)]
    user_id: Option<String>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let mut settings = Settings::load()?;
    if let Some(device) = args.device {
        settings.device.mac = device;
    }
    if let Some(url) = args.backend_url {
        settings.device.backend_url = url;
    }
    if let Some(user_id) = args.user_id {
        settings.device.user_id = user_id;
    }

    tracing::info!(
        backend = %settings.device.backend_url,
        user_id = %settings.device.user_id,
        device = %settings.device.mac,
        "Starting VoxLink device runtime"
    );

    voxlink_app::runtime::run_device_runtime(settings).await
}
