use signaling_server::{run_server, SignalingServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional, only meant for local runs
    dotenvy::dotenv().ok();
    init_tracing();

    let config = SignalingServerConfig::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        notify_peer_left = config.notify_peer_left,
        "Loaded signaling relay configuration"
    );
    run_server(config).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
