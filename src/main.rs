use rapidfare::{build_router, server, AppState, Config};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!(
        "Starting rapidfare v{} (static files from {})",
        env!("CARGO_PKG_VERSION"),
        config.static_dir.display()
    );

    let state = AppState::init(&config).await?;
    let app = build_router(state, &config.static_dir);

    server::serve(app, config.port).await
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
