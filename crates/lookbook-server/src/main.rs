use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lookbook_server::{build_router, AppState, ServerConfig};

/// The blocking HTTP clients must be built outside the async runtime, so the
/// runtime is started by hand once the state exists.
fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        production = config.production,
        images_dir = %config.images_dir.display(),
        "starting lookbook server"
    );
    let listen_addr = config.listen_addr;
    let state = AppState::from_config(config)?;
    let router = build_router(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "REST server ready");
        axum::serve(listener, router).await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
