//! Server binary: load configuration, build the engine, serve HTTP + WS.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::EngineConfig;
use crucible::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::load_and_apply(None)?;
    let engine_config = EngineConfig::from_env()?;
    info!(
        workspace = %engine_config.workspace_dir.display(),
        inference = %engine_config.inference_url,
        mock = engine_config.mock_llm,
        "starting crucible"
    );

    let engine = Arc::new(Engine::new(engine_config));
    let app = serve::router(engine);

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
