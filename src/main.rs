//! WeGo Turn Server
//!
//! Authoritative match server: one match, one engine task, one WebSocket
//! listener. Configuration comes from the environment.

use std::sync::Arc;
use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wego::{
    VERSION, EngineConfig, FileStore, MemoryStore, PhaseScheduler, RandomSeeds, TurnStore,
    network::{spawn_host, AuthConfig, GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("WeGo server v{}", VERSION);

    let engine_config = EngineConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    let auth = AuthConfig::from_env();

    info!(
        "Phases: planning {:?}, resolve {:?}, commit {:?}",
        engine_config.planning_duration,
        engine_config.resolve_duration,
        engine_config.commit_duration,
    );
    if !auth.is_configured() {
        if auth.allow_insecure_ids {
            warn!("No token key configured, trusting client-declared country ids");
        } else {
            warn!("No token key configured and insecure ids disabled; every auth will fail");
        }
    }

    match std::env::var("WEGO_STORE_PATH") {
        Ok(path) => {
            let store = FileStore::open(&path)
                .with_context(|| format!("failed to open store at {}", path))?;
            serve(store, engine_config, server_config, auth).await
        }
        Err(_) => {
            warn!("WEGO_STORE_PATH not set, match state will not survive a restart");
            serve(MemoryStore::new(), engine_config, server_config, auth).await
        }
    }
}

async fn serve<S: TurnStore + 'static>(
    store: S,
    engine_config: EngineConfig,
    server_config: ServerConfig,
    auth: AuthConfig,
) -> anyhow::Result<()> {
    let (scheduler, recovery) = PhaseScheduler::bootstrap(
        store,
        engine_config,
        Box::new(RandomSeeds),
        Utc::now(),
    )?;
    info!("Engine ready ({:?})", recovery);

    let (engine, host_task) = spawn_host(scheduler)?;
    let server = Arc::new(GameServer::new(server_config, auth, engine.clone()));

    let running = server.clone();
    let mut server_task = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut server_task => {
            result.context("server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
            server_task.await.context("server task panicked")??;
        }
    }

    engine.shutdown().await;
    host_task.await.context("host task panicked")?;
    Ok(())
}
