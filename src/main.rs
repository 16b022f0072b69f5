//! Scenario runner: drives a full session against the in-memory backend with
//! four simulated clients, exercising boarding, role selection, simulated
//! acknowledgments, and completion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use poison_express::config::AppConfig;
use poison_express::dao::memory::MemoryStore;
use poison_express::dao::store::RecordStore;
use poison_express::feed::FeedHub;
use poison_express::services::{control_service, lobby_service, round_service, session_service};
use poison_express::session_store::SessionStore;
use poison_express::state::{AppState, SharedState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// One simulated client: its own application state and session history over
/// the shared store and feed.
fn client_state(config: &AppConfig, store: &Arc<dyn RecordStore>, feed: &Arc<FeedHub>) -> SharedState {
    let path = std::env::temp_dir()
        .join("poison-express")
        .join(format!("{}.json", Uuid::new_v4()));
    let history = SessionStore::open(path, config.recent_sessions_cap, config.session_ttl);
    AppState::new(config.clone(), store.clone(), feed.clone(), history)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let feed = Arc::new(FeedHub::new(config.feed_capacity));
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(feed.clone()));

    let names = ["MOLLY", "OLIVER", "JADE", "KINGSLEY"];
    let clients: Vec<SharedState> = names
        .iter()
        .map(|_| client_state(&config, &store, &feed))
        .collect();

    let game = lobby_service::create_session(&clients[0], names[0])
        .await
        .context("creating the session")?;
    for (state, name) in clients.iter().zip(names).skip(1) {
        lobby_service::join_session(state, game.id, name)
            .await
            .with_context(|| format!("{name} joining"))?;
    }

    let mut handles = Vec::new();
    for (state, name) in clients.iter().zip(names) {
        let handle = session_service::attach_session(state, game.id, name)
            .await
            .with_context(|| format!("attaching {name}"))?;
        handles.push(handle);
    }

    round_service::start_selection(&clients[0], game.id)
        .await
        .context("starting selection")?;
    sleep(Duration::from_millis(100)).await;

    let projection = handles[1].projection().await;
    let (ready, total) = projection.readiness();
    info!(phase = ?projection.game.phase, ready, total, "selection underway");

    let simulated = control_service::simulate_acknowledgments(&clients[0], game.id)
        .await
        .context("simulating acknowledgments")?;
    info!(simulated, "all roles acknowledged");

    round_service::advance(&clients[0], game.id)
        .await
        .context("advancing into the round")?;
    sleep(Duration::from_millis(100)).await;
    for (handle, name) in handles.iter().zip(names) {
        let projection = handle.projection().await;
        info!(client = name, phase = ?projection.game.phase, "client view");
    }

    round_service::complete(&clients[0], game.id)
        .await
        .context("completing the session")?;
    sleep(Duration::from_millis(100)).await;

    for state in &clients {
        session_service::detach_session(state).await;
    }
    info!("scenario finished");
    Ok(())
}
