use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portal_ball_net::config::GameConfig;
use portal_ball_net::game::ball::{Contact, ContactKind};
use portal_ball_net::game::entities::Team;
use portal_ball_net::game::input::PlayerIntent;
use portal_ball_net::game::match_state::MatchPhase;
use portal_ball_net::lobby::scene::Scene;
use portal_ball_net::metrics::Metrics;
use portal_ball_net::net::game_session::{PeerSession, SessionNotice};
use portal_ball_net::net::loopback::{LoopbackEndpoint, LoopbackHub};
use portal_ball_net::net::substrate::Substrate;
use portal_ball_net::settings::{JsonFileSettings, MemorySettings, SettingsStore};
use portal_ball_net::util::vec3::Vec3;

type DemoPeer = PeerSession<LoopbackEndpoint, Box<dyn SettingsStore>>;

/// Ticks between simulated goals once a round is live
const TICKS_PER_POINT: u64 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Portal Ball demo v{}", env!("CARGO_PKG_VERSION"));

    let config = GameConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    info!(
        "Configuration loaded: max_score={}, tick_rate={}, goal_delay={:?}",
        config.max_score, config.tick_rate, config.goal_delay
    );

    let metrics = Arc::new(Metrics::new());

    if let Some(port) = config.metrics_port {
        start_metrics(metrics.clone(), port);
    }

    let hub = LoopbackHub::new();
    info!("Room {} created", hub.room_id());
    let mut host = spawn_peer(&hub, &config, &metrics)?;
    let mut guest = spawn_peer(&hub, &config, &metrics)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = run_match(&mut host, &mut guest, &config) => result?,
        _ = shutdown => info!("Shutting down..."),
    }

    host.leave_room();
    guest.leave_room();
    info!("{}", metrics.to_json());
    Ok(())
}

#[cfg(feature = "metrics_server")]
fn start_metrics(metrics: Arc<Metrics>, port: u16) {
    tokio::spawn(async move {
        if let Err(e) = portal_ball_net::metrics::start_metrics_server(metrics, port).await {
            error!("Metrics server error: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics_server"))]
fn start_metrics(_metrics: Arc<Metrics>, port: u16) {
    tracing::warn!("METRICS_PORT={} ignored: built without metrics_server", port);
}

fn spawn_peer(hub: &LoopbackHub, config: &GameConfig, metrics: &Arc<Metrics>) -> anyhow::Result<DemoPeer> {
    let endpoint = hub.join()?;
    let settings = open_settings(config.settings_path.as_deref(), endpoint.local_actor())?;
    let mut peer = PeerSession::new(endpoint, settings, config.clone(), metrics.clone());
    peer.join()?;
    Ok(peer)
}

/// One settings file per actor, since both peers share a process
fn open_settings(path: Option<&Path>, actor: u32) -> anyhow::Result<Box<dyn SettingsStore>> {
    let Some(path) = path else {
        return Ok(Box::new(MemorySettings::new()));
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("settings");
    let file = path.with_file_name(format!("{}-{}.json", stem, actor));
    let store = JsonFileSettings::open(&file)
        .with_context(|| format!("opening settings {}", file.display()))?;
    info!("Actor {} settings at {}", actor, store.path().display());
    Ok(Box::new(store))
}

/// Scripted two-peer match: pick teams, confirm, then score for the left
/// team until it wins
async fn run_match(host: &mut DemoPeer, guest: &mut DemoPeer, config: &GameConfig) -> anyhow::Result<()> {
    let dt = config.tick_duration();
    let mut interval = tokio::time::interval(dt);
    let host_input = host.input_sender();
    let guest_input = guest.input_sender();

    host_input.try_send(PlayerIntent::SelectLeft)?;
    host_input.try_send(PlayerIntent::SelectLeft)?;
    guest_input.try_send(PlayerIntent::SelectLeft)?;

    let mut tick: u64 = 0;
    let mut confirmed = false;
    let mut live_since: Option<u64> = None;

    loop {
        interval.tick().await;
        tick += 1;

        for notice in host.tick(dt).into_iter().chain(guest.tick(dt)) {
            log_notice(&notice);
        }

        if !confirmed && host.scene() == Scene::TeamSelection && host.selection().is_ready() {
            host_input.try_send(PlayerIntent::ConfirmTeams)?;
            confirmed = true;
        }

        if host.scene() != Scene::Arena {
            continue;
        }

        if host.match_state().is_complete() && guest.match_state().is_complete() {
            if let Some(result) = host.match_state().result() {
                info!("Final: {}", result.summary());
            }
            return Ok(());
        }

        if host.match_state().phase() != MatchPhase::InRound {
            live_since = None;
            continue;
        }
        let since = *live_since.get_or_insert(tick);

        // Players drift toward the ball; the host bounces it off a wall
        guest_input.try_send(PlayerIntent::Move {
            horizontal: -1.0,
            vertical: 0.0,
        })?;
        if let Some(impulse) = host.on_ball_collision(Contact {
            kind: ContactKind::Wall,
            normal: Vec3::new(0.0, 0.0, 1.0),
        }) {
            tracing::debug!("Ball impulse {:?}", impulse);
        }

        if tick - since >= TICKS_PER_POINT {
            // Both replicas see the ball enter the left team's portal
            host.on_ball_trigger(Team::Left);
            guest.on_ball_trigger(Team::Left);
        }
    }
}

fn log_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::SceneLoaded(scene) => info!("Scene loaded: {:?}", scene),
        SessionNotice::ReadyChanged(ready) => info!("Ready: {}", ready),
        SessionNotice::TeamLocked { actor, team } => info!("Actor {} locked {:?}", actor, team),
        SessionNotice::ScoreChanged(scores) => info!("Score {} - {}", scores[0], scores[1]),
        SessionNotice::MatchEnded(result) => info!("Match ended: {}", result.summary()),
        SessionNotice::LeftRoom => info!("Left room"),
    }
}
