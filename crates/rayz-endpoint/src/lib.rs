//! RayZ endpoint firmware core: admin WebSocket server, peer event bus,
//! game-state engine wiring and connection supervisor.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http_api;
pub mod peer_bus;
pub mod ports;
pub mod router;
pub mod state;
pub mod storage;
pub mod supervisor;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rayz_core::rules::GameRules;
use rayz_core::time::Uptime;
use rayz_engine::Engine;

use config::EndpointConfig;
use peer_bus::PeerBus;
use ports::Ports;
use router::EngineInput;
use state::AppState;
use storage::KvStore;

/// Everything the station app needs injected at wiring time.
pub struct StationDeps {
    pub config: Arc<EndpointConfig>,
    pub kv: Arc<dyn KvStore>,
    pub ports: Ports,
    pub peers: Arc<PeerBus>,
    pub uptime: Uptime,
    pub restart: CancellationToken,
    pub shutdown: CancellationToken,
}

/// Builds the station-mode router and state, and spawns the engine,
/// ticker and peer-drain tasks.
pub fn build_station_app(deps: StationDeps) -> (Router, AppState) {
    let identity = storage::load_or_create_identity(deps.kv.as_ref());
    let engine = Engine::new(identity, GameRules::factory());

    let (inputs, input_rx) = mpsc::channel::<EngineInput>(deps.config.limits.engine_queue);

    let state = AppState::new(
        deps.config,
        engine,
        deps.peers,
        deps.kv,
        deps.ports,
        inputs,
        deps.uptime,
        deps.restart,
        deps.shutdown,
    );

    router::spawn_router(state.clone(), input_rx);
    router::spawn_ticker(state.clone());
    router::spawn_peer_drain(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(http_api::root_page))
        .route("/ws", get(ws::ws_handler))
        .route("/clean", post(http_api::clean_post))
        .route("/api/status", get(http_api::api_status))
        .route(
            "/api/peers",
            get(http_api::peers_get).post(http_api::peers_post),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    (app, state)
}

/// Builds the captive provisioning router.
pub fn build_provisioning_app(state: http_api::ProvisionState) -> Router {
    Router::new()
        .route("/", get(http_api::provision_page))
        .route("/config", post(http_api::provision_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
