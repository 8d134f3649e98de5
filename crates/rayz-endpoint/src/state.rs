use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rayz_core::time::Uptime;
use rayz_engine::Engine;

use crate::config::EndpointConfig;
use crate::peer_bus::PeerBus;
use crate::ports::Ports;
use crate::router::EngineInput;
use crate::storage::KvStore;
use crate::ws::{ClientTable, SessionId};

/// Station link state as reported by the connection supervisor.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub connected: bool,
    pub ip: String,
    pub channel: u8,
    pub rssi: i8,
}

/// Shared application state for the station app. Everything behind an
/// `Arc`; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EndpointConfig>,
    pub engine: Arc<tokio::sync::Mutex<Engine>>,
    pub clients: Arc<ClientTable>,
    pub peers: Arc<PeerBus>,
    pub kv: Arc<dyn KvStore>,
    pub ports: Ports,
    pub inputs: mpsc::Sender<EngineInput>,
    pub uptime: Uptime,
    pub link: Arc<StdMutex<LinkStatus>>,
    /// Cancelled to leave the current lifecycle stage (re-provision,
    /// factory reset). The supervisor re-evaluates the boot mode.
    pub restart: CancellationToken,
    pub shutdown: CancellationToken,
    session_counter: Arc<AtomicU64>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<EndpointConfig>,
        engine: Engine,
        peers: Arc<PeerBus>,
        kv: Arc<dyn KvStore>,
        ports: Ports,
        inputs: mpsc::Sender<EngineInput>,
        uptime: Uptime,
        restart: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            engine: Arc::new(tokio::sync::Mutex::new(engine)),
            clients: Arc::new(ClientTable::new()),
            peers,
            kv,
            ports,
            inputs,
            uptime,
            link: Arc::new(StdMutex::new(LinkStatus::default())),
            restart,
            shutdown,
            session_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_session_id(&self) -> SessionId {
        self.session_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn now_ms(&self) -> u32 {
        self.uptime.now_ms()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_link_status(&self, status: LinkStatus) {
        *self.link.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}
