//! The connection-lifecycle supervisor.
//!
//! Decides the boot mode from the KV store (provisioning vs. station),
//! runs each stage until its restart token fires, and handles station
//! reconnection with bounded back-off. "Restart" re-enters the boot-mode
//! evaluation loop; that is the authoritative way to switch modes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use rayz_core::mac::Mac;
use rayz_core::time::Uptime;

use crate::config::EndpointConfig;
use crate::peer_bus::PeerBus;
use crate::ports::{BootButton, Ports};
use crate::state::LinkStatus;
use crate::storage::{self, KvStore};

/// Consecutive connect failures before the radio driver is restarted.
const MAX_RETRY_COUNT: u32 = 15;

/// Reconnect back-off schedule, saturating at the last entry.
const BACKOFF_MS: [u64; 4] = [500, 1_000, 2_000, 5_000];

/// Boot-button hold time that triggers a factory reset.
const FACTORY_RESET_HOLD_MS: u32 = 2_000;

#[derive(Debug, Clone)]
pub struct WifiError(pub String);

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wifi error: {}", self.0)
    }
}

impl std::error::Error for WifiError {}

#[derive(Debug, Clone)]
pub struct StationInfo {
    pub ip: String,
    pub channel: u8,
    pub rssi: i8,
}

/// The Wi-Fi driver port. Joining, link-loss events and driver restarts
/// belong to the driver; policy (back-off, mode switching) lives here.
pub trait WifiLink: Send + Sync {
    fn mac(&self) -> Mac;
    fn connect(&self, ssid: &str, pass: &str) -> Result<StationInfo, WifiError>;
    fn rssi(&self) -> i8;
    fn restart_driver(&self);
    /// Bumped on every link drop.
    fn link_drops(&self) -> watch::Receiver<u64>;
}

/// Stand-in driver for hosts where the OS owns the network: every
/// connect succeeds immediately with the configured report.
pub struct StaticWifi {
    mac: Mac,
    info: StationInfo,
    drops: watch::Sender<u64>,
}

impl StaticWifi {
    pub fn new(mac: Mac, info: StationInfo) -> Arc<Self> {
        let (drops, _) = watch::channel(0);
        Arc::new(Self { mac, info, drops })
    }

    pub fn from_config(cfg: &EndpointConfig) -> Arc<Self> {
        // A stable pseudo-MAC derived from the radio port keeps AP SSIDs
        // distinct when several endpoints share a host.
        let port = cfg.radio.udp_port.to_be_bytes();
        let mac = Mac([0x02, 0x52, 0x5A, 0x00, port[0], port[1]]);
        Self::new(
            mac,
            StationInfo {
                ip: cfg.station.ip.clone(),
                channel: cfg.station.channel,
                rssi: cfg.station.rssi,
            },
        )
    }
}

impl WifiLink for StaticWifi {
    fn mac(&self) -> Mac {
        self.mac
    }

    fn connect(&self, ssid: &str, _pass: &str) -> Result<StationInfo, WifiError> {
        tracing::info!(ssid, "station joined");
        Ok(self.info.clone())
    }

    fn rssi(&self) -> i8 {
        self.info.rssi
    }

    fn restart_driver(&self) {
        tracing::warn!("radio driver restarted");
    }

    fn link_drops(&self) -> watch::Receiver<u64> {
        self.drops.subscribe()
    }
}

/// Soft-AP SSID for provisioning: `RayZ-` plus the MAC tail.
pub fn provisioning_ssid(mac: Mac) -> String {
    let b = mac.as_bytes();
    format!("RayZ-{:02X}{:02X}{:02X}", b[3], b[4], b[5])
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub ssid: String,
    pub pass: String,
}

pub enum BootMode {
    Provisioning,
    Station(Credentials),
}

/// No credentials stored means provisioning.
pub fn evaluate_boot_mode(kv: &dyn KvStore) -> BootMode {
    match kv.get_str(storage::NS_WIFI, storage::KEY_SSID) {
        Some(ssid) if !ssid.is_empty() => {
            let pass = kv
                .get_str(storage::NS_WIFI, storage::KEY_PASS)
                .unwrap_or_default();
            BootMode::Station(Credentials { ssid, pass })
        },
        _ => BootMode::Provisioning,
    }
}

/// Samples the reset button once at boot; a long hold erases both
/// namespaces (full factory reset) before the boot mode is evaluated.
pub fn check_boot_button(kv: &dyn KvStore, button: &dyn BootButton) {
    let held = button.held_ms();
    if held >= FACTORY_RESET_HOLD_MS {
        tracing::warn!(held_ms = held, "factory reset button held at boot");
        if let Err(e) = kv.erase_namespace(storage::NS_WIFI) {
            tracing::warn!(error = %e, "wifi namespace erase failed");
        }
        if let Err(e) = kv.erase_namespace(storage::NS_GAME) {
            tracing::warn!(error = %e, "game namespace erase failed");
        }
    }
}

/// Joins the network with bounded back-off. Never fails permanently:
/// every [`MAX_RETRY_COUNT`] consecutive failures the radio driver is
/// restarted and the counter resets. Returns `None` only on shutdown.
pub async fn connect_with_backoff(
    wifi: &dyn WifiLink,
    creds: &Credentials,
    shutdown: &CancellationToken,
) -> Option<StationInfo> {
    let mut failures: u32 = 0;
    loop {
        if shutdown.is_cancelled() {
            return None;
        }
        match wifi.connect(&creds.ssid, &creds.pass) {
            Ok(info) => {
                tracing::info!(ip = %info.ip, channel = info.channel, "got IP");
                return Some(info);
            },
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    error = %e,
                    retry = failures,
                    max = MAX_RETRY_COUNT,
                    "station connect failed"
                );
                if failures >= MAX_RETRY_COUNT {
                    tracing::warn!("restarting radio driver after repeated failures");
                    wifi.restart_driver();
                    failures = 0;
                }
                let backoff = BACKOFF_MS[(failures.max(1) as usize - 1).min(BACKOFF_MS.len() - 1)];
                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                }
            },
        }
    }
}

/// The supervisor main loop: evaluate the boot mode, run that stage
/// until its restart token fires, repeat. Only process shutdown exits.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: Arc<EndpointConfig>,
    kv: Arc<dyn KvStore>,
    ports: Ports,
    wifi: Arc<dyn WifiLink>,
    peers: Arc<PeerBus>,
    uptime: Uptime,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match evaluate_boot_mode(kv.as_ref()) {
            BootMode::Provisioning => {
                run_provisioning(&config, &kv, wifi.as_ref(), &shutdown).await;
            },
            BootMode::Station(creds) => {
                run_station(
                    &config,
                    &kv,
                    &ports,
                    wifi.clone(),
                    &peers,
                    uptime,
                    creds,
                    &shutdown,
                )
                .await;
            },
        }
    }
}

async fn run_provisioning(
    config: &Arc<EndpointConfig>,
    kv: &Arc<dyn KvStore>,
    wifi: &dyn WifiLink,
    shutdown: &CancellationToken,
) {
    let ap_ssid = provisioning_ssid(wifi.mac());
    tracing::info!(ssid = %ap_ssid, "starting AP provisioning mode");

    let restart = shutdown.child_token();
    let app = crate::build_provisioning_app(crate::http_api::ProvisionState {
        kv: kv.clone(),
        restart: restart.clone(),
        ap_ssid,
    });

    serve(&config.listen_addr, app, restart).await;
}

#[allow(clippy::too_many_arguments)]
async fn run_station(
    config: &Arc<EndpointConfig>,
    kv: &Arc<dyn KvStore>,
    ports: &Ports,
    wifi: Arc<dyn WifiLink>,
    peers: &Arc<PeerBus>,
    uptime: Uptime,
    creds: Credentials,
    shutdown: &CancellationToken,
) {
    let Some(info) = connect_with_backoff(wifi.as_ref(), &creds, shutdown).await else {
        return;
    };

    let restart = shutdown.child_token();
    let (app, state) = crate::build_station_app(crate::StationDeps {
        config: config.clone(),
        kv: kv.clone(),
        ports: ports.clone(),
        peers: peers.clone(),
        uptime,
        restart: restart.clone(),
        shutdown: shutdown.clone(),
    });

    // The peer bus and station radio share one channel.
    peers.init(info.channel, true, true);
    if let Some(csv) = kv.get_str(storage::NS_WIFI, storage::KEY_PEERS) {
        peers.load_peers_from_csv(&csv);
    }
    state.set_link_status(LinkStatus {
        connected: true,
        ip: info.ip.clone(),
        channel: info.channel,
        rssi: info.rssi,
    });

    // Reconnect policy: on link drop, flip the flag and re-join with
    // back-off; engine state is never disturbed.
    {
        let state = state.clone();
        let wifi = wifi.clone();
        let creds = creds.clone();
        let restart = restart.clone();
        let mut drops = wifi.link_drops();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = restart.cancelled() => break,
                    changed = drops.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        tracing::warn!("station link lost");
                        let mut link = state.link_status();
                        link.connected = false;
                        state.set_link_status(link);

                        if let Some(info) =
                            connect_with_backoff(wifi.as_ref(), &creds, &restart).await
                        {
                            state.peers.set_channel(info.channel);
                            state.set_link_status(LinkStatus {
                                connected: true,
                                ip: info.ip.clone(),
                                channel: info.channel,
                                rssi: info.rssi,
                            });
                        }
                    }
                }
            }
        });
    }

    serve(&config.listen_addr, app, restart).await;
    tracing::info!("station stage ended");
}

async fn serve(listen_addr: &str, app: axum::Router, restart: CancellationToken) {
    // Bind with SO_REUSEADDR: a lifecycle restart re-binds the same
    // port while connections from the previous stage sit in TIME_WAIT.
    let listener = match bind_reusable(listen_addr) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = listen_addr, error = %e, "failed to bind; retrying shortly");
            tokio::time::sleep(Duration::from_secs(1)).await;
            return;
        },
    };
    tracing::info!(addr = listen_addr, "HTTP server listening");

    let graceful = restart.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }
}

fn bind_reusable(listen_addr: &str) -> std::io::Result<tokio::net::TcpListener> {
    let addr: std::net::SocketAddr = listen_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(64)
}
