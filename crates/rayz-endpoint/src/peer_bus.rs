//! The peer-to-peer event bus: fixed-size datagram exchange with other
//! endpoints over a shared radio channel.
//!
//! The radio itself is a port ([`RadioLink`]); a UDP-backed
//! implementation is provided for hosts, framing `[src_mac(6) |
//! datagram]` on a shared broadcast port. The bus owns the peer table
//! (unicast addresses, last-seen roster data, de-dup sequences) and a
//! bounded receive queue filled from the driver's receive context.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use rayz_core::mac::Mac;
use rayz_core::net::datagram::{DATAGRAM_LEN, PeerDatagram};
use rayz_core::time::{ms_since, seq_newer, Uptime};

/// Bounded receive queue depth; the oldest entry is dropped on overflow.
pub const RX_QUEUE_DEPTH: usize = 16;

/// Peer table capacity, matching the radio driver's limit.
pub const PEER_CAPACITY: usize = 20;

/// Peers silent for longer than this fall out of the table.
pub const PEER_STALE_MS: u32 = 30_000;

/// Send-mutex acquire budget; on timeout the frame is dropped.
const SEND_BUDGET: Duration = Duration::from_millis(50);

/// The raw radio transport. `transmit` must not block.
pub trait RadioLink: Send + Sync {
    fn transmit(&self, dest: Mac, payload: &[u8]) -> bool;
    fn set_channel(&self, _channel: u8) {}
}

/// A received datagram with its source address.
#[derive(Debug, Clone, Copy)]
pub struct PeerEnvelope {
    pub datagram: PeerDatagram,
    pub src_mac: Mac,
}

struct PeerEntry {
    mac: Mac,
    last_seen_ms: u32,
    last_seq_rx: u32,
    seq_seen: bool,
    player_id: Option<u8>,
    team_id: Option<u8>,
}

pub struct PeerBus {
    link: Arc<dyn RadioLink>,
    uptime: Uptime,
    peers: StdMutex<Vec<PeerEntry>>,
    rx_queue: StdMutex<VecDeque<PeerEnvelope>>,
    rx_notify: Notify,
    send_lock: tokio::sync::Mutex<()>,
    tx_seq: AtomicU32,
    channel: AtomicU8,
    initialized: AtomicBool,
}

impl PeerBus {
    pub fn new(link: Arc<dyn RadioLink>, uptime: Uptime) -> Arc<Self> {
        Arc::new(Self {
            link,
            uptime,
            peers: StdMutex::new(Vec::new()),
            rx_queue: StdMutex::new(VecDeque::with_capacity(RX_QUEUE_DEPTH)),
            rx_notify: Notify::new(),
            send_lock: tokio::sync::Mutex::new(()),
            tx_seq: AtomicU32::new(1),
            channel: AtomicU8::new(0),
            initialized: AtomicBool::new(false),
        })
    }

    /// Brings the bus up. Idempotent; `channel = 0` keeps the current
    /// channel, anything else locks the shared radio onto it.
    pub fn init(&self, channel: u8, set_pmk: bool, prefer_wifi: bool) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            if channel != 0 {
                self.set_channel(channel);
            }
            return;
        }
        if channel != 0 {
            self.set_channel(channel);
        }
        tracing::info!(channel, set_pmk, prefer_wifi, "peer bus ready");
    }

    pub fn set_channel(&self, channel: u8) {
        if channel == 0 {
            return;
        }
        self.channel.store(channel, Ordering::Relaxed);
        self.link.set_channel(channel);
        tracing::info!(channel, "peer bus channel locked");
    }

    pub fn channel(&self) -> u8 {
        self.channel.load(Ordering::Relaxed)
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, Vec<PeerEntry>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a unicast peer. Already-known addresses are fine.
    pub fn add_peer(&self, mac: Mac) -> bool {
        let now = self.uptime.now_ms();
        let mut peers = self.lock_peers();
        if peers.iter().any(|p| p.mac == mac) {
            return true;
        }
        if peers.len() >= PEER_CAPACITY {
            tracing::warn!(%mac, "peer table full");
            return false;
        }
        peers.push(PeerEntry {
            mac,
            last_seen_ms: now,
            last_seq_rx: 0,
            seq_seen: false,
            player_id: None,
            team_id: None,
        });
        tracing::info!(%mac, "peer added");
        true
    }

    pub fn clear_peers(&self) {
        self.lock_peers().clear();
    }

    pub fn peer_count(&self) -> u8 {
        self.lock_peers().len() as u8
    }

    /// Parses `aa:bb:cc:dd:ee:ff` units separated by `,` or `;` and adds
    /// each. Returns true when at least one peer was added.
    pub fn load_peers_from_csv(&self, csv: &str) -> bool {
        let mut loaded = 0u8;
        for unit in csv.split([',', ';']) {
            let unit = unit.trim();
            if unit.is_empty() {
                continue;
            }
            match Mac::from_str(unit) {
                Ok(mac) => {
                    if self.add_peer(mac) {
                        loaded += 1;
                    }
                },
                Err(e) => tracing::warn!(error = %e, "skipping peer entry"),
            }
        }
        tracing::info!(loaded, "peers loaded from list");
        loaded > 0
    }

    /// Next rolling sequence number for an outbound datagram.
    pub fn next_seq(&self) -> u32 {
        self.tx_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends one datagram to one peer. Contention is serialized by a
    /// short mutex; missing the 50 ms budget drops the frame.
    pub async fn send(&self, dest: Mac, datagram: &PeerDatagram) -> bool {
        let Ok(_guard) = tokio::time::timeout(SEND_BUDGET, self.send_lock.lock()).await else {
            tracing::warn!(%dest, "send mutex busy, frame dropped");
            return false;
        };
        self.link.transmit(dest, &datagram.encode())
    }

    /// Broadcast to every endpoint on the channel.
    pub async fn broadcast(&self, datagram: &PeerDatagram) -> bool {
        self.send(Mac::BROADCAST, datagram).await
    }

    /// Driver receive context: validate, enqueue, never block. Overflow
    /// drops the oldest queued envelope.
    pub fn ingest(&self, src_mac: Mac, payload: &[u8]) {
        let datagram = match PeerDatagram::decode(payload) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(%src_mac, error = %e, "invalid datagram dropped");
                return;
            },
        };
        {
            let mut queue = self.rx_queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= RX_QUEUE_DEPTH {
                queue.pop_front();
            }
            queue.push_back(PeerEnvelope { datagram, src_mac });
        }
        self.rx_notify.notify_one();
    }

    /// Drains the receive queue. Duplicates (stale rolling sequence per
    /// source) are discarded here, silently. Returns `None` on timeout.
    pub async fn receive(&self, timeout: Duration) -> Option<PeerEnvelope> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            while let Some(envelope) = {
                let mut queue = self.rx_queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.pop_front()
            } {
                if self.note_rx(&envelope) {
                    return Some(envelope);
                }
            }
            if tokio::time::timeout_at(deadline, self.rx_notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    /// Updates the roster for a received envelope; false means the
    /// sequence was stale and the envelope is a duplicate.
    fn note_rx(&self, envelope: &PeerEnvelope) -> bool {
        let now = self.uptime.now_ms();
        let d = &envelope.datagram;
        let mut peers = self.lock_peers();

        let entry = match peers.iter_mut().find(|p| p.mac == envelope.src_mac) {
            Some(entry) => entry,
            None => {
                if peers.len() >= PEER_CAPACITY {
                    // Roster full: still deliver, just untracked.
                    return true;
                }
                peers.push(PeerEntry {
                    mac: envelope.src_mac,
                    last_seen_ms: now,
                    last_seq_rx: 0,
                    seq_seen: false,
                    player_id: None,
                    team_id: None,
                });
                peers.last_mut().expect("just pushed")
            },
        };

        if entry.seq_seen && !seq_newer(d.seq, entry.last_seq_rx) {
            return false;
        }
        entry.seq_seen = true;
        entry.last_seq_rx = d.seq;
        entry.last_seen_ms = now;
        entry.player_id = Some(d.player_id);
        entry.team_id = Some(d.team_id);
        true
    }

    /// Team of a player as last advertised on the bus.
    pub fn team_of(&self, player_id: u8) -> Option<u8> {
        self.lock_peers()
            .iter()
            .find(|p| p.player_id == Some(player_id))
            .and_then(|p| p.team_id)
    }

    /// Unicast address of a player, if this endpoint has heard from it.
    pub fn mac_of(&self, player_id: u8) -> Option<Mac> {
        self.lock_peers()
            .iter()
            .find(|p| p.player_id == Some(player_id))
            .map(|p| p.mac)
    }

    /// Drops peers that have gone silent.
    pub fn expire_stale(&self, now_ms: u32) {
        let mut peers = self.lock_peers();
        let before = peers.len();
        peers.retain(|p| ms_since(now_ms, p.last_seen_ms) <= PEER_STALE_MS);
        let expired = before - peers.len();
        if expired > 0 {
            tracing::info!(expired, "stale peers expired");
        }
    }
}

// ---------------------------------------------------------------------------
// UDP-backed radio link
// ---------------------------------------------------------------------------

/// Emulates the shared-channel radio over a UDP broadcast port. Frames
/// are `[src_mac(6) | datagram(DATAGRAM_LEN)]`; unicast destinations use
/// addresses learned from inbound frames and fall back to broadcast.
pub struct UdpRadioLink {
    socket: Arc<UdpSocket>,
    port: u16,
    own_mac: Mac,
    addrs: StdMutex<HashMap<Mac, SocketAddr>>,
}

impl UdpRadioLink {
    pub async fn bind(port: u16, own_mac: Mac) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.set_broadcast(true)?;
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            port,
            own_mac,
            addrs: StdMutex::new(HashMap::new()),
        }))
    }

    /// Local port actually bound (useful when `port` was 0).
    pub fn local_port(&self) -> u16 {
        self.socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(self.port)
    }

    /// Drains the socket into the bus until shutdown.
    pub fn spawn_reader(self: &Arc<Self>, bus: Arc<PeerBus>, shutdown: CancellationToken) {
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = link.socket.recv_from(&mut buf) => {
                        let Ok((len, addr)) = result else { break };
                        if len < 6 + DATAGRAM_LEN {
                            continue;
                        }
                        let mut mac = [0u8; 6];
                        mac.copy_from_slice(&buf[..6]);
                        let src_mac = Mac(mac);
                        if src_mac == link.own_mac {
                            continue; // our own broadcast echo
                        }
                        {
                            let mut addrs =
                                link.addrs.lock().unwrap_or_else(|e| e.into_inner());
                            addrs.insert(src_mac, addr);
                        }
                        bus.ingest(src_mac, &buf[6..6 + DATAGRAM_LEN]);
                    }
                }
            }
        });
    }
}

impl RadioLink for UdpRadioLink {
    fn transmit(&self, dest: Mac, payload: &[u8]) -> bool {
        let mut frame = Vec::with_capacity(6 + payload.len());
        frame.extend_from_slice(self.own_mac.as_bytes());
        frame.extend_from_slice(payload);

        let target: SocketAddr = if dest.is_broadcast() {
            (Ipv4Addr::BROADCAST, self.port).into()
        } else {
            let addrs = self.addrs.lock().unwrap_or_else(|e| e.into_inner());
            match addrs.get(&dest) {
                Some(addr) => *addr,
                None => (Ipv4Addr::BROADCAST, self.port).into(),
            }
        };

        match self.socket.try_send_to(&frame, target) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(%dest, error = %e, "radio transmit failed");
                false
            },
        }
    }
}
