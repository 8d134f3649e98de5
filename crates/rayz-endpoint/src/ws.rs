//! WebSocket server core: the bounded client table and the `/ws`
//! handler.
//!
//! The table holds at most [`MAX_CLIENTS`] rows keyed by a
//! process-unique session id. Outbound frames are handed to a per-client
//! bounded channel without blocking; a full channel drops the frame and
//! leaves the client's activity clock untouched. Broadcast snapshots the
//! active set under the table lock and sends outside it.

use std::sync::Mutex;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use rayz_core::net::frames::{Command, CommandFrame};
use rayz_core::net::protocol::{self, MAX_FRAME_SIZE};
use rayz_core::time::ms_since;

use crate::router::EngineInput;
use crate::state::AppState;

/// Fixed client-table capacity.
pub const MAX_CLIENTS: usize = 8;

/// Clients silent for longer than this are evicted.
pub const STALE_TIMEOUT_MS: u32 = 30_000;

pub type SessionId = u64;

#[derive(Debug)]
pub struct TableFull;

struct ClientSlot {
    session: SessionId,
    tx: mpsc::Sender<Message>,
    last_activity_ms: u32,
    #[allow(dead_code)]
    supports_binary: bool,
}

/// The fixed-capacity WebSocket client table.
pub struct ClientTable {
    slots: Mutex<[Option<ClientSlot>; MAX_CLIENTS]>,
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, [Option<ClientSlot>; MAX_CLIENTS]> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a client on handshake: any stale rows and any old row
    /// for the same session go first, then the first free slot is taken.
    pub fn register(
        &self,
        session: SessionId,
        tx: mpsc::Sender<Message>,
        supports_binary: bool,
        now_ms: u32,
    ) -> Result<usize, TableFull> {
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            if let Some(client) = slot
                && (client.session == session
                    || ms_since(now_ms, client.last_activity_ms) > STALE_TIMEOUT_MS)
            {
                *slot = None;
            }
        }
        let free = slots.iter_mut().find(|s| s.is_none()).ok_or(TableFull)?;
        *free = Some(ClientSlot {
            session,
            tx,
            last_activity_ms: now_ms,
            supports_binary,
        });
        Ok(slots.iter().filter(|s| s.is_some()).count())
    }

    pub fn remove(&self, session: SessionId) -> bool {
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|c| c.session == session) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Refreshes a client's activity clock (inbound frame or PONG).
    pub fn touch(&self, session: SessionId, now_ms: u32) {
        let mut slots = self.lock();
        if let Some(client) = slots
            .iter_mut()
            .flatten()
            .find(|c| c.session == session)
        {
            client.last_activity_ms = now_ms;
        }
    }

    /// Drops every client that went silent; returns the evicted ids.
    pub fn evict_stale(&self, now_ms: u32) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            if let Some(client) = slot
                && ms_since(now_ms, client.last_activity_ms) > STALE_TIMEOUT_MS
            {
                evicted.push(client.session);
                *slot = None;
            }
        }
        evicted
    }

    /// Sends one frame to one client. The hand-off never blocks: a full
    /// channel drops the frame and does not refresh activity.
    pub fn send_to(&self, session: SessionId, msg: Message, now_ms: u32) -> bool {
        let tx = {
            let slots = self.lock();
            match slots.iter().flatten().find(|c| c.session == session) {
                Some(client) => client.tx.clone(),
                None => return false,
            }
        };
        if tx.try_send(msg).is_ok() {
            self.touch(session, now_ms);
            true
        } else {
            false
        }
    }

    /// Fan-out: snapshot the active set under the lock, send outside it.
    pub fn broadcast(&self, msg: Message, now_ms: u32) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<Message>)> = {
            let slots = self.lock();
            slots
                .iter()
                .flatten()
                .map(|c| (c.session, c.tx.clone()))
                .collect()
        };

        let mut sent = 0;
        for (session, tx) in targets {
            if tx.try_send(msg.clone()).is_ok() {
                self.touch(session, now_ms);
                sent += 1;
            }
        }
        sent
    }

    /// Unsolicited PING to every client. Deliberately does not refresh
    /// activity; only the answering PONG does.
    pub fn ping_all(&self) -> usize {
        let targets: Vec<mpsc::Sender<Message>> = {
            let slots = self.lock();
            slots.iter().flatten().map(|c| c.tx.clone()).collect()
        };
        targets
            .into_iter()
            .filter(|tx| tx.try_send(Message::Ping(Vec::new().into())).is_ok())
            .count()
    }

    pub fn count(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_connected(&self) -> bool {
        self.count() > 0
    }
}

// ---------------------------------------------------------------------------
// The /ws endpoint
// ---------------------------------------------------------------------------

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = state.next_session_id();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(state.config.limits.client_buffer);

    let now = state.uptime.now_ms();
    match state.clients.register(session, tx, true, now) {
        Ok(total) => {
            tracing::info!(session, total, "WebSocket client connected");
        },
        Err(TableFull) => {
            tracing::warn!(session, "client table full, refusing connection");
            let _ = ws_sender.close().await;
            return;
        },
    }

    // Writer task: drains the per-client channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Fresh clients get an immediate status report.
    let _ = state
        .inputs
        .send(EngineInput::Command {
            session,
            frame: CommandFrame {
                command: Command::GetStatus,
                req_id: None,
            },
        })
        .await;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let now = state.uptime.now_ms();
        match msg {
            Message::Text(text) => {
                if text.len() > MAX_FRAME_SIZE {
                    tracing::debug!(session, len = text.len(), "oversized frame dropped");
                    continue;
                }
                state.clients.touch(session, now);
                match protocol::decode_command(text.as_str()) {
                    Ok(Some(frame)) => {
                        if state
                            .inputs
                            .send(EngineInput::Command { session, frame })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    },
                    Ok(None) => {
                        tracing::debug!(session, "unknown op ignored");
                    },
                    Err(e) => {
                        tracing::debug!(session, error = %e, "undecodable frame dropped");
                    },
                }
            },
            Message::Binary(_) => {
                // Reserved for a future MessagePack profile; JSON is
                // authoritative. Count it as activity and move on.
                state.clients.touch(session, now);
            },
            Message::Pong(_) => {
                state.clients.touch(session, now);
            },
            Message::Ping(_) => {
                // axum answers pings itself.
            },
            Message::Close(_) => break,
        }
    }

    state.clients.remove(session);
    writer.abort();
    tracing::info!(session, "WebSocket client disconnected");
}
