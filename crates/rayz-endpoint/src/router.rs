//! The message router: one engine task draining one input queue.
//!
//! Laser RX, peer RX, WS commands, trigger pulls and the 100 ms tick all
//! arrive here; every state mutation happens inside this task, and all
//! side effects (WS frames, peer TX, laser TX, NVS writes) are emitted
//! only after the corresponding transition has completed.

use std::time::Duration;

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rayz_core::identity::DeviceIdentity;
use rayz_core::laser;
use rayz_core::mac::Mac;
use rayz_core::net::datagram::{DATAGRAM_VERSION, DatagramKind, PeerDatagram};
use rayz_core::net::frames::{
    CommandFrame, GameOverFrame, HitReportFrame, ReloadEventFrame, RespawnFrame, ShotFiredFrame,
};
use rayz_core::net::protocol;
use rayz_engine::{Event, Shooter};

use crate::dispatch;
use crate::peer_bus::PeerEnvelope;
use crate::ports::SOUND_HIT;
use crate::state::AppState;
use crate::ws::SessionId;

/// Everything the engine task consumes.
#[derive(Debug)]
pub enum EngineInput {
    /// A decoded admin command from a WS client.
    Command {
        session: SessionId,
        frame: CommandFrame,
    },
    /// A raw 32-bit frame from the photodiode driver.
    LaserRx { frame: u32 },
    /// A de-duplicated datagram from the peer bus.
    PeerRx(PeerEnvelope),
    /// Trigger GPIO edge.
    TriggerPulled,
    /// Reload button edge.
    ReloadRequested,
    /// 100 ms housekeeping tick.
    Tick,
}

/// Snapshot taken under the engine lock so event emission can run
/// outside it.
pub(crate) struct EmitContext {
    pub identity: DeviceIdentity,
    pub hit_sound_enabled: bool,
    pub stats: rayz_core::net::frames::StatusStats,
}

impl EmitContext {
    pub(crate) fn capture(engine: &rayz_engine::Engine) -> Self {
        Self {
            identity: engine.identity.clone(),
            hit_sound_enabled: engine.rules.hit_sound_enabled,
            stats: engine.stats(),
        }
    }
}

/// Spawns the engine task.
pub fn spawn_router(state: AppState, mut inputs: mpsc::Receiver<EngineInput>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = state.restart.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                input = inputs.recv() => {
                    let Some(input) = input else { break };
                    handle_input(&state, input).await;
                }
            }
        }
        tracing::debug!("engine task stopped");
    })
}

/// Spawns the 100 ms tick source plus the slower PING / peer-heartbeat
/// cadence derived from it.
pub fn spawn_ticker(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tick = Duration::from_millis(state.config.limits.tick_interval_ms);
        let ticks_per_ping = (state.config.limits.ping_interval_s * 1_000
            / state.config.limits.tick_interval_ms)
            .max(1);
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let shutdown = state.restart.clone();
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if state.inputs.send(EngineInput::Tick).await.is_err() {
                        break;
                    }
                    ticks += 1;
                    if ticks % ticks_per_ping == 0 {
                        state.clients.ping_all();
                        broadcast_peer_heartbeat(&state, state.now_ms()).await;
                    }
                }
            }
        }
    })
}

/// Spawns the peer-bus drain: receives de-duplicated envelopes and
/// forwards them onto the engine queue.
pub fn spawn_peer_drain(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = state.restart.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = state.peers.receive(Duration::from_secs(5)) => {
                    if let Some(envelope) = envelope
                        && state.inputs.send(EngineInput::PeerRx(envelope)).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    })
}

async fn handle_input(state: &AppState, input: EngineInput) {
    let now = state.now_ms();
    match input {
        EngineInput::Command { session, frame } => {
            dispatch::handle_command(state, session, frame, now).await;
        },
        EngineInput::LaserRx { frame } => {
            let Some((player_id, device_id)) = laser::decode(frame) else {
                tracing::debug!(
                    frame = format_args!("{frame:#010x}"),
                    "laser frame failed validation"
                );
                return;
            };
            let team_id = state.peers.team_of(player_id);
            let (events, ctx) = {
                let mut engine = state.engine.lock().await;
                engine.note_laser_rx(now);
                let events = engine.hit(
                    Shooter {
                        player_id,
                        device_id,
                        team_id,
                    },
                    None,
                    now,
                );
                (events, EmitContext::capture(&engine))
            };
            emit_events(state, &ctx, events, now).await;
        },
        EngineInput::PeerRx(envelope) => {
            handle_peer(state, envelope, now).await;
        },
        EngineInput::TriggerPulled => {
            let (events, ctx) = {
                let mut engine = state.engine.lock().await;
                let events = engine.trigger_pulled(now);
                (events, EmitContext::capture(&engine))
            };
            emit_events(state, &ctx, events, now).await;
        },
        EngineInput::ReloadRequested => {
            let (events, ctx) = {
                let mut engine = state.engine.lock().await;
                let events = engine.reload_requested(now);
                (events, EmitContext::capture(&engine))
            };
            emit_events(state, &ctx, events, now).await;
        },
        EngineInput::Tick => {
            let (events, ctx) = {
                let mut engine = state.engine.lock().await;
                let events = engine.tick(now);
                (events, EmitContext::capture(&engine))
            };
            emit_events(state, &ctx, events, now).await;

            for session in state.clients.evict_stale(now) {
                tracing::info!(session, "stale client evicted");
            }
            state.peers.expire_stale(now);
        },
    }
}

async fn handle_peer(state: &AppState, envelope: PeerEnvelope, now: u32) {
    let d = envelope.datagram;
    match d.kind {
        DatagramKind::Heartbeat => {
            // Roster bookkeeping already happened in the bus.
            tracing::trace!(player_id = d.player_id, "peer heartbeat");
        },
        DatagramKind::Shot => {
            // Informational: telemetry only, no state change.
            tracing::debug!(player_id = d.player_id, seq = d.seq, "peer shot observed");
        },
        DatagramKind::HitEvent => {
            let credited = {
                let engine = state.engine.lock().await;
                d.data == u32::from(engine.identity.player_id)
            };
            if !credited {
                return;
            }
            let status = {
                let mut engine = state.engine.lock().await;
                engine.kill_confirmed();
                engine.status_frame(now)
            };
            tracing::info!(victim = d.player_id, "kill credited by peer");
            broadcast_frame(state, &status, now);
        },
    }
}

/// Turns engine events into their external effects, in order.
pub(crate) async fn emit_events(
    state: &AppState,
    ctx: &EmitContext,
    events: Vec<Event>,
    now: u32,
) {
    let mut peer_tx = 0u32;

    for event in events {
        match event {
            Event::ShotFired { seq_id, laser_frame } => {
                state.ports.laser.emit(laser_frame);
                broadcast_frame(state, &ShotFiredFrame::new(seq_id, now), now);

                let datagram = PeerDatagram {
                    kind: DatagramKind::Shot,
                    version: DATAGRAM_VERSION,
                    player_id: ctx.identity.player_id,
                    device_id: ctx.identity.device_id,
                    team_id: ctx.identity.team_id,
                    color_rgb: ctx.identity.color_rgb,
                    seq: state.peers.next_seq(),
                    data: u32::from(seq_id),
                };
                if state.peers.broadcast(&datagram).await {
                    peer_tx += 1;
                }
            },
            Event::HitReport {
                fatal,
                shooter_id,
                damage,
            } => {
                broadcast_frame(state, &HitReportFrame::hit(fatal, shooter_id, damage, now), now);
                if ctx.hit_sound_enabled {
                    state.ports.sound.play(SOUND_HIT);
                }
                if fatal {
                    // Tell the shooter it scored a kill.
                    let datagram = PeerDatagram {
                        kind: DatagramKind::HitEvent,
                        version: DATAGRAM_VERSION,
                        player_id: ctx.identity.player_id,
                        device_id: ctx.identity.device_id,
                        team_id: ctx.identity.team_id,
                        color_rgb: ctx.identity.color_rgb,
                        seq: state.peers.next_seq(),
                        data: u32::from(shooter_id),
                    };
                    let dest = state.peers.mac_of(shooter_id).unwrap_or(Mac::BROADCAST);
                    if state.peers.send(dest, &datagram).await {
                        peer_tx += 1;
                    }
                }
            },
            Event::HitInvalid { shooter_id } => {
                broadcast_frame(state, &HitReportFrame::invalid(shooter_id, now), now);
            },
            Event::Respawn { current_hearts } => {
                broadcast_frame(state, &RespawnFrame::new(current_hearts, now), now);
            },
            Event::ReloadComplete { current_ammo } => {
                broadcast_frame(state, &ReloadEventFrame::new(current_ammo, now), now);
            },
            Event::GameOver => {
                broadcast_frame(state, &GameOverFrame::new(ctx.stats.clone(), now), now);
            },
        }
    }

    if peer_tx > 0 {
        state.engine.lock().await.record_peer_tx(peer_tx);
    }
}

/// Broadcasts the peer HEARTBEAT datagram advertising this endpoint's
/// identity; keeps the fleet's rosters (teams, unicast addresses) warm.
pub(crate) async fn broadcast_peer_heartbeat(state: &AppState, now: u32) {
    let identity = state.engine.lock().await.identity.clone();
    let datagram = PeerDatagram {
        kind: DatagramKind::Heartbeat,
        version: DATAGRAM_VERSION,
        player_id: identity.player_id,
        device_id: identity.device_id,
        team_id: identity.team_id,
        color_rgb: identity.color_rgb,
        seq: state.peers.next_seq(),
        data: now,
    };
    if state.peers.broadcast(&datagram).await {
        state.engine.lock().await.record_peer_tx(1);
    }
}

/// Serializes and broadcasts one frame to all WS clients.
pub(crate) fn broadcast_frame<T: Serialize>(state: &AppState, frame: &T, now: u32) {
    match protocol::encode(frame) {
        Ok(json) => {
            state.clients.broadcast(Message::Text(json.into()), now);
        },
        Err(e) => tracing::error!(error = %e, "failed to encode broadcast frame"),
    }
}

/// Serializes and sends one frame to one WS client.
pub(crate) fn send_frame<T: Serialize>(
    state: &AppState,
    session: SessionId,
    frame: &T,
    now: u32,
) -> bool {
    match protocol::encode(frame) {
        Ok(json) => state.clients.send_to(session, Message::Text(json.into()), now),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode frame");
            false
        },
    }
}
