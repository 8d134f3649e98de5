//! Admin protocol v2.2 dispatcher: translates inbound commands into
//! engine mutations and replies.
//!
//! Runs inside the engine task. Contract: every command that carried a
//! `req_id` gets exactly one `ack{reply_to}`; `config_update` and
//! successful `game_command`s additionally broadcast a fresh `status`.

use rayz_core::net::frames::{AckFrame, Command, CommandFrame, HeartbeatAckFrame};
use rayz_engine::Shooter;

use crate::ports::MAX_SOUND_ID;
use crate::router::{self, EmitContext};
use crate::state::AppState;
use crate::storage;
use crate::ws::SessionId;

pub(crate) async fn handle_command(
    state: &AppState,
    session: SessionId,
    frame: CommandFrame,
    now: u32,
) {
    // The ack (if req_id was given) is built alongside the effect and
    // sent exactly once at the end.
    let mut ack = frame.req_id.as_deref().map(AckFrame::ok);

    match frame.command {
        Command::GetStatus => {
            let status = state.engine.lock().await.status_frame(now);
            router::send_frame(state, session, &status, now);
        },
        Command::Heartbeat => {
            let batt_voltage = state.ports.battery.voltage();
            let rssi = state.link_status().rssi;
            router::send_frame(state, session, &HeartbeatAckFrame::new(batt_voltage, rssi), now);
        },
        Command::ConfigUpdate(update) => {
            let (outcome, identity, status) = {
                let mut engine = state.engine.lock().await;
                let outcome = engine.apply_config(&update, now);
                (outcome, engine.identity.clone(), engine.status_frame(now))
            };

            // Identity is the persistent part; rules stay session-scoped.
            if outcome.identity_changed
                && let Err(e) = storage::store_identity(state.kv.as_ref(), &identity)
            {
                tracing::warn!(error = %e, "identity not persisted; RAM state stays authoritative");
            }

            ack = ack.map(|a| a.with_clamped(outcome.clamped));
            router::broadcast_frame(state, &status, now);
        },
        Command::GameCommand(kind) => {
            let result = {
                let mut engine = state.engine.lock().await;
                engine.game_command(kind, now).map(|events| {
                    (events, EmitContext::capture(&engine), engine.status_frame(now))
                })
            };
            match result {
                Ok((events, ctx, status)) => {
                    tracing::info!(command = kind.as_str(), "game command applied");
                    router::emit_events(state, &ctx, events, now).await;
                    router::broadcast_frame(state, &status, now);
                },
                Err(reason) => {
                    tracing::warn!(command = kind.as_str(), reason, "game command rejected");
                    ack = frame.req_id.as_deref().map(|r| AckFrame::rejected(r, reason));
                },
            }
        },
        Command::HitForward {
            shooter_id,
            shooter_team,
            damage,
        } => {
            // Debug injection: resolved exactly like a real laser hit,
            // minus the rx accounting.
            let team_id = shooter_team.or_else(|| state.peers.team_of(shooter_id));
            let (events, ctx) = {
                let mut engine = state.engine.lock().await;
                let events = engine.hit(
                    Shooter {
                        player_id: shooter_id,
                        device_id: shooter_id,
                        team_id,
                    },
                    damage,
                    now,
                );
                (events, EmitContext::capture(&engine))
            };
            router::emit_events(state, &ctx, events, now).await;
        },
        Command::KillConfirmed => {
            let status = {
                let mut engine = state.engine.lock().await;
                engine.kill_confirmed();
                engine.status_frame(now)
            };
            router::broadcast_frame(state, &status, now);
        },
        Command::RemoteSound { sound_id } => {
            if sound_id <= MAX_SOUND_ID {
                state.ports.sound.play(sound_id);
            } else {
                tracing::warn!(sound_id, "remote sound id out of range");
                ack = frame
                    .req_id
                    .as_deref()
                    .map(|r| AckFrame::rejected(r, "unknown sound id"));
            }
        },
    }

    if let Some(ack) = ack {
        router::send_frame(state, session, &ack, now);
    }
}
