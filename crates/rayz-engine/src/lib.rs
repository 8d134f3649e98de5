//! The attribute-driven game-state engine.
//!
//! An [`Engine`] is a plain value owning one player's identity, the
//! active [`GameRules`] and the live runtime state. Every mutator takes
//! the current uptime in milliseconds and returns the [`Event`]s the
//! transition produced; the caller owns locking and side effects.

pub mod combat;
pub mod config;
pub mod events;
pub mod session;

pub use combat::Shooter;
pub use config::ConfigOutcome;
pub use events::Event;

use rayz_core::identity::DeviceIdentity;
use rayz_core::net::frames::{OP_STATUS, StatusConfig, StatusFrame, StatusState, StatusStats};
use rayz_core::rules::GameRules;

/// Live per-player counters and runtime flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveState {
    // Counters
    pub shots_fired: u32,
    pub hits_landed: u32,
    pub kills: u32,
    pub deaths: u32,
    pub friendly_fire_count: u32,
    pub rx_count: u32,
    pub tx_count: u32,

    // Runtime
    pub current_hearts: u16,
    pub current_ammo: u16,
    pub is_respawning: bool,
    pub respawn_end_ms: u32,
    pub is_reloading: bool,
    pub reload_end_ms: u32,
    pub last_shot_ms: Option<u32>,
    pub last_rx_ms: Option<u32>,
    pub last_death_ms: Option<u32>,
}

/// The match timer and command-machine state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTimer {
    pub running: bool,
    pub paused: bool,
    /// Absolute uptime deadline; 0 when the timer is disabled.
    pub end_time_ms: u32,
    pub pause_started_ms: u32,
    /// Latched by a timer expiry; shots stay denied until the next START.
    pub game_over_latched: bool,
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub identity: DeviceIdentity,
    pub rules: GameRules,
    live: LiveState,
    timer: MatchTimer,
    seq_id: u8,
}

impl Engine {
    pub fn new(identity: DeviceIdentity, rules: GameRules) -> Self {
        let mut engine = Self {
            identity,
            rules,
            live: LiveState::default(),
            timer: MatchTimer::default(),
            seq_id: 0,
        };
        engine.reset_runtime();
        engine
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn timer(&self) -> &MatchTimer {
        &self.timer
    }

    /// Hearts restored on spawn: `spawn_hearts` when set, otherwise the
    /// heart cap (or a single heart when the cap is infinite).
    pub(crate) fn spawn_hearts(&self) -> u16 {
        if self.rules.spawn_hearts > 0 {
            match self.rules.max_hearts.bounded() {
                Some(max) => self.rules.spawn_hearts.min(max),
                None => self.rules.spawn_hearts,
            }
        } else {
            self.rules.max_hearts.bounded().unwrap_or(1)
        }
    }

    /// Rounds restored by a completed reload: the magazine capacity when
    /// configured, otherwise the full ammo cap.
    pub(crate) fn magazine_fill(&self) -> u16 {
        if self.rules.mag_capacity > 0 {
            self.rules.mag_capacity
        } else {
            self.rules.max_ammo.bounded().unwrap_or(0)
        }
    }

    /// Restores hearts/ammo and clears transient combat state.
    pub(crate) fn reset_runtime(&mut self) {
        self.live.current_hearts = self.spawn_hearts();
        self.live.current_ammo = self.magazine_fill();
        self.live.is_respawning = false;
        self.live.respawn_end_ms = 0;
        self.live.is_reloading = false;
        self.live.reload_end_ms = 0;
        self.live.last_shot_ms = None;
        self.live.last_death_ms = None;
    }

    /// The RESET command: clear all counters and restore the runtime.
    pub fn reset_stats(&mut self) {
        self.live.shots_fired = 0;
        self.live.hits_landed = 0;
        self.live.kills = 0;
        self.live.deaths = 0;
        self.live.friendly_fire_count = 0;
        self.live.rx_count = 0;
        self.live.tx_count = 0;
        self.reset_runtime();
        tracing::info!("stats reset");
    }

    /// Admin- or peer-confirmed kill credit.
    pub fn kill_confirmed(&mut self) {
        self.live.kills += 1;
        self.live.hits_landed += 1;
        tracing::info!(kills = self.live.kills, "kill credited");
    }

    /// Accounting for an accepted laser frame.
    pub fn note_laser_rx(&mut self, now_ms: u32) {
        self.live.rx_count += 1;
        self.live.last_rx_ms = Some(now_ms);
    }

    /// Accounting for peer datagrams that actually left the radio.
    pub fn record_peer_tx(&mut self, sent: u32) {
        self.live.tx_count += sent;
    }

    /// One 100 ms housekeeping tick: respawn expiry, reload completion,
    /// match-timer expiry.
    pub fn tick(&mut self, now_ms: u32) -> Vec<Event> {
        let mut events = self.tick_combat(now_ms);
        events.extend(self.tick_session(now_ms));
        events
    }

    /// Builds the authoritative `status` report (op 10).
    pub fn status_frame(&self, now_ms: u32) -> StatusFrame {
        let id = &self.identity;
        let r = &self.rules;
        StatusFrame {
            op: OP_STATUS,
            kind: "status".to_string(),
            uptime_ms: now_ms,
            config: StatusConfig {
                device_id: id.device_id,
                player_id: id.player_id,
                team_id: id.team_id,
                color_rgb: id.color_rgb,
                device_name: id.device_name.clone(),
                role: id.role.as_str().to_string(),

                enable_hearts: r.enable_hearts,
                max_hearts: r.max_hearts.to_wire(),
                spawn_hearts: r.spawn_hearts,
                respawn_time_ms: r.respawn_time_ms,
                invulnerability_ms: r.invulnerability_ms,

                damage_in: r.damage_in,
                damage_out: r.damage_out,
                friendly_fire: r.friendly_fire,

                enable_ammo: !r.unlimited_ammo,
                max_ammo: r.max_ammo.to_wire(),
                mag_capacity: r.mag_capacity,
                reload_time_ms: r.reload_time_ms,
                shot_rate_limit_ms: r.shot_rate_limit_ms,
                unlimited_ammo: r.unlimited_ammo,

                kill_score: r.kill_score,
                hit_score: r.hit_score,
                assist_score: r.assist_score,
                score_to_win: r.score_to_win,

                game_duration_s: r.game_duration_s,

                overtime_enabled: r.overtime_enabled,
                sudden_death: r.sudden_death,
                team_play: r.team_play,
                random_teams_on_start: r.random_teams_on_start,
                hit_sound_enabled: r.hit_sound_enabled,
                haptic_enabled: r.haptic_enabled,

                volume: r.volume,
                sound_profile: r.sound_profile,
            },
            stats: self.stats(),
            state: StatusState {
                current_hearts: self.live.current_hearts,
                current_ammo: self.live.current_ammo,
                is_respawning: self.live.is_respawning,
                is_reloading: self.live.is_reloading,
                remaining_time_s: self.remaining_time_s(now_ms),
            },
        }
    }

    pub fn stats(&self) -> StatusStats {
        StatusStats {
            shots: self.live.shots_fired,
            enemy_kills: self.live.kills,
            friendly_kills: self.live.friendly_fire_count,
            deaths: self.live.deaths,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::test_engine;
    use rayz_core::rules::Extent;

    #[test]
    fn new_engine_starts_at_spawn_values() {
        let engine = test_engine();
        assert_eq!(engine.live().current_hearts, 3);
        assert_eq!(engine.live().current_ammo, 30);
        assert!(!engine.live().is_respawning);
        assert!(!engine.timer().running);
    }

    #[test]
    fn mag_capacity_overrides_full_reload() {
        let mut engine = test_engine();
        engine.rules.mag_capacity = 12;
        assert_eq!(engine.magazine_fill(), 12);
        engine.rules.mag_capacity = 0;
        assert_eq!(engine.magazine_fill(), 30);
    }

    #[test]
    fn spawn_hearts_capped_by_max() {
        let mut engine = test_engine();
        engine.rules.spawn_hearts = 10;
        engine.rules.max_hearts = Extent::Bounded(5);
        assert_eq!(engine.spawn_hearts(), 5);

        engine.rules.max_hearts = Extent::Infinite;
        assert_eq!(engine.spawn_hearts(), 10);

        engine.rules.spawn_hearts = 0;
        assert_eq!(engine.spawn_hearts(), 1);
    }

    #[test]
    fn reset_clears_counters_and_runtime() {
        let mut engine = test_engine();
        engine.kill_confirmed();
        engine.note_laser_rx(10);
        engine.reset_stats();
        assert_eq!(engine.live().kills, 0);
        assert_eq!(engine.live().rx_count, 0);
        assert_eq!(engine.live().current_hearts, 3);
    }

    #[test]
    fn status_frame_shape() {
        let engine = test_engine();
        let frame = engine.status_frame(1234);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], 10);
        assert_eq!(json["type"], "status");
        assert_eq!(json["uptime_ms"], 1234);
        assert_eq!(json["config"]["device_id"], 10);
        assert_eq!(json["config"]["max_hearts"], 3);
        assert_eq!(json["stats"]["deaths"], 0);
        assert_eq!(json["state"]["current_hearts"], 3);
        // Timer disabled: remaining time omitted entirely.
        assert!(json["state"].get("remaining_time_s").is_none());
    }
}
