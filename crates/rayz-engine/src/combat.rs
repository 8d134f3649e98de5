//! The shot state machine and hit/kill resolution.

use rayz_core::laser;
use rayz_core::time::{ms_since, reached};

use crate::events::Event;
use crate::Engine;

/// Resolved identity of whoever fired the incoming shot. The team is
/// looked up from the peer roster by the router and is `None` for
/// shooters this endpoint has never heard from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shooter {
    pub player_id: u8,
    pub device_id: u8,
    pub team_id: Option<u8>,
}

impl Engine {
    /// Trigger pulled. Returns the shot event when the shot is allowed;
    /// a denied shot is silent (`Busy`) and observable only through the
    /// absence of a `shot_fired`.
    pub fn trigger_pulled(&mut self, now_ms: u32) -> Vec<Event> {
        if self.live.is_respawning || self.live.is_reloading || self.timer.game_over_latched {
            return Vec::new();
        }

        if let Some(last) = self.live.last_shot_ms
            && ms_since(now_ms, last) < self.rules.shot_rate_limit_ms
        {
            return Vec::new();
        }

        let consumes_ammo = !self.rules.unlimited_ammo && !self.rules.max_ammo.is_infinite();
        if consumes_ammo && self.live.current_ammo == 0 {
            // Empty magazine: the trigger starts the reload instead.
            self.start_reload(now_ms);
            return Vec::new();
        }

        if consumes_ammo {
            self.live.current_ammo -= 1;
        }
        self.live.last_shot_ms = Some(now_ms);
        self.live.shots_fired += 1;

        let seq_id = self.seq_id;
        self.seq_id = self.seq_id.wrapping_add(1);

        let laser_frame = laser::encode(self.identity.player_id, self.identity.device_id);

        if consumes_ammo && self.live.current_ammo == 0 {
            self.start_reload(now_ms);
        }

        vec![Event::ShotFired { seq_id, laser_frame }]
    }

    /// Explicit reload request (reload button).
    pub fn reload_requested(&mut self, now_ms: u32) -> Vec<Event> {
        let consumes_ammo = !self.rules.unlimited_ammo && !self.rules.max_ammo.is_infinite();
        if !consumes_ammo || self.live.is_reloading || self.live.is_respawning {
            return Vec::new();
        }
        self.start_reload(now_ms);
        Vec::new()
    }

    fn start_reload(&mut self, now_ms: u32) {
        self.live.is_reloading = true;
        self.live.reload_end_ms = now_ms.wrapping_add(self.rules.reload_time_ms);
        tracing::debug!(reload_ms = self.rules.reload_time_ms, "reload started");
    }

    /// Applies an incoming hit per the resolution rules.
    pub fn hit(&mut self, shooter: Shooter, damage: Option<u16>, now_ms: u32) -> Vec<Event> {
        // Dead players and freshly-respawned players take no damage.
        if self.live.is_respawning {
            return Vec::new();
        }
        if let Some(death) = self.live.last_death_ms
            && ms_since(now_ms, death) < self.rules.invulnerability_ms
        {
            return Vec::new();
        }

        // Friendly fire under team play is rejected, not absorbed.
        if self.rules.team_play
            && !self.rules.friendly_fire
            && shooter.team_id == Some(self.identity.team_id)
        {
            tracing::debug!(shooter = shooter.player_id, "friendly fire rejected");
            return vec![Event::HitInvalid {
                shooter_id: shooter.player_id,
            }];
        }

        let damage = damage.unwrap_or(self.rules.damage_in);

        if !self.rules.enable_hearts {
            return vec![Event::HitReport {
                fatal: false,
                shooter_id: shooter.player_id,
                damage,
            }];
        }

        if self.rules.max_hearts.is_infinite() {
            // Unbounded hearts never drop below one.
            self.live.current_hearts = self.live.current_hearts.saturating_sub(damage).max(1);
            return vec![Event::HitReport {
                fatal: false,
                shooter_id: shooter.player_id,
                damage,
            }];
        }

        self.live.current_hearts = self.live.current_hearts.saturating_sub(damage);

        if self.live.current_hearts == 0 {
            self.live.is_respawning = true;
            self.live.respawn_end_ms = now_ms.wrapping_add(self.rules.respawn_time_ms);
            self.live.deaths += 1;
            self.live.last_death_ms = Some(now_ms);
            tracing::info!(
                shooter = shooter.player_id,
                deaths = self.live.deaths,
                "fatal hit, respawning"
            );
            vec![Event::HitReport {
                fatal: true,
                shooter_id: shooter.player_id,
                damage,
            }]
        } else {
            vec![Event::HitReport {
                fatal: false,
                shooter_id: shooter.player_id,
                damage,
            }]
        }
    }

    /// Respawn expiry and reload completion, driven by the 100 ms tick.
    pub(crate) fn tick_combat(&mut self, now_ms: u32) -> Vec<Event> {
        let mut events = Vec::new();

        if self.live.is_respawning && reached(now_ms, self.live.respawn_end_ms) {
            self.live.is_respawning = false;
            self.live.current_hearts = self.spawn_hearts();
            tracing::info!(hearts = self.live.current_hearts, "respawn complete");
            events.push(Event::Respawn {
                current_hearts: self.live.current_hearts,
            });
        }

        if self.live.is_reloading && reached(now_ms, self.live.reload_end_ms) {
            self.live.is_reloading = false;
            self.live.current_ammo = self.magazine_fill();
            events.push(Event::ReloadComplete {
                current_ammo: self.live.current_ammo,
            });
        }

        events
    }
}
