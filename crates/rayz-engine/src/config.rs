//! The `config_update` contract: ordered application of a partial rules
//! delta with per-field clamping.

use rayz_core::net::frames::ConfigUpdate;
use rayz_core::rules::{Extent, GameRules};

use crate::Engine;

/// What a config application did, surfaced in the `ack` and used by the
/// caller to decide persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOutcome {
    /// At least one numeric field was coerced to a legal bound.
    pub clamped: bool,
    /// An identity field changed and must be written back to NVS.
    pub identity_changed: bool,
}

fn clamp(v: i64, lo: i64, hi: i64, clamped: &mut bool) -> i64 {
    if v < lo {
        *clamped = true;
        lo
    } else if v > hi {
        *clamped = true;
        hi
    } else {
        v
    }
}

fn clamp_extent(v: i64, lo: i64, hi: i64, clamped: &mut bool) -> Extent {
    if v < 0 {
        Extent::Infinite
    } else {
        Extent::Bounded(clamp(v, lo, hi, clamped) as u16)
    }
}

/// Identity bytes are silently coerced into range; the clamp flag is
/// reserved for the rule table.
fn as_u8(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

impl Engine {
    /// Applies a partial config delta in the fixed order:
    /// defaults reset, identity, hardware/AV, clamped numeric rules,
    /// liveness safety clamp, timer reconciliation.
    ///
    /// Persisting identity and broadcasting the new status are the
    /// caller's responsibility, driven by the returned outcome.
    pub fn apply_config(&mut self, update: &ConfigUpdate, now_ms: u32) -> ConfigOutcome {
        let mut out = ConfigOutcome::default();

        // 1. Factory defaults first, so explicit fields win over them.
        if update.reset_to_defaults == Some(true) {
            self.rules = GameRules::factory();
        }

        // 2. Identity.
        if let Some(v) = update.device_id {
            self.identity.device_id = as_u8(v);
            out.identity_changed = true;
        }
        if let Some(v) = update.player_id {
            self.identity.player_id = as_u8(v);
            out.identity_changed = true;
        }
        if let Some(v) = update.team_id {
            self.identity.team_id = as_u8(v);
            out.identity_changed = true;
        }
        if let Some(v) = update.color_rgb {
            self.identity.color_rgb = v.clamp(0, i64::from(u32::MAX)) as u32;
            out.identity_changed = true;
        }
        if let Some(name) = &update.device_name {
            self.identity.set_device_name(name);
            out.identity_changed = true;
        }

        // 3. Hardware / AV.
        if let Some(v) = update.volume {
            self.rules.volume = clamp(v, 0, 100, &mut out.clamped) as u8;
        }
        if let Some(v) = update.sound_profile {
            self.rules.sound_profile = clamp(v, 0, 2, &mut out.clamped) as u8;
        }
        if let Some(v) = update.haptic_enabled {
            self.rules.haptic_enabled = v;
        }

        // 4. Numeric rules, clamped per the rule table.
        if let Some(v) = update.max_hearts {
            self.rules.max_hearts = clamp_extent(v, 1, 99, &mut out.clamped);
        }
        if let Some(v) = update.spawn_hearts {
            let hi = i64::from(self.rules.max_hearts.bounded().unwrap_or(99));
            self.rules.spawn_hearts = clamp(v, 1, hi, &mut out.clamped) as u16;
        }
        let respawn_ms = update
            .respawn_time_ms
            .or(update.respawn_time_s.map(|s| s.saturating_mul(1_000)));
        if let Some(v) = respawn_ms {
            self.rules.respawn_time_ms = clamp(v, 0, 30_000, &mut out.clamped) as u32;
        }
        if let Some(v) = update.invulnerability_ms {
            self.rules.invulnerability_ms = clamp(v, 0, 30_000, &mut out.clamped) as u32;
        }
        if let Some(v) = update.enable_hearts {
            self.rules.enable_hearts = v;
        }

        if let Some(v) = update.damage_in {
            self.rules.damage_in = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }
        if let Some(v) = update.damage_out {
            self.rules.damage_out = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }
        if let Some(v) = update.friendly_fire {
            self.rules.friendly_fire = v;
        }

        if let Some(v) = update.max_ammo {
            self.rules.max_ammo = clamp_extent(v, 0, 65_535, &mut out.clamped);
        }
        if let Some(v) = update.mag_capacity {
            self.rules.mag_capacity = clamp(v, 0, 255, &mut out.clamped) as u16;
        }
        if let Some(v) = update.reload_time_ms {
            self.rules.reload_time_ms = clamp(v, 0, 30_000, &mut out.clamped) as u32;
        }
        if let Some(v) = update.shot_rate_limit_ms {
            self.rules.shot_rate_limit_ms = clamp(v, 50, 2_000, &mut out.clamped) as u32;
        }
        if let Some(v) = update.unlimited_ammo {
            self.rules.unlimited_ammo = v;
        }
        if let Some(v) = update.enable_ammo {
            self.rules.unlimited_ammo = !v;
        }

        if let Some(v) = update.kill_score {
            self.rules.kill_score = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }
        if let Some(v) = update.hit_score {
            self.rules.hit_score = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }
        if let Some(v) = update.assist_score {
            self.rules.assist_score = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }
        if let Some(v) = update.score_to_win {
            self.rules.score_to_win = clamp(v, 0, 65_535, &mut out.clamped) as u16;
        }

        if let Some(v) = update.game_duration_s {
            self.rules.game_duration_s = clamp(v, 0, 7_200, &mut out.clamped) as u32;
        }

        if let Some(v) = update.overtime_enabled {
            self.rules.overtime_enabled = v;
        }
        if let Some(v) = update.sudden_death {
            self.rules.sudden_death = v;
        }
        if let Some(v) = update.team_play {
            self.rules.team_play = v;
        }
        if let Some(v) = update.random_teams_on_start {
            self.rules.random_teams_on_start = v;
        }
        if let Some(v) = update.hit_sound_enabled {
            self.rules.hit_sound_enabled = v;
        }

        // 5. Liveness safety clamp. Lowering a cap pulls live values
        // down; raising one never auto-heals or auto-fills.
        if let Some(max) = self.rules.max_hearts.bounded() {
            if self.live.current_hearts > max {
                self.live.current_hearts = max;
            }
            if self.rules.spawn_hearts > max {
                self.rules.spawn_hearts = max;
            }
        }
        if let Some(max) = self.rules.max_ammo.bounded()
            && self.live.current_ammo > max
        {
            self.live.current_ammo = max;
        }

        // 6. Timer reconciliation against the (possibly new) duration.
        if self.timer.running {
            self.timer.end_time_ms = if self.rules.game_duration_s > 0 {
                now_ms.wrapping_add(self.rules.game_duration_s.saturating_mul(1_000))
            } else {
                0
            };
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_engine;
    use rayz_core::net::frames::GameCommandKind;

    fn update_json(json: &str) -> ConfigUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn in_range_values_do_not_clamp() {
        let mut engine = test_engine();
        let out = engine.apply_config(&update_json(r#"{"max_hearts":5,"volume":50}"#), 0);
        assert!(!out.clamped);
        assert_eq!(engine.rules.max_hearts, Extent::Bounded(5));
        assert_eq!(engine.rules.volume, 50);
    }

    #[test]
    fn out_of_range_values_clamp_and_flag() {
        let mut engine = test_engine();
        let out = engine.apply_config(
            &update_json(r#"{"max_hearts":500,"volume":300,"shot_rate_limit_ms":1}"#),
            0,
        );
        assert!(out.clamped);
        assert_eq!(engine.rules.max_hearts, Extent::Bounded(99));
        assert_eq!(engine.rules.volume, 100);
        assert_eq!(engine.rules.shot_rate_limit_ms, 50);
    }

    #[test]
    fn clamping_is_idempotent() {
        // apply(apply(C, R), R) == apply(C, R) for any delta R.
        let deltas = [
            r#"{"max_hearts":500,"spawn_hearts":1000,"volume":-5}"#,
            r#"{"max_ammo":-1,"reload_time_ms":99999,"game_duration_s":8000}"#,
            r#"{"reset_to_defaults":true,"max_hearts":-1,"sound_profile":9}"#,
        ];
        for delta in deltas {
            let update = update_json(delta);
            let mut engine = test_engine();
            engine.apply_config(&update, 0);
            let once = engine.rules.clone();
            engine.apply_config(&update, 0);
            assert_eq!(engine.rules, once, "delta {delta}");
        }
    }

    #[test]
    fn infinity_sentinel_only_where_allowed() {
        let mut engine = test_engine();
        let out = engine.apply_config(&update_json(r#"{"max_hearts":-1,"max_ammo":-1}"#), 0);
        assert!(!out.clamped);
        assert_eq!(engine.rules.max_hearts, Extent::Infinite);
        assert_eq!(engine.rules.max_ammo, Extent::Infinite);

        // Negative values on fields without the sentinel clamp to the floor.
        let out = engine.apply_config(&update_json(r#"{"respawn_time_ms":-5}"#), 0);
        assert!(out.clamped);
        assert_eq!(engine.rules.respawn_time_ms, 0);
    }

    #[test]
    fn lowering_max_hearts_clamps_live_hearts() {
        // Scenario: cap 5 hearts and full health, lower to 3, raise to 10.
        let mut engine = test_engine();
        engine.apply_config(&update_json(r#"{"max_hearts":5,"spawn_hearts":5}"#), 0);
        engine.reset_runtime();
        assert_eq!(engine.live().current_hearts, 5);

        let out = engine.apply_config(&update_json(r#"{"max_hearts":3}"#), 0);
        assert!(!out.clamped);
        assert_eq!(engine.live().current_hearts, 3);
        assert_eq!(engine.rules.spawn_hearts, 3);

        // Raising the cap never auto-heals.
        engine.apply_config(&update_json(r#"{"max_hearts":10}"#), 0);
        assert_eq!(engine.live().current_hearts, 3);
    }

    #[test]
    fn reset_to_defaults_applies_before_fields() {
        let mut engine = test_engine();
        engine.apply_config(&update_json(r#"{"max_hearts":9,"volume":10}"#), 0);
        let out = engine.apply_config(
            &update_json(r#"{"reset_to_defaults":true,"volume":33}"#),
            0,
        );
        assert!(!out.clamped);
        // max_hearts went back to factory; the explicit volume won.
        assert_eq!(engine.rules.max_hearts, GameRules::factory().max_hearts);
        assert_eq!(engine.rules.volume, 33);
    }

    #[test]
    fn identity_fields_mark_persistence() {
        let mut engine = test_engine();
        let out = engine.apply_config(
            &update_json(r#"{"player_id":42,"device_name":"alpha","color_rgb":255}"#),
            0,
        );
        assert!(out.identity_changed);
        assert!(!out.clamped);
        assert_eq!(engine.identity.player_id, 42);
        assert_eq!(engine.identity.device_name, "alpha");
        assert_eq!(engine.identity.color_rgb, 0x0000FF);

        let out = engine.apply_config(&update_json(r#"{"volume":20}"#), 0);
        assert!(!out.identity_changed);
    }

    #[test]
    fn spawn_hearts_bounded_by_max_hearts() {
        let mut engine = test_engine();
        let out = engine.apply_config(&update_json(r#"{"max_hearts":4,"spawn_hearts":9}"#), 0);
        assert!(out.clamped);
        assert_eq!(engine.rules.spawn_hearts, 4);
    }

    #[test]
    fn legacy_respawn_seconds_alias() {
        let mut engine = test_engine();
        engine.apply_config(&update_json(r#"{"respawn_time_s":7}"#), 0);
        assert_eq!(engine.rules.respawn_time_ms, 7_000);

        // The millisecond field wins when both are present.
        engine.apply_config(&update_json(r#"{"respawn_time_ms":1500,"respawn_time_s":9}"#), 0);
        assert_eq!(engine.rules.reload_time_ms, 2_000); // untouched
        assert_eq!(engine.rules.respawn_time_ms, 1_500);
    }

    #[test]
    fn legacy_enable_ammo_alias() {
        let mut engine = test_engine();
        engine.apply_config(&update_json(r#"{"enable_ammo":false}"#), 0);
        assert!(engine.rules.unlimited_ammo);
        engine.apply_config(&update_json(r#"{"enable_ammo":true}"#), 0);
        assert!(!engine.rules.unlimited_ammo);
    }

    #[test]
    fn timer_reconciled_while_running() {
        let mut engine = test_engine();
        engine.rules.game_duration_s = 60;
        engine.game_command(GameCommandKind::Start, 0).unwrap();
        assert_eq!(engine.timer().end_time_ms, 60_000);

        engine.apply_config(&update_json(r#"{"game_duration_s":120}"#), 30_000);
        assert_eq!(engine.timer().end_time_ms, 150_000);

        // Duration 0 disables the timer outright.
        engine.apply_config(&update_json(r#"{"game_duration_s":0}"#), 40_000);
        assert_eq!(engine.timer().end_time_ms, 0);
        assert!(engine.timer().running);
    }

    #[test]
    fn timer_untouched_when_idle() {
        let mut engine = test_engine();
        engine.apply_config(&update_json(r#"{"game_duration_s":120}"#), 5_000);
        assert_eq!(engine.timer().end_time_ms, 0);
        assert!(!engine.timer().running);
    }
}
