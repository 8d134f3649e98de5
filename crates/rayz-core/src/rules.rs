use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A bounded quantity that may also be unbounded.
///
/// On the JSON wire `Infinite` is the sentinel `-1`; in RAM it is a real
/// tag so no guard can be forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Bounded(u16),
    Infinite,
}

impl Extent {
    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }

    pub fn bounded(self) -> Option<u16> {
        match self {
            Self::Bounded(n) => Some(n),
            Self::Infinite => None,
        }
    }

    /// The wire representation: `-1` for infinity.
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Bounded(n) => i64::from(n),
            Self::Infinite => -1,
        }
    }

    /// Any negative wire value reads as infinity; positive values are
    /// capped into u16 range. Range clamping against the per-field rule
    /// table happens in the engine.
    pub fn from_wire(v: i64) -> Self {
        if v < 0 {
            Self::Infinite
        } else {
            Self::Bounded(v.min(i64::from(u16::MAX)) as u16)
        }
    }
}

impl Serialize for Extent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Extent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i64::deserialize(deserializer)?;
        if v > i64::from(u16::MAX) {
            return Err(D::Error::custom(format!("value {v} out of range")));
        }
        Ok(Self::from_wire(v))
    }
}

/// The mutable game-rule attribute set. Session-scoped: loaded from
/// factory defaults at boot and mutated by `config_update`; identity is
/// the only part of device configuration that persists.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRules {
    // Health
    pub max_hearts: Extent,
    pub spawn_hearts: u16,
    pub respawn_time_ms: u32,
    pub invulnerability_ms: u32,
    pub enable_hearts: bool,

    // Damage
    pub damage_in: u16,
    pub damage_out: u16,
    pub friendly_fire: bool,

    // Ammo
    pub max_ammo: Extent,
    pub mag_capacity: u16,
    pub reload_time_ms: u32,
    pub shot_rate_limit_ms: u32,
    pub unlimited_ammo: bool,

    // Scoring
    pub kill_score: u16,
    pub hit_score: u16,
    pub assist_score: u16,
    pub score_to_win: u16,

    // Timer: 0 = manual stop, positive = autostop after that many seconds.
    pub game_duration_s: u32,

    // Flags
    pub overtime_enabled: bool,
    pub sudden_death: bool,
    pub team_play: bool,
    pub random_teams_on_start: bool,
    pub hit_sound_enabled: bool,
    pub haptic_enabled: bool,

    // Audio
    pub volume: u8,
    pub sound_profile: u8,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_hearts: Extent::Bounded(3),
            spawn_hearts: 3,
            respawn_time_ms: 5_000,
            invulnerability_ms: 2_000,
            enable_hearts: true,

            damage_in: 1,
            damage_out: 1,
            friendly_fire: false,

            max_ammo: Extent::Bounded(30),
            mag_capacity: 0,
            reload_time_ms: 2_000,
            shot_rate_limit_ms: 250,
            unlimited_ammo: false,

            kill_score: 100,
            hit_score: 10,
            assist_score: 5,
            score_to_win: 0,

            game_duration_s: 0,

            overtime_enabled: false,
            sudden_death: false,
            team_play: false,
            random_teams_on_start: false,
            hit_sound_enabled: true,
            haptic_enabled: true,

            volume: 80,
            sound_profile: 0,
        }
    }
}

impl GameRules {
    /// The factory ruleset applied at boot and by `reset_to_defaults`.
    pub fn factory() -> Self {
        Self::default()
    }
}
