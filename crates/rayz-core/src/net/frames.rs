//! Admin WebSocket protocol v2.2 message types ("OpCode" JSON).
//!
//! Every frame is a JSON object carrying an integer `op` and a canonical
//! `type` string. `op` is authoritative on input; `type` is the fallback.
//! All numeric IDs are JSON numbers, colors are u32 numbers, booleans are
//! JSON booleans.

use serde::{Deserialize, Serialize};

/// Inbound opcodes (client → endpoint).
pub const OP_GET_STATUS: u8 = 1;
pub const OP_HEARTBEAT: u8 = 2;
pub const OP_CONFIG_UPDATE: u8 = 3;
pub const OP_GAME_COMMAND: u8 = 4;
pub const OP_HIT_FORWARD: u8 = 5;
pub const OP_KILL_CONFIRMED: u8 = 6;
pub const OP_REMOTE_SOUND: u8 = 7;

/// Outbound opcodes (endpoint → client).
pub const OP_STATUS: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;
pub const OP_SHOT_FIRED: u8 = 12;
pub const OP_HIT_REPORT: u8 = 13;
pub const OP_RESPAWN: u8 = 14;
pub const OP_RELOAD_EVENT: u8 = 15;
pub const OP_GAME_OVER: u8 = 16;
pub const OP_ACK: u8 = 20;

/// Maps a canonical `type` string to its inbound opcode.
pub fn op_for_type(t: &str) -> Option<u8> {
    match t {
        "get_status" => Some(OP_GET_STATUS),
        "heartbeat" => Some(OP_HEARTBEAT),
        "config_update" => Some(OP_CONFIG_UPDATE),
        "game_command" => Some(OP_GAME_COMMAND),
        "hit_forward" => Some(OP_HIT_FORWARD),
        "kill_confirmed" => Some(OP_KILL_CONFIRMED),
        "remote_sound" => Some(OP_REMOTE_SOUND),
        _ => None,
    }
}

/// Game-command verbs for op 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GameCommandKind {
    Stop = 0,
    Start = 1,
    Reset = 2,
    Pause = 3,
    Unpause = 4,
}

impl GameCommandKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Stop),
            1 => Some(Self::Start),
            2 => Some(Self::Reset),
            3 => Some(Self::Pause),
            4 => Some(Self::Unpause),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Reset => "reset",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }
}

/// A partial rules/identity delta carried by `config_update` (op 3).
///
/// Numeric fields are wide signed integers on purpose: out-of-range
/// values are clamped by the engine (surfacing `clamped: true`), never
/// rejected at parse time. `-1` means infinite where the rule allows it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigUpdate {
    pub reset_to_defaults: Option<bool>,

    // Identity
    pub device_id: Option<i64>,
    pub player_id: Option<i64>,
    pub team_id: Option<i64>,
    pub color_rgb: Option<i64>,
    pub device_name: Option<String>,

    // Hardware / AV
    pub volume: Option<i64>,
    pub sound_profile: Option<i64>,
    pub haptic_enabled: Option<bool>,

    // Health
    pub max_hearts: Option<i64>,
    pub spawn_hearts: Option<i64>,
    pub respawn_time_ms: Option<i64>,
    /// Legacy alias carried by older admin clients, in whole seconds.
    pub respawn_time_s: Option<i64>,
    pub invulnerability_ms: Option<i64>,
    pub enable_hearts: Option<bool>,

    // Damage
    pub damage_in: Option<i64>,
    pub damage_out: Option<i64>,
    pub friendly_fire: Option<bool>,

    // Ammo
    pub max_ammo: Option<i64>,
    pub mag_capacity: Option<i64>,
    pub reload_time_ms: Option<i64>,
    pub shot_rate_limit_ms: Option<i64>,
    pub unlimited_ammo: Option<bool>,
    /// Legacy alias: `enable_ammo: false` means unlimited ammo.
    pub enable_ammo: Option<bool>,

    // Scoring
    pub kill_score: Option<i64>,
    pub hit_score: Option<i64>,
    pub assist_score: Option<i64>,
    pub score_to_win: Option<i64>,

    // Timer
    #[serde(alias = "time_limit_s")]
    pub game_duration_s: Option<i64>,

    // Flags
    pub overtime_enabled: Option<bool>,
    pub sudden_death: Option<bool>,
    pub team_play: Option<bool>,
    pub random_teams_on_start: Option<bool>,
    pub hit_sound_enabled: Option<bool>,
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetStatus,
    Heartbeat,
    ConfigUpdate(Box<ConfigUpdate>),
    GameCommand(GameCommandKind),
    HitForward {
        shooter_id: u8,
        shooter_team: Option<u8>,
        damage: Option<u16>,
    },
    KillConfirmed,
    RemoteSound {
        sound_id: u8,
    },
}

/// A command plus its optional request correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    pub command: Command,
    pub req_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// `status` (op 10): the authoritative device report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub uptime_ms: u32,
    pub config: StatusConfig,
    pub stats: StatusStats,
    pub state: StatusState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub device_id: u8,
    pub player_id: u8,
    pub team_id: u8,
    pub color_rgb: u32,
    pub device_name: String,
    pub role: String,

    pub enable_hearts: bool,
    pub max_hearts: i64,
    pub spawn_hearts: u16,
    pub respawn_time_ms: u32,
    pub invulnerability_ms: u32,

    pub damage_in: u16,
    pub damage_out: u16,
    pub friendly_fire: bool,

    pub enable_ammo: bool,
    pub max_ammo: i64,
    pub mag_capacity: u16,
    pub reload_time_ms: u32,
    pub shot_rate_limit_ms: u32,
    pub unlimited_ammo: bool,

    pub kill_score: u16,
    pub hit_score: u16,
    pub assist_score: u16,
    pub score_to_win: u16,

    pub game_duration_s: u32,

    pub overtime_enabled: bool,
    pub sudden_death: bool,
    pub team_play: bool,
    pub random_teams_on_start: bool,
    pub hit_sound_enabled: bool,
    pub haptic_enabled: bool,

    pub volume: u8,
    pub sound_profile: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusStats {
    pub shots: u32,
    pub enemy_kills: u32,
    pub friendly_kills: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusState {
    pub current_hearts: u16,
    pub current_ammo: u16,
    pub is_respawning: bool,
    pub is_reloading: bool,
    /// Omitted entirely when the game timer is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time_s: Option<u32>,
}

/// `heartbeat_ack` (op 11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAckFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub batt_voltage: f32,
    pub rssi: i8,
}

impl HeartbeatAckFrame {
    pub fn new(batt_voltage: f32, rssi: i8) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            kind: "heartbeat_ack".to_string(),
            batt_voltage,
            rssi,
        }
    }
}

/// `shot_fired` (op 12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotFiredFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub seq_id: u8,
    pub timestamp_ms: u32,
}

impl ShotFiredFrame {
    pub fn new(seq_id: u8, timestamp_ms: u32) -> Self {
        Self {
            op: OP_SHOT_FIRED,
            kind: "shot_fired".to_string(),
            seq_id,
            timestamp_ms,
        }
    }
}

/// `hit_report` (op 13). A rejected friendly-fire hit goes out on the
/// same opcode with `type: "hit_invalid"` and no `fatal` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitReportFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<bool>,
    pub shooter_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<u16>,
    pub timestamp_ms: u32,
}

impl HitReportFrame {
    pub fn hit(fatal: bool, shooter_id: u8, damage: u16, timestamp_ms: u32) -> Self {
        Self {
            op: OP_HIT_REPORT,
            kind: "hit_report".to_string(),
            fatal: Some(fatal),
            shooter_id,
            damage: Some(damage),
            timestamp_ms,
        }
    }

    pub fn invalid(shooter_id: u8, timestamp_ms: u32) -> Self {
        Self {
            op: OP_HIT_REPORT,
            kind: "hit_invalid".to_string(),
            fatal: None,
            shooter_id,
            damage: None,
            timestamp_ms,
        }
    }
}

/// `respawn` (op 14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespawnFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub current_hearts: u16,
    pub timestamp_ms: u32,
}

impl RespawnFrame {
    pub fn new(current_hearts: u16, timestamp_ms: u32) -> Self {
        Self {
            op: OP_RESPAWN,
            kind: "respawn".to_string(),
            current_hearts,
            timestamp_ms,
        }
    }
}

/// `reload_event` (op 15).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadEventFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub current_ammo: u16,
    pub timestamp_ms: u32,
}

impl ReloadEventFrame {
    pub fn new(current_ammo: u16, timestamp_ms: u32) -> Self {
        Self {
            op: OP_RELOAD_EVENT,
            kind: "reload_event".to_string(),
            current_ammo,
            timestamp_ms,
        }
    }
}

/// `game_over` (op 16).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub stats: StatusStats,
    pub timestamp_ms: u32,
}

impl GameOverFrame {
    pub fn new(stats: StatusStats, timestamp_ms: u32) -> Self {
        Self {
            op: OP_GAME_OVER,
            kind: "game_over".to_string(),
            stats,
            timestamp_ms,
        }
    }
}

/// `ack` (op 20): the reply to any command that carried a `req_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFrame {
    pub op: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub reply_to: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AckFrame {
    pub fn ok(reply_to: &str) -> Self {
        Self {
            op: OP_ACK,
            kind: "ack".to_string(),
            reply_to: reply_to.to_string(),
            success: true,
            clamped: None,
            reason: None,
        }
    }

    pub fn rejected(reply_to: &str, reason: &str) -> Self {
        Self {
            op: OP_ACK,
            kind: "ack".to_string(),
            reply_to: reply_to.to_string(),
            success: false,
            clamped: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn with_clamped(mut self, clamped: bool) -> Self {
        self.clamped = Some(clamped);
        self
    }
}
