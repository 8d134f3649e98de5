//! The fixed-size peer-bus datagram exchanged between endpoints.
//!
//! Packed wire layout (integers little-endian):
//!
//! ```text
//! offset 0  u8  kind       0=SHOT, 1=HIT_EVENT, 2=HEARTBEAT
//! offset 1  u8  version
//! offset 2  u8  player_id
//! offset 3  u8  device_id
//! offset 4  u8  team_id
//! offset 5  u8  reserved
//! offset 6  u32 color_rgb
//! offset 10 u32 seq        rolling sequence, wrap-safe
//! offset 14 u32 data
//! ```

use std::fmt;

/// Current datagram schema version.
pub const DATAGRAM_VERSION: u8 = 1;

/// Exact on-air size; anything else is an invalid frame.
pub const DATAGRAM_LEN: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DatagramKind {
    Shot = 0,
    HitEvent = 1,
    Heartbeat = 2,
}

impl DatagramKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Shot),
            1 => Some(Self::HitEvent),
            2 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// One peer-to-peer event. `seq` doubles as the sender's millisecond
/// timestamp; receivers only ever compare it as a rolling sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerDatagram {
    pub kind: DatagramKind,
    pub version: u8,
    pub player_id: u8,
    pub device_id: u8,
    pub team_id: u8,
    pub color_rgb: u32,
    pub seq: u32,
    pub data: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Length(usize),
    UnknownKind(u8),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(n) => write!(f, "datagram wrong size: {n} bytes (want {DATAGRAM_LEN})"),
            Self::UnknownKind(b) => write!(f, "unknown datagram kind: {b}"),
        }
    }
}

impl std::error::Error for WireError {}

impl PeerDatagram {
    pub fn encode(&self) -> [u8; DATAGRAM_LEN] {
        let mut buf = [0u8; DATAGRAM_LEN];
        buf[0] = self.kind as u8;
        buf[1] = self.version;
        buf[2] = self.player_id;
        buf[3] = self.device_id;
        buf[4] = self.team_id;
        // buf[5] is reserved and stays zero
        buf[6..10].copy_from_slice(&self.color_rgb.to_le_bytes());
        buf[10..14].copy_from_slice(&self.seq.to_le_bytes());
        buf[14..18].copy_from_slice(&self.data.to_le_bytes());
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
        if raw.len() != DATAGRAM_LEN {
            return Err(WireError::Length(raw.len()));
        }
        let kind = DatagramKind::from_byte(raw[0]).ok_or(WireError::UnknownKind(raw[0]))?;
        Ok(Self {
            kind,
            version: raw[1],
            player_id: raw[2],
            device_id: raw[3],
            team_id: raw[4],
            color_rgb: u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]),
            seq: u32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]),
            data: u32::from_le_bytes([raw[14], raw[15], raw[16], raw[17]]),
        })
    }
}
