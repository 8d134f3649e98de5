use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum stored length of a device display name.
pub const MAX_NAME_LEN: usize = 31;

/// Team 0 means solo / free-for-all.
pub const TEAM_SOLO: u8 = 0;
/// Team 255 is reserved for admin consoles.
pub const TEAM_ADMIN: u8 = 255;

/// Which half of the game this endpoint plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    #[default]
    Weapon,
    Target,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weapon => "weapon",
            Self::Target => "target",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "weapon" => Some(Self::Weapon),
            "target" => Some(Self::Target),
            _ => None,
        }
    }
}

/// Who this endpoint is. Persisted in the `game` NVS namespace and born
/// at first boot if nothing is stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: u8,
    pub player_id: u8,
    pub team_id: u8,
    pub color_rgb: u32,
    pub role: DeviceRole,
    pub device_name: String,
}

impl DeviceIdentity {
    /// Generates a fresh identity: random device id, player id defaulting
    /// to the device id, solo team, red.
    pub fn generate(role: DeviceRole) -> Self {
        let device_id: u8 = rand::rng().random();
        let mut identity = Self {
            device_id,
            player_id: device_id,
            team_id: TEAM_SOLO,
            color_rgb: 0xFF0000,
            role,
            device_name: String::new(),
        };
        identity.set_device_name(&format!("{} {device_id}", role.as_str()));
        identity
    }

    /// Assigns the display name, truncated to the stored maximum.
    pub fn set_device_name(&mut self, name: &str) {
        let mut name = name.trim().to_string();
        if name.len() > MAX_NAME_LEN {
            // Truncate on a char boundary.
            let mut cut = MAX_NAME_LEN;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }
        self.device_name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_player_id_defaults_to_device_id() {
        let id = DeviceIdentity::generate(DeviceRole::Target);
        assert_eq!(id.player_id, id.device_id);
        assert_eq!(id.team_id, TEAM_SOLO);
        assert_eq!(id.role, DeviceRole::Target);
    }

    #[test]
    fn name_is_bounded() {
        let mut id = DeviceIdentity::generate(DeviceRole::Weapon);
        id.set_device_name(&"x".repeat(100));
        assert_eq!(id.device_name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn name_truncation_respects_char_boundaries() {
        let mut id = DeviceIdentity::generate(DeviceRole::Weapon);
        id.set_device_name(&"é".repeat(40));
        assert!(id.device_name.len() <= MAX_NAME_LEN);
        assert!(id.device_name.is_char_boundary(id.device_name.len()));
    }

    #[test]
    fn role_string_roundtrip() {
        assert_eq!(DeviceRole::parse("weapon"), Some(DeviceRole::Weapon));
        assert_eq!(DeviceRole::parse(" target "), Some(DeviceRole::Target));
        assert_eq!(DeviceRole::parse("admin"), None);
        assert_eq!(DeviceRole::Weapon.as_str(), "weapon");
    }
}
