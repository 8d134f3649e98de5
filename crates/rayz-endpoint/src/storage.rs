//! The persistent key-value store port and its implementations.
//!
//! Mirrors the NVS layout: typed keys grouped under flat namespaces.
//! A write failure is never fatal — the in-RAM state stays authoritative
//! and the next successful write catches up.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use rayz_core::identity::{DeviceIdentity, DeviceRole};

/// Namespace for Wi-Fi credentials and peer registration.
pub const NS_WIFI: &str = "wifi";
/// Namespace for the device's game identity.
pub const NS_GAME: &str = "game";

pub const KEY_SSID: &str = "ssid";
pub const KEY_PASS: &str = "pass";
pub const KEY_NAME: &str = "name";
pub const KEY_ROLE: &str = "role";
pub const KEY_PEERS: &str = "peers";

pub const KEY_DEVICE_ID: &str = "device_id_u8";
pub const KEY_PLAYER_ID: &str = "player_id_u8";
pub const KEY_TEAM_ID: &str = "team_id_u8";
pub const KEY_COLOR: &str = "color_u32";
pub const KEY_DEVICE_NAME: &str = "device_name";

#[derive(Debug, Clone)]
pub enum StorageError {
    Io(String),
    Encode(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O error: {e}"),
            Self::Encode(e) => write!(f, "storage encode error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// The non-volatile store consumed by the core. Reads that miss return
/// `None`; writes may fail with [`StorageError`] and callers carry on
/// with RAM-only state.
pub trait KvStore: Send + Sync {
    fn get_str(&self, ns: &str, key: &str) -> Option<String>;
    fn put_str(&self, ns: &str, key: &str, value: &str) -> Result<(), StorageError>;
    fn get_u8(&self, ns: &str, key: &str) -> Option<u8>;
    fn put_u8(&self, ns: &str, key: &str, value: u8) -> Result<(), StorageError>;
    fn get_u32(&self, ns: &str, key: &str) -> Option<u32>;
    fn put_u32(&self, ns: &str, key: &str, value: u32) -> Result<(), StorageError>;
    fn erase_namespace(&self, ns: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// File-backed store: one TOML table per namespace under the data dir.
// ---------------------------------------------------------------------------

pub struct FileKvStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, toml::Table>>,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, ns: &str) -> PathBuf {
        self.dir.join(format!("{ns}.toml"))
    }

    fn with_table<R>(&self, ns: &str, f: impl FnOnce(&mut toml::Table) -> R) -> R {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if !cache.contains_key(ns) {
            let table = std::fs::read_to_string(self.path_for(ns))
                .ok()
                .and_then(|text| text.parse::<toml::Table>().ok())
                .unwrap_or_default();
            cache.insert(ns.to_string(), table);
        }
        f(cache.get_mut(ns).expect("namespace just inserted"))
    }

    fn persist(&self, ns: &str) -> Result<(), StorageError> {
        let text = self.with_table(ns, |table| toml::to_string(table))
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::write(self.path_for(ns), text).map_err(|e| StorageError::Io(e.to_string()))
    }

    fn get_value(&self, ns: &str, key: &str) -> Option<toml::Value> {
        self.with_table(ns, |table| table.get(key).cloned())
    }

    fn put_value(&self, ns: &str, key: &str, value: toml::Value) -> Result<(), StorageError> {
        self.with_table(ns, |table| {
            table.insert(key.to_string(), value);
        });
        self.persist(ns)
    }
}

impl KvStore for FileKvStore {
    fn get_str(&self, ns: &str, key: &str) -> Option<String> {
        match self.get_value(ns, key)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn put_str(&self, ns: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::String(value.to_string()))
    }

    fn get_u8(&self, ns: &str, key: &str) -> Option<u8> {
        self.get_value(ns, key)?
            .as_integer()
            .and_then(|v| u8::try_from(v).ok())
    }

    fn put_u8(&self, ns: &str, key: &str, value: u8) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::Integer(i64::from(value)))
    }

    fn get_u32(&self, ns: &str, key: &str) -> Option<u32> {
        self.get_value(ns, key)?
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
    }

    fn put_u32(&self, ns: &str, key: &str, value: u32) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::Integer(i64::from(value)))
    }

    fn erase_namespace(&self, ns: &str) -> Result<(), StorageError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.remove(ns);
        }
        match std::fs::remove_file(self.path_for(ns)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store for tests and RAM-only fallback.
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemKvStore {
    tables: Mutex<HashMap<String, toml::Table>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_value(&self, ns: &str, key: &str) -> Option<toml::Value> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(ns)?.get(key).cloned()
    }

    fn put_value(&self, ns: &str, key: &str, value: toml::Value) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

impl KvStore for MemKvStore {
    fn get_str(&self, ns: &str, key: &str) -> Option<String> {
        match self.get_value(ns, key)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn put_str(&self, ns: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::String(value.to_string()));
        Ok(())
    }

    fn get_u8(&self, ns: &str, key: &str) -> Option<u8> {
        self.get_value(ns, key)?
            .as_integer()
            .and_then(|v| u8::try_from(v).ok())
    }

    fn put_u8(&self, ns: &str, key: &str, value: u8) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::Integer(i64::from(value)));
        Ok(())
    }

    fn get_u32(&self, ns: &str, key: &str) -> Option<u32> {
        self.get_value(ns, key)?
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
    }

    fn put_u32(&self, ns: &str, key: &str, value: u32) -> Result<(), StorageError> {
        self.put_value(ns, key, toml::Value::Integer(i64::from(value)));
        Ok(())
    }

    fn erase_namespace(&self, ns: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.remove(ns);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identity persistence (`game` namespace)
// ---------------------------------------------------------------------------

/// Loads the stored identity, if one was ever written.
pub fn load_identity(kv: &dyn KvStore) -> Option<DeviceIdentity> {
    let device_id = kv.get_u8(NS_GAME, KEY_DEVICE_ID)?;
    let role = kv
        .get_str(NS_WIFI, KEY_ROLE)
        .and_then(|s| DeviceRole::parse(&s))
        .unwrap_or_default();
    let mut identity = DeviceIdentity {
        device_id,
        player_id: kv.get_u8(NS_GAME, KEY_PLAYER_ID).unwrap_or(device_id),
        team_id: kv.get_u8(NS_GAME, KEY_TEAM_ID).unwrap_or(0),
        color_rgb: kv.get_u32(NS_GAME, KEY_COLOR).unwrap_or(0xFF0000),
        role,
        device_name: String::new(),
    };
    let name = kv
        .get_str(NS_GAME, KEY_DEVICE_NAME)
        .or_else(|| kv.get_str(NS_WIFI, KEY_NAME))
        .unwrap_or_else(|| format!("{} {device_id}", role.as_str()));
    identity.set_device_name(&name);
    Some(identity)
}

/// Writes the identity back to the `game` namespace.
pub fn store_identity(kv: &dyn KvStore, identity: &DeviceIdentity) -> Result<(), StorageError> {
    kv.put_u8(NS_GAME, KEY_DEVICE_ID, identity.device_id)?;
    kv.put_u8(NS_GAME, KEY_PLAYER_ID, identity.player_id)?;
    kv.put_u8(NS_GAME, KEY_TEAM_ID, identity.team_id)?;
    kv.put_u32(NS_GAME, KEY_COLOR, identity.color_rgb)?;
    kv.put_str(NS_GAME, KEY_DEVICE_NAME, &identity.device_name)?;
    Ok(())
}

/// First-boot path: load the persisted identity or generate and persist
/// a fresh one. A failing store degrades to RAM-only with a warning.
pub fn load_or_create_identity(kv: &dyn KvStore) -> DeviceIdentity {
    if let Some(identity) = load_identity(kv) {
        tracing::info!(
            device_id = identity.device_id,
            player_id = identity.player_id,
            "identity loaded from store"
        );
        return identity;
    }
    let role = kv
        .get_str(NS_WIFI, KEY_ROLE)
        .and_then(|s| DeviceRole::parse(&s))
        .unwrap_or_default();
    let identity = DeviceIdentity::generate(role);
    tracing::info!(device_id = identity.device_id, "generated new identity");
    if let Err(e) = store_identity(kv, &identity) {
        tracing::warn!(error = %e, "could not persist identity; continuing in RAM");
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_typed_roundtrip() {
        let kv = MemKvStore::new();
        kv.put_str(NS_WIFI, KEY_SSID, "Lab").unwrap();
        kv.put_u8(NS_GAME, KEY_DEVICE_ID, 42).unwrap();
        kv.put_u32(NS_GAME, KEY_COLOR, 0xABCDEF).unwrap();

        assert_eq!(kv.get_str(NS_WIFI, KEY_SSID).as_deref(), Some("Lab"));
        assert_eq!(kv.get_u8(NS_GAME, KEY_DEVICE_ID), Some(42));
        assert_eq!(kv.get_u32(NS_GAME, KEY_COLOR), Some(0xABCDEF));
        assert_eq!(kv.get_str(NS_WIFI, "missing"), None);
    }

    #[test]
    fn erase_namespace_is_scoped() {
        let kv = MemKvStore::new();
        kv.put_str(NS_WIFI, KEY_SSID, "Lab").unwrap();
        kv.put_u8(NS_GAME, KEY_DEVICE_ID, 7).unwrap();

        kv.erase_namespace(NS_WIFI).unwrap();
        assert_eq!(kv.get_str(NS_WIFI, KEY_SSID), None);
        assert_eq!(kv.get_u8(NS_GAME, KEY_DEVICE_ID), Some(7));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("rayz_kv_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let kv = FileKvStore::new(&dir);
            kv.put_str(NS_WIFI, KEY_SSID, "Lab").unwrap();
            kv.put_u8(NS_GAME, KEY_DEVICE_ID, 9).unwrap();
        }
        {
            let kv = FileKvStore::new(&dir);
            assert_eq!(kv.get_str(NS_WIFI, KEY_SSID).as_deref(), Some("Lab"));
            assert_eq!(kv.get_u8(NS_GAME, KEY_DEVICE_ID), Some(9));
            kv.erase_namespace(NS_WIFI).unwrap();
        }
        {
            let kv = FileKvStore::new(&dir);
            assert_eq!(kv.get_str(NS_WIFI, KEY_SSID), None);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn identity_roundtrip_through_store() {
        let kv = MemKvStore::new();
        kv.put_str(NS_WIFI, KEY_ROLE, "target").unwrap();

        let created = load_or_create_identity(&kv);
        assert_eq!(created.role, DeviceRole::Target);

        let loaded = load_or_create_identity(&kv);
        assert_eq!(loaded, created, "second boot loads the same identity");
    }

    #[test]
    fn load_identity_requires_device_id() {
        let kv = MemKvStore::new();
        assert!(load_identity(&kv).is_none());
    }
}
