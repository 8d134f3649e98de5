use serde::Deserialize;

/// Process configuration, loaded from `rayz.toml` with `RAYZ_*`
/// environment overrides. This is host-level plumbing; game rules and
/// Wi-Fi credentials live in the KV store instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub listen_addr: String,
    pub data_dir: String,
    pub radio: RadioConfig,
    pub station: StationConfig,
    pub limits: Limits,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:80".to_string(),
            data_dir: "data".to_string(),
            radio: RadioConfig::default(),
            station: StationConfig::default(),
            limits: Limits::default(),
        }
    }
}

/// The shared-channel radio link (UDP-backed on hosts).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub udp_port: u16,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self { udp_port: 17_500 }
    }
}

/// What the stand-in Wi-Fi driver reports once "joined".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub ip: String,
    pub channel: u8,
    pub rssi: i8,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.4.10".to_string(),
            channel: 1,
            rssi: -42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Per-client outbound frame buffer; frames are dropped when full.
    pub client_buffer: usize,
    /// Engine input queue depth.
    pub engine_queue: usize,
    /// Housekeeping tick cadence.
    pub tick_interval_ms: u64,
    /// Unsolicited WebSocket PING cadence.
    pub ping_interval_s: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            client_buffer: 32,
            engine_queue: 64,
            tick_interval_ms: 100,
            ping_interval_s: 10,
        }
    }
}

impl EndpointConfig {
    /// Loads `rayz.toml` if present, then applies env overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("rayz.toml") {
            Ok(content) => match toml::from_str::<EndpointConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("loaded configuration from rayz.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("failed to parse rayz.toml: {e}, using defaults");
                    EndpointConfig::default()
                },
            },
            Err(_) => EndpointConfig::default(),
        };

        if let Ok(addr) = std::env::var("RAYZ_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(dir) = std::env::var("RAYZ_DATA_DIR")
            && !dir.is_empty()
        {
            config.data_dir = dir;
        }

        config
    }

    /// Validates startup-critical settings; an unusable listen address
    /// is the only fatal condition.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(addr = %self.listen_addr, "listen_addr is not a valid socket address");
            std::process::exit(1);
        }
        if self.limits.tick_interval_ms == 0 {
            tracing::error!("tick_interval_ms must be > 0");
            std::process::exit(1);
        }
    }
}
