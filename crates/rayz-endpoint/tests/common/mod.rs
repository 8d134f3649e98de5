use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use rayz_core::identity::{DeviceIdentity, DeviceRole};
use rayz_core::mac::Mac;
use rayz_core::time::Uptime;
use rayz_endpoint::config::EndpointConfig;
use rayz_endpoint::peer_bus::{PeerBus, RadioLink};
use rayz_endpoint::ports::{BatteryProbe, ConstBattery, LaserTx, Ports, SoundPort};
use rayz_endpoint::state::{AppState, LinkStatus};
use rayz_endpoint::storage::{self, MemKvStore};
use rayz_endpoint::{StationDeps, build_station_app};

/// Records every transmitted radio frame.
pub struct TestRadio {
    pub sent: Mutex<Vec<(Mac, Vec<u8>)>>,
}

impl TestRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl RadioLink for TestRadio {
    fn transmit(&self, dest: Mac, payload: &[u8]) -> bool {
        self.sent.lock().unwrap().push((dest, payload.to_vec()));
        true
    }
}

/// Records every emitted laser frame.
pub struct TestLaser {
    pub frames: Mutex<Vec<u32>>,
}

impl LaserTx for TestLaser {
    fn emit(&self, frame: u32) {
        self.frames.lock().unwrap().push(frame);
    }
}

/// Records every dispatched sound id.
pub struct TestSound {
    pub played: Mutex<Vec<u8>>,
}

impl SoundPort for TestSound {
    fn play(&self, sound_id: u8) {
        self.played.lock().unwrap().push(sound_id);
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub kv: Arc<MemKvStore>,
    pub radio: Arc<TestRadio>,
    pub laser: Arc<TestLaser>,
    pub sound: Arc<TestSound>,
    pub shutdown: CancellationToken,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_kv(Arc::new(MemKvStore::new())).await
    }

    pub async fn with_kv(kv: Arc<MemKvStore>) -> Self {
        // A fixed identity keeps shooter ids in tests collision-free.
        if storage::load_identity(kv.as_ref()).is_none() {
            let identity = DeviceIdentity {
                device_id: 10,
                player_id: 10,
                team_id: 0,
                color_rgb: 0x00FF00,
                role: DeviceRole::Target,
                device_name: "test target".to_string(),
            };
            storage::store_identity(kv.as_ref(), &identity).unwrap();
        }

        let config = Arc::new(EndpointConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..EndpointConfig::default()
        });
        let uptime = Uptime::start();
        let shutdown = CancellationToken::new();
        let restart = shutdown.child_token();

        let radio = TestRadio::new();
        let radio_link: Arc<dyn RadioLink> = radio.clone();
        let peers = PeerBus::new(radio_link, uptime);

        let laser = Arc::new(TestLaser {
            frames: Mutex::new(Vec::new()),
        });
        let sound = Arc::new(TestSound {
            played: Mutex::new(Vec::new()),
        });
        let battery: Arc<dyn BatteryProbe> = Arc::new(ConstBattery(3.7));
        let ports = Ports {
            laser: laser.clone(),
            sound: sound.clone(),
            battery,
        };

        let (app, state) = build_station_app(StationDeps {
            config,
            kv: kv.clone(),
            ports,
            peers: peers.clone(),
            uptime,
            restart,
            shutdown: shutdown.clone(),
        });

        peers.init(6, true, true);
        state.set_link_status(LinkStatus {
            connected: true,
            ip: "10.0.0.5".to_string(),
            channel: 6,
            rssi: -48,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            kv,
            radio,
            laser,
            sound,
            shutdown,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Sends one JSON object as a text frame.
pub async fn send_json(stream: &mut WsStream, value: serde_json::Value) {
    stream
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Reads the next JSON text frame, skipping control frames.
pub async fn read_json(stream: &mut WsStream) -> serde_json::Value {
    try_read_json(stream)
        .await
        .expect("expected a JSON frame before timeout")
}

/// Like [`read_json`] but yields `None` on a 2 s timeout.
pub async fn try_read_json(stream: &mut WsStream) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout_at(deadline, stream.next()).await.ok()??;
        match msg.ok()? {
            Message::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("valid JSON frame"));
            },
            _ => continue,
        }
    }
}

/// Reads frames until one with the given `type` arrives.
pub async fn read_frame_of_type(stream: &mut WsStream, kind: &str) -> serde_json::Value {
    for _ in 0..32 {
        let frame = read_json(stream).await;
        if frame["type"] == kind {
            return frame;
        }
    }
    panic!("no '{kind}' frame arrived");
}
