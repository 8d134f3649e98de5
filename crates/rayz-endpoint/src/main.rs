use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rayz_core::time::Uptime;
use rayz_endpoint::config::EndpointConfig;
use rayz_endpoint::peer_bus::{PeerBus, UdpRadioLink};
use rayz_endpoint::ports::{Ports, ReleasedButton};
use rayz_endpoint::storage::{FileKvStore, KvStore};
use rayz_endpoint::supervisor::{self, StaticWifi, WifiLink};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Arc::new(EndpointConfig::load());
    config.validate();

    let kv: Arc<dyn KvStore> = Arc::new(FileKvStore::new(&config.data_dir));
    let uptime = Uptime::start();
    let shutdown = CancellationToken::new();

    // Physical factory reset: button held through boot.
    supervisor::check_boot_button(kv.as_ref(), &ReleasedButton);

    let wifi: Arc<dyn WifiLink> = StaticWifi::from_config(&config);

    let radio = match UdpRadioLink::bind(config.radio.udp_port, wifi.mac()).await {
        Ok(radio) => radio,
        Err(e) => {
            tracing::error!(port = config.radio.udp_port, error = %e, "radio bind failed");
            std::process::exit(1);
        },
    };
    let peers = PeerBus::new(radio.clone(), uptime);
    radio.spawn_reader(peers.clone(), shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        "RayZ endpoint starting"
    );

    supervisor::run(
        config,
        kv,
        Ports::null(),
        wifi,
        peers,
        uptime,
        shutdown,
    )
    .await;
}
