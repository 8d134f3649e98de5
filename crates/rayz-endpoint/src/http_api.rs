//! The plain-HTTP surface: status page, peer-list management, runtime
//! factory reset, and the captive provisioning form.

use std::sync::Arc;
use std::time::Duration;

use axum::Form;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use rayz_core::identity::DeviceRole;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{self, KvStore};

// ---------------------------------------------------------------------------
// Station mode
// ---------------------------------------------------------------------------

/// `GET /` — basic status HTML.
pub async fn root_page(State(state): State<AppState>) -> Html<String> {
    let name = state.engine.lock().await.identity.device_name.clone();
    Html(format!(
        "<html><body><h2>RayZ Online</h2><p>{name} connected.</p></body></html>"
    ))
}

#[derive(Debug, Serialize)]
pub struct ApiStatus {
    pub wifi: bool,
    pub ip: String,
    pub channel: u8,
    pub peers: String,
    pub espnow_peers: u8,
}

/// `GET /api/status`.
pub async fn api_status(State(state): State<AppState>) -> Json<ApiStatus> {
    let link = state.link_status();
    let peers = state
        .kv
        .get_str(storage::NS_WIFI, storage::KEY_PEERS)
        .unwrap_or_default();
    Json(ApiStatus {
        wifi: link.connected,
        ip: link.ip,
        channel: link.channel,
        peers,
        espnow_peers: state.peers.peer_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct PeerList {
    pub peers: String,
}

/// `GET /api/peers`.
pub async fn peers_get(State(state): State<AppState>) -> Json<PeerList> {
    let peers = state
        .kv
        .get_str(storage::NS_WIFI, storage::KEY_PEERS)
        .unwrap_or_default();
    Json(PeerList { peers })
}

/// `POST /api/peers` — body is a CSV of MAC addresses.
pub async fn peers_post(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let csv = body.trim();
    if csv.is_empty() {
        return Err(AppError::BadRequest("no peer list".to_string()));
    }
    if !state.peers.load_peers_from_csv(csv) {
        return Err(AppError::BadRequest("no valid peer address".to_string()));
    }
    if let Err(e) = state.kv.put_str(storage::NS_WIFI, storage::KEY_PEERS, csv) {
        tracing::warn!(error = %e, "peer list not persisted");
    }
    Ok(Json(serde_json::json!({ "stored": true })))
}

/// `POST /clean` — erase Wi-Fi credentials and restart into
/// provisioning.
pub async fn clean_post(State(state): State<AppState>) -> &'static str {
    tracing::warn!("factory reset of Wi-Fi credentials requested");
    if let Err(e) = state.kv.erase_namespace(storage::NS_WIFI) {
        tracing::warn!(error = %e, "wifi namespace erase failed");
    }
    trigger_restart(state.restart.clone());
    "Erased. Restarting..."
}

// ---------------------------------------------------------------------------
// Provisioning mode
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ProvisionState {
    pub kv: Arc<dyn KvStore>,
    pub restart: CancellationToken,
    pub ap_ssid: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionForm {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
}

/// `GET /` in provisioning mode — the captive configuration form.
pub async fn provision_page(State(state): State<ProvisionState>) -> Html<String> {
    Html(format!(
        "<html><body><h2>RayZ Provisioning ({})</h2>\
         <form method='POST' action='/config'>\
         SSID:<br><input name='ssid' maxlength='32'><br>\
         Password:<br><input name='pass' type='password' maxlength='64'><br>\
         Device Name:<br><input name='name' maxlength='32'><br>\
         Role:<br><select name='role'><option>weapon</option><option>target</option></select><br><br>\
         <input type='submit' value='Save &amp; Connect'></form></body></html>",
        state.ap_ssid
    ))
}

/// `POST /config` — persist credentials and restart into station mode.
pub async fn provision_config(
    State(state): State<ProvisionState>,
    Form(form): Form<ProvisionForm>,
) -> Result<&'static str, AppError> {
    if form.ssid.is_empty() {
        return Err(AppError::BadRequest("missing SSID".to_string()));
    }
    if !form.role.is_empty() && DeviceRole::parse(&form.role).is_none() {
        return Err(AppError::BadRequest("unknown role".to_string()));
    }

    let kv = state.kv.as_ref();
    let mut stored = kv.put_str(storage::NS_WIFI, storage::KEY_SSID, &form.ssid).is_ok();
    stored &= kv.put_str(storage::NS_WIFI, storage::KEY_PASS, &form.pass).is_ok();
    if !form.name.is_empty() {
        stored &= kv.put_str(storage::NS_WIFI, storage::KEY_NAME, &form.name).is_ok();
    }
    if !form.role.is_empty() {
        stored &= kv.put_str(storage::NS_WIFI, storage::KEY_ROLE, &form.role).is_ok();
    }
    if !stored {
        return Err(AppError::Internal("credentials not stored".to_string()));
    }

    tracing::info!(ssid = %form.ssid, name = %form.name, role = %form.role, "provisioned");
    trigger_restart(state.restart.clone());
    Ok("Stored. Reconnecting...")
}

/// Cancels the lifecycle token shortly after the response has a chance
/// to flush; the supervisor then re-evaluates the boot mode.
fn trigger_restart(restart: CancellationToken) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        restart.cancel();
    });
}
