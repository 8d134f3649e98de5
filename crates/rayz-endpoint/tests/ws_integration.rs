#[allow(dead_code)]
mod common;

use serde_json::json;

use common::{TestServer, read_frame_of_type, send_json, try_read_json, ws_connect};

#[tokio::test]
async fn fresh_client_receives_status() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;

    let status = read_frame_of_type(&mut client, "status").await;
    assert_eq!(status["op"], 10);
    assert!(status["uptime_ms"].is_u64());
    assert!(status["config"]["device_id"].is_u64(), "ids are JSON numbers");
    assert!(status["config"]["color_rgb"].is_u64());
    assert_eq!(status["config"]["max_hearts"], 3);
    assert_eq!(status["state"]["current_hearts"], 3);
    assert_eq!(status["state"]["is_respawning"], false);
    assert_eq!(status["stats"]["deaths"], 0);
    // Timer disabled: no remaining time reported.
    assert!(status["state"].get("remaining_time_s").is_none());
}

#[tokio::test]
async fn get_status_answers_requester_with_ack() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"op": 1, "req_id": "q-7"})).await;

    let status = read_frame_of_type(&mut client, "status").await;
    assert_eq!(status["op"], 10);
    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["op"], 20);
    assert_eq!(ack["reply_to"], "q-7");
    assert_eq!(ack["success"], true);
}

#[tokio::test]
async fn legacy_type_string_maps_to_opcode() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"type": "heartbeat"})).await;
    let ack = read_frame_of_type(&mut client, "heartbeat_ack").await;
    assert_eq!(ack["op"], 11);
    assert!(ack["batt_voltage"].is_number());
    assert!(ack["rssi"].is_number());
}

#[tokio::test]
async fn config_update_acks_with_clamp_flag_and_broadcasts_status() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut alice, "status").await;
    let _ = read_frame_of_type(&mut bob, "status").await;

    send_json(
        &mut alice,
        json!({"op": 3, "req_id": "cfg-1", "max_hearts": 500, "friendly_fire": true}),
    )
    .await;

    let ack = read_frame_of_type(&mut alice, "ack").await;
    assert_eq!(ack["reply_to"], "cfg-1");
    assert_eq!(ack["success"], true);
    assert_eq!(ack["clamped"], true, "500 hearts clamps to 99");

    // Both clients see the new rules broadcast.
    let status = read_frame_of_type(&mut bob, "status").await;
    assert_eq!(status["config"]["max_hearts"], 99);
    assert_eq!(status["config"]["friendly_fire"], true);
}

#[tokio::test]
async fn config_update_with_infinity_sentinel() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    // The status broadcast precedes the ack on the wire.
    send_json(&mut client, json!({"op": 3, "req_id": "r", "max_ammo": -1})).await;
    let status = read_frame_of_type(&mut client, "status").await;
    assert_eq!(status["config"]["max_ammo"], -1);

    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["clamped"], false);
}

#[tokio::test]
async fn illegal_game_command_is_rejected() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    // UNPAUSE while idle.
    send_json(&mut client, json!({"op": 4, "command": 4, "req_id": "gc-1"})).await;
    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["reply_to"], "gc-1");
    assert_eq!(ack["success"], false);
    assert!(ack["reason"].is_string());
}

#[tokio::test]
async fn start_with_duration_reports_remaining_time() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"op": 3, "game_duration_s": 120})).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    // The status broadcast precedes the ack on the wire.
    send_json(&mut client, json!({"op": 4, "command": 1, "req_id": "go"})).await;
    let status = read_frame_of_type(&mut client, "status").await;
    let remaining = status["state"]["remaining_time_s"].as_u64().unwrap();
    assert!(remaining > 100, "remaining {remaining}s should be near 120");

    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["success"], true);
}

#[tokio::test]
async fn kill_confirmed_updates_stats() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"op": 6})).await;
    let status = read_frame_of_type(&mut client, "status").await;
    assert_eq!(status["stats"]["enemy_kills"], 1);
}

#[tokio::test]
async fn remote_sound_dispatches_and_validates() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"op": 7, "sound_id": 2, "req_id": "s1"})).await;
    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["success"], true);
    assert_eq!(server.sound.played.lock().unwrap().as_slice(), &[2]);

    send_json(&mut client, json!({"op": 7, "sound_id": 9, "req_id": "s2"})).await;
    let ack = read_frame_of_type(&mut client, "ack").await;
    assert_eq!(ack["success"], false);
    assert_eq!(server.sound.played.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_op_is_silently_ignored() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    send_json(&mut client, json!({"op": 99, "req_id": "nope"})).await;
    assert!(
        try_read_json(&mut client).await.is_none(),
        "unknown ops produce no reply"
    );
}

#[tokio::test]
async fn ninth_client_is_refused() {
    let server = TestServer::new().await;

    let mut clients = Vec::new();
    for _ in 0..8 {
        let mut c = ws_connect(&server.ws_url()).await;
        let _ = read_frame_of_type(&mut c, "status").await;
        clients.push(c);
    }

    // The table is full; the ninth upgrade is accepted at the HTTP
    // layer but closed immediately.
    let mut ninth = ws_connect(&server.ws_url()).await;
    assert!(
        try_read_json(&mut ninth).await.is_none(),
        "ninth client gets no frames"
    );

    // The eight original clients are unaffected.
    send_json(&mut clients[0], json!({"op": 1})).await;
    let status = read_frame_of_type(&mut clients[0], "status").await;
    assert_eq!(status["op"], 10);
}

#[tokio::test]
async fn every_req_id_gets_exactly_one_ack() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let _ = read_frame_of_type(&mut client, "status").await;

    for (i, msg) in [
        json!({"op": 2}),
        json!({"op": 3, "volume": 70}),
        json!({"op": 4, "command": 1}),
        json!({"op": 6}),
    ]
    .into_iter()
    .enumerate()
    {
        let mut msg = msg;
        msg["req_id"] = json!(format!("cmd-{i}"));
        send_json(&mut client, msg).await;
        let ack = read_frame_of_type(&mut client, "ack").await;
        assert_eq!(ack["reply_to"], format!("cmd-{i}"));
    }
}
