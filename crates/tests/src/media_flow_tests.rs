use crate::fixtures::{test_app::TestApp, ws_client::WsClient};
use serde_json::{Value, json};

async fn join(client: &mut WsClient, room_id: &str, name: &str, role: &str) -> Value {
    client
        .request(
            "join-room",
            json!({ "roomId": room_id, "name": name, "role": role }),
        )
        .await
}

#[tokio::test]
async fn host_join_returns_capabilities_and_empty_snapshot() {
    let app = TestApp::spawn().await;
    let mut host = WsClient::connect(&app).await;

    let reply = join(&mut host, "r1", "Host", "host").await;
    assert!(reply["error"].is_null(), "unexpected error: {reply}");
    assert!(reply["participantId"].is_string());
    assert!(
        reply["routerRtpCapabilities"].is_object(),
        "streamers receive router capabilities"
    );
    assert_eq!(reply["existingProducers"], json!([]));
    assert_eq!(reply["room"]["id"], "r1");
    assert_eq!(reply["room"]["participants"].as_array().unwrap().len(), 1);
    assert_eq!(reply["room"]["participants"][0]["role"], "host");

    host.close().await;
}

#[tokio::test]
async fn direct_url_join_activates_room_record() {
    let app = TestApp::spawn().await;
    let mut host = WsClient::connect(&app).await;

    let reply = join(&mut host, "walk-in", "Host", "host").await;
    assert!(reply["error"].is_null());

    let resp = app
        .client
        .get(app.url("/api/rooms/walk-in"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let room: Value = resp.json().await.unwrap();
    assert_eq!(room["isActive"], true);

    host.close().await;
}

#[tokio::test]
async fn first_guest_is_promoted_and_second_host_rejected() {
    let app = TestApp::spawn().await;

    let mut first = WsClient::connect(&app).await;
    let reply = join(&mut first, "r2", "First", "guest").await;
    assert_eq!(reply["room"]["participants"][0]["role"], "host");

    let mut second = WsClient::connect(&app).await;
    let reply = join(&mut second, "r2", "Second", "host").await;
    assert_eq!(reply["error"], "HOST_EXISTS");

    first.close().await;
    second.close().await;
}

#[tokio::test]
async fn third_streamer_is_rejected_without_side_effects() {
    let app = TestApp::spawn().await;

    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r3", "Host", "host").await;
    let mut guest = WsClient::connect(&app).await;
    join(&mut guest, "r3", "Guest", "guest").await;

    let mut third = WsClient::connect(&app).await;
    let reply = join(&mut third, "r3", "Third", "guest").await;
    assert_eq!(reply["error"], "ROOM_FULL");

    // the rejected participant leaves no mirror row behind
    let rows = app
        .db
        .collection::<bson::Document>("participants")
        .count_documents(bson::doc! { "room_id": "r3" })
        .await
        .unwrap();
    assert_eq!(rows, 2);

    host.close().await;
    guest.close().await;
    third.close().await;
}

#[tokio::test]
async fn viewer_gets_null_capabilities_and_no_endpoints() {
    let app = TestApp::spawn().await;

    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r4", "Host", "host").await;

    let mut viewer = WsClient::connect(&app).await;
    let reply = join(&mut viewer, "r4", "Viewer", "viewer").await;
    assert!(reply["error"].is_null());
    assert!(reply["routerRtpCapabilities"].is_null());
    assert_eq!(reply["existingProducers"], json!([]));
    // the room snapshot still carries the playlist state for viewers
    assert!(reply["room"]["hlsUrl"].is_null());

    let transport = viewer
        .request("create-transport", json!({ "direction": "recv" }))
        .await;
    assert_eq!(transport["error"], "VIEWER_CANNOT_CONSUME_WEBRTC");

    host.close().await;
    viewer.close().await;
}

#[tokio::test]
async fn join_broadcasts_new_participant() {
    let app = TestApp::spawn().await;

    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r5", "Host", "host").await;

    let mut guest = WsClient::connect(&app).await;
    let reply = join(&mut guest, "r5", "Guest", "guest").await;
    let guest_id = reply["participantId"].as_str().unwrap().to_string();

    let event = host.event("new-participant").await;
    assert_eq!(event["data"]["participant"]["id"], guest_id.as_str());
    assert_eq!(event["data"]["participant"]["role"], "guest");

    host.close().await;
    guest.close().await;
}

#[tokio::test]
async fn leave_broadcasts_participant_left_and_empties_room() {
    let app = TestApp::spawn().await;

    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r6", "Host", "host").await;
    let mut guest = WsClient::connect(&app).await;
    let reply = join(&mut guest, "r6", "Guest", "guest").await;
    let guest_id = reply["participantId"].as_str().unwrap().to_string();

    guest.emit("leave-room", json!({})).await;
    let event = host.event("participant-left").await;
    assert_eq!(event["data"]["participantId"], guest_id.as_str());

    // last member out closes the room and deactivates the record
    host.close().await;
    let mut deactivated = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let resp = app
            .client
            .get(app.url("/api/rooms/r6"))
            .send()
            .await
            .unwrap();
        let room: Value = resp.json().await.unwrap();
        if room["isActive"] == false {
            deactivated = true;
            break;
        }
    }
    assert!(deactivated, "room should deactivate once it empties");
}

#[tokio::test]
async fn streamer_gets_send_transport_bootstrap() {
    let app = TestApp::spawn().await;
    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r7", "Host", "host").await;

    let reply = host
        .request("create-transport", json!({ "direction": "send" }))
        .await;
    assert!(reply["error"].is_null(), "unexpected error: {reply}");
    assert!(reply["id"].is_string());
    assert!(reply["iceParameters"].is_object());
    assert!(reply["iceCandidates"].is_array());
    assert!(reply["dtlsParameters"].is_object());

    // hls is not a client-facing direction
    let reply = host
        .request("create-transport", json!({ "direction": "hls" }))
        .await;
    assert_eq!(reply["error"], "INVALID_DIRECTION");

    host.close().await;
}

#[tokio::test]
async fn protocol_errors_surface_as_reply_errors() {
    let app = TestApp::spawn().await;
    let mut host = WsClient::connect(&app).await;

    // not joined yet
    let reply = host
        .request("create-transport", json!({ "direction": "send" }))
        .await;
    assert_eq!(reply["error"], "PARTICIPANT_NOT_FOUND");

    join(&mut host, "r8", "Host", "host").await;

    let reply = host
        .request(
            "connect-transport",
            json!({ "transportId": "bogus", "dtlsParameters": { "role": "client", "fingerprints": [] } }),
        )
        .await;
    assert_eq!(reply["error"], "TRANSPORT_NOT_FOUND");

    let caps = host
        .request("create-transport", json!({ "direction": "recv" }))
        .await;
    assert!(caps["error"].is_null());

    host.close().await;
}

#[tokio::test]
async fn hls_controls_enforce_role_and_state() {
    let app = TestApp::spawn().await;

    let mut host = WsClient::connect(&app).await;
    join(&mut host, "r9", "Host", "host").await;
    let mut guest = WsClient::connect(&app).await;
    join(&mut guest, "r9", "Guest", "guest").await;

    // no transcoder running
    let reply = host.request("stop-hls", json!({ "roomId": "r9" })).await;
    assert_eq!(reply["error"], "HLS_NOT_RUNNING");

    // host has no audio producer yet
    let reply = host.request("start-hls", json!({ "roomId": "r9" })).await;
    assert_eq!(reply["error"], "NO_AUDIO_PRODUCERS");

    // only the host drives the broadcast
    let reply = guest.request("start-hls", json!({ "roomId": "r9" })).await;
    assert_eq!(reply["error"], "NOT_AUTHORIZED");

    host.close().await;
    guest.close().await;
}
