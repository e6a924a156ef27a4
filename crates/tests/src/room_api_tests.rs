use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn create_and_fetch_room() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/rooms"))
        .json(&serde_json::json!({ "name": "Friday Show" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let room: Value = resp.json().await.unwrap();
    assert_eq!(room["name"], "Friday Show");
    assert_eq!(room["isActive"], false);
    assert!(room["hlsUrl"].is_null());
    let room_id = room["id"].as_str().unwrap().to_string();

    let resp = app
        .client
        .get(app.url(&format!("/api/rooms/{room_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let fetched: Value = resp.json().await.unwrap();
    assert_eq!(fetched["id"], room_id.as_str());

    let resp = app.client.get(app.url("/api/rooms")).send().await.unwrap();
    let rooms: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(rooms.len(), 1);
}

#[tokio::test]
async fn create_room_validates_name() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/rooms"))
        .json(&serde_json::json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn delete_room_removes_record() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/rooms"))
        .json(&serde_json::json!({ "name": "temp" }))
        .send()
        .await
        .unwrap();
    let room: Value = resp.json().await.unwrap();
    let room_id = room["id"].as_str().unwrap().to_string();

    let resp = app
        .client
        .delete(app.url(&format!("/api/rooms/{room_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app
        .client
        .get(app.url(&format!("/api/rooms/{room_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn unknown_room_is_404() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .get(app.url("/api/rooms/no-such-room"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn streams_list_is_empty_without_transcoders() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/api/streams")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let streams: Vec<Value> = resp.json().await.unwrap();
    assert!(streams.is_empty());

    let resp = app
        .client
        .get(app.url("/api/streams/no-such-room"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn health_reports_worker_pool() {
    let app = TestApp::spawn().await;
    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let health: Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["workers"], 1);
    assert_eq!(health["rooms"], 0);
}
