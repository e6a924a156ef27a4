use serde_json::json;
use stagecast_services::media::MediaError;
use stagecast_services::media::signaling::{
    ClientEnvelope, ClientSignal, ParticipantRole, ServerSignal, TransportDirection,
};

#[test]
fn join_room_envelope_parses() {
    let raw = json!({
        "id": 7,
        "type": "join-room",
        "data": { "roomId": "r1", "name": "Ana", "role": "host" },
    });

    let envelope: ClientEnvelope = serde_json::from_value(raw).unwrap();
    assert_eq!(envelope.id, Some(7));
    match envelope.signal {
        ClientSignal::JoinRoom { room_id, name, role } => {
            assert_eq!(room_id, "r1");
            assert_eq!(name, "Ana");
            assert_eq!(role, ParticipantRole::Host);
        }
        other => panic!("unexpected signal: {other:?}"),
    }
}

#[test]
fn fire_and_forget_has_no_id() {
    let raw = json!({ "type": "leave-room", "data": {} });
    let envelope: ClientEnvelope = serde_json::from_value(raw).unwrap();
    assert_eq!(envelope.id, None);
    assert!(matches!(envelope.signal, ClientSignal::LeaveRoom {}));
}

#[test]
fn create_transport_direction_is_lowercase() {
    let raw = json!({ "id": 1, "type": "create-transport", "data": { "direction": "recv" } });
    let envelope: ClientEnvelope = serde_json::from_value(raw).unwrap();
    match envelope.signal {
        ClientSignal::CreateTransport { direction } => {
            assert_eq!(direction, TransportDirection::Recv);
        }
        other => panic!("unexpected signal: {other:?}"),
    }
}

#[test]
fn server_events_use_spec_names_and_camel_case() {
    let event = ServerSignal::NewProducer {
        producer_id: "p1".to_string(),
        participant_id: "u1".to_string(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({ "type": "new-producer", "data": { "producerId": "p1", "participantId": "u1" } })
    );

    let event = ServerSignal::HlsStarted {
        room_id: "r1".to_string(),
        playlist_url: "/hls/r1/playlist.m3u8".to_string(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "hls-started");
    assert_eq!(value["data"]["roomId"], "r1");
    assert_eq!(value["data"]["playlistUrl"], "/hls/r1/playlist.m3u8");
}

#[test]
fn error_codes_match_wire_text() {
    assert_eq!(MediaError::HostExists.to_string(), "HOST_EXISTS");
    assert_eq!(MediaError::RoomFull.to_string(), "ROOM_FULL");
    assert_eq!(MediaError::RoomNotFound.to_string(), "ROOM_NOT_FOUND");
    assert_eq!(MediaError::NotAuthorized.to_string(), "NOT_AUTHORIZED");
    assert_eq!(
        MediaError::ViewerCannotConsumeWebrtc.to_string(),
        "VIEWER_CANNOT_CONSUME_WEBRTC"
    );
    assert_eq!(
        MediaError::TransportConnectTimeout.to_string(),
        "TRANSPORT_CONNECT_TIMEOUT"
    );
    assert_eq!(
        MediaError::IncompatibleCapabilities.to_string(),
        "INCOMPATIBLE_CAPABILITIES"
    );
    assert_eq!(MediaError::HlsNotRunning.to_string(), "HLS_NOT_RUNNING");
    assert_eq!(MediaError::HlsBusy.to_string(), "HLS_BUSY");
    assert_eq!(MediaError::NoAudioProducers.to_string(), "NO_AUDIO_PRODUCERS");
    assert_eq!(MediaError::RouterGone.to_string(), "ROUTER_GONE");
}

#[test]
fn roles_round_trip() {
    for (role, text) in [
        (ParticipantRole::Host, "\"host\""),
        (ParticipantRole::Guest, "\"guest\""),
        (ParticipantRole::Viewer, "\"viewer\""),
    ] {
        assert_eq!(serde_json::to_string(&role).unwrap(), text);
        let parsed: ParticipantRole = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, role);
    }
    assert!(ParticipantRole::Host.is_streamer());
    assert!(ParticipantRole::Guest.is_streamer());
    assert!(!ParticipantRole::Viewer.is_streamer());
}
