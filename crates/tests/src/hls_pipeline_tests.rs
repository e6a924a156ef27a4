use stagecast_services::media::hls_pipeline::{
    SdpMedia, Selection, StreamerMedia, render_sdp, select_inputs, should_restart,
    transcoder_args,
};
use std::path::Path;

fn host(video: Option<&str>, audio: Option<&str>) -> StreamerMedia {
    StreamerMedia {
        participant_id: "host".to_string(),
        is_host: true,
        video_producer: video.map(str::to_string),
        audio_producer: audio.map(str::to_string),
    }
}

fn guest(video: Option<&str>, audio: Option<&str>) -> StreamerMedia {
    StreamerMedia {
        participant_id: "guest".to_string(),
        is_host: false,
        video_producer: video.map(str::to_string),
        audio_producer: audio.map(str::to_string),
    }
}

#[test]
fn selection_orders_videos_before_audios_by_join_order() {
    let streamers = [host(Some("hv"), Some("ha")), guest(Some("gv"), Some("ga"))];
    let selection = select_inputs(&streamers);
    assert_eq!(selection.videos, vec!["hv", "gv"]);
    assert_eq!(selection.audios, vec!["ha", "ga"]);
}

#[test]
fn selection_handles_audio_only_host() {
    let streamers = [host(None, Some("ha"))];
    let selection = select_inputs(&streamers);
    assert!(selection.videos.is_empty());
    assert_eq!(selection.audios, vec!["ha"]);
}

#[test]
fn host_video_over_audio_only_triggers_restart() {
    let running = Selection {
        videos: vec![],
        audios: vec!["ha".to_string()],
    };
    let streamers = [host(Some("hv"), Some("ha"))];
    assert!(should_restart(&running, &streamers));
}

#[test]
fn guest_with_both_kinds_triggers_restart() {
    let running = Selection {
        videos: vec!["hv".to_string()],
        audios: vec!["ha".to_string()],
    };
    let streamers = [host(Some("hv"), Some("ha")), guest(Some("gv"), Some("ga"))];
    assert!(should_restart(&running, &streamers));
}

#[test]
fn guest_audio_only_does_not_trigger_restart() {
    let running = Selection {
        videos: vec!["hv".to_string()],
        audios: vec!["ha".to_string()],
    };
    let streamers = [host(Some("hv"), Some("ha")), guest(None, Some("ga"))];
    assert!(!should_restart(&running, &streamers));
}

#[test]
fn unchanged_set_does_not_trigger_restart() {
    let running = Selection {
        videos: vec!["hv".to_string(), "gv".to_string()],
        audios: vec!["ha".to_string(), "ga".to_string()],
    };
    let streamers = [host(Some("hv"), Some("ha")), guest(Some("gv"), Some("ga"))];
    assert!(!should_restart(&running, &streamers));
}

#[test]
fn sdp_renders_video_and_audio_lines() {
    let media = [
        SdpMedia {
            kind: "video".to_string(),
            port: 5004,
            rtcp_port: Some(5005),
            payload_type: 101,
            codec: "VP8".to_string(),
            clock_rate: 90000,
            channels: None,
        },
        SdpMedia {
            kind: "audio".to_string(),
            port: 5006,
            rtcp_port: Some(5007),
            payload_type: 100,
            codec: "opus".to_string(),
            clock_rate: 48000,
            channels: Some(2),
        },
    ];

    let sdp = render_sdp("studio", &media);
    assert!(sdp.starts_with("v=0\r\n"));
    assert!(sdp.contains("s=studio\r\n"));
    assert!(sdp.contains("c=IN IP4 127.0.0.1\r\n"));
    assert!(sdp.contains("m=video 5004 RTP/AVP 101\r\n"));
    assert!(sdp.contains("a=rtpmap:101 VP8/90000\r\n"));
    assert!(sdp.contains("a=rtcp:5005\r\n"));
    assert!(sdp.contains("m=audio 5006 RTP/AVP 100\r\n"));
    assert!(sdp.contains("a=rtpmap:100 opus/48000/2\r\n"));
}

#[test]
fn two_videos_are_stacked_side_by_side() {
    let args = transcoder_args(Path::new("/tmp/r.sdp"), Path::new("/tmp/r"), 2, 2);
    let joined = args.join(" ");
    assert!(joined.contains("-protocol_whitelist file,udp,rtp"));
    assert!(joined.contains("scale=960:540"));
    assert!(joined.contains("hstack=inputs=2"));
    assert!(joined.contains("amix=inputs=2:duration=longest"));
    assert!(joined.contains("-c:v libx264"));
    assert!(joined.contains("-preset ultrafast"));
    assert!(joined.contains("-tune zerolatency"));
    assert!(joined.contains("-c:a aac"));
    assert!(joined.contains("-hls_time 4"));
    assert!(joined.contains("-hls_list_size 5"));
    assert!(joined.contains("-hls_flags delete_segments"));
    assert!(args.last().unwrap().ends_with("playlist.m3u8"));
}

#[test]
fn single_video_is_scaled_to_720p() {
    let args = transcoder_args(Path::new("/tmp/r.sdp"), Path::new("/tmp/r"), 1, 1);
    let joined = args.join(" ");
    assert!(joined.contains("scale=1280:720"));
    assert!(!joined.contains("hstack"));
    assert!(!joined.contains("amix"));
    assert!(joined.contains("-map 0:a:0"));
}

#[test]
fn audio_only_pipeline_skips_video_codec() {
    let args = transcoder_args(Path::new("/tmp/r.sdp"), Path::new("/tmp/r"), 0, 1);
    let joined = args.join(" ");
    assert!(!joined.contains("-c:v"));
    assert!(!joined.contains("-filter_complex"));
    assert!(joined.contains("-c:a aac"));
    assert!(joined.contains("-f hls"));
}
