use std::path::Path;

pub const SEGMENT_SECONDS: u32 = 4;
pub const WINDOW_SEGMENTS: u32 = 5;

/// Media published by one streamer, in join order.
#[derive(Debug, Clone, Default)]
pub struct StreamerMedia {
    pub participant_id: String,
    pub is_host: bool,
    pub video_producer: Option<String>,
    pub audio_producer: Option<String>,
}

/// Producer ids feeding the transcoder: up to two videos then up to two
/// audios, stable by streamer join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub videos: Vec<String>,
    pub audios: Vec<String>,
}

pub fn select_inputs(streamers: &[StreamerMedia]) -> Selection {
    let mut selection = Selection::default();
    for streamer in streamers {
        if selection.videos.len() < 2 {
            if let Some(id) = &streamer.video_producer {
                selection.videos.push(id.clone());
            }
        }
    }
    for streamer in streamers {
        if selection.audios.len() < 2 {
            if let Some(id) = &streamer.audio_producer {
                selection.audios.push(id.clone());
            }
        }
    }
    selection
}

/// A restart is warranted only when the host adds video over an audio-only
/// pipeline, or when the guest has reached both audio and video and the
/// running pipeline does not carry them yet.
pub fn should_restart(running: &Selection, streamers: &[StreamerMedia]) -> bool {
    if let Some(host) = streamers.iter().find(|s| s.is_host) {
        if running.videos.is_empty() && host.video_producer.is_some() {
            return true;
        }
    }
    if let Some(guest) = streamers.iter().find(|s| !s.is_host) {
        if let (Some(video), Some(audio)) = (&guest.video_producer, &guest.audio_producer) {
            if !running.videos.contains(video) || !running.audios.contains(audio) {
                return true;
            }
        }
    }
    false
}

/// One media line of the transcoder's session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMedia {
    pub kind: String,
    pub port: u16,
    pub rtcp_port: Option<u16>,
    pub payload_type: u8,
    pub codec: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

/// Renders the session description consumed by the transcoder. All media
/// lines point at loopback plain transports.
pub fn render_sdp(session_name: &str, media: &[SdpMedia]) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str("o=- 0 0 IN IP4 127.0.0.1\r\n");
    sdp.push_str(&format!("s={session_name}\r\n"));
    sdp.push_str("c=IN IP4 127.0.0.1\r\n");
    sdp.push_str("t=0 0\r\n");
    for m in media {
        sdp.push_str(&format!("m={} {} RTP/AVP {}\r\n", m.kind, m.port, m.payload_type));
        match m.channels {
            Some(channels) => sdp.push_str(&format!(
                "a=rtpmap:{} {}/{}/{}\r\n",
                m.payload_type, m.codec, m.clock_rate, channels
            )),
            None => sdp.push_str(&format!(
                "a=rtpmap:{} {}/{}\r\n",
                m.payload_type, m.codec, m.clock_rate
            )),
        }
        if let Some(rtcp_port) = m.rtcp_port {
            sdp.push_str(&format!("a=rtcp:{rtcp_port}\r\n"));
        }
    }
    sdp
}

/// Transcoder invocation: H264/AAC out, low-latency HLS with a sliding
/// 5-segment window. Two videos are stacked side by side at 960x540 each;
/// two audios are mixed.
pub fn transcoder_args(
    sdp_path: &Path,
    out_dir: &Path,
    video_count: usize,
    audio_count: usize,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    push(&mut args, &["-hide_banner", "-loglevel", "warning"]);
    push(&mut args, &["-protocol_whitelist", "file,udp,rtp"]);
    push(&mut args, &["-i", &sdp_path.display().to_string()]);

    match video_count {
        2 => {
            push(
                &mut args,
                &[
                    "-filter_complex",
                    "[0:v:0]scale=960:540[v0];[0:v:1]scale=960:540[v1];[v0][v1]hstack=inputs=2[vout]",
                    "-map",
                    "[vout]",
                ],
            );
        }
        1 => {
            push(
                &mut args,
                &["-filter_complex", "[0:v:0]scale=1280:720[vout]", "-map", "[vout]"],
            );
        }
        _ => {}
    }

    match audio_count {
        2 => {
            push(
                &mut args,
                &[
                    "-filter_complex",
                    "[0:a:0][0:a:1]amix=inputs=2:duration=longest[aout]",
                    "-map",
                    "[aout]",
                ],
            );
        }
        1 => {
            push(&mut args, &["-map", "0:a:0"]);
        }
        _ => {}
    }

    if video_count > 0 {
        push(
            &mut args,
            &["-c:v", "libx264", "-preset", "ultrafast", "-tune", "zerolatency"],
        );
    }
    if audio_count > 0 {
        push(&mut args, &["-c:a", "aac"]);
    }

    push(&mut args, &["-f", "hls"]);
    push(&mut args, &["-hls_time", &SEGMENT_SECONDS.to_string()]);
    push(&mut args, &["-hls_list_size", &WINDOW_SEGMENTS.to_string()]);
    push(&mut args, &["-hls_flags", "delete_segments"]);
    args.push(out_dir.join("playlist.m3u8").display().to_string());

    args
}

fn push(args: &mut Vec<String>, values: &[&str]) {
    args.extend(values.iter().map(|v| v.to_string()));
}
