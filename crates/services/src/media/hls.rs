use mediasoup::plain_transport::{PlainTransport, PlainTransportOptions};
use mediasoup::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use super::endpoints::EndpointRegistry;
use super::error::MediaError;
use super::hls_pipeline::{self, SdpMedia, Selection, StreamerMedia};
use super::room::LiveRoom;
use super::signaling::{EventSender, OutboundEvent, ServerSignal};
use crate::dao::room::RoomDao;

const RESTART_DEBOUNCE: Duration = Duration::from_secs(2);

/// Collaborators the HLS state machine needs, injected so it performs no
/// global lookups.
#[derive(Clone)]
pub struct HlsDeps {
    pub events_tx: EventSender,
    pub rooms: Arc<RoomDao>,
    pub endpoints: Arc<EndpointRegistry>,
    pub storage_path: PathBuf,
    pub ffmpeg_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HlsPhase {
    Off,
    Starting,
    Running,
    Restarting,
    Stopping,
}

/// Per-room broadcast pipeline: plain transports and un-paused consumers
/// feeding an external transcoder that emits the live playlist.
///
/// Transitions are serialized by the state mutex, which is never held
/// across transport creation or process spawn; operations arriving during
/// a startup observe `Starting` and fail with `HLS_BUSY` instead of
/// queueing. The restart debounce is a sequence-checked timer: replacing
/// or cancelling it bumps `debounce_seq`, and a stale timer exits on
/// wake-up.
pub struct HlsController {
    state: Mutex<HlsInner>,
}

struct HlsInner {
    phase: HlsPhase,
    selection: Selection,
    plain_transports: Vec<PlainTransport>,
    consumers: Vec<Consumer>,
    sdp_path: Option<PathBuf>,
    kill_tx: Option<oneshot::Sender<()>>,
    debounce_seq: u64,
    generation: u64,
}

struct BuiltPipeline {
    plain_transports: Vec<PlainTransport>,
    consumers: Vec<Consumer>,
    sdp_path: PathBuf,
    child: Child,
    kill_tx: oneshot::Sender<()>,
    kill_rx: oneshot::Receiver<()>,
}

impl HlsController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HlsInner {
                phase: HlsPhase::Off,
                selection: Selection::default(),
                plain_transports: Vec::new(),
                consumers: Vec::new(),
                sdp_path: None,
                kill_tx: None,
                debounce_seq: 0,
                generation: 0,
            }),
        }
    }

    /// Reacts to a producer-set change: auto-starts once the host publishes
    /// audio, and schedules a debounced restart when the set changes
    /// materially while running.
    pub async fn on_producers_changed(room: &Arc<LiveRoom>, deps: &HlsDeps) {
        let streamers = streamer_media(room, &deps.endpoints);
        {
            let mut inner = room.hls.state.lock().await;
            match inner.phase {
                HlsPhase::Off => {
                    let host_has_audio = streamers
                        .iter()
                        .any(|s| s.is_host && s.audio_producer.is_some());
                    if !host_has_audio {
                        return;
                    }
                    inner.phase = HlsPhase::Starting;
                }
                HlsPhase::Running | HlsPhase::Restarting => {
                    if !hls_pipeline::should_restart(&inner.selection, &streamers) {
                        return;
                    }
                    Self::schedule_restart(&mut inner, room, deps);
                    return;
                }
                HlsPhase::Starting | HlsPhase::Stopping => return,
            }
        }

        if let Err(e) = Self::build_and_run(room, deps, false).await {
            warn!(room_id = %room.id, %e, "hls auto-start failed");
        }
    }

    /// Explicit `start-hls` from the host.
    pub async fn start_manual(room: &Arc<LiveRoom>, deps: &HlsDeps) -> Result<(), MediaError> {
        let streamers = streamer_media(room, &deps.endpoints);
        {
            let mut inner = room.hls.state.lock().await;
            match inner.phase {
                HlsPhase::Running | HlsPhase::Restarting => {
                    return Err(MediaError::HlsAlreadyRunning);
                }
                HlsPhase::Starting | HlsPhase::Stopping => return Err(MediaError::HlsBusy),
                HlsPhase::Off => {}
            }
            if !streamers.iter().any(|s| s.audio_producer.is_some()) {
                return Err(MediaError::NoAudioProducers);
            }
            inner.phase = HlsPhase::Starting;
        }
        Self::build_and_run(room, deps, false).await
    }

    /// Explicit `stop-hls`, last streamer leaving, or room close.
    pub async fn stop(room: &Arc<LiveRoom>, deps: &HlsDeps) -> Result<(), MediaError> {
        {
            let mut inner = room.hls.state.lock().await;
            match inner.phase {
                HlsPhase::Off => return Err(MediaError::HlsNotRunning),
                HlsPhase::Starting | HlsPhase::Stopping => return Err(MediaError::HlsBusy),
                HlsPhase::Running | HlsPhase::Restarting => {}
            }
            inner.debounce_seq += 1;
            inner.phase = HlsPhase::Stopping;
        }

        Self::teardown(room, deps).await;

        {
            let mut inner = room.hls.state.lock().await;
            inner.phase = HlsPhase::Off;
        }
        Self::clear_url(room, deps).await;
        broadcast(
            room,
            deps,
            ServerSignal::HlsStopped {
                room_id: room.id.clone(),
            },
        );
        info!(room_id = %room.id, "hls stopped");
        Ok(())
    }

    /// Best-effort stop for room teardown paths.
    pub async fn stop_if_running(room: &Arc<LiveRoom>, deps: &HlsDeps) {
        match Self::stop(room, deps).await {
            Ok(()) | Err(MediaError::HlsNotRunning) => {}
            Err(e) => warn!(room_id = %room.id, %e, "hls stop failed"),
        }
    }

    /// Debounce timer body; `seq` invalidates stale timers.
    async fn restart(room: &Arc<LiveRoom>, deps: &HlsDeps, seq: u64) {
        {
            let mut inner = room.hls.state.lock().await;
            if inner.debounce_seq != seq || inner.phase != HlsPhase::Restarting {
                return;
            }
            inner.phase = HlsPhase::Starting;
        }

        Self::teardown(room, deps).await;

        if let Err(e) = Self::build_and_run(room, deps, true).await {
            warn!(room_id = %room.id, %e, "hls restart failed");
            Self::clear_url(room, deps).await;
            broadcast(
                room,
                deps,
                ServerSignal::HlsStopped {
                    room_id: room.id.clone(),
                },
            );
        }
    }

    /// Builds the pipeline and finishes the STARTING -> RUNNING transition.
    /// Expects the phase to be `Starting` on entry; resets to `Off` on
    /// failure.
    async fn build_and_run(
        room: &Arc<LiveRoom>,
        deps: &HlsDeps,
        restarted: bool,
    ) -> Result<(), MediaError> {
        let streamers = streamer_media(room, &deps.endpoints);
        let selection = hls_pipeline::select_inputs(&streamers);
        if selection.audios.is_empty() {
            // audio vanished between the trigger and the build
            room.hls.state.lock().await.phase = HlsPhase::Off;
            return Err(MediaError::NoAudioProducers);
        }

        let built = match Self::build_pipeline(room, deps, &selection).await {
            Ok(built) => built,
            Err(e) => {
                room.hls.state.lock().await.phase = HlsPhase::Off;
                return Err(e);
            }
        };

        // The room may have emptied or closed while the pipeline was built.
        if room.is_closed() || room.members.streamers().is_empty() {
            let mut child = built.child;
            let _ = child.kill().await;
            let _ = child.wait().await;
            Self::remove_artifacts(room, deps, Some(built.sdp_path)).await;
            room.hls.state.lock().await.phase = HlsPhase::Off;
            return Ok(());
        }

        let url = format!("/hls/{}/playlist.m3u8", room.id);
        let generation = {
            let mut inner = room.hls.state.lock().await;
            inner.generation += 1;
            inner.selection = selection;
            inner.plain_transports = built.plain_transports;
            inner.consumers = built.consumers;
            inner.sdp_path = Some(built.sdp_path);
            inner.kill_tx = Some(built.kill_tx);
            inner.phase = HlsPhase::Running;
            inner.generation
        };

        Self::monitor_transcoder(room, deps, built.child, built.kill_rx, generation);

        *room.hls_url.lock() = Some(url.clone());
        if let Err(e) = deps.rooms.update_hls_url(&room.id, Some(url.as_str())).await {
            warn!(room_id = %room.id, %e, "failed to persist hls url");
        }

        let signal = if restarted {
            ServerSignal::HlsRestarted {
                room_id: room.id.clone(),
                playlist_url: url.clone(),
            }
        } else {
            ServerSignal::HlsStarted {
                room_id: room.id.clone(),
                playlist_url: url.clone(),
            }
        };
        broadcast(room, deps, signal);
        info!(room_id = %room.id, url, restarted, "hls pipeline running");

        // publications that landed while the pipeline was building get the
        // normal debounced-restart treatment
        let streamers = streamer_media(room, &deps.endpoints);
        let mut inner = room.hls.state.lock().await;
        if inner.phase == HlsPhase::Running
            && hls_pipeline::should_restart(&inner.selection, &streamers)
        {
            Self::schedule_restart(&mut inner, room, deps);
        }
        Ok(())
    }

    /// Replaces any pending restart timer; a stale timer sees a bumped
    /// `debounce_seq` and exits.
    fn schedule_restart(inner: &mut HlsInner, room: &Arc<LiveRoom>, deps: &HlsDeps) {
        inner.phase = HlsPhase::Restarting;
        inner.debounce_seq += 1;
        let seq = inner.debounce_seq;
        debug!(room_id = %room.id, seq, "hls restart scheduled");
        let room = Arc::clone(room);
        let deps = deps.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_DEBOUNCE).await;
            Self::restart(&room, &deps, seq).await;
        });
    }

    /// Creates the plain transports, consumers, SDP file and transcoder
    /// process. Runs without the state lock.
    async fn build_pipeline(
        room: &Arc<LiveRoom>,
        deps: &HlsDeps,
        selection: &Selection,
    ) -> Result<BuiltPipeline, MediaError> {
        // Finalized router capabilities deserialize into consumer
        // capabilities (same JSON schema).
        let capabilities: RtpCapabilities = serde_json::to_value(room.router.rtp_capabilities())
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| MediaError::Internal("router capabilities unavailable".to_string()))?;

        let mut plain_transports = Vec::new();
        let mut consumers = Vec::new();
        let mut media = Vec::new();

        for producer_id in selection.videos.iter().chain(selection.audios.iter()) {
            let producer_id: ProducerId = producer_id.parse().map_err(|_| {
                MediaError::Internal(format!("invalid producer id {producer_id}"))
            })?;

            let transport = room
                .router
                .create_plain_transport(plain_transport_options())
                .await
                .map_err(|e| {
                    warn!(room_id = %room.id, %e, "failed to create plain transport");
                    MediaError::HlsSpawnFailed
                })?;

            let mut options = ConsumerOptions::new(producer_id, capabilities.clone());
            options.paused = false;
            let consumer = transport.consume(options).await.map_err(|e| {
                warn!(room_id = %room.id, %producer_id, %e, "failed to consume for hls");
                MediaError::HlsSpawnFailed
            })?;

            media.push(sdp_media_for(&transport, &consumer)?);
            plain_transports.push(transport);
            consumers.push(consumer);
        }

        let sdp_path = deps.storage_path.join(format!("{}.sdp", room.id));
        let out_dir = deps.storage_path.join(&room.id);
        let sdp = hls_pipeline::render_sdp(&room.name, &media);

        tokio::fs::create_dir_all(&out_dir).await.map_err(|e| {
            warn!(room_id = %room.id, %e, "failed to create segment directory");
            MediaError::HlsSpawnFailed
        })?;
        tokio::fs::write(&sdp_path, sdp).await.map_err(|e| {
            warn!(room_id = %room.id, %e, "failed to write sdp file");
            MediaError::HlsSpawnFailed
        })?;

        let args = hls_pipeline::transcoder_args(
            &sdp_path,
            &out_dir,
            selection.videos.len(),
            selection.audios.len(),
        );
        let mut child = Command::new(&deps.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                warn!(room_id = %room.id, %e, "failed to spawn transcoder");
                MediaError::HlsSpawnFailed
            })?;

        // Transcoder stderr is logged, never fed back into the protocol.
        if let Some(stderr) = child.stderr.take() {
            let room_id = room.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(room_id, "transcoder: {line}");
                }
            });
        }

        info!(room_id = %room.id, pid = ?child.id(), videos = selection.videos.len(), audios = selection.audios.len(), "transcoder started");

        let (kill_tx, kill_rx) = oneshot::channel();
        Ok(BuiltPipeline {
            plain_transports,
            consumers,
            sdp_path,
            child,
            kill_tx,
            kill_rx,
        })
    }

    /// Watches the transcoder. A fired (or dropped) kill switch means the
    /// exit was requested; anything else is a crash that turns HLS off.
    fn monitor_transcoder(
        room: &Arc<LiveRoom>,
        deps: &HlsDeps,
        mut child: Child,
        mut kill_rx: oneshot::Receiver<()>,
        generation: u64,
    ) {
        let weak = Arc::downgrade(room);
        let deps = deps.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = &mut kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(%e, "failed to kill transcoder");
                    }
                    let _ = child.wait().await;
                }
                status = child.wait() => {
                    warn!(?status, "transcoder exited unexpectedly");
                    if let Some(room) = weak.upgrade() {
                        Self::on_transcoder_exit(&room, &deps, generation).await;
                    }
                }
            }
        });
    }

    async fn on_transcoder_exit(room: &Arc<LiveRoom>, deps: &HlsDeps, generation: u64) {
        let taken = {
            let mut inner = room.hls.state.lock().await;
            if inner.generation != generation
                || !matches!(inner.phase, HlsPhase::Running | HlsPhase::Restarting)
            {
                return;
            }
            inner.phase = HlsPhase::Off;
            inner.debounce_seq += 1;
            inner.kill_tx = None;
            inner.selection = Selection::default();
            (
                std::mem::take(&mut inner.consumers),
                std::mem::take(&mut inner.plain_transports),
                inner.sdp_path.take(),
            )
        };

        let (consumers, plain_transports, sdp_path) = taken;
        drop(consumers);
        drop(plain_transports);
        Self::remove_artifacts(room, deps, sdp_path).await;
        Self::clear_url(room, deps).await;
        broadcast(
            room,
            deps,
            ServerSignal::HlsStopped {
                room_id: room.id.clone(),
            },
        );
        info!(room_id = %room.id, "hls turned off after transcoder exit");
    }

    /// Stops the transcoder and releases every pipeline resource: consumers
    /// close before their plain transports, then the SDP file and segment
    /// directory are removed. Cleanup is best-effort.
    async fn teardown(room: &Arc<LiveRoom>, deps: &HlsDeps) {
        let (consumers, plain_transports, sdp_path, kill_tx) = {
            let mut inner = room.hls.state.lock().await;
            inner.generation += 1;
            inner.selection = Selection::default();
            (
                std::mem::take(&mut inner.consumers),
                std::mem::take(&mut inner.plain_transports),
                inner.sdp_path.take(),
                inner.kill_tx.take(),
            )
        };

        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }
        drop(consumers);
        drop(plain_transports);
        Self::remove_artifacts(room, deps, sdp_path).await;
    }

    async fn remove_artifacts(room: &LiveRoom, deps: &HlsDeps, sdp_path: Option<PathBuf>) {
        if let Some(path) = sdp_path {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(room_id = %room.id, %e, "failed to remove sdp file");
                }
            }
        }
        let segment_dir = deps.storage_path.join(&room.id);
        if let Err(e) = tokio::fs::remove_dir_all(&segment_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(room_id = %room.id, %e, "failed to remove segment directory");
            }
        }
    }

    async fn clear_url(room: &LiveRoom, deps: &HlsDeps) {
        *room.hls_url.lock() = None;
        if let Err(e) = deps.rooms.update_hls_url(&room.id, None).await {
            warn!(room_id = %room.id, %e, "failed to clear hls url");
        }
    }
}

impl Default for HlsController {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of what each streamer currently publishes, in join order.
fn streamer_media(room: &LiveRoom, endpoints: &EndpointRegistry) -> Vec<StreamerMedia> {
    room.members
        .streamers()
        .iter()
        .map(|participant| {
            let mut media = StreamerMedia {
                participant_id: participant.id.clone(),
                is_host: participant.is_host(),
                video_producer: None,
                audio_producer: None,
            };
            for producer_id in participant.producer_ids() {
                let Some(entry) = endpoints.producer(&producer_id) else {
                    continue;
                };
                if entry.producer.closed() {
                    continue;
                }
                match entry.kind {
                    MediaKind::Video if media.video_producer.is_none() => {
                        media.video_producer = Some(producer_id);
                    }
                    MediaKind::Audio if media.audio_producer.is_none() => {
                        media.audio_producer = Some(producer_id);
                    }
                    _ => {}
                }
            }
            media
        })
        .collect()
}

fn plain_transport_options() -> PlainTransportOptions {
    let mut options = PlainTransportOptions::new(ListenInfo {
        protocol: Protocol::Udp,
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        announced_address: None,
        port: None,
        port_range: None,
        flags: None,
        send_buffer_size: None,
        recv_buffer_size: None,
        expose_internal_ip: false,
    });
    // listen-only: the transcoder never sends RTP back
    options.comedia = true;
    options.rtcp_mux = false;
    options
}

/// Derives the SDP media line for one plain-transport consumer from its
/// negotiated RTP parameters.
fn sdp_media_for(transport: &PlainTransport, consumer: &Consumer) -> Result<SdpMedia, MediaError> {
    let parameters = serde_json::to_value(consumer.rtp_parameters())
        .map_err(|e| MediaError::Internal(format!("unserializable rtp parameters: {e}")))?;
    let codec = parameters
        .get("codecs")
        .and_then(|c| c.get(0))
        .ok_or_else(|| MediaError::Internal("consumer negotiated no codec".to_string()))?;

    let mime = codec.get("mimeType").and_then(|m| m.as_str()).unwrap_or("");
    let (kind, codec_name) = mime
        .split_once('/')
        .ok_or_else(|| MediaError::Internal(format!("malformed mime type {mime}")))?;

    let port = tuple_local_port(transport.tuple())
        .ok_or_else(|| MediaError::Internal("plain transport has no local port".to_string()))?;
    let rtcp_port = transport.rtcp_tuple().and_then(tuple_local_port);

    Ok(SdpMedia {
        kind: kind.to_string(),
        port,
        rtcp_port,
        payload_type: codec.get("payloadType").and_then(|p| p.as_u64()).unwrap_or(0) as u8,
        codec: codec_name.to_string(),
        clock_rate: codec.get("clockRate").and_then(|c| c.as_u64()).unwrap_or(90000) as u32,
        channels: codec
            .get("channels")
            .and_then(|c| c.as_u64())
            .map(|c| c as u8),
    })
}

fn tuple_local_port(tuple: TransportTuple) -> Option<u16> {
    serde_json::to_value(&tuple)
        .ok()?
        .get("localPort")?
        .as_u64()
        .map(|p| p as u16)
}

fn broadcast(room: &LiveRoom, deps: &HlsDeps, signal: ServerSignal) {
    let targets = room.members.connection_ids_except(None);
    if targets.is_empty() {
        return;
    }
    let _ = deps.events_tx.send(OutboundEvent { targets, signal });
}
