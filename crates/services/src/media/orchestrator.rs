use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use mediasoup::prelude::*;
use mediasoup::worker::WorkerId;
use stagecast_config::HlsSettings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::endpoints::{EndpointMeta, EndpointRegistry};
use super::error::MediaError;
use super::hls::{HlsController, HlsDeps};
use super::participant::LiveParticipant;
use super::room::LiveRoom;
use super::router_registry::RouterRegistry;
use super::signaling::{
    ConsumerCreated, EventSender, JoinResponse, OutboundEvent, ParticipantRole, Produced,
    ProducerSnapshot, ServerSignal, TransportConnected, TransportCreated, TransportDirection,
};
use super::worker_pool::WorkerPool;
use crate::dao::participant::ParticipantDao;
use crate::dao::room::RoomDao;
use stagecast_db::models::ParticipantRecord;

/// Consumers are created paused and resumed after this grace period so the
/// client transport can finish its DTLS handshake; resuming earlier drops
/// the first seconds of the track.
const CONSUMER_RESUME_DELAY: Duration = Duration::from_secs(1);

/// The room orchestrator: admission, the WebRTC handshake flow, HLS
/// triggers and worker-loss fan-out. All collaborators are injected.
pub struct Orchestrator {
    rooms: DashMap<String, Arc<LiveRoom>>,
    /// connection id -> room id
    connections: DashMap<String, String>,
    pool: Arc<WorkerPool>,
    routers: RouterRegistry,
    endpoints: Arc<EndpointRegistry>,
    rooms_dao: Arc<RoomDao>,
    participants_dao: Arc<ParticipantDao>,
    events_tx: EventSender,
    hls_deps: HlsDeps,
}

impl Orchestrator {
    pub fn new(
        pool: Arc<WorkerPool>,
        endpoints: Arc<EndpointRegistry>,
        rooms_dao: Arc<RoomDao>,
        participants_dao: Arc<ParticipantDao>,
        hls_settings: &HlsSettings,
        events_tx: EventSender,
    ) -> Arc<Self> {
        let routers = RouterRegistry::new(Arc::clone(&pool));
        let hls_deps = HlsDeps {
            events_tx: events_tx.clone(),
            rooms: Arc::clone(&rooms_dao),
            endpoints: Arc::clone(&endpoints),
            storage_path: PathBuf::from(&hls_settings.storage_path),
            ffmpeg_path: hls_settings.ffmpeg_path.clone(),
        };
        Arc::new(Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            pool,
            routers,
            endpoints,
            rooms_dao,
            participants_dao,
            events_tx,
            hls_deps,
        })
    }

    /// Worker-loss fan-out: rooms routed on a dead worker broadcast
    /// `ROUTER_GONE` and close; their clients must rejoin to land on a
    /// fresh router.
    pub fn watch_worker_deaths(self: &Arc<Self>, mut lost: mpsc::UnboundedReceiver<WorkerId>) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(worker_id) = lost.recv().await {
                for room_id in orchestrator.routers.rooms_on_worker(worker_id) {
                    warn!(%worker_id, room_id, "router lost with its worker");
                    let Some(room) = orchestrator.rooms.get(&room_id).map(|r| Arc::clone(&r))
                    else {
                        continue;
                    };
                    orchestrator.send_to_room(
                        &room,
                        None,
                        ServerSignal::Error {
                            message: MediaError::RouterGone.to_string(),
                        },
                    );
                    orchestrator.close_room(&room).await;
                }
            }
        });
    }

    /// Resolves (or activates) the room, applies the admission rules and
    /// hands the new participant everything it needs to start consuming.
    pub async fn join_room(
        &self,
        connection_id: &str,
        room_id: &str,
        name: &str,
        role: ParticipantRole,
    ) -> Result<JoinResponse, MediaError> {
        // a rejoin on the same connection is a fresh join
        if self.connections.contains_key(connection_id) {
            self.disconnect(connection_id).await;
        }

        // direct-URL joins mint the room record on the fly
        let record = self.rooms_dao.ensure(room_id, room_id).await.map_err(|e| {
            warn!(room_id, %e, "room store unavailable");
            MediaError::Internal("room store unavailable".to_string())
        })?;

        let room = match self.rooms.get(room_id).map(|r| Arc::clone(&r)) {
            Some(room) => room,
            None => {
                let entry = self.routers.get_or_create(room_id).await?;
                let fresh = LiveRoom::new(room_id, &record.name, entry.router);
                let (room, activated) = match self.rooms.entry(room_id.to_string()) {
                    MapEntry::Occupied(existing) => (Arc::clone(existing.get()), false),
                    MapEntry::Vacant(slot) => {
                        slot.insert(Arc::clone(&fresh));
                        (fresh, true)
                    }
                };
                if activated {
                    if let Err(e) = self.rooms_dao.set_active(room_id, true).await {
                        warn!(room_id, %e, "failed to mark room active");
                    }
                    info!(room_id, "room activated");
                }
                room
            }
        };

        let participant = room.members.admit(connection_id, name, role)?;
        self.connections
            .insert(connection_id.to_string(), room_id.to_string());

        let row = ParticipantRecord {
            id: participant.id.clone(),
            room_id: room_id.to_string(),
            socket_id: connection_id.to_string(),
            is_host: participant.is_host(),
            is_viewer: participant.is_viewer(),
            has_video: false,
            has_audio: false,
            joined_at: participant.joined_at,
        };
        if let Err(e) = self.participants_dao.insert(&row).await {
            warn!(room_id, %e, "failed to mirror participant");
        }

        let (router_rtp_capabilities, existing_producers) = if participant.is_viewer() {
            (None, Vec::new())
        } else {
            let capabilities = self.routers.capabilities(&room.id).ok_or_else(|| {
                MediaError::Internal("router capabilities unavailable".to_string())
            })?;
            (
                Some(capabilities),
                self.producer_snapshot(&room, &participant.id),
            )
        };

        let response = JoinResponse {
            room: room.snapshot(),
            participant_id: participant.id.clone(),
            router_rtp_capabilities,
            existing_producers,
        };

        self.send_to_room(
            &room,
            Some(connection_id),
            ServerSignal::NewParticipant {
                participant: participant.info(),
            },
        );
        info!(room_id, participant_id = %participant.id, role = ?participant.role, "participant joined");
        Ok(response)
    }

    /// Authoritative cleanup for a connection; `leave-room` routes here.
    /// Nothing started by the connection is awaited, endpoints close via
    /// event propagation.
    pub async fn disconnect(&self, connection_id: &str) {
        let Some((_, room_id)) = self.connections.remove(connection_id) else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id).map(|r| Arc::clone(&r)) else {
            return;
        };
        let Some(participant) = room.members.remove_by_connection(connection_id) else {
            return;
        };

        participant.close(&self.endpoints);
        if let Err(e) = self.participants_dao.remove(&participant.id).await {
            warn!(room_id, %e, "failed to remove participant row");
        }

        self.send_to_room(
            &room,
            Some(connection_id),
            ServerSignal::ParticipantLeft {
                participant_id: participant.id.clone(),
            },
        );
        info!(room_id, participant_id = %participant.id, "participant left");

        if room.members.is_empty() {
            self.close_room(&room).await;
        } else if participant.role.is_streamer() && room.members.streamers().is_empty() {
            HlsController::stop_if_running(&room, &self.hls_deps).await;
        }
    }

    pub async fn create_transport(
        &self,
        connection_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportCreated, MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        if participant.is_viewer() {
            return Err(MediaError::ViewerCannotConsumeWebrtc);
        }
        if direction == TransportDirection::Hls {
            return Err(MediaError::InvalidDirection);
        }

        let meta = EndpointMeta {
            room_id: room.id.clone(),
            participant_id: participant.id.clone(),
        };
        let entry = self
            .endpoints
            .create_webrtc_transport(&room.router, direction, meta)
            .await?;
        let transport_id = entry.transport.id().to_string();

        // a re-created transport replaces the previous one for the direction
        if let Some(stale) = participant.add_transport(transport_id.clone(), direction) {
            self.endpoints.remove_transport(&stale);
        }

        debug!(room_id = %room.id, participant_id = %participant.id, transport_id, ?direction, "transport created");
        Ok(TransportCreated {
            id: transport_id,
            ice_parameters: serde_json::to_value(entry.transport.ice_parameters())
                .unwrap_or_default(),
            ice_candidates: serde_json::to_value(entry.transport.ice_candidates())
                .unwrap_or_default(),
            dtls_parameters: serde_json::to_value(entry.transport.dtls_parameters())
                .unwrap_or_default(),
        })
    }

    pub async fn connect_transport(
        &self,
        connection_id: &str,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<TransportConnected, MediaError> {
        let (_room, participant) = self.resolve(connection_id)?;
        let entry = self
            .endpoints
            .transport(transport_id)
            .ok_or(MediaError::TransportNotFound)?;
        if entry.meta.participant_id != participant.id {
            return Err(MediaError::TransportNotFound);
        }

        match self
            .endpoints
            .connect_transport(transport_id, dtls_parameters)
            .await
        {
            Ok(()) => Ok(TransportConnected { connected: true }),
            Err(MediaError::TransportConnectTimeout) => {
                participant.remove_transport(transport_id);
                Err(MediaError::TransportConnectTimeout)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn produce(
        &self,
        connection_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Produced, MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        let transport = self
            .endpoints
            .transport(transport_id)
            .ok_or(MediaError::TransportNotFound)?;
        if transport.meta.participant_id != participant.id {
            return Err(MediaError::TransportNotFound);
        }
        if transport.direction != TransportDirection::Send {
            return Err(MediaError::InvalidDirection);
        }

        // one producer per kind per streamer
        for existing in participant.producer_ids() {
            if let Some(entry) = self.endpoints.producer(&existing) {
                if entry.kind == kind && !entry.producer.closed() {
                    warn!(participant_id = %participant.id, ?kind, "duplicate producer rejected");
                    return Err(MediaError::ProduceFailed);
                }
            }
        }

        let entry = self
            .endpoints
            .create_producer(&transport, kind, rtp_parameters)
            .await?;
        let producer_id = entry.producer.id().to_string();
        participant.add_producer(producer_id.clone());

        // producer-closed fan-out regardless of how the closure happens
        {
            let weak = Arc::downgrade(&room);
            let events_tx = self.events_tx.clone();
            let closed_id = producer_id.clone();
            entry
                .producer
                .on_close(Box::new(move || {
                    if let Some(room) = weak.upgrade() {
                        let targets = room.members.connection_ids_except(None);
                        if !targets.is_empty() {
                            let _ = events_tx.send(OutboundEvent {
                                targets,
                                signal: ServerSignal::ProducerClosed {
                                    producer_id: closed_id,
                                },
                            });
                        }
                    }
                }))
                .detach();
        }

        let (has_audio, has_video) = participant.set_media_flag(kind, true);
        if let Err(e) = self
            .participants_dao
            .set_media_flags(&participant.id, has_audio, has_video)
            .await
        {
            warn!(%e, "failed to mirror media flags");
        }

        self.send_to_room(
            &room,
            Some(connection_id),
            ServerSignal::NewProducer {
                producer_id: producer_id.clone(),
                participant_id: participant.id.clone(),
            },
        );
        info!(room_id = %room.id, participant_id = %participant.id, producer_id, ?kind, "producer created");

        HlsController::on_producers_changed(&room, &self.hls_deps).await;

        Ok(Produced { id: producer_id })
    }

    pub async fn consume(
        &self,
        connection_id: &str,
        producer_id: &str,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerCreated, MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        if participant.is_viewer() {
            return Err(MediaError::ViewerCannotConsumeWebrtc);
        }

        let producer = self
            .endpoints
            .producer(producer_id)
            .ok_or(MediaError::ProducerNotFound)?;
        if producer.producer.closed() {
            return Err(MediaError::ProducerNotFound);
        }
        let producer_id = producer.producer.id();

        if !room.router.can_consume(&producer_id, &rtp_capabilities) {
            return Err(MediaError::IncompatibleCapabilities);
        }

        let recv_id = participant
            .transport_id(TransportDirection::Recv)
            .ok_or(MediaError::TransportNotFound)?;
        let transport = self
            .endpoints
            .transport(&recv_id)
            .ok_or(MediaError::TransportNotFound)?;

        let meta = EndpointMeta {
            room_id: room.id.clone(),
            participant_id: participant.id.clone(),
        };
        let entry = self
            .endpoints
            .create_consumer(&transport, producer_id, rtp_capabilities, meta)
            .await?;
        let consumer_id = entry.consumer.id().to_string();
        participant.add_consumer(consumer_id.clone());

        // deferred resume: see CONSUMER_RESUME_DELAY
        let consumer = entry.consumer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CONSUMER_RESUME_DELAY).await;
            if let Err(e) = consumer.resume().await {
                debug!(%e, "deferred consumer resume failed");
            }
        });

        debug!(room_id = %room.id, participant_id = %participant.id, consumer_id, %producer_id, "consumer created");
        Ok(ConsumerCreated {
            id: consumer_id,
            producer_id: producer_id.to_string(),
            kind: match entry.consumer.kind() {
                MediaKind::Audio => "audio".to_string(),
                MediaKind::Video => "video".to_string(),
            },
            rtp_parameters: serde_json::to_value(entry.consumer.rtp_parameters())
                .unwrap_or_default(),
        })
    }

    pub async fn close_producer(
        &self,
        connection_id: &str,
        producer_id: &str,
    ) -> Result<(), MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        let entry = self
            .endpoints
            .producer(producer_id)
            .ok_or(MediaError::ProducerNotFound)?;
        if entry.meta.participant_id != participant.id {
            return Err(MediaError::ProducerNotFound);
        }
        let kind = entry.kind;

        participant.remove_producer(producer_id);
        self.endpoints.remove_producer(producer_id);
        drop(entry); // last handle; the close event broadcasts producer-closed

        let still_producing_kind = participant.producer_ids().iter().any(|id| {
            self.endpoints
                .producer(id)
                .map(|p| p.kind == kind)
                .unwrap_or(false)
        });
        if !still_producing_kind {
            let (has_audio, has_video) = participant.set_media_flag(kind, false);
            if let Err(e) = self
                .participants_dao
                .set_media_flags(&participant.id, has_audio, has_video)
                .await
            {
                warn!(%e, "failed to mirror media flags");
            }
        }

        info!(room_id = %room.id, participant_id = %participant.id, producer_id, "producer closed");
        Ok(())
    }

    pub async fn start_hls(&self, connection_id: &str, room_id: &str) -> Result<(), MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        if room.id != room_id {
            return Err(MediaError::RoomNotFound);
        }
        if !participant.is_host() {
            return Err(MediaError::NotAuthorized);
        }
        HlsController::start_manual(&room, &self.hls_deps).await
    }

    pub async fn stop_hls(&self, connection_id: &str, room_id: &str) -> Result<(), MediaError> {
        let (room, participant) = self.resolve(connection_id)?;
        if room.id != room_id {
            return Err(MediaError::RoomNotFound);
        }
        if !participant.is_host() {
            return Err(MediaError::NotAuthorized);
        }
        HlsController::stop(&room, &self.hls_deps).await
    }

    /// `DELETE /api/rooms/:id` path; returns false for rooms not live.
    pub async fn close_room_by_id(&self, room_id: &str) -> bool {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(&r)) else {
            return false;
        };
        self.close_room(&room).await;
        true
    }

    pub fn live_room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    async fn close_room(&self, room: &Arc<LiveRoom>) {
        if room.mark_closed() {
            return;
        }
        self.rooms.remove(&room.id);

        HlsController::stop_if_running(room, &self.hls_deps).await;

        for participant in room.members.drain() {
            participant.close(&self.endpoints);
            self.connections.remove(&participant.connection_id);
        }
        if let Err(e) = self.participants_dao.remove_by_room(&room.id).await {
            warn!(room_id = %room.id, %e, "failed to clear participant rows");
        }

        self.routers.close(&room.id);
        if let Err(e) = self.rooms_dao.set_active(&room.id, false).await {
            warn!(room_id = %room.id, %e, "failed to deactivate room");
        }
        info!(room_id = %room.id, "room closed");
    }

    /// Existing-producers snapshot for late-joiner catch-up: every
    /// non-closed producer of the other members, in join order.
    fn producer_snapshot(&self, room: &LiveRoom, exclude_participant: &str) -> Vec<ProducerSnapshot> {
        let mut snapshot = Vec::new();
        for member in room.members.snapshot() {
            if member.id == exclude_participant {
                continue;
            }
            for producer_id in member.producer_ids() {
                let Some(entry) = self.endpoints.producer(&producer_id) else {
                    continue;
                };
                if entry.producer.closed() {
                    continue;
                }
                snapshot.push(ProducerSnapshot {
                    producer_id,
                    participant_id: member.id.clone(),
                });
            }
        }
        snapshot
    }

    fn resolve(
        &self,
        connection_id: &str,
    ) -> Result<(Arc<LiveRoom>, Arc<LiveParticipant>), MediaError> {
        let room_id = self
            .connections
            .get(connection_id)
            .map(|r| r.clone())
            .ok_or(MediaError::ParticipantNotFound)?;
        let room = self
            .rooms
            .get(&room_id)
            .map(|r| Arc::clone(&r))
            .ok_or(MediaError::RoomNotFound)?;
        let participant = room
            .members
            .get_by_connection(connection_id)
            .ok_or(MediaError::ParticipantNotFound)?;
        Ok((room, participant))
    }

    /// Snapshot the targets under the membership lock, then hand off to the
    /// socket layer; broadcasts are not serialized across connections.
    fn send_to_room(&self, room: &LiveRoom, exclude: Option<&str>, signal: ServerSignal) {
        let targets = room.members.connection_ids_except(exclude);
        if targets.is_empty() {
            return;
        }
        let _ = self.events_tx.send(OutboundEvent { targets, signal });
    }
}
