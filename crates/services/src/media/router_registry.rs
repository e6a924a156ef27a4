use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use mediasoup::prelude::*;
use mediasoup::worker::WorkerId;
use std::num::NonZero;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::MediaError;
use super::worker_pool::WorkerPool;

/// One router per live room, keyed by room id. Dropping an entry closes the
/// router and, via the worker, everything created on it.
pub struct RouterRegistry {
    routers: DashMap<String, RouterEntry>,
    pool: Arc<WorkerPool>,
}

#[derive(Clone)]
pub struct RouterEntry {
    pub router: Router,
    pub worker_id: WorkerId,
}

impl RouterRegistry {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            routers: DashMap::new(),
            pool,
        }
    }

    /// Returns the room's router, creating it on the next pool worker when
    /// the room is not live yet. Safe under concurrent first joins: the
    /// loser of the insert race drops its router and adopts the winner's.
    pub async fn get_or_create(&self, room_id: &str) -> Result<RouterEntry, MediaError> {
        if let Some(entry) = self.routers.get(room_id) {
            return Ok(entry.clone());
        }

        let Some(worker) = self.pool.next_worker() else {
            warn!(room_id, "no live media worker available");
            return Err(MediaError::WorkerDied);
        };
        let worker_id = worker.id();
        let router = worker
            .create_router(RouterOptions::new(media_codecs()))
            .await
            .map_err(|e| {
                warn!(room_id, %e, "failed to create router");
                MediaError::Internal(format!("failed to create router: {e}"))
            })?;

        let entry = match self.routers.entry(room_id.to_string()) {
            MapEntry::Occupied(existing) => existing.get().clone(),
            MapEntry::Vacant(slot) => {
                let entry = RouterEntry { router, worker_id };
                slot.insert(entry.clone());
                info!(room_id, router_id = %entry.router.id(), %worker_id, "router created");
                entry
            }
        };
        Ok(entry)
    }

    /// Idempotent.
    pub fn close(&self, room_id: &str) {
        if self.routers.remove(room_id).is_some() {
            info!(room_id, "router closed");
        }
    }

    pub fn capabilities(&self, room_id: &str) -> Option<serde_json::Value> {
        self.routers
            .get(room_id)
            .and_then(|e| serde_json::to_value(e.router.rtp_capabilities()).ok())
    }

    /// Room ids whose router lives on the given worker.
    pub fn rooms_on_worker(&self, worker_id: WorkerId) -> Vec<String> {
        self.routers
            .iter()
            .filter(|e| e.value().worker_id == worker_id)
            .map(|e| e.key().clone())
            .collect()
    }
}

/// Codec menu offered by every router. Payload types are left dynamic;
/// the router picks them during negotiation.
fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        // opus, 48kHz stereo, with in-band FEC so single packet drops
        // survive without a retransmit round trip
        RtpCodecCapability::Audio {
            mime_type: MimeTypeAudio::Opus,
            preferred_payload_type: None,
            clock_rate: NonZero::new(48000).unwrap(),
            channels: NonZero::new(2).unwrap(),
            parameters: RtpCodecParametersParameters::from([("useinbandfec", 1_u32.into())]),
            rtcp_feedback: vec![RtcpFeedback::TransportCc],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp8,
            preferred_payload_type: None,
            clock_rate: NonZero::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: video_rtcp_feedback(),
        },
        // constrained baseline, packetization-mode 1; asymmetry allowed so
        // clients may decode a higher level than they encode
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::H264,
            preferred_payload_type: None,
            clock_rate: NonZero::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32.into()),
                ("profile-level-id", "42e01f".into()),
                ("level-asymmetry-allowed", 1_u32.into()),
            ]),
            rtcp_feedback: video_rtcp_feedback(),
        },
    ]
}

/// Video loss recovery and bandwidth estimation: NACK retransmits, PLI and
/// FIR keyframe requests, and both congestion feedback flavors (transport-cc
/// with REMB as the fallback for older clients).
fn video_rtcp_feedback() -> Vec<RtcpFeedback> {
    vec![
        RtcpFeedback::Nack,
        RtcpFeedback::NackPli,
        RtcpFeedback::CcmFir,
        RtcpFeedback::TransportCc,
        RtcpFeedback::GoogRemb,
    ]
}
