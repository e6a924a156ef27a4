use mediasoup::prelude::Router;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::MediaError;
use super::hls::HlsController;
use super::participant::LiveParticipant;
use super::signaling::{ParticipantRole, RoomSnapshot};

/// Role admission rules: at most one host, at most two streamers, viewers
/// always pass. The first streamer in is promoted to host.
pub fn admit_role(
    requested: ParticipantRole,
    existing: impl Iterator<Item = ParticipantRole>,
) -> Result<ParticipantRole, MediaError> {
    let mut hosts = 0usize;
    let mut streamers = 0usize;
    for role in existing {
        if role == ParticipantRole::Host {
            hosts += 1;
        }
        if role.is_streamer() {
            streamers += 1;
        }
    }

    match requested {
        ParticipantRole::Viewer => Ok(ParticipantRole::Viewer),
        ParticipantRole::Host if hosts > 0 => Err(MediaError::HostExists),
        ParticipantRole::Host if streamers >= 2 => Err(MediaError::RoomFull),
        ParticipantRole::Host => Ok(ParticipantRole::Host),
        ParticipantRole::Guest if streamers >= 2 => Err(MediaError::RoomFull),
        ParticipantRole::Guest if hosts == 0 => Ok(ParticipantRole::Host),
        ParticipantRole::Guest => Ok(ParticipantRole::Guest),
    }
}

/// Insertion-ordered membership with admission under a single lock, so N
/// concurrent joins observe a consistent host/streamer count.
#[derive(Default)]
pub struct RoomMembers {
    inner: RwLock<Vec<Arc<LiveParticipant>>>,
}

impl RoomMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(
        &self,
        connection_id: &str,
        name: &str,
        requested: ParticipantRole,
    ) -> Result<Arc<LiveParticipant>, MediaError> {
        let mut members = self.inner.write();
        let effective = admit_role(requested, members.iter().map(|p| p.role))?;
        let participant = LiveParticipant::new(connection_id, name, effective);
        members.push(Arc::clone(&participant));
        Ok(participant)
    }

    pub fn remove_by_connection(&self, connection_id: &str) -> Option<Arc<LiveParticipant>> {
        let mut members = self.inner.write();
        let position = members
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        Some(members.remove(position))
    }

    pub fn get_by_connection(&self, connection_id: &str) -> Option<Arc<LiveParticipant>> {
        self.inner
            .read()
            .iter()
            .find(|p| p.connection_id == connection_id)
            .map(Arc::clone)
    }

    /// Members in join order.
    pub fn snapshot(&self) -> Vec<Arc<LiveParticipant>> {
        self.inner.read().iter().map(Arc::clone).collect()
    }

    /// Streamers in join order; the host always precedes the guest it admitted.
    pub fn streamers(&self) -> Vec<Arc<LiveParticipant>> {
        self.inner
            .read()
            .iter()
            .filter(|p| p.role.is_streamer())
            .map(Arc::clone)
            .collect()
    }

    pub fn host(&self) -> Option<Arc<LiveParticipant>> {
        self.inner.read().iter().find(|p| p.is_host()).map(Arc::clone)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn connection_ids_except(&self, exclude: Option<&str>) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .filter(|p| Some(p.connection_id.as_str()) != exclude)
            .map(|p| p.connection_id.clone())
            .collect()
    }

    pub fn drain(&self) -> Vec<Arc<LiveParticipant>> {
        std::mem::take(&mut *self.inner.write())
    }
}

/// A live room: one router, insertion-ordered members, and the HLS context.
/// The owning worker is tracked by the router registry.
pub struct LiveRoom {
    pub id: String,
    pub name: String,
    pub router: Router,
    pub members: RoomMembers,
    pub hls: HlsController,
    /// Present exactly while a transcoder is running.
    pub hls_url: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl LiveRoom {
    pub fn new(id: &str, name: &str, router: Router) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            name: name.to_string(),
            router,
            members: RoomMembers::new(),
            hls: HlsController::new(),
            hls_url: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns true if the room was already marked closed.
    pub fn mark_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            hls_url: self.hls_url.lock().clone(),
            participants: self
                .members
                .snapshot()
                .iter()
                .map(|p| p.info())
                .collect(),
        }
    }
}
