use mediasoup::prelude::MediaKind;
use parking_lot::Mutex;
use std::sync::Arc;

use super::endpoints::EndpointRegistry;
use super::signaling::{ParticipantInfo, ParticipantRole, TransportDirection};

/// Live state for one signaling connection.
///
/// `id` is the stable participant id handed to peers; `connection_id` is
/// the signaling-channel id and changes when a client reconnects (a rejoin
/// mints a fresh participant). Owned endpoints are stored as ids, looked up
/// in the registries on demand.
pub struct LiveParticipant {
    pub id: String,
    pub connection_id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub joined_at: bson::DateTime,
    state: Mutex<EndpointState>,
}

#[derive(Default)]
struct EndpointState {
    has_audio: bool,
    has_video: bool,
    transports: Vec<(String, TransportDirection)>,
    producers: Vec<String>,
    consumers: Vec<String>,
}

impl LiveParticipant {
    pub fn new(connection_id: &str, name: &str, role: ParticipantRole) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            name: name.to_string(),
            role,
            joined_at: bson::DateTime::now(),
            state: Mutex::new(EndpointState::default()),
        })
    }

    pub fn is_viewer(&self) -> bool {
        self.role == ParticipantRole::Viewer
    }

    pub fn is_host(&self) -> bool {
        self.role == ParticipantRole::Host
    }

    pub fn info(&self) -> ParticipantInfo {
        let state = self.state.lock();
        ParticipantInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            has_audio: state.has_audio,
            has_video: state.has_video,
        }
    }

    /// Flips one media flag and returns the new `(has_audio, has_video)`.
    pub fn set_media_flag(&self, kind: MediaKind, value: bool) -> (bool, bool) {
        let mut state = self.state.lock();
        match kind {
            MediaKind::Audio => state.has_audio = value,
            MediaKind::Video => state.has_video = value,
        }
        (state.has_audio, state.has_video)
    }

    /// Records a transport, replacing any previous one of the same
    /// direction. The replaced transport id is returned for closure.
    pub fn add_transport(&self, id: String, direction: TransportDirection) -> Option<String> {
        let mut state = self.state.lock();
        let stale = state
            .transports
            .iter()
            .position(|(_, d)| *d == direction)
            .map(|i| state.transports.remove(i).0);
        state.transports.push((id, direction));
        stale
    }

    pub fn remove_transport(&self, id: &str) {
        self.state.lock().transports.retain(|(t, _)| t != id);
    }

    pub fn transport_id(&self, direction: TransportDirection) -> Option<String> {
        self.state
            .lock()
            .transports
            .iter()
            .find(|(_, d)| *d == direction)
            .map(|(id, _)| id.clone())
    }

    pub fn add_producer(&self, id: String) {
        self.state.lock().producers.push(id);
    }

    pub fn remove_producer(&self, id: &str) {
        self.state.lock().producers.retain(|p| p != id);
    }

    pub fn producer_ids(&self) -> Vec<String> {
        self.state.lock().producers.clone()
    }

    pub fn add_consumer(&self, id: String) {
        self.state.lock().consumers.push(id);
    }

    /// Closes every owned endpoint and clears the local lists. Removing a
    /// transport from the registry drops the last handle, which closes it
    /// in the worker; producers and consumers follow via their
    /// transport-close subscriptions, the explicit removals here just make
    /// the eviction order deterministic.
    pub fn close(&self, endpoints: &EndpointRegistry) {
        let (transports, producers, consumers) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.transports),
                std::mem::take(&mut state.producers),
                std::mem::take(&mut state.consumers),
            )
        };
        for id in consumers {
            endpoints.remove_consumer(&id);
        }
        for id in producers {
            endpoints.remove_producer(&id);
        }
        for (id, _) in transports {
            endpoints.remove_transport(&id);
        }
    }
}
