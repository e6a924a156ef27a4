use dashmap::DashMap;
use mediasoup::prelude::*;
use mediasoup::webrtc_transport::{
    WebRtcTransportListenInfos, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};
use stagecast_config::MediaSettings;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::MediaError;
use super::signaling::TransportDirection;

const DTLS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed ownership record attached to every registered endpoint.
#[derive(Debug, Clone)]
pub struct EndpointMeta {
    pub room_id: String,
    pub participant_id: String,
}

pub struct TransportEntry {
    pub transport: WebRtcTransport,
    pub direction: TransportDirection,
    pub meta: EndpointMeta,
    connected: AtomicBool,
}

impl TransportEntry {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

pub struct ProducerEntry {
    pub producer: Producer,
    pub kind: MediaKind,
    pub meta: EndpointMeta,
}

pub struct ConsumerEntry {
    pub consumer: Consumer,
    pub meta: EndpointMeta,
}

/// Arena for every live client-facing endpoint, keyed by endpoint id.
///
/// The registry is the owning side: participants hold ids and look entries
/// up on demand. Every insert wires the entry's close events so the maps
/// self-evict, and removing an entry drops the last SDK handle, which
/// closes the endpoint in the worker.
pub struct EndpointRegistry {
    transports: DashMap<String, Arc<TransportEntry>>,
    producers: DashMap<String, Arc<ProducerEntry>>,
    consumers: DashMap<String, Arc<ConsumerEntry>>,
    listen_ip: IpAddr,
    announced_ip: Option<String>,
    force_tcp: bool,
}

impl EndpointRegistry {
    pub fn new(settings: &MediaSettings) -> Arc<Self> {
        let listen_ip: IpAddr = settings
            .listen_ip
            .parse()
            .unwrap_or_else(|_| "0.0.0.0".parse().unwrap());

        let announced_ip = if settings.announced_ip.is_empty() {
            None
        } else {
            Some(settings.announced_ip.clone())
        };

        Arc::new(Self {
            transports: DashMap::new(),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            listen_ip,
            announced_ip,
            force_tcp: settings.force_tcp,
        })
    }

    pub async fn create_webrtc_transport(
        self: &Arc<Self>,
        router: &Router,
        direction: TransportDirection,
        meta: EndpointMeta,
    ) -> Result<Arc<TransportEntry>, MediaError> {
        let transport = router
            .create_webrtc_transport(self.transport_options())
            .await
            .map_err(|e| {
                warn!(%e, "failed to create webrtc transport");
                MediaError::Internal(format!("failed to create transport: {e}"))
            })?;

        let id = transport.id().to_string();
        let entry = Arc::new(TransportEntry {
            transport,
            direction,
            meta,
            connected: AtomicBool::new(false),
        });
        self.transports.insert(id.clone(), Arc::clone(&entry));

        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .transport
            .on_close(Box::new(move || {
                registry.transports.remove(&evict);
            }))
            .detach();
        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .transport
            .on_router_close(Box::new(move || {
                registry.transports.remove(&evict);
            }))
            .detach();

        debug!(transport_id = %id, ?direction, "webrtc transport created");
        Ok(entry)
    }

    /// DTLS connect under a 10 second timeout; idempotent for a transport
    /// that already connected. On timeout the transport is closed.
    pub async fn connect_transport(
        &self,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), MediaError> {
        let entry = self
            .transports
            .get(transport_id)
            .map(|e| Arc::clone(&e))
            .ok_or(MediaError::TransportNotFound)?;

        if entry.is_connected() {
            return Ok(());
        }

        let connect = entry
            .transport
            .connect(WebRtcTransportRemoteParameters { dtls_parameters });
        match tokio::time::timeout(DTLS_CONNECT_TIMEOUT, connect).await {
            Ok(Ok(())) => {
                entry.connected.store(true, Ordering::Release);
                debug!(transport_id, "transport connected");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(transport_id, %e, "transport connect failed");
                Err(MediaError::Internal(format!(
                    "transport connect failed: {e}"
                )))
            }
            Err(_) => {
                warn!(transport_id, "transport connect timed out");
                self.transports.remove(transport_id);
                Err(MediaError::TransportConnectTimeout)
            }
        }
    }

    pub async fn create_producer(
        self: &Arc<Self>,
        transport: &TransportEntry,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Arc<ProducerEntry>, MediaError> {
        let producer = transport
            .transport
            .produce(ProducerOptions::new(kind, rtp_parameters))
            .await
            .map_err(|e| {
                warn!(%e, "produce failed");
                MediaError::ProduceFailed
            })?;

        let id = producer.id().to_string();
        let entry = Arc::new(ProducerEntry {
            producer,
            kind,
            meta: transport.meta.clone(),
        });
        self.producers.insert(id.clone(), Arc::clone(&entry));

        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .producer
            .on_close(Box::new(move || {
                registry.producers.remove(&evict);
            }))
            .detach();
        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .producer
            .on_transport_close(Box::new(move || {
                registry.producers.remove(&evict);
            }))
            .detach();

        debug!(producer_id = %id, ?kind, "producer created");
        Ok(entry)
    }

    /// Consumers are created paused; the orchestrator resumes them once the
    /// client transport has settled.
    pub async fn create_consumer(
        self: &Arc<Self>,
        transport: &TransportEntry,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
        meta: EndpointMeta,
    ) -> Result<Arc<ConsumerEntry>, MediaError> {
        let mut options = ConsumerOptions::new(producer_id, rtp_capabilities);
        options.paused = true;

        let consumer = transport.transport.consume(options).await.map_err(|e| {
            warn!(%e, "consume failed");
            MediaError::ConsumeFailed
        })?;

        let id = consumer.id().to_string();
        let entry = Arc::new(ConsumerEntry { consumer, meta });
        self.consumers.insert(id.clone(), Arc::clone(&entry));

        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .consumer
            .on_close(Box::new(move || {
                registry.consumers.remove(&evict);
            }))
            .detach();
        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .consumer
            .on_transport_close(Box::new(move || {
                registry.consumers.remove(&evict);
            }))
            .detach();
        let registry = Arc::clone(self);
        let evict = id.clone();
        entry
            .consumer
            .on_producer_close(Box::new(move || {
                registry.consumers.remove(&evict);
            }))
            .detach();

        debug!(
            consumer_id = %id,
            %producer_id,
            participant_id = %entry.meta.participant_id,
            "consumer created"
        );
        Ok(entry)
    }

    pub fn transport(&self, id: &str) -> Option<Arc<TransportEntry>> {
        self.transports.get(id).map(|e| Arc::clone(&e))
    }

    pub fn producer(&self, id: &str) -> Option<Arc<ProducerEntry>> {
        self.producers.get(id).map(|e| Arc::clone(&e))
    }

    pub fn remove_transport(&self, id: &str) {
        self.transports.remove(id);
    }

    pub fn remove_producer(&self, id: &str) {
        self.producers.remove(id);
    }

    pub fn remove_consumer(&self, id: &str) {
        self.consumers.remove(id);
    }

    fn transport_options(&self) -> WebRtcTransportOptions {
        let udp_info = ListenInfo {
            protocol: Protocol::Udp,
            ip: self.listen_ip,
            announced_address: self.announced_ip.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let tcp_info = ListenInfo {
            protocol: Protocol::Tcp,
            ip: self.listen_ip,
            announced_address: self.announced_ip.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let listen_infos = if self.force_tcp {
            WebRtcTransportListenInfos::new(tcp_info)
        } else {
            WebRtcTransportListenInfos::new(udp_info).insert(tcp_info)
        };

        let mut transport_options = WebRtcTransportOptions::new(listen_infos);
        transport_options.enable_udp = !self.force_tcp;
        transport_options.enable_tcp = true;
        transport_options.prefer_udp = !self.force_tcp;
        transport_options
    }
}
