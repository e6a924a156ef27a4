use thiserror::Error;

/// Error codes surfaced to clients, either in-band as a request reply
/// (`{error: message}`) or broadcast to a room as an `error` event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    // Admission
    #[error("HOST_EXISTS")]
    HostExists,
    #[error("ROOM_FULL")]
    RoomFull,
    #[error("ROOM_NOT_FOUND")]
    RoomNotFound,
    #[error("NOT_AUTHORIZED")]
    NotAuthorized,

    // Protocol
    #[error("PARTICIPANT_NOT_FOUND")]
    ParticipantNotFound,
    #[error("TRANSPORT_NOT_FOUND")]
    TransportNotFound,
    #[error("PRODUCER_NOT_FOUND")]
    ProducerNotFound,
    #[error("INVALID_DIRECTION")]
    InvalidDirection,
    #[error("VIEWER_CANNOT_CONSUME_WEBRTC")]
    ViewerCannotConsumeWebrtc,

    // Media
    #[error("INCOMPATIBLE_CAPABILITIES")]
    IncompatibleCapabilities,
    #[error("TRANSPORT_CONNECT_TIMEOUT")]
    TransportConnectTimeout,
    #[error("PRODUCE_FAILED")]
    ProduceFailed,
    #[error("CONSUME_FAILED")]
    ConsumeFailed,

    // HLS
    #[error("HLS_ALREADY_RUNNING")]
    HlsAlreadyRunning,
    #[error("HLS_NOT_RUNNING")]
    HlsNotRunning,
    #[error("HLS_BUSY")]
    HlsBusy,
    #[error("HLS_SPAWN_FAILED")]
    HlsSpawnFailed,
    #[error("NO_AUDIO_PRODUCERS")]
    NoAudioProducers,

    // Infrastructure
    #[error("WORKER_DIED")]
    WorkerDied,
    #[error("ROUTER_GONE")]
    RouterGone,
    #[error("{0}")]
    Internal(String),
}
