pub mod endpoints;
pub mod error;
pub mod hls;
pub mod hls_pipeline;
pub mod orchestrator;
pub mod participant;
pub mod room;
pub mod router_registry;
pub mod signaling;
pub mod worker_pool;

pub use error::MediaError;
pub use orchestrator::Orchestrator;
