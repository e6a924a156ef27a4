pub mod dao;
pub mod media;

pub use media::{MediaError, Orchestrator};
