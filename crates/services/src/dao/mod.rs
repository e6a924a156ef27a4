pub mod base;
pub mod participant;
pub mod room;

pub use base::BaseDao;
pub use participant::ParticipantDao;
pub use room::RoomDao;
