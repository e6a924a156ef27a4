pub mod participant;
pub mod room;

pub use participant::ParticipantRecord;
pub use room::Room;
