pub mod room;
pub mod stream;
