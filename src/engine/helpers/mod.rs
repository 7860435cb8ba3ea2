pub mod message_builder;
pub mod status_emit;

pub use status_emit::StatusEmitter;
