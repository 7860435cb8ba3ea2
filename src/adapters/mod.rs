//! Storage and transport adapters

pub mod sqlite;
pub mod transport;
