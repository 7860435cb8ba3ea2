//! Data types shared by the store, the sync engine and the query service

pub mod error;
mod folder;
mod message;
mod sync;

pub use folder::*;
pub use message::*;
pub use sync::*;
