//! Business logic services
//!
//! Services sit on top of the adapters and are what a UI layer talks to.

mod query_service;

pub use query_service::QueryService;
