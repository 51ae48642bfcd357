//! API route declarations

pub mod event_routes;
pub mod system_routes;
