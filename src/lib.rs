//! argoos: redeploys Kubernetes workloads when a container registry reports
//! that one of the images they run was pushed.

pub mod api;
pub mod app_state;
pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod routes;
