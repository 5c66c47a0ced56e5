//! Port traits at the boundary between the domain and external collaborators.

pub mod config_port;
pub mod report_port;
pub mod temporal_store;
