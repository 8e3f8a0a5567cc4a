pub mod api;
pub mod approval;
pub mod config;
pub mod error;
pub mod generator;
pub mod notify;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod workflow;
