pub mod bridge;
pub mod config;
pub mod forward;
pub mod http;
pub mod metrics;
