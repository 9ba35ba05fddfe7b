pub mod config;
pub mod context;
pub mod http;
pub mod metrics;
pub mod rate_limit;
