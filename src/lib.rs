pub mod app_state;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod dedup;
pub mod distance;
pub mod index;
pub mod lookup;
pub mod rate_limit;
pub mod routes;
pub mod search;
pub mod tracing;
