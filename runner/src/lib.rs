//! runway
//!
//! Per-host deployment runner: turns a repository snapshot into a running
//! container and reports its status, logs and resource usage.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod source;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod utils;
