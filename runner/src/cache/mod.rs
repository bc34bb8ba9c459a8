//! In-memory caches

pub mod build_logs;

pub use build_logs::BuildLogCache;
