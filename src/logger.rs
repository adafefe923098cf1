//! Injected logging capability.
//!
//! The teacher calls `log::{info,warn,error}` directly from a process-wide
//! logger singleton initialized by each binary's `env_logger::init()`. This
//! crate has no binaries of its own, so callers inject a `Logger`; the
//! default implementation forwards into the `log` crate so host
//! applications that already run `env_logger` (or any other `log` backend)
//! get output for free.

use std::sync::Arc;

pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards into the `log` crate's global macros.
pub struct StdLogger;

impl Logger for StdLogger {
    fn debug(&self, msg: &str) {
        log::debug!("{msg}");
    }
    fn info(&self, msg: &str) {
        log::info!("{msg}");
    }
    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        log::error!("{msg}");
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(StdLogger)
}
