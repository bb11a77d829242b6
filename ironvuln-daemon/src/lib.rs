//! Ironvuln daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `ironvuln-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod daemon;
pub mod gateway;
pub mod logging;
pub mod metrics_server;

pub use daemon::{Daemon, DaemonOrchestrator};
