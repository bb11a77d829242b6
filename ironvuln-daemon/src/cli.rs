//! CLI argument definitions for ironvuln-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use ironvuln_core::config::IronvulnConfig;

/// Ironvuln vulnerability scanning daemon.
///
/// Accepts SBOM and CVE scan requests over HTTP, runs them through a
/// bounded worker pool and reports completions to the configured notifier.
#[derive(Parser, Debug)]
#[command(name = "ironvuln-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ironvuln.toml configuration file.
    #[arg(short, long, default_value = "/etc/ironvuln/ironvuln.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the HTTP listen address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Override the number of concurrent scan runs.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut IronvulnConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(addr) = &self.listen_addr {
            config.server.listen_addr = addr.clone();
        }
        if let Some(workers) = self.workers {
            config.scanner.workers = workers;
        }
    }
}
