//! Daemon assembly and lifecycle.
//!
//! [`Daemon`] wires the configured adapters into a [`ScanOrchestrator`],
//! serves the HTTP gateway and runs the shutdown sequence:
//!
//! 1. Stop accepting connections and close scan admission at once:
//!    queued runs are rejected, active runs get the grace period
//! 2. Let open HTTP requests flush their responses, then abort the server
//! 3. Stop background tasks

use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ironvuln_core::config::IronvulnConfig;
use ironvuln_engine::adapters::tools_from_core;
use ironvuln_engine::{
    CommandCveResolver, CommandSbomGenerator, DrainReport, NotifierBackend, OrchestratorConfig,
    ScanOrchestrator, StoreBackend,
};

use crate::gateway;
use crate::metrics_server;

/// Extra time past the grace period for the HTTP server to flush responses.
const RESPONSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Orchestrator as assembled from configuration.
pub type DaemonOrchestrator =
    ScanOrchestrator<CommandSbomGenerator, CommandCveResolver, StoreBackend, NotifierBackend>;

/// The running daemon.
pub struct Daemon {
    config: IronvulnConfig,
    orchestrator: DaemonOrchestrator,
    start_time: Instant,
}

impl Daemon {
    /// Assemble the daemon from a validated configuration.
    ///
    /// Installs the metrics recorder when `[metrics]` is enabled, so this
    /// should be called once per process.
    pub async fn build(config: IronvulnConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let orchestrator = Self::assemble(&config).await?;
        tracing::info!(
            workers = config.scanner.workers,
            store = %config.store.backend,
            notifier = %config.notifier.backend,
            sbom_program = %config.tools.sbom_program,
            cve_program = %config.tools.cve_program,
            "scan orchestrator initialized"
        );

        Ok(Self {
            config,
            orchestrator,
            start_time: Instant::now(),
        })
    }

    /// Build the orchestrator and its adapters without touching global state.
    pub async fn assemble(config: &IronvulnConfig) -> Result<DaemonOrchestrator> {
        let store = StoreBackend::from_core(&config.store)
            .await
            .context("failed to open artifact store")?;
        let notifier =
            NotifierBackend::from_core(&config.notifier).context("failed to create notifier")?;
        let (generator, resolver) = tools_from_core(&config.tools);

        ScanOrchestrator::builder()
            .config(OrchestratorConfig::from_core(&config.scanner))
            .generator(generator)
            .resolver(resolver)
            .store(store)
            .notifier(notifier)
            .build()
            .context("failed to build scan orchestrator")
    }

    /// The orchestrator behind the gateway.
    pub fn orchestrator(&self) -> &DaemonOrchestrator {
        &self.orchestrator
    }

    /// Effective configuration.
    pub fn config(&self) -> &IronvulnConfig {
        &self.config
    }

    /// Bind the configured address and serve until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server listen address: {}", e))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        let report = self
            .serve(listener, async {
                match wait_for_shutdown_signal().await {
                    Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                    Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
                }
            })
            .await?;

        if !report.is_clean() {
            tracing::warn!(
                rejected = report.rejected.len(),
                abandoned = report.abandoned.len(),
                "drain did not complete every run"
            );
        }
        tracing::info!("ironvuln-daemon shut down");
        Ok(())
    }

    /// Serve the gateway on `listener` until `shutdown` resolves, then drain.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<DrainReport>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr().context("listener has no local address")?;
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let stop = CancellationToken::new();

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| metrics_server::spawn_uptime_updater(self.start_time, stop.clone()));

        let app = gateway::router(self.orchestrator.clone());
        let http_stop = stop.clone();
        let mut server = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_stop.cancelled().await })
                .into_future(),
        );
        tracing::info!(listen_addr = %local_addr, "ironvuln-daemon running");

        tokio::select! {
            _ = shutdown => {}
            result = &mut server => {
                stop.cancel();
                self.orchestrator.shutdown(grace).await;
                return match result {
                    Ok(Ok(())) => Err(anyhow::anyhow!("http server stopped unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::anyhow!("http server failed: {}", e)),
                    Err(e) => Err(anyhow::anyhow!("http server task panicked: {}", e)),
                };
            }
        }

        tracing::info!(grace_secs = grace.as_secs(), "stopping http gateway and scan admission");
        stop.cancel();

        // 대기열의 실행은 신호 시점에 거절되고, 그 요청들은 503으로 끝난다
        let (report, http_result) = tokio::join!(
            self.orchestrator.shutdown(grace),
            tokio::time::timeout(grace + RESPONSE_FLUSH_TIMEOUT, &mut server),
        );
        tracing::info!(
            rejected = report.rejected.len(),
            abandoned = report.abandoned.len(),
            "scan orchestrator drained"
        );

        match http_result {
            Ok(result) => log_server_exit(result),
            Err(_) => {
                tracing::warn!("aborting http server with open connections");
                server.abort();
            }
        }

        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        Ok(report)
    }
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::info!("http gateway stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "http gateway failed"),
        Err(e) => tracing::error!(error = %e, "http gateway task panicked"),
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for ctrl-c: {}", e))?;
    Ok("ctrl-c")
}
