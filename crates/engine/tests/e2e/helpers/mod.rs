//! Shared E2E test helpers.
//!
//! Provides scripted SBOM/CVE tools, a recording store and notifier, and a
//! [`Harness`] that wires them into a `ScanOrchestrator`.

pub mod mocks;
pub mod store;

use std::time::Duration;

use ironvuln_engine::{ImageIdentity, OrchestratorConfig, ScanOrchestrator};

use mocks::{RecordingNotifier, ScriptedGenerator, ScriptedResolver};
use store::RecordingStore;

/// Default timeout for waiting on asynchronous conditions.
#[allow(dead_code)]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub type TestOrchestrator =
    ScanOrchestrator<ScriptedGenerator, ScriptedResolver, RecordingStore, RecordingNotifier>;

/// Orchestrator plus handles to every scripted port it uses.
///
/// The port handles share state with the copies owned by the orchestrator.
#[allow(dead_code)]
pub struct Harness {
    pub orch: TestOrchestrator,
    pub generator: ScriptedGenerator,
    pub resolver: ScriptedResolver,
    pub store: RecordingStore,
    pub notifier: RecordingNotifier,
}

/// Orchestrator config with short timeouts suitable for tests.
#[allow(dead_code)]
pub fn test_config(workers: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        workers,
        sbom_timeout: Duration::from_secs(5),
        cve_timeout: Duration::from_secs(5),
        store_timeout: Duration::from_secs(1),
    }
}

/// Builds a harness with default scripted ports.
#[allow(dead_code)]
pub fn harness(config: OrchestratorConfig) -> Harness {
    harness_with(
        config,
        ScriptedGenerator::new(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    )
}

/// Builds a harness with the given ports and a fresh notifier.
#[allow(dead_code)]
pub fn harness_with(
    config: OrchestratorConfig,
    generator: ScriptedGenerator,
    resolver: ScriptedResolver,
    store: RecordingStore,
) -> Harness {
    let notifier = RecordingNotifier::new();
    let orch = ScanOrchestrator::builder()
        .config(config)
        .generator(generator.clone())
        .resolver(resolver.clone())
        .store(store.clone())
        .notifier(notifier.clone())
        .build()
        .expect("valid test orchestrator");
    Harness {
        orch,
        generator,
        resolver,
        store,
        notifier,
    }
}

#[allow(dead_code)]
pub fn image(raw: &str) -> ImageIdentity {
    ImageIdentity::parse(raw).expect("valid test image reference")
}

/// Polls `condition` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if the condition is still false after `timeout`.
#[allow(dead_code)]
pub async fn wait_until(what: &str, timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out after {timeout:?} waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
