//! Scripted tool and notifier implementations for E2E tests.
//!
//! Tools can be delayed, gated (blocked until the test releases them) or made
//! to fail for specific images. Every call is recorded so tests can assert on
//! call counts, call order and peak concurrency.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};

use ironvuln_engine::{
    CveManifest, CveResolver, ImageIdentity, NotifyError, Notifier, Sbom, SbomGenerator,
    ScanReport, ToolError,
};

/// Behavior shared by the scripted generator and resolver.
#[derive(Default)]
pub struct ScriptedTool {
    delay: Option<Duration>,
    failing: HashSet<String>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedTool {
    async fn invoke(&self, image: &ImageIdentity) -> Result<(), ToolError> {
        let canonical = image.canonical();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(canonical.clone());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&canonical) {
            return Err(ToolError::Failed(format!("scripted failure for {canonical}")));
        }
        Ok(())
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

macro_rules! scripted_tool {
    ($name:ident) => {
        #[derive(Clone, Default)]
        pub struct $name {
            tool: Arc<ScriptedTool>,
        }

        #[allow(dead_code)]
        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            fn tool_mut(&mut self) -> &mut ScriptedTool {
                Arc::get_mut(&mut self.tool).expect("configure before cloning")
            }

            /// Sleeps for `delay` on every call.
            pub fn with_delay(mut self, delay: Duration) -> Self {
                self.tool_mut().delay = Some(delay);
                self
            }

            /// Fails every call for `raw` (any equivalent reference).
            pub fn failing_for(mut self, raw: &str) -> Self {
                let canonical = ImageIdentity::parse(raw).unwrap().canonical();
                self.tool_mut().failing.insert(canonical);
                self
            }

            /// Blocks every call until [`release`](Self::release) is called.
            pub fn gated(mut self) -> Self {
                self.tool_mut().gate = Some(Semaphore::new(0));
                self
            }

            /// Lets `n` blocked (or future) calls proceed.
            pub fn release(&self, n: usize) {
                self.tool
                    .gate
                    .as_ref()
                    .expect("tool is not gated")
                    .add_permits(n);
            }

            pub fn calls(&self) -> usize {
                self.tool.calls.load(Ordering::SeqCst)
            }

            pub fn running(&self) -> usize {
                self.tool.running.load(Ordering::SeqCst)
            }

            pub fn peak(&self) -> usize {
                self.tool.peak.load(Ordering::SeqCst)
            }

            /// Canonical references in call order.
            pub fn seen(&self) -> Vec<String> {
                self.tool.seen.lock().unwrap().clone()
            }
        }
    };
}

scripted_tool!(ScriptedGenerator);
scripted_tool!(ScriptedResolver);

impl SbomGenerator for ScriptedGenerator {
    async fn generate(&self, image: &ImageIdentity, _deadline: Duration) -> Result<Sbom, ToolError> {
        self.tool.invoke(image).await?;
        Ok(Sbom::new(format!("sbom:{image}")))
    }
}

impl CveResolver for ScriptedResolver {
    async fn resolve(
        &self,
        image: &ImageIdentity,
        _sbom: &Sbom,
        _deadline: Duration,
    ) -> Result<CveManifest, ToolError> {
        self.tool.invoke(image).await?;
        Ok(CveManifest::new(format!("cve:{image}")))
    }
}

/// SBOM content the scripted generator produces for `raw`.
#[allow(dead_code)]
pub fn expected_sbom(raw: &str) -> Vec<u8> {
    format!("sbom:{}", ImageIdentity::parse(raw).unwrap()).into_bytes()
}

/// CVE manifest content the scripted resolver produces for `raw`.
#[allow(dead_code)]
pub fn expected_cve(raw: &str) -> Vec<u8> {
    format!("cve:{}", ImageIdentity::parse(raw).unwrap()).into_bytes()
}

/// Notifier that records every report.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    reports: Arc<Mutex<Vec<ScanReport>>>,
    notify: Arc<Notify>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ScanReport> {
        self.reports.lock().unwrap().clone()
    }

    /// Waits until at least `count` reports have arrived and returns them.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `count` reports arrive within `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<ScanReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let reports = self.reports();
            if reports.len() >= count {
                return reports;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                panic!(
                    "timed out after {timeout:?} waiting for {count} reports (got {})",
                    self.reports().len()
                );
            }
        }
    }
}

impl Notifier for RecordingNotifier {
    async fn report(&self, _image: &ImageIdentity, report: &ScanReport) -> Result<(), NotifyError> {
        self.reports.lock().unwrap().push(report.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
