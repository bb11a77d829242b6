//! Per-stage timeouts fail the run without losing earlier artifacts.

use std::time::Duration;

use ironvuln_engine::{ArtifactKind, OrchestratorConfig, ScanError, ScanRequest, StageKind, StageSet};

use crate::helpers::mocks::{ScriptedGenerator, ScriptedResolver};
use crate::helpers::store::RecordingStore;
use crate::helpers::{harness_with, image};

fn short_timeouts(sbom_ms: u64, cve_ms: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        workers: 1,
        sbom_timeout: Duration::from_millis(sbom_ms),
        cve_timeout: Duration::from_millis(cve_ms),
        store_timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn test_e2e_sbom_timeout_skips_cve_stage() {
    let h = harness_with(
        short_timeouts(50, 5_000),
        ScriptedGenerator::new().with_delay(Duration::from_secs(10)),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let err = h
        .orch
        .submit(ScanRequest::new("slow:1", StageSet::SbomAndCve))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ScanError::Timeout {
            stage: StageKind::Sbom,
            timeout: Duration::from_millis(50),
        }
    );
    assert_eq!(h.resolver.calls(), 0);
    assert_eq!(h.generator.running(), 0);
}

#[tokio::test]
async fn test_e2e_cve_timeout_keeps_stored_sbom() {
    let h = harness_with(
        short_timeouts(5_000, 50),
        ScriptedGenerator::new(),
        ScriptedResolver::new().with_delay(Duration::from_secs(10)),
        RecordingStore::new(),
    );

    let err = h
        .orch
        .submit(ScanRequest::new("slow:2", StageSet::SbomAndCve))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScanError::Timeout {
            stage: StageKind::Cve,
            ..
        }
    ));
    assert!(err.to_string().contains("cve stage timed out"));

    let slow = image("slow:2");
    assert!(h.store.peek(&slow, ArtifactKind::Sbom).await.is_some());
    assert!(h.store.peek(&slow, ArtifactKind::CveManifest).await.is_none());
}
