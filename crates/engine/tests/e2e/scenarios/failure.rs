//! Stage failures reach every waiter and are never cached.

use ironvuln_engine::{ArtifactKind, ReportStatus, ScanError, ScanRequest, StageSet};

use crate::helpers::mocks::{ScriptedGenerator, ScriptedResolver};
use crate::helpers::store::RecordingStore;
use crate::helpers::{DEFAULT_TIMEOUT, harness, harness_with, image, test_config, wait_until};

#[tokio::test]
async fn test_e2e_sbom_failure_reaches_all_waiters() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated().failing_for("busybox"),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let first = h
        .orch
        .submit(ScanRequest::new("busybox", StageSet::SbomAndCve))
        .await
        .unwrap();
    let second = h
        .orch
        .submit(ScanRequest::new("busybox:latest", StageSet::SbomOnly))
        .await
        .unwrap();
    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;
    h.generator.release(1);

    let a = first.wait().await.unwrap_err();
    let b = second.wait().await.unwrap_err();
    assert_eq!(a, b);
    assert!(matches!(a, ScanError::SbomGeneration(_)));

    // SBOM 없이는 CVE 단계가 시작되지 않는다
    assert_eq!(h.resolver.calls(), 0);
    assert_eq!(h.orch.stats().in_flight, 0);
    assert_eq!(h.orch.stats().runs_failed, 1);

    let reports = h.notifier.wait_for(1, DEFAULT_TIMEOUT).await;
    assert_eq!(reports[0].status, ReportStatus::Failed);
    assert_eq!(reports[0].error.as_ref().unwrap().kind, "sbom_generation");
}

#[tokio::test]
async fn test_e2e_failed_run_is_not_cached() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().failing_for("busybox"),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    for _ in 0..2 {
        let handle = h
            .orch
            .submit(ScanRequest::new("busybox", StageSet::SbomOnly))
            .await
            .unwrap();
        assert!(!handle.is_ready());
        assert!(handle.wait().await.is_err());
    }
    assert_eq!(h.generator.calls(), 2);
    assert_eq!(h.orch.stats().runs_started, 2);
}

#[tokio::test]
async fn test_e2e_cve_failure_keeps_sbom() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new(),
        ScriptedResolver::new().failing_for("node:20"),
        RecordingStore::new(),
    );

    let err = h
        .orch
        .submit(ScanRequest::new("node:20", StageSet::SbomAndCve))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::CveResolution(_)));

    let node = image("node:20");
    assert!(h.store.peek(&node, ArtifactKind::Sbom).await.is_some());
    assert!(h.store.peek(&node, ArtifactKind::CveManifest).await.is_none());

    // 저장된 SBOM으로 SBOM 전용 요청은 캐시에서 응답
    let handle = h
        .orch
        .submit(ScanRequest::new("node:20", StageSet::SbomOnly))
        .await
        .unwrap();
    assert!(handle.is_ready());
    assert!(handle.wait().await.unwrap().from_cache);
}

#[tokio::test]
async fn test_e2e_invalid_reference_rejected_without_run() {
    let h = harness(test_config(1));

    for raw in ["", "UPPER/case", "alpine:", "alpine@sha256:abc", "has space:1"] {
        let err = h
            .orch
            .submit(ScanRequest::new(raw, StageSet::SbomOnly))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ScanError::InvalidImageReference { .. }),
            "{raw:?} -> {err:?}"
        );
    }

    let stats = h.orch.stats();
    assert_eq!(stats.runs_started, 0);
    assert_eq!(stats.active + stats.queued, 0);
    assert_eq!(h.generator.calls(), 0);
    assert_eq!(h.store.gets(), 0);
}
