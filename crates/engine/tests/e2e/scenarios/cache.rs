//! Stored artifacts answer requests without invoking the tools.

use ironvuln_engine::{ArtifactKind, ReportStatus, ScanError, ScanRequest, StageSet};

use crate::helpers::mocks::expected_sbom;
use crate::helpers::{DEFAULT_TIMEOUT, harness, image, test_config};

#[tokio::test]
async fn test_e2e_repeat_request_served_from_cache() {
    let h = harness(test_config(1));

    let first = h
        .orch
        .submit(ScanRequest::new("alpine:3.19", StageSet::SbomAndCve))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(!first.from_cache);

    let handle = h
        .orch
        .submit(
            ScanRequest::new("docker.io/library/alpine:3.19", StageSet::SbomAndCve)
                .with_correlation_id("second"),
        )
        .await
        .unwrap();
    assert!(handle.is_ready());
    let second = handle.wait().await.unwrap();

    assert!(second.from_cache);
    assert_eq!(second.sbom, first.sbom);
    assert_eq!(second.cve, first.cve);
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.resolver.calls(), 1);

    // 캐시 응답도 알림으로 보고된다
    let reports = h.notifier.wait_for(2, DEFAULT_TIMEOUT).await;
    let cached = reports
        .iter()
        .find(|r| r.correlation_ids == ["second"])
        .expect("report for cached answer");
    assert!(cached.from_cache);
    assert_eq!(cached.status, ReportStatus::Completed);
    assert!(cached.run_id.is_none());
}

#[tokio::test]
async fn test_e2e_sbom_only_cache_does_not_satisfy_cve_request() {
    let h = harness(test_config(1));

    h.orch
        .submit(ScanRequest::new("redis:7", StageSet::SbomOnly))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(h.resolver.calls(), 0);

    let handle = h
        .orch
        .submit(ScanRequest::new("redis:7", StageSet::SbomAndCve))
        .await
        .unwrap();
    assert!(!handle.is_ready());
    let outcome = handle.wait().await.unwrap();

    // 저장된 SBOM을 재사용하고 CVE 단계만 실행
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.resolver.calls(), 1);
    assert!(outcome.cve.is_some());
    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn test_e2e_preloaded_sbom_skips_generator() {
    let h = harness(test_config(1));
    let ubuntu = image("ubuntu:24.04");
    h.store
        .preload(&ubuntu, ArtifactKind::Sbom, b"{\"bomFormat\":\"CycloneDX\"}")
        .await;

    let handle = h
        .orch
        .submit(ScanRequest::new("ubuntu:24.04", StageSet::SbomOnly))
        .await
        .unwrap();
    assert!(handle.is_ready());
    let outcome = handle.wait().await.unwrap();
    assert_eq!(
        outcome.sbom.as_bytes().as_ref(),
        b"{\"bomFormat\":\"CycloneDX\"}"
    );
    assert_eq!(h.generator.calls(), 0);
    assert_eq!(h.orch.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_e2e_store_read_failure_is_a_miss() {
    let h = harness(test_config(1));
    h.store.fail_gets(true);

    let outcome = h
        .orch
        .submit(ScanRequest::new("nginx", StageSet::SbomOnly))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.sbom.as_bytes().as_ref(), expected_sbom("nginx"));
    assert_eq!(h.generator.calls(), 1);
    assert!(h.orch.stats().store_errors >= 1);
}

#[tokio::test]
async fn test_e2e_store_write_failure_still_returns_result() {
    let h = harness(test_config(1));
    h.store.fail_puts(true);

    let outcome = h
        .orch
        .submit(ScanRequest::new("nginx", StageSet::SbomAndCve))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(outcome.cve.is_some());
    assert!(!outcome.persisted());
    assert!(matches!(
        outcome.persist_error,
        Some(ScanError::StoreUnavailable(_))
    ));

    let reports = h.notifier.wait_for(1, DEFAULT_TIMEOUT).await;
    assert_eq!(reports[0].status, ReportStatus::Completed);
    assert!(!reports[0].persisted);

    // 아무것도 저장되지 않았으므로 다음 요청은 다시 실행된다
    h.store.fail_puts(false);
    let again = h
        .orch
        .submit(ScanRequest::new("nginx", StageSet::SbomAndCve))
        .await
        .unwrap();
    assert!(!again.is_ready());
    again.wait().await.unwrap();
    assert_eq!(h.generator.calls(), 2);
}
