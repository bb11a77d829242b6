//! Concurrent requests for the same image share one pipeline run.

use ironvuln_engine::{ArtifactKind, ScanRequest, StageSet};

use crate::helpers::mocks::{ScriptedGenerator, ScriptedResolver, expected_cve, expected_sbom};
use crate::helpers::store::RecordingStore;
use crate::helpers::{DEFAULT_TIMEOUT, harness_with, image, test_config, wait_until};

#[tokio::test]
async fn test_e2e_concurrent_requests_share_one_run() {
    let h = harness_with(
        test_config(2),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let spellings = [
        "alpine",
        "alpine:latest",
        "library/alpine",
        "docker.io/library/alpine:latest",
        "index.docker.io/library/alpine",
    ];
    let mut handles = Vec::new();
    for (i, raw) in spellings.iter().enumerate() {
        let request =
            ScanRequest::new(*raw, StageSet::SbomAndCve).with_correlation_id(format!("req-{i}"));
        handles.push(h.orch.submit(request).await.unwrap());
    }

    let run_id = handles[0].run_id().unwrap();
    assert!(!handles[0].joined_existing());
    for handle in &handles[1..] {
        assert!(handle.joined_existing());
        assert_eq!(handle.run_id(), Some(run_id));
    }

    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;
    h.generator.release(1);

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.wait().await.unwrap());
    }
    for outcome in &outcomes[1..] {
        assert_eq!(outcome, &outcomes[0]);
    }
    assert_eq!(outcomes[0].sbom.as_bytes().as_ref(), expected_sbom("alpine"));
    assert_eq!(
        outcomes[0].cve.as_ref().unwrap().as_bytes().as_ref(),
        expected_cve("alpine")
    );

    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.resolver.calls(), 1);
    let stats = h.orch.stats();
    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.dedup_joins, 4);
    assert_eq!(stats.in_flight, 0);

    let reports = h.notifier.wait_for(1, DEFAULT_TIMEOUT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].run_id, Some(run_id.to_string()));
    assert_eq!(reports[0].correlation_ids.len(), 5);
    assert!(reports[0].correlation_ids.contains(&"req-3".to_owned()));
}

#[tokio::test]
async fn test_e2e_cve_joiner_upgrades_sbom_only_run() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let sbom_only = h
        .orch
        .submit(ScanRequest::new("nginx:1.25", StageSet::SbomOnly))
        .await
        .unwrap();
    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;

    // SBOM 생성 중 합류: 결정 지점 전이므로 CVE 단계가 추가된다
    let with_cve = h
        .orch
        .submit(ScanRequest::new("nginx:1.25", StageSet::SbomAndCve))
        .await
        .unwrap();
    assert!(with_cve.joined_existing());
    h.generator.release(1);

    let first = sbom_only.wait().await.unwrap();
    let second = with_cve.wait().await.unwrap();
    assert_eq!(first, second);
    assert!(first.cve.is_some());
    assert_eq!(h.resolver.calls(), 1);

    let nginx = image("nginx:1.25");
    assert!(h.store.peek(&nginx, ArtifactKind::CveManifest).await.is_some());
}

#[tokio::test]
async fn test_e2e_distinct_images_run_independently() {
    let h = harness_with(
        test_config(2),
        ScriptedGenerator::new(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let a = h
        .orch
        .submit(ScanRequest::new("alpine:3.19", StageSet::SbomOnly))
        .await
        .unwrap();
    let b = h
        .orch
        .submit(ScanRequest::new("alpine:3.20", StageSet::SbomOnly))
        .await
        .unwrap();
    assert_ne!(a.run_id(), b.run_id());
    assert!(!b.joined_existing());

    let a = a.wait().await.unwrap();
    let b = b.wait().await.unwrap();
    assert_ne!(a.sbom, b.sbom);
    assert_eq!(h.generator.calls(), 2);
    assert_eq!(h.orch.stats().dedup_joins, 0);
}

#[tokio::test]
async fn test_e2e_dropped_waiter_does_not_cancel_run() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let abandoned = h
        .orch
        .submit(ScanRequest::new("redis:7", StageSet::SbomOnly))
        .await
        .unwrap();
    let kept = h
        .orch
        .submit(ScanRequest::new("redis:7", StageSet::SbomOnly))
        .await
        .unwrap();
    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;

    drop(abandoned);
    h.generator.release(1);

    let outcome = kept.wait().await.unwrap();
    assert_eq!(outcome.sbom.as_bytes().as_ref(), expected_sbom("redis:7"));
    assert!(
        h.store
            .peek(&image("redis:7"), ArtifactKind::Sbom)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_e2e_run_completes_with_no_waiters_left() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let handle = h
        .orch
        .submit(ScanRequest::new("postgres:16", StageSet::SbomAndCve))
        .await
        .unwrap();
    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;
    drop(handle);
    h.generator.release(1);

    // 결과는 저장소와 알림으로만 관찰된다
    let reports = h.notifier.wait_for(1, DEFAULT_TIMEOUT).await;
    assert_eq!(reports[0].image, "docker.io/library/postgres:16");
    let postgres = image("postgres:16");
    assert!(h.store.peek(&postgres, ArtifactKind::CveManifest).await.is_some());
}
