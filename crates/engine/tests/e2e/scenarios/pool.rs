//! Worker pool bounds and admission order as seen through the orchestrator.

use std::time::Duration;

use ironvuln_engine::{RunStage, ScanRequest, StageSet};

use crate::helpers::mocks::{ScriptedGenerator, ScriptedResolver};
use crate::helpers::store::RecordingStore;
use crate::helpers::{DEFAULT_TIMEOUT, harness_with, image, test_config, wait_until};

#[tokio::test]
async fn test_e2e_concurrency_never_exceeds_workers() {
    let h = harness_with(
        test_config(2),
        ScriptedGenerator::new().with_delay(Duration::from_millis(30)),
        ScriptedResolver::new().with_delay(Duration::from_millis(10)),
        RecordingStore::new(),
    );

    let mut handles = Vec::new();
    for i in 0..6 {
        let request = ScanRequest::new(format!("app-{i}:v1"), StageSet::SbomAndCve);
        handles.push(h.orch.submit(request).await.unwrap());
    }
    for handle in handles {
        handle.wait().await.unwrap();
    }

    assert_eq!(h.generator.calls(), 6);
    assert!(h.generator.peak() <= 2, "generator peak {}", h.generator.peak());
    let stats = h.orch.stats();
    assert!(stats.peak_active <= 2);
    assert_eq!(stats.runs_completed, 6);
}

#[tokio::test]
async fn test_e2e_saturated_pool_queues_in_fifo_order() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let order = ["first:1", "second:1", "third:1"];
    let mut handles = Vec::new();
    for raw in order {
        handles.push(
            h.orch
                .submit(ScanRequest::new(raw, StageSet::SbomOnly))
                .await
                .unwrap(),
        );
    }

    wait_until("first generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;
    let stats = h.orch.stats();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.queued, 2);
    assert_eq!(h.orch.run_stage(&image("second:1")), Some(RunStage::Queued));
    assert_eq!(
        h.orch.run_stage(&image("first:1")),
        Some(RunStage::GeneratingSbom)
    );

    h.generator.release(3);
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let expected: Vec<String> = order.iter().map(|raw| image(raw).canonical()).collect();
    assert_eq!(h.generator.seen(), expected);
}

#[tokio::test]
async fn test_e2e_joiners_do_not_consume_slots() {
    let h = harness_with(
        test_config(1),
        ScriptedGenerator::new().gated(),
        ScriptedResolver::new(),
        RecordingStore::new(),
    );

    let mut handles = Vec::new();
    for _ in 0..10 {
        handles.push(
            h.orch
                .submit(ScanRequest::new("alpine", StageSet::SbomOnly))
                .await
                .unwrap(),
        );
    }
    wait_until("generator call", DEFAULT_TIMEOUT, || h.generator.calls() == 1).await;
    assert_eq!(h.orch.stats().queued, 0);

    h.generator.release(1);
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(h.orch.stats().peak_active, 1);
}
