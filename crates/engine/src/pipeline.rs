//! 파이프라인 실행 상태 머신
//!
//! ```text
//! Queued ──> GeneratingSbom ──> SbomReady ──> ResolvingCves ──> Completed
//!   │  └──────(캐시된 SBOM)──────>┘   └──(SBOM 전용)──────────────>┘
//!   └──────────────┴─────────────────┴──────────────┴──> Failed
//! ```
//!
//! [`PipelineRun`]은 이미지 하나에 대한 진행 중 실행 기록이며
//! 오케스트레이터의 in-flight 테이블만 소유합니다.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::error::ScanError;
use crate::types::{ScanOutcome, StageSet, WorkloadMetadata};

/// 외부 호출 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// SBOM 생성
    Sbom,
    /// CVE 분석
    Cve,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sbom => "sbom",
            Self::Cve => "cve",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// 워커 슬롯 대기
    Queued,
    /// SBOM 생성 중
    GeneratingSbom,
    /// SBOM 확보됨 (생성 또는 캐시)
    SbomReady,
    /// CVE 분석 중
    ResolvingCves,
    /// 성공 종료
    Completed,
    /// 실패 종료
    Failed,
}

impl RunStage {
    /// 상태 전이가 허용되는지 확인합니다.
    ///
    /// `Failed`는 종료되지 않은 모든 상태에서 도달할 수 있습니다
    /// (드레인 중 거부/포기 포함).
    pub fn can_transition_to(self, next: RunStage) -> bool {
        use RunStage::*;
        matches!(
            (self, next),
            (Queued, GeneratingSbom)
                | (Queued, SbomReady)
                | (GeneratingSbom, SbomReady)
                | (SbomReady, ResolvingCves)
                | (SbomReady, Completed)
                | (ResolvingCves, Completed)
                | (Queued | GeneratingSbom | SbomReady | ResolvingCves, Failed)
        )
    }

    /// 종료 상태 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 상태명
    pub fn state_name(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::GeneratingSbom => "generating_sbom",
            Self::SbomReady => "sbom_ready",
            Self::ResolvingCves => "resolving_cves",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

pub(crate) type WaiterTx = oneshot::Sender<Result<ScanOutcome, ScanError>>;

/// 이미지 하나에 대한 진행 중 실행
#[derive(Debug)]
pub(crate) struct PipelineRun {
    pub(crate) run_id: Uuid,
    stage: RunStage,
    stages: StageSet,
    /// SBOM 결정 지점을 지났는지 (이후로는 단계 집합 확장 불가)
    decided: bool,
    waiters: HashMap<u64, WaiterTx>,
    correlation_ids: Vec<String>,
    workloads: Vec<WorkloadMetadata>,
    started_at: Instant,
    pub(crate) cancel: CancellationToken,
}

impl PipelineRun {
    pub(crate) fn new(stages: StageSet, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: RunStage::Queued,
            stages,
            decided: false,
            waiters: HashMap::new(),
            correlation_ids: Vec::new(),
            workloads: Vec::new(),
            started_at: Instant::now(),
            cancel,
        }
    }

    pub(crate) fn stage(&self) -> RunStage {
        self.stage
    }

    pub(crate) fn stages(&self) -> StageSet {
        self.stages
    }

    /// 상태를 전이합니다. 허용되지 않는 전이는 무시하고 `false`를 반환합니다.
    pub(crate) fn advance(&mut self, next: RunStage) -> bool {
        if self.stage.can_transition_to(next) {
            self.stage = next;
            true
        } else {
            warn!(
                run_id = %self.run_id,
                from = self.stage.state_name(),
                to = next.state_name(),
                "rejected illegal run stage transition"
            );
            false
        }
    }

    /// 대기자를 추가하고, 결정 지점 전이면 요청 단계를 합칩니다.
    pub(crate) fn join(
        &mut self,
        waiter_id: u64,
        tx: WaiterTx,
        stages: StageSet,
        correlation_id: &str,
        workload: Option<&WorkloadMetadata>,
    ) {
        if !self.decided {
            self.stages = self.stages.union(stages);
        }
        self.waiters.insert(waiter_id, tx);
        self.correlation_ids.push(correlation_id.to_owned());
        if let Some(workload) = workload {
            self.workloads.push(workload.clone());
        }
    }

    /// SBOM 결정 지점 통과를 기록하고 최종 단계 집합을 반환합니다.
    pub(crate) fn decide(&mut self) -> StageSet {
        self.decided = true;
        self.stages
    }

    pub(crate) fn remove_waiter(&mut self, waiter_id: u64) -> bool {
        self.waiters.remove(&waiter_id).is_some()
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn correlation_ids(&self) -> &[String] {
        &self.correlation_ids
    }

    pub(crate) fn workloads(&self) -> &[WorkloadMetadata] {
        &self.workloads
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// 남은 대기자 모두에게 같은 결과를 보냅니다. 전달된 수를 반환합니다.
    pub(crate) fn deliver(&mut self, result: &Result<ScanOutcome, ScanError>) -> usize {
        let mut delivered = 0;
        for (_, tx) in self.waiters.drain() {
            // 수신 측이 이미 사라졌으면 무시
            if tx.send(result.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
