//! 스캔 오케스트레이터 -- 요청 접수, 캐시, 중복 제거, 2단계 파이프라인, 드레인
//!
//! # 내부 아키텍처
//!
//! ```text
//! submit ──> ImageIdentity::parse ──> 캐시 조회 ──(hit)──> ScanHandle::Ready
//!                                        │ miss
//!                                        ▼
//!                              in-flight 테이블 (Mutex<HashMap>)
//!                           ┌────────────┴────────────┐
//!                        있음: 대기자 합류          없음: PipelineRun 생성
//!                                                      │
//!                                                 WorkerPool
//!                                                      │
//!                  저장소 재확인 → SBOM 생성 → 저장 → 결정 지점 → CVE 분석 → 저장
//!                                                      │
//!                              테이블에서 제거 → 모든 대기자에게 같은 결과 → Notifier
//! ```
//!
//! 테이블 락은 동기 구간에서만 잡으며 락을 쥔 채 `.await` 하지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ironvuln_core::metrics as m;

use crate::config::OrchestratorConfig;
use crate::error::{EngineError, ScanError, ToolError};
use crate::image::ImageIdentity;
use crate::pipeline::{PipelineRun, RunStage, StageKind};
use crate::pool::{BoxFuture, DrainReport, PoolJob, WorkerPool, lock};
use crate::ports::{ArtifactStore, CveResolver, Notifier, SbomGenerator};
use crate::types::{ArtifactKind, CveManifest, Sbom, ScanOutcome, ScanReport, ScanRequest, StageSet};

/// 오케스트레이터 통계 (readiness 응답에 포함)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// 새 요청을 받는지 여부
    pub accepting: bool,
    /// 워커 슬롯 수
    pub workers: usize,
    /// 실행 중인 파이프라인 수
    pub active: usize,
    /// 슬롯 대기 중인 파이프라인 수
    pub queued: usize,
    /// 최대 동시 실행 수
    pub peak_active: usize,
    /// in-flight 테이블 크기
    pub in_flight: usize,
    pub requests: u64,
    pub cache_hits: u64,
    pub dedup_joins: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub store_errors: u64,
    pub notify_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    dedup_joins: AtomicU64,
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    store_errors: AtomicU64,
    notify_failures: AtomicU64,
}

/// SBOM 결정 지점의 판정
enum Decision {
    /// CVE 단계로 진행
    ResolveCves,
    /// SBOM 전용 실행: 테이블에서 이미 제거됨
    Finished(PipelineRun),
    /// 실행이 이미 정리됨 (드레인)
    Gone,
}

/// in-flight 테이블: `ImageIdentity → PipelineRun`
#[derive(Default)]
pub(crate) struct RunTable {
    runs: Mutex<HashMap<ImageIdentity, PipelineRun>>,
}

impl RunTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<ImageIdentity, PipelineRun>> {
        lock(&self.runs)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn with_run<T>(
        &self,
        image: &ImageIdentity,
        run_id: Uuid,
        f: impl FnOnce(&mut PipelineRun) -> T,
    ) -> Option<T> {
        let mut runs = self.lock();
        runs.get_mut(image)
            .filter(|run| run.run_id == run_id)
            .map(f)
    }

    fn stage(&self, image: &ImageIdentity) -> Option<RunStage> {
        self.lock().get(image).map(PipelineRun::stage)
    }

    fn advance(&self, image: &ImageIdentity, run_id: Uuid, next: RunStage) -> bool {
        self.with_run(image, run_id, |run| run.advance(next))
            .unwrap_or(false)
    }

    fn cancel_token(&self, image: &ImageIdentity, run_id: Uuid) -> Option<CancellationToken> {
        self.with_run(image, run_id, |run| run.cancel.clone())
    }

    fn decide(&self, image: &ImageIdentity, run_id: Uuid) -> Decision {
        let mut runs = self.lock();
        let stages = match runs.get_mut(image) {
            Some(run) if run.run_id == run_id => run.decide(),
            _ => return Decision::Gone,
        };
        if stages.includes_cve() {
            return Decision::ResolveCves;
        }
        // 같은 락 안에서 제거해야 이후 합류자가 끝난 실행에 붙지 않음
        match runs.remove(image) {
            Some(run) => Decision::Finished(run),
            None => Decision::Gone,
        }
    }

    fn take(&self, image: &ImageIdentity, run_id: Uuid) -> Option<PipelineRun> {
        let mut runs = self.lock();
        match runs.get(image) {
            Some(run) if run.run_id == run_id => runs.remove(image),
            _ => None,
        }
    }

    fn remove_waiter(&self, image: &ImageIdentity, waiter_id: u64) {
        if let Some(run) = self.lock().get_mut(image) {
            if run.remove_waiter(waiter_id) {
                debug!(
                    image = %image,
                    run_id = %run.run_id,
                    remaining = run.waiter_count(),
                    "scan waiter cancelled"
                );
            }
        }
    }

    fn drain_all(&self) -> Vec<(ImageIdentity, PipelineRun)> {
        self.lock().drain().collect()
    }
}

/// 요청 하나에 대한 결과 핸들
///
/// 캐시 응답이면 즉시 결과를 가지고 있고, 아니면 실행 종료 시 결과를 받습니다.
/// 결과를 받기 전에 drop 되면 대기자에서 빠지며 실행은 계속됩니다.
pub struct ScanHandle {
    image: ImageIdentity,
    state: HandleState,
}

enum HandleState {
    Ready(Option<Result<ScanOutcome, ScanError>>),
    Pending {
        run_id: Uuid,
        waiter_id: u64,
        joined: bool,
        rx: oneshot::Receiver<Result<ScanOutcome, ScanError>>,
        table: Arc<RunTable>,
        done: bool,
    },
}

impl ScanHandle {
    fn ready(image: ImageIdentity, result: Result<ScanOutcome, ScanError>) -> Self {
        Self {
            image,
            state: HandleState::Ready(Some(result)),
        }
    }

    /// 대상 이미지
    pub fn image(&self) -> &ImageIdentity {
        &self.image
    }

    /// 캐시에서 바로 응답했는지 여부
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// 연결된 실행 ID (캐시 응답이면 `None`)
    pub fn run_id(&self) -> Option<Uuid> {
        match &self.state {
            HandleState::Pending { run_id, .. } => Some(*run_id),
            HandleState::Ready(_) => None,
        }
    }

    /// 이미 진행 중이던 실행에 합류했는지 여부
    pub fn joined_existing(&self) -> bool {
        matches!(self.state, HandleState::Pending { joined: true, .. })
    }

    /// 최종 결과를 기다립니다.
    pub async fn wait(mut self) -> Result<ScanOutcome, ScanError> {
        match &mut self.state {
            HandleState::Ready(result) => result.take().unwrap_or(Err(ScanError::ShutdownInProgress)),
            HandleState::Pending { rx, done, .. } => {
                // 실행이 결과 없이 사라지는 경우는 강제 중단뿐
                let result = rx.await.unwrap_or(Err(ScanError::ShutdownInProgress));
                *done = true;
                result
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if let HandleState::Pending {
            waiter_id,
            table,
            done: false,
            ..
        } = &self.state
        {
            table.remove_waiter(&self.image, *waiter_id);
        }
    }
}

impl std::fmt::Debug for ScanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle")
            .field("image", &self.image)
            .field("ready", &self.is_ready())
            .field("run_id", &self.run_id())
            .finish()
    }
}

struct Inner<G, R, S, N> {
    config: OrchestratorConfig,
    generator: G,
    resolver: R,
    store: S,
    notifier: N,
    pool: WorkerPool,
    runs: Arc<RunTable>,
    accepting: AtomicBool,
    /// 모든 실행 취소 토큰의 부모
    shutdown: CancellationToken,
    next_waiter: AtomicU64,
    counters: Counters,
}

/// 스캔 오케스트레이터
///
/// 복제 비용이 낮은 핸들이며 내부 상태는 공유됩니다.
pub struct ScanOrchestrator<G, R, S, N> {
    inner: Arc<Inner<G, R, S, N>>,
}

impl<G, R, S, N> Clone for ScanOrchestrator<G, R, S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G, R, S, N> std::fmt::Debug for ScanOrchestrator<G, R, S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator").finish_non_exhaustive()
    }
}

impl<G, R, S, N> ScanOrchestrator<G, R, S, N>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    /// 빌더를 생성합니다.
    pub fn builder() -> ScanOrchestratorBuilder<G, R, S, N> {
        ScanOrchestratorBuilder::new()
    }

    /// 스캔 요청을 접수합니다.
    ///
    /// # Errors
    ///
    /// - `ScanError::InvalidImageReference`: 이미지 참조 형식 오류 (슬롯 소비 없음)
    /// - `ScanError::ShutdownInProgress`: 드레인 중
    pub async fn submit(&self, request: ScanRequest) -> Result<ScanHandle, ScanError> {
        let inner = &self.inner;
        let image = match ImageIdentity::parse(request.image()) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    image = request.image(),
                    correlation_id = request.correlation_id(),
                    error = %e,
                    "rejected scan request"
                );
                return Err(e);
            }
        };
        if !inner.accepting.load(Ordering::Acquire) {
            return Err(ScanError::ShutdownInProgress);
        }

        inner.counters.requests.fetch_add(1, Ordering::Relaxed);
        counter!(m::SCAN_REQUESTS_TOTAL, m::LABEL_STAGES => request.stages().as_str())
            .increment(1);

        if let Some(outcome) = inner.lookup_cache(&image, request.stages()).await {
            inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            counter!(m::SCAN_CACHE_HITS_TOTAL).increment(1);
            info!(
                image = %image,
                correlation_id = request.correlation_id(),
                stages = %request.stages(),
                "answered scan from stored artifacts"
            );

            let result = Ok(outcome);
            let mut report = ScanReport::from_result(&image, request.stages(), &result);
            report.correlation_ids.push(request.correlation_id().to_owned());
            report.workloads.extend(request.workload().cloned());
            inner.spawn_report(image.clone(), report);
            return Ok(ScanHandle::ready(image, result));
        }

        let waiter_id = inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let (run_id, joined) = {
            let mut runs = inner.runs.lock();
            // 캐시 조회 중 종료가 시작되었을 수 있음
            if !inner.accepting.load(Ordering::Acquire) {
                return Err(ScanError::ShutdownInProgress);
            }
            let entry = match runs.get_mut(&image) {
                Some(run) => {
                    run.join(
                        waiter_id,
                        tx,
                        request.stages(),
                        request.correlation_id(),
                        request.workload(),
                    );
                    (run.run_id, true)
                }
                None => {
                    let mut run = PipelineRun::new(request.stages(), inner.shutdown.child_token());
                    run.join(
                        waiter_id,
                        tx,
                        request.stages(),
                        request.correlation_id(),
                        request.workload(),
                    );
                    let run_id = run.run_id;
                    runs.insert(image.clone(), run);
                    (run_id, false)
                }
            };
            gauge!(m::SCAN_RUNS_IN_FLIGHT).set(runs.len() as f64);
            entry
        };

        if joined {
            inner.counters.dedup_joins.fetch_add(1, Ordering::Relaxed);
            counter!(m::SCAN_DEDUP_JOINS_TOTAL).increment(1);
            debug!(
                image = %image,
                %run_id,
                correlation_id = request.correlation_id(),
                "joined in-flight scan run"
            );
        } else {
            inner.counters.runs_started.fetch_add(1, Ordering::Relaxed);
            counter!(m::SCAN_RUNS_STARTED_TOTAL).increment(1);
            info!(
                image = %image,
                %run_id,
                correlation_id = request.correlation_id(),
                stages = %request.stages(),
                "queued new scan run"
            );
            inner.pool.submit(Box::new(RunJob {
                inner: Arc::clone(inner),
                image: image.clone(),
                run_id,
            }));
        }

        Ok(ScanHandle {
            image,
            state: HandleState::Pending {
                run_id,
                waiter_id,
                joined,
                rx,
                table: Arc::clone(&inner.runs),
                done: false,
            },
        })
    }

    /// 요청을 받을 수 있는 상태인지 반환합니다.
    pub fn ready(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire) && !self.inner.pool.is_closed()
    }

    /// 진행 중인 실행의 현재 단계를 반환합니다.
    pub fn run_stage(&self, image: &ImageIdentity) -> Option<RunStage> {
        self.inner.runs.stage(image)
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> OrchestratorStats {
        let inner = &self.inner;
        let c = &inner.counters;
        OrchestratorStats {
            accepting: inner.accepting.load(Ordering::Acquire),
            workers: inner.pool.size(),
            active: inner.pool.active(),
            queued: inner.pool.queued(),
            peak_active: inner.pool.peak_active(),
            in_flight: inner.runs.len(),
            requests: c.requests.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            dedup_joins: c.dedup_joins.load(Ordering::Relaxed),
            runs_started: c.runs_started.load(Ordering::Relaxed),
            runs_completed: c.runs_completed.load(Ordering::Relaxed),
            runs_failed: c.runs_failed.load(Ordering::Relaxed),
            store_errors: c.store_errors.load(Ordering::Relaxed),
            notify_failures: c.notify_failures.load(Ordering::Relaxed),
        }
    }

    /// 설정
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// 드레인합니다.
    ///
    /// 새 요청을 거부하고, 슬롯을 기다리던 실행을 `ShutdownInProgress`로 끝내고,
    /// 실행 중인 파이프라인을 `grace`까지 기다립니다. 그 뒤에도 남은 실행은
    /// 취소되고 대기자는 `ShutdownInProgress`를 받습니다.
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        let inner = &self.inner;
        if !inner.accepting.swap(false, Ordering::AcqRel) {
            debug!("scan orchestrator shutdown already requested");
        }
        info!(
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            in_flight = inner.runs.len(),
            active = inner.pool.active(),
            queued = inner.pool.queued(),
            "draining scan orchestrator"
        );

        let shutdown = inner.shutdown.clone();
        let report = inner.pool.drain(grace, move || shutdown.cancel()).await;

        // 중단되어 스스로 정리하지 못한 실행
        for (image, run) in inner.runs.drain_all() {
            run.cancel.cancel();
            inner.complete(&image, run, Err(ScanError::ShutdownInProgress));
        }
        gauge!(m::SCAN_RUNS_IN_FLIGHT).set(0.0);

        info!(
            rejected = report.rejected.len(),
            abandoned = report.abandoned.len(),
            "scan orchestrator drained"
        );
        report
    }
}

impl<G, R, S, N> Inner<G, R, S, N>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    /// 요청된 단계의 산출물이 모두 저장되어 있으면 결과를 만듭니다.
    async fn lookup_cache(&self, image: &ImageIdentity, stages: StageSet) -> Option<ScanOutcome> {
        let sbom = self.store_get(image, ArtifactKind::Sbom).await?;
        let cve = if stages.includes_cve() {
            Some(CveManifest::new(
                self.store_get(image, ArtifactKind::CveManifest).await?,
            ))
        } else {
            None
        };
        Some(ScanOutcome {
            image: image.clone(),
            sbom: Sbom::new(sbom),
            cve,
            from_cache: true,
            persist_error: None,
        })
    }

    /// 파이프라인 단계를 순서대로 실행합니다.
    async fn execute(
        self: &Arc<Self>,
        image: &ImageIdentity,
        run_id: Uuid,
    ) -> Result<ScanOutcome, ScanError> {
        let mut persist_error = None;

        // 방금 끝난 실행이나 부분 캐시가 남긴 SBOM 재사용
        let (sbom, sbom_cached) = match self.store_get(image, ArtifactKind::Sbom).await {
            Some(content) => {
                self.runs.advance(image, run_id, RunStage::SbomReady);
                debug!(image = %image, %run_id, "reusing stored sbom");
                (Sbom::new(content), true)
            }
            None => {
                self.runs.advance(image, run_id, RunStage::GeneratingSbom);
                let sbom = self.generate_sbom(image).await?;
                self.runs.advance(image, run_id, RunStage::SbomReady);
                if let Err(e) = self
                    .store_put(image, ArtifactKind::Sbom, sbom.as_bytes().clone())
                    .await
                {
                    persist_error = Some(e);
                }
                (sbom, false)
            }
        };

        match self.runs.decide(image, run_id) {
            Decision::ResolveCves => {}
            Decision::Finished(run) => {
                let outcome = ScanOutcome {
                    image: image.clone(),
                    sbom,
                    cve: None,
                    from_cache: sbom_cached,
                    persist_error,
                };
                self.complete(image, run, Ok(outcome.clone()));
                return Ok(outcome);
            }
            Decision::Gone => return Err(ScanError::ShutdownInProgress),
        }

        self.runs.advance(image, run_id, RunStage::ResolvingCves);
        let cve = self.resolve_cves(image, &sbom).await?;
        if let Err(e) = self
            .store_put(image, ArtifactKind::CveManifest, cve.as_bytes().clone())
            .await
        {
            persist_error.get_or_insert(e);
        }

        Ok(ScanOutcome {
            image: image.clone(),
            sbom,
            cve: Some(cve),
            from_cache: false,
            persist_error,
        })
    }

    async fn generate_sbom(&self, image: &ImageIdentity) -> Result<Sbom, ScanError> {
        let deadline = self.config.sbom_timeout;
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, self.generator.generate(image, deadline)).await;
        histogram!(m::SCAN_STAGE_DURATION_SECONDS, m::LABEL_STAGE => StageKind::Sbom.as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(sbom)) if sbom.is_empty() => Err(ScanError::SbomGeneration(
                "generator returned an empty sbom".to_owned(),
            )),
            Ok(Ok(sbom)) => Ok(sbom),
            Ok(Err(ToolError::Timeout(_))) | Err(_) => Err(ScanError::Timeout {
                stage: StageKind::Sbom,
                timeout: deadline,
            }),
            Ok(Err(e)) => Err(ScanError::SbomGeneration(e.to_string())),
        }
    }

    async fn resolve_cves(&self, image: &ImageIdentity, sbom: &Sbom) -> Result<CveManifest, ScanError> {
        let deadline = self.config.cve_timeout;
        let started = Instant::now();
        let result =
            tokio::time::timeout(deadline, self.resolver.resolve(image, sbom, deadline)).await;
        histogram!(m::SCAN_STAGE_DURATION_SECONDS, m::LABEL_STAGE => StageKind::Cve.as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(manifest)) => Ok(manifest),
            Ok(Err(ToolError::Timeout(_))) | Err(_) => Err(ScanError::Timeout {
                stage: StageKind::Cve,
                timeout: deadline,
            }),
            Ok(Err(e)) => Err(ScanError::CveResolution(e.to_string())),
        }
    }

    /// 저장소 읽기. 실패와 시간 초과는 캐시 미스로 취급합니다.
    async fn store_get(&self, image: &ImageIdentity, kind: ArtifactKind) -> Option<Bytes> {
        match tokio::time::timeout(self.config.store_timeout, self.store.get(image, kind)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                self.store_failed("get");
                warn!(image = %image, kind = %kind, error = %e, "artifact store read failed, treating as miss");
                None
            }
            Err(_) => {
                self.store_failed("get");
                warn!(image = %image, kind = %kind, "artifact store read timed out, treating as miss");
                None
            }
        }
    }

    /// 저장소 쓰기. 실패해도 실행은 계속됩니다.
    async fn store_put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> Result<(), ScanError> {
        let message = match tokio::time::timeout(
            self.config.store_timeout,
            self.store.put(image, kind, content),
        )
        .await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {:?}", self.config.store_timeout),
        };
        self.store_failed("put");
        warn!(image = %image, kind = %kind, error = %message, "failed to persist artifact");
        Err(ScanError::StoreUnavailable(message))
    }

    fn store_failed(&self, operation: &'static str) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
        counter!(m::STORE_ERRORS_TOTAL, m::LABEL_OPERATION => operation).increment(1);
    }

    /// 실행이 아직 테이블에 있으면 제거하고 결과를 전달합니다.
    fn finish(self: &Arc<Self>, image: &ImageIdentity, run_id: Uuid, result: Result<ScanOutcome, ScanError>) {
        if let Some(run) = self.runs.take(image, run_id) {
            self.complete(image, run, result);
        }
    }

    /// 테이블에서 빠진 실행을 종료 상태로 만들고 대기자와 알림에 결과를 전달합니다.
    fn complete(
        self: &Arc<Self>,
        image: &ImageIdentity,
        mut run: PipelineRun,
        result: Result<ScanOutcome, ScanError>,
    ) {
        let terminal = if result.is_ok() {
            RunStage::Completed
        } else {
            RunStage::Failed
        };
        run.advance(terminal);
        let delivered = run.deliver(&result);
        gauge!(m::SCAN_RUNS_IN_FLIGHT).set(self.runs.len() as f64);

        match &result {
            Ok(outcome) => {
                self.counters.runs_completed.fetch_add(1, Ordering::Relaxed);
                counter!(m::SCAN_RUNS_FINISHED_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(
                    image = %image,
                    run_id = %run.run_id,
                    waiters = delivered,
                    with_cve = outcome.cve.is_some(),
                    persisted = outcome.persisted(),
                    duration_ms = run.elapsed_ms(),
                    "scan run completed"
                );
            }
            Err(e) => {
                self.counters.runs_failed.fetch_add(1, Ordering::Relaxed);
                counter!(
                    m::SCAN_RUNS_FINISHED_TOTAL,
                    m::LABEL_RESULT => "failure",
                    m::LABEL_ERROR_KIND => e.kind()
                )
                .increment(1);
                warn!(
                    image = %image,
                    run_id = %run.run_id,
                    waiters = delivered,
                    error = %e,
                    duration_ms = run.elapsed_ms(),
                    "scan run failed"
                );
            }
        }

        let mut report = ScanReport::from_result(image, run.stages(), &result);
        report.run_id = Some(run.run_id.to_string());
        report.correlation_ids = run.correlation_ids().to_vec();
        report.workloads = run.workloads().to_vec();
        report.duration_ms = run.elapsed_ms();
        self.spawn_report(image.clone(), report);
    }

    /// 알림은 분리된 태스크에서 보냅니다. 실패는 로그와 메트릭에만 남습니다.
    fn spawn_report(self: &Arc<Self>, image: ImageIdentity, report: ScanReport) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = inner.notifier.report(&image, &report).await {
                inner.counters.notify_failures.fetch_add(1, Ordering::Relaxed);
                counter!(m::NOTIFIER_FAILURES_TOTAL).increment(1);
                warn!(image = %image, error = %e, "failed to deliver scan report");
            }
        });
    }
}

/// 워커 풀에서 실행되는 파이프라인 실행 하나
struct RunJob<G, R, S, N> {
    inner: Arc<Inner<G, R, S, N>>,
    image: ImageIdentity,
    run_id: Uuid,
}

impl<G, R, S, N> PoolJob for RunJob<G, R, S, N>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    fn label(&self) -> String {
        self.image.canonical()
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let RunJob {
                inner,
                image,
                run_id,
            } = *self;
            let Some(cancel) = inner.runs.cancel_token(&image, run_id) else {
                return;
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ScanError::ShutdownInProgress),
                result = inner.execute(&image, run_id) => result,
            };
            inner.finish(&image, run_id, result);
        })
    }

    fn reject(self: Box<Self>) {
        debug!(image = %self.image, run_id = %self.run_id, "scan run rejected before start");
        self.inner
            .finish(&self.image, self.run_id, Err(ScanError::ShutdownInProgress));
    }
}

/// [`ScanOrchestrator`] 빌더
pub struct ScanOrchestratorBuilder<G, R, S, N> {
    config: OrchestratorConfig,
    generator: Option<G>,
    resolver: Option<R>,
    store: Option<S>,
    notifier: Option<N>,
}

impl<G, R, S, N> Default for ScanOrchestratorBuilder<G, R, S, N> {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            generator: None,
            resolver: None,
            store: None,
            notifier: None,
        }
    }
}

impl<G, R, S, N> ScanOrchestratorBuilder<G, R, S, N>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    /// 기본 설정을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 오케스트레이터 설정
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// SBOM 생성기
    pub fn generator(mut self, generator: G) -> Self {
        self.generator = Some(generator);
        self
    }

    /// CVE 분석기
    pub fn resolver(mut self, resolver: R) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// 아티팩트 저장소
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// 완료 알림
    pub fn notifier(mut self, notifier: N) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 오케스트레이터를 생성합니다. 워커 풀을 스폰하므로 tokio 런타임 안에서 호출해야 합니다.
    ///
    /// # Errors
    ///
    /// 설정 검증 실패, 구성 요소 누락 시 `EngineError::Config`
    pub fn build(self) -> Result<ScanOrchestrator<G, R, S, N>, EngineError> {
        self.config.validate()?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;
        let resolver = self.resolver.ok_or_else(|| missing("resolver"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let notifier = self.notifier.ok_or_else(|| missing("notifier"))?;

        info!(
            workers = self.config.workers,
            sbom_timeout_secs = self.config.sbom_timeout.as_secs_f64(),
            cve_timeout_secs = self.config.cve_timeout.as_secs_f64(),
            "scan orchestrator created"
        );

        Ok(ScanOrchestrator {
            inner: Arc::new(Inner {
                pool: WorkerPool::new(self.config.workers),
                config: self.config,
                generator,
                resolver,
                store,
                notifier,
                runs: Arc::new(RunTable::default()),
                accepting: AtomicBool::new(true),
                shutdown: CancellationToken::new(),
                next_waiter: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        })
    }
}

fn missing(component: &str) -> EngineError {
    EngineError::Config {
        field: component.to_owned(),
        reason: "required component was not provided".to_owned(),
    }
}
