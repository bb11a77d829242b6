//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진과 데몬은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironvuln_`
//! - 영역: `scan_`, `pool_`, `store_`, `notifier_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ironvuln_core::metrics::SCAN_CACHE_HITS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 파이프라인 단계 레이블 키 (sbom, cve)
pub const LABEL_STAGE: &str = "stage";

/// 요청된 단계 집합 레이블 키 (sbom_only, sbom_and_cve)
pub const LABEL_STAGES: &str = "stages";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 에러 종류 레이블 키 (timeout, sbom_generation, ...)
pub const LABEL_ERROR_KIND: &str = "kind";

/// 저장소 연산 레이블 키 (get, put)
pub const LABEL_OPERATION: &str = "operation";

// ─── Scan 메트릭 ────────────────────────────────────────────────────

/// Scan: 접수된 스캔 요청 수 (counter, label: stages)
pub const SCAN_REQUESTS_TOTAL: &str = "ironvuln_scan_requests_total";

/// Scan: 캐시에서 바로 응답한 요청 수 (counter)
pub const SCAN_CACHE_HITS_TOTAL: &str = "ironvuln_scan_cache_hits_total";

/// Scan: 진행 중인 실행에 합류한 요청 수 (counter)
pub const SCAN_DEDUP_JOINS_TOTAL: &str = "ironvuln_scan_dedup_joins_total";

/// Scan: 새로 시작된 파이프라인 실행 수 (counter)
pub const SCAN_RUNS_STARTED_TOTAL: &str = "ironvuln_scan_runs_started_total";

/// Scan: 종료된 파이프라인 실행 수 (counter, labels: result, kind)
pub const SCAN_RUNS_FINISHED_TOTAL: &str = "ironvuln_scan_runs_finished_total";

/// Scan: 현재 진행 중인 파이프라인 실행 수 (gauge)
pub const SCAN_RUNS_IN_FLIGHT: &str = "ironvuln_scan_runs_in_flight";

/// Scan: 단계별 소요 시간 (histogram, 초, label: stage)
pub const SCAN_STAGE_DURATION_SECONDS: &str = "ironvuln_scan_stage_duration_seconds";

// ─── Pool 메트릭 ────────────────────────────────────────────────────

/// Pool: 슬롯을 점유하고 실행 중인 작업 수 (gauge)
pub const POOL_ACTIVE_WORKERS: &str = "ironvuln_pool_active_workers";

/// Pool: 슬롯을 기다리는 작업 수 (gauge)
pub const POOL_QUEUED_JOBS: &str = "ironvuln_pool_queued_jobs";

// ─── Store / Notifier 메트릭 ────────────────────────────────────────

/// Store: 저장소 읽기/쓰기 실패 수 (counter, label: operation)
pub const STORE_ERRORS_TOTAL: &str = "ironvuln_store_errors_total";

/// Notifier: 완료 알림 전송 실패 수 (counter)
pub const NOTIFIER_FAILURES_TOTAL: &str = "ironvuln_notifier_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ironvuln_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "ironvuln_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 단계 소요 시간 히스토그램 버킷 (초)
///
/// 100ms ~ 600s 범위 (이미지 pull + SBOM 생성 포함)
pub const STAGE_DURATION_BUCKETS: [f64; 10] =
    [0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `ironvuln-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Scan
    describe_counter!(
        SCAN_REQUESTS_TOTAL,
        "Total number of scan requests accepted by the orchestrator"
    );
    describe_counter!(
        SCAN_CACHE_HITS_TOTAL,
        "Total number of scan requests answered from stored artifacts"
    );
    describe_counter!(
        SCAN_DEDUP_JOINS_TOTAL,
        "Total number of scan requests joined to an in-flight run"
    );
    describe_counter!(
        SCAN_RUNS_STARTED_TOTAL,
        "Total number of pipeline runs started"
    );
    describe_counter!(
        SCAN_RUNS_FINISHED_TOTAL,
        "Total number of pipeline runs that reached a terminal state"
    );
    describe_gauge!(
        SCAN_RUNS_IN_FLIGHT,
        "Number of pipeline runs currently queued or executing"
    );
    describe_histogram!(
        SCAN_STAGE_DURATION_SECONDS,
        "Time spent in a single pipeline stage in seconds"
    );

    // Pool
    describe_gauge!(
        POOL_ACTIVE_WORKERS,
        "Number of worker slots currently executing a run"
    );
    describe_gauge!(
        POOL_QUEUED_JOBS,
        "Number of runs waiting for a worker slot"
    );

    // Store / Notifier
    describe_counter!(
        STORE_ERRORS_TOTAL,
        "Total number of failed or timed out artifact store calls"
    );
    describe_counter!(
        NOTIFIER_FAILURES_TOTAL,
        "Total number of failed completion notifications"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Ironvuln daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
