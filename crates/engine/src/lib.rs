//! Ironvuln 스캔 엔진
//!
//! 컨테이너 이미지 스캔 요청을 받아 SBOM을 만들고(1단계) 필요하면 CVE 매니페스트를
//! 계산합니다(2단계). 같은 이미지에 대한 동시 요청은 하나의 실행으로 합쳐지고,
//! 저장된 산출물이 있으면 외부 도구를 호출하지 않고 응답합니다.
//!
//! # 모듈 구조
//!
//! - [`image`]: 이미지 참조 파싱과 정규화 (`ImageIdentity`)
//! - [`types`]: 요청, 산출물, 결과, 알림 보고서
//! - [`pipeline`]: 실행 상태 머신 (`RunStage`)
//! - [`ports`]: 외부 협력자 trait (`SbomGenerator`, `CveResolver`, `ArtifactStore`, `Notifier`)
//! - [`adapters`]: 포트 구현체 (CLI 도구, 메모리/파일 저장소, 로그/HTTP 알림)
//! - [`pool`]: 고정 크기 FIFO 워커 풀
//! - [`config`]: 오케스트레이터 설정과 빌더
//! - [`orchestrator`]: 요청 접수, 캐시, 중복 제거, 드레인 (`ScanOrchestrator`)
//! - [`error`]: 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! ScanRequest ──> ScanOrchestrator ──> ArtifactStore (cache)
//!                       │
//!                  WorkerPool (N slots, FIFO)
//!                       │
//!          SbomGenerator ──> ArtifactStore ──> CveResolver ──> ArtifactStore
//!                       │
//!           waiters (identical result) + Notifier
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod ports;
pub mod types;

// --- 공개 API re-export ---

// 오케스트레이터
pub use orchestrator::{OrchestratorStats, ScanHandle, ScanOrchestrator, ScanOrchestratorBuilder};

// 설정
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};

// 에러
pub use error::{EngineError, NotifyError, ScanError, StoreError, ToolError};

// 도메인 타입
pub use image::{ImageIdentity, ImageReference};
pub use pipeline::{RunStage, StageKind};
pub use types::{
    ArtifactKind, CveManifest, ReportError, ReportStatus, Sbom, ScanOutcome, ScanReport,
    ScanRequest, StageSet, WorkloadMetadata,
};

// 포트
pub use ports::{ArtifactStore, CveResolver, Notifier, SbomGenerator};

// 워커 풀
pub use pool::{DrainReport, WorkerPool};

// 어댑터
pub use adapters::{
    CommandCveResolver, CommandSbomGenerator, FileStore, HttpNotifier, LogNotifier, MemoryStore,
    NotifierBackend, StoreBackend, ToolCommand,
};
