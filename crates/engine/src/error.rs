//! 스캔 엔진 에러 타입
//!
//! - [`ScanError`]: 요청자(대기자)에게 전달되는 스캔 결과 에러. 중복 제거된 모든
//!   대기자가 같은 값을 받아야 하므로 `Clone`입니다.
//! - [`ToolError`]: SBOM 생성기 / CVE 분석기 어댑터 에러
//! - [`StoreError`]: 아티팩트 저장소 에러
//! - [`NotifyError`]: 완료 알림 에러
//! - [`EngineError`]: 엔진 구성(설정, 어댑터 생성) 에러
//!
//! `From<EngineError> for IronvulnError` 구현을 통해 데몬에서 `?`로 전파됩니다.

use std::time::Duration;

use ironvuln_core::error::{EngineFailure, IronvulnError};

use crate::pipeline::StageKind;

/// 스캔 요청 처리 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// 이미지 참조 형식 오류 (작업이 큐에 들어가기 전에 거부)
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference {
        /// 요청에 들어온 원본 문자열
        reference: String,
        /// 거부 사유
        reason: String,
    },

    /// SBOM 생성기 실패
    #[error("sbom generation failed: {0}")]
    SbomGeneration(String),

    /// CVE 분석기 실패 (SBOM은 캐시에 남음)
    #[error("cve resolution failed: {0}")]
    CveResolution(String),

    /// 외부 호출이 제한 시간을 넘김
    #[error("{stage} stage timed out after {timeout:?}")]
    Timeout {
        /// 시간 초과가 발생한 단계
        stage: StageKind,
        /// 적용된 제한 시간
        timeout: Duration,
    },

    /// 종료(드레인) 중이라 처리하지 않음
    #[error("scanner is shutting down")]
    ShutdownInProgress,

    /// 저장소 읽기/쓰기 실패
    #[error("artifact store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ScanError {
    /// 에러 종류 이름 (메트릭 레이블, HTTP 에러 본문에 사용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidImageReference { .. } => "invalid_image_reference",
            Self::SbomGeneration(_) => "sbom_generation",
            Self::CveResolution(_) => "cve_resolution",
            Self::Timeout { .. } => "timeout",
            Self::ShutdownInProgress => "shutdown_in_progress",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub(crate) fn invalid_reference(reference: &str, reason: impl Into<String>) -> Self {
        Self::InvalidImageReference {
            reference: reference.to_owned(),
            reason: reason.into(),
        }
    }
}

/// 외부 도구 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// 프로세스 실행 실패
    #[error("failed to launch '{program}': {reason}")]
    Spawn {
        /// 실행 파일
        program: String,
        /// 실패 사유
        reason: String,
    },

    /// 0이 아닌 종료 코드
    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        /// 실행 파일
        program: String,
        /// 종료 상태
        status: String,
        /// 표준 에러 출력 (잘림)
        stderr: String,
    },

    /// 출력이 비어 있음
    #[error("'{program}' produced no output")]
    EmptyOutput {
        /// 실행 파일
        program: String,
    },

    /// 도구 자체가 보고한 시간 초과
    #[error("tool call exceeded {0:?}")]
    Timeout(Duration),

    /// 기타 실패
    #[error("{0}")]
    Failed(String),
}

/// 아티팩트 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 파일 I/O 에러
    #[error("store io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },

    /// 백엔드 사용 불가
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// 완료 알림 에러
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// 전송 실패 (연결, 타임아웃, 직렬화)
    #[error("notification transport error: {0}")]
    Transport(String),

    /// 수신 측이 거부함
    #[error("notification rejected with status {status}")]
    Rejected {
        /// HTTP 상태 코드
        status: u16,
    },
}

/// 엔진 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 저장소 초기화 에러
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 알림 백엔드 초기화 에러
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl From<EngineError> for IronvulnError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => IronvulnError::Engine(
                EngineFailure::InitFailed(format!("config error: {field}: {reason}")),
            ),
            EngineError::Store(e) => IronvulnError::Engine(EngineFailure::Store(e.to_string())),
            EngineError::Notify(e) => {
                IronvulnError::Engine(EngineFailure::Notifier(e.to_string()))
            }
        }
    }
}
