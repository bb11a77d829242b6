//! 에러 타입: 크레이트 공통 에러 정의

/// Ironvuln 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronvulnError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 엔진 에러
    #[error("engine error: {0}")]
    Engine(#[from] EngineFailure),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스캔 엔진 에러 (엔진 크레이트의 상세 에러를 요약한 형태)
#[derive(Debug, thiserror::Error)]
pub enum EngineFailure {
    /// 엔진 초기화 실패
    #[error("engine init failed: {0}")]
    InitFailed(String),

    /// 아티팩트 저장소 에러
    #[error("artifact store error: {0}")]
    Store(String),

    /// 외부 도구(SBOM 생성기 / CVE 분석기) 에러
    #[error("external tool error: {0}")]
    Tool(String),

    /// 알림 전송 에러
    #[error("notifier error: {0}")]
    Notifier(String),
}
