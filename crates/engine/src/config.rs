//! 오케스트레이터 설정
//!
//! [`OrchestratorConfig`]는 core의 [`ScannerConfig`](ironvuln_core::config::ScannerConfig)에서
//! 파생되며 초 단위 값을 `Duration`으로 바꿔 보관합니다.
//!
//! # 사용 예시
//!
//! ```
//! use std::time::Duration;
//! use ironvuln_engine::OrchestratorConfigBuilder;
//!
//! let config = OrchestratorConfigBuilder::new()
//!     .workers(4)
//!     .cve_timeout(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.workers, 4);
//! ```

use std::time::Duration;

use crate::error::EngineError;

/// 설정 상한값 상수
const MAX_WORKERS: usize = 256;
const MAX_STAGE_TIMEOUT: Duration = Duration::from_secs(3600);

/// 오케스트레이터 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// 워커 슬롯 수
    pub workers: usize,
    /// SBOM 생성 호출 제한 시간
    pub sbom_timeout: Duration,
    /// CVE 분석 호출 제한 시간
    pub cve_timeout: Duration,
    /// 저장소 호출 제한 시간
    pub store_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            sbom_timeout: Duration::from_secs(300),
            cve_timeout: Duration::from_secs(300),
            store_timeout: Duration::from_secs(10),
        }
    }
}

impl OrchestratorConfig {
    /// core의 `ScannerConfig`에서 설정을 생성합니다.
    pub fn from_core(core: &ironvuln_core::config::ScannerConfig) -> Self {
        Self {
            workers: core.workers,
            sbom_timeout: Duration::from_secs(core.sbom_timeout_secs),
            cve_timeout: Duration::from_secs(core.cve_timeout_secs),
            store_timeout: Duration::from_secs(core.store_timeout_secs),
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `workers`: 1-256
    /// - 각 제한 시간: 0보다 크고 1시간 이하
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(EngineError::Config {
                field: "workers".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        for (field, value) in [
            ("sbom_timeout", self.sbom_timeout),
            ("cve_timeout", self.cve_timeout),
            ("store_timeout", self.store_timeout),
        ] {
            if value.is_zero() || value > MAX_STAGE_TIMEOUT {
                return Err(EngineError::Config {
                    field: field.to_owned(),
                    reason: format!("must be greater than 0 and at most {MAX_STAGE_TIMEOUT:?}"),
                });
            }
        }

        Ok(())
    }
}

/// [`OrchestratorConfig`] 빌더
#[derive(Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 워커 슬롯 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// SBOM 생성 제한 시간을 설정합니다.
    pub fn sbom_timeout(mut self, timeout: Duration) -> Self {
        self.config.sbom_timeout = timeout;
        self
    }

    /// CVE 분석 제한 시간을 설정합니다.
    pub fn cve_timeout(mut self, timeout: Duration) -> Self {
        self.config.cve_timeout = timeout;
        self
    }

    /// 저장소 호출 제한 시간을 설정합니다.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `EngineError::Config` 반환
    pub fn build(self) -> Result<OrchestratorConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
