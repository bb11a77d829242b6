//! Ironvuln 공통 크레이트: 설정, 최상위 에러, 메트릭 이름
//!
//! 모든 크레이트가 공유하는 최소한의 기반 타입만 둡니다.
//! 스캔 도메인 타입과 오케스트레이션 로직은 `ironvuln-engine`에 있습니다.
//!
//! # 모듈 구조
//!
//! - [`config`]: `ironvuln.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 최상위 에러 (`IronvulnError`) 및 설정 에러
//! - [`metrics`]: Prometheus 메트릭 이름 상수와 설명 등록

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineFailure, IronvulnError};

// 설정
pub use config::IronvulnConfig;
