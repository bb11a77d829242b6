//! 설정 관리: ironvuln.toml 파싱 및 런타임 설정
//!
//! [`IronvulnConfig`]는 데몬과 스캔 엔진의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONVULN_SCANNER_WORKERS=4` 형식)
//! 3. 설정 파일 (`ironvuln.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironvuln_core::error::IronvulnError> {
//! use ironvuln_core::config::IronvulnConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronvulnConfig::load("ironvuln.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronvulnConfig::parse("[scanner]\nworkers = 4")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronvulnError};

/// 설정 상한값 상수
const MAX_WORKERS: usize = 256;
const MAX_STAGE_TIMEOUT_SECS: u64 = 3600;
const MAX_GRACE_SECS: u64 = 300;

/// Ironvuln 통합 설정
///
/// `ironvuln.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronvulnConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP 게이트웨이 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 스캔 오케스트레이터 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 외부 도구(SBOM 생성기, CVE 분석기) 설정
    #[serde(default)]
    pub tools: ToolsConfig,
    /// 아티팩트 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 완료 알림 설정
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronvulnConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronvulnError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronvulnError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronvulnError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronvulnError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronvulnError> {
        toml::from_str(toml_str).map_err(|e| {
            IronvulnError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONVULN_{SECTION}_{FIELD}`
    /// 예: `IRONVULN_STORE_BACKEND=file`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONVULN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONVULN_GENERAL_LOG_FORMAT");

        // Server
        override_string(&mut self.server.listen_addr, "IRONVULN_SERVER_LISTEN_ADDR");
        override_u64(
            &mut self.server.shutdown_grace_secs,
            "IRONVULN_SERVER_SHUTDOWN_GRACE_SECS",
        );

        // Scanner
        override_usize(&mut self.scanner.workers, "IRONVULN_SCANNER_WORKERS");
        override_u64(
            &mut self.scanner.sbom_timeout_secs,
            "IRONVULN_SCANNER_SBOM_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.scanner.cve_timeout_secs,
            "IRONVULN_SCANNER_CVE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.scanner.store_timeout_secs,
            "IRONVULN_SCANNER_STORE_TIMEOUT_SECS",
        );

        // Tools
        override_string(&mut self.tools.sbom_program, "IRONVULN_TOOLS_SBOM_PROGRAM");
        override_args(&mut self.tools.sbom_args, "IRONVULN_TOOLS_SBOM_ARGS");
        override_string(&mut self.tools.cve_program, "IRONVULN_TOOLS_CVE_PROGRAM");
        override_args(&mut self.tools.cve_args, "IRONVULN_TOOLS_CVE_ARGS");

        // Store
        override_string(&mut self.store.backend, "IRONVULN_STORE_BACKEND");
        override_string(&mut self.store.path, "IRONVULN_STORE_PATH");

        // Notifier
        override_string(&mut self.notifier.backend, "IRONVULN_NOTIFIER_BACKEND");
        override_string(&mut self.notifier.url, "IRONVULN_NOTIFIER_URL");
        override_u64(
            &mut self.notifier.timeout_secs,
            "IRONVULN_NOTIFIER_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONVULN_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "IRONVULN_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "IRONVULN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronvulnError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "server.listen_addr",
                format!("'{}' is not a valid socket address", self.server.listen_addr),
            ));
        }

        if self.server.shutdown_grace_secs == 0 || self.server.shutdown_grace_secs > MAX_GRACE_SECS
        {
            return Err(invalid(
                "server.shutdown_grace_secs",
                format!("must be 1-{MAX_GRACE_SECS}"),
            ));
        }

        if self.scanner.workers == 0 || self.scanner.workers > MAX_WORKERS {
            return Err(invalid("scanner.workers", format!("must be 1-{MAX_WORKERS}")));
        }

        for (field, value) in [
            ("scanner.sbom_timeout_secs", self.scanner.sbom_timeout_secs),
            ("scanner.cve_timeout_secs", self.scanner.cve_timeout_secs),
            ("scanner.store_timeout_secs", self.scanner.store_timeout_secs),
        ] {
            if value == 0 || value > MAX_STAGE_TIMEOUT_SECS {
                return Err(invalid(field, format!("must be 1-{MAX_STAGE_TIMEOUT_SECS}")));
            }
        }

        if self.tools.sbom_program.trim().is_empty() {
            return Err(invalid("tools.sbom_program", "must not be empty".to_owned()));
        }
        if self.tools.cve_program.trim().is_empty() {
            return Err(invalid("tools.cve_program", "must not be empty".to_owned()));
        }

        // store 백엔드 검증
        let valid_backends = ["memory", "file"];
        if !valid_backends.contains(&self.store.backend.as_str()) {
            return Err(invalid(
                "store.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }
        if self.store.backend == "file" {
            if self.store.path.is_empty() {
                return Err(invalid(
                    "store.path",
                    "path must not be empty when backend is 'file'".to_owned(),
                ));
            }
            // Path traversal 체크
            if Path::new(&self.store.path)
                .components()
                .any(|c| c == std::path::Component::ParentDir)
            {
                return Err(invalid(
                    "store.path",
                    "store path contains path traversal pattern '..'".to_owned(),
                ));
            }
        }

        // notifier 백엔드 검증
        let valid_notifiers = ["log", "http"];
        if !valid_notifiers.contains(&self.notifier.backend.as_str()) {
            return Err(invalid(
                "notifier.backend",
                format!("must be one of: {}", valid_notifiers.join(", ")),
            ));
        }
        if self.notifier.backend == "http" {
            if !(self.notifier.url.starts_with("http://")
                || self.notifier.url.starts_with("https://"))
            {
                return Err(invalid(
                    "notifier.url",
                    "must be an http:// or https:// URL when backend is 'http'".to_owned(),
                ));
            }
            if self.notifier.timeout_secs == 0 {
                return Err(invalid(
                    "notifier.timeout_secs",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "port must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> IronvulnError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// HTTP 게이트웨이 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 수신 주소
    pub listen_addr: String,
    /// 종료 시 진행 중인 요청/스캔을 기다리는 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_owned(),
            shutdown_grace_secs: 5,
        }
    }
}

/// 스캔 오케스트레이터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 동시에 실행 가능한 파이프라인 수 (워커 슬롯)
    pub workers: usize,
    /// SBOM 생성 호출 제한 시간 (초)
    pub sbom_timeout_secs: u64,
    /// CVE 분석 호출 제한 시간 (초)
    pub cve_timeout_secs: u64,
    /// 저장소 읽기/쓰기 제한 시간 (초)
    pub store_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            sbom_timeout_secs: 300,
            cve_timeout_secs: 300,
            store_timeout_secs: 10,
        }
    }
}

/// 외부 도구 설정
///
/// 인자 목록의 `{image}`는 정규화된 이미지 참조로 치환됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// SBOM 생성기 실행 파일
    pub sbom_program: String,
    /// SBOM 생성기 인자
    pub sbom_args: Vec<String>,
    /// CVE 분석기 실행 파일 (SBOM은 stdin으로 전달)
    pub cve_program: String,
    /// CVE 분석기 인자
    pub cve_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sbom_program: "syft".to_owned(),
            sbom_args: vec![
                "{image}".to_owned(),
                "-o".to_owned(),
                "cyclonedx-json".to_owned(),
                "-q".to_owned(),
            ],
            cve_program: "grype".to_owned(),
            cve_args: vec!["-o".to_owned(), "json".to_owned(), "-q".to_owned()],
        }
    }
}

/// 아티팩트 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 백엔드 (memory, file)
    pub backend: String,
    /// file 백엔드의 루트 디렉토리
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            path: "/var/lib/ironvuln/artifacts".to_owned(),
        }
    }
}

/// 완료 알림 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// 백엔드 (log, http)
    pub backend: String,
    /// http 백엔드의 webhook URL
    pub url: String,
    /// http 요청 제한 시간 (초)
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            backend: "log".to_owned(),
            url: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 노출 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

/// 공백으로 구분된 인자 목록 (도구 인자에는 쉼표가 들어갈 수 있음)
fn override_args(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
