//! 완료 알림 어댑터
//!
//! - [`LogNotifier`]: 보고서를 구조화 로그로 남깁니다 (기본값).
//! - [`HttpNotifier`]: 보고서를 JSON으로 웹훅 URL에 POST 합니다.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::image::ImageIdentity;
use crate::ports::Notifier;
use crate::types::{ReportStatus, ScanReport};

/// 로그 알림
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    async fn report(&self, image: &ImageIdentity, report: &ScanReport) -> Result<(), NotifyError> {
        match report.status {
            ReportStatus::Completed => info!(
                image = %image,
                run_id = report.run_id.as_deref().unwrap_or("-"),
                stages = %report.stages,
                correlation_ids = ?report.correlation_ids,
                from_cache = report.from_cache,
                persisted = report.persisted,
                sbom_bytes = report.sbom_bytes,
                cve_bytes = report.cve_bytes,
                duration_ms = report.duration_ms,
                "scan report"
            ),
            ReportStatus::Failed => warn!(
                image = %image,
                run_id = report.run_id.as_deref().unwrap_or("-"),
                stages = %report.stages,
                correlation_ids = ?report.correlation_ids,
                error_kind = report.error.as_ref().map(|e| e.kind.as_str()),
                error = report.error.as_ref().map(|e| e.message.as_str()),
                duration_ms = report.duration_ms,
                "scan report"
            ),
        }
        Ok(())
    }
}

/// 웹훅 알림
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    /// 요청 제한 시간을 가진 HTTP 클라이언트를 만듭니다.
    ///
    /// # Errors
    ///
    /// URL 스킴이 http(s)가 아니거나 클라이언트 생성 실패 시 `NotifyError::Transport`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Transport(format!(
                "webhook url must start with http:// or https://: '{url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self { client, url })
    }

    /// 대상 URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for HttpNotifier {
    async fn report(&self, image: &ImageIdentity, report: &ScanReport) -> Result<(), NotifyError> {
        debug!(image = %image, url = %self.url, "posting scan report");

        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
