//! 스캔 도메인 타입
//!
//! 요청([`ScanRequest`]), 산출물([`Sbom`], [`CveManifest`]), 결과([`ScanOutcome`]),
//! 알림 본문([`ScanReport`])을 정의합니다.
//! SBOM과 CVE 매니페스트는 엔진 입장에서 불투명한 바이트 페이로드입니다.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::image::ImageIdentity;

/// 요청된 파이프라인 단계 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSet {
    /// SBOM 생성만
    SbomOnly,
    /// SBOM 생성 후 CVE 분석
    SbomAndCve,
}

impl StageSet {
    /// CVE 단계를 포함하는지 여부
    pub fn includes_cve(self) -> bool {
        matches!(self, Self::SbomAndCve)
    }

    /// 두 집합을 합칩니다 (합류한 요청이 CVE를 원하면 확장).
    pub fn union(self, other: Self) -> Self {
        if self.includes_cve() || other.includes_cve() {
            Self::SbomAndCve
        } else {
            Self::SbomOnly
        }
    }

    /// 레이블 문자열
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SbomOnly => "sbom_only",
            Self::SbomAndCve => "sbom_and_cve",
        }
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 이미지를 실행 중인 워크로드 정보 (알림에 그대로 전달)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadMetadata {
    /// 클러스터 이름
    pub cluster: String,
    /// 네임스페이스
    pub namespace: String,
    /// 워크로드 종류 (Deployment, DaemonSet, ...)
    pub kind: String,
    /// 워크로드 이름
    pub name: String,
    /// 컨테이너 이름
    pub container: String,
}

/// 스캔 요청 (생성 후 변경 불가)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    image: String,
    correlation_id: String,
    workload: Option<WorkloadMetadata>,
    stages: StageSet,
}

impl ScanRequest {
    /// 새 요청을 생성합니다. 상관 ID는 UUID v4로 생성됩니다.
    pub fn new(image: impl Into<String>, stages: StageSet) -> Self {
        Self {
            image: image.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            workload: None,
            stages,
        }
    }

    /// 호출자가 준 상관 ID를 사용합니다 (비어 있으면 무시).
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.correlation_id = id;
        }
        self
    }

    /// 워크로드 정보를 붙입니다.
    pub fn with_workload(mut self, workload: WorkloadMetadata) -> Self {
        self.workload = Some(workload);
        self
    }

    /// 원본 이미지 참조 문자열
    pub fn image(&self) -> &str {
        &self.image
    }

    /// 상관 ID
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// 워크로드 정보
    pub fn workload(&self) -> Option<&WorkloadMetadata> {
        self.workload.as_ref()
    }

    /// 요청된 단계
    pub fn stages(&self) -> StageSet {
        self.stages
    }
}

/// 저장소 아티팩트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// SBOM 문서
    Sbom,
    /// CVE 매니페스트
    CveManifest,
}

impl ArtifactKind {
    /// 레이블/디렉토리 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sbom => "sbom",
            Self::CveManifest => "cve",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SBOM 문서 (불투명 바이트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sbom(Bytes);

impl Sbom {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self(content.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// CVE 매니페스트 (불투명 바이트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CveManifest(Bytes);

impl CveManifest {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self(content.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 스캔 성공 결과
///
/// 저장소 쓰기가 실패해도 결과는 성공으로 전달되며,
/// 실패 내용은 `persist_error`로 따로 드러납니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// 대상 이미지
    pub image: ImageIdentity,
    /// SBOM
    pub sbom: Sbom,
    /// CVE 매니페스트 (SBOM 전용 실행이면 `None`)
    pub cve: Option<CveManifest>,
    /// 도구 호출 없이 저장소에서 응답했는지 여부
    pub from_cache: bool,
    /// 아티팩트 저장 실패 (`ScanError::StoreUnavailable`)
    pub persist_error: Option<ScanError>,
}

impl ScanOutcome {
    /// 산출물이 모두 저장소에 기록되었는지 여부
    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// 알림 대상 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Failed,
}

/// 알림에 포함되는 에러 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    /// [`ScanError::kind`]
    pub kind: String,
    /// 사람이 읽는 메시지
    pub message: String,
}

impl From<&ScanError> for ReportError {
    fn from(err: &ScanError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

/// 외부 플랫폼으로 보내는 완료 보고
///
/// 실행 하나당 정확히 한 번 생성됩니다. 합류한 요청들의 상관 ID와
/// 워크로드 정보가 모두 포함됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// 정규화된 이미지 참조
    pub image: String,
    /// 실행 ID (캐시 응답이면 `None`)
    pub run_id: Option<String>,
    /// 요청 상관 ID 목록
    pub correlation_ids: Vec<String>,
    /// 워크로드 목록
    pub workloads: Vec<WorkloadMetadata>,
    /// 수행된 단계 집합
    pub stages: StageSet,
    /// 최종 상태
    pub status: ReportStatus,
    /// 실패 사유
    pub error: Option<ReportError>,
    /// 저장소에서 응답했는지 여부
    pub from_cache: bool,
    /// 산출물이 저장되었는지 여부
    pub persisted: bool,
    /// SBOM 크기 (바이트)
    pub sbom_bytes: Option<usize>,
    /// CVE 매니페스트 크기 (바이트)
    pub cve_bytes: Option<usize>,
    /// 실행 소요 시간 (밀리초)
    pub duration_ms: u64,
}

impl ScanReport {
    /// 최종 결과에서 보고서를 만듭니다.
    pub fn from_result(
        image: &ImageIdentity,
        stages: StageSet,
        result: &Result<ScanOutcome, ScanError>,
    ) -> Self {
        let mut report = Self {
            image: image.canonical(),
            run_id: None,
            correlation_ids: Vec::new(),
            workloads: Vec::new(),
            stages,
            status: ReportStatus::Completed,
            error: None,
            from_cache: false,
            persisted: true,
            sbom_bytes: None,
            cve_bytes: None,
            duration_ms: 0,
        };
        match result {
            Ok(outcome) => {
                report.from_cache = outcome.from_cache;
                report.persisted = outcome.persisted();
                report.sbom_bytes = Some(outcome.sbom.len());
                report.cve_bytes = outcome.cve.as_ref().map(CveManifest::len);
            }
            Err(err) => {
                report.status = ReportStatus::Failed;
                report.error = Some(ReportError::from(err));
            }
        }
        report
    }
}
