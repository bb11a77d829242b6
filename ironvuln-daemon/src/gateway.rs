//! HTTP gateway.
//!
//! Translates HTTP requests into [`ScanRequest`]s and orchestrator results
//! into JSON responses.
//!
//! # Routes
//!
//! | Method | Path               | Stages             |
//! |--------|--------------------|--------------------|
//! | GET    | `/v1/ready`        | readiness + stats  |
//! | POST   | `/v1/generateSBOM` | SBOM only          |
//! | POST   | `/v1/scanImage`    | SBOM then CVE      |
//!
//! Scan requests are fire-and-forget by default and answer `202 Accepted`
//! once admitted. With `"wait": true` the handler holds the connection
//! until the run finishes and returns the artifacts.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use ironvuln_engine::ports::{ArtifactStore, CveResolver, Notifier, SbomGenerator};
use ironvuln_engine::{
    OrchestratorStats, ScanError, ScanOrchestrator, ScanOutcome, ScanRequest, StageSet,
    WorkloadMetadata,
};

/// Path of the readiness endpoint.
pub const READY_PATH: &str = "/v1/ready";
/// Path of the SBOM-only scan.
pub const GENERATE_SBOM_PATH: &str = "/v1/generateSBOM";
/// Path of the SBOM + CVE scan.
pub const SCAN_IMAGE_PATH: &str = "/v1/scanImage";

/// Scan request body shared by both scan routes.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanBody {
    /// Image reference as written by the caller.
    pub image: String,
    /// Caller correlation id; generated when absent.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Workload running the image, echoed into the completion report.
    #[serde(default)]
    pub workload: Option<WorkloadMetadata>,
    /// Hold the connection until the run finishes.
    #[serde(default)]
    pub wait: bool,
}

/// `202 Accepted` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub correlation_id: String,
    pub image: String,
    /// Run the request was attached to (`None` when served from the store)
    pub run_id: Option<String>,
    pub joined_existing: bool,
    pub from_cache: bool,
}

/// `200 OK` body of a waited scan.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub correlation_id: String,
    pub image: String,
    pub from_cache: bool,
    pub persisted: bool,
    /// SBOM document; embedded as JSON when it parses, otherwise as a string
    pub sbom: serde_json::Value,
    pub cve: Option<serde_json::Value>,
}

/// Error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error returned by gateway handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: kind.to_owned(),
                message: message.into(),
            },
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        let status = match &err {
            ScanError::InvalidImageReference { .. } => StatusCode::BAD_REQUEST,
            ScanError::ShutdownInProgress => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ScanError::SbomGeneration(_) | ScanError::CveResolution(_) => StatusCode::BAD_GATEWAY,
            ScanError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build the gateway router around an orchestrator.
pub fn router<G, R, S, N>(orchestrator: ScanOrchestrator<G, R, S, N>) -> Router
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    Router::new()
        .route(READY_PATH, get(ready::<G, R, S, N>))
        .route(GENERATE_SBOM_PATH, post(generate_sbom::<G, R, S, N>))
        .route(SCAN_IMAGE_PATH, post(scan_image::<G, R, S, N>))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

async fn ready<G, R, S, N>(
    State(orchestrator): State<ScanOrchestrator<G, R, S, N>>,
) -> (StatusCode, Json<OrchestratorStats>)
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    let status = if orchestrator.ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(orchestrator.stats()))
}

async fn generate_sbom<G, R, S, N>(
    State(orchestrator): State<ScanOrchestrator<G, R, S, N>>,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> Result<Response, ApiError>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    let Json(body) = body?;
    submit(&orchestrator, body, StageSet::SbomOnly).await
}

async fn scan_image<G, R, S, N>(
    State(orchestrator): State<ScanOrchestrator<G, R, S, N>>,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> Result<Response, ApiError>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    let Json(body) = body?;
    submit(&orchestrator, body, StageSet::SbomAndCve).await
}

async fn submit<G, R, S, N>(
    orchestrator: &ScanOrchestrator<G, R, S, N>,
    body: ScanBody,
    stages: StageSet,
) -> Result<Response, ApiError>
where
    G: SbomGenerator,
    R: CveResolver,
    S: ArtifactStore,
    N: Notifier,
{
    let mut request = ScanRequest::new(body.image, stages);
    if let Some(id) = body.correlation_id {
        request = request.with_correlation_id(id);
    }
    if let Some(workload) = body.workload {
        request = request.with_workload(workload);
    }
    let correlation_id = request.correlation_id().to_owned();

    let handle = orchestrator.submit(request).await?;
    let image = handle.image().canonical();

    if !body.wait {
        tracing::debug!(
            image = %image,
            correlation_id = %correlation_id,
            joined = handle.joined_existing(),
            "scan accepted"
        );
        let accepted = AcceptedResponse {
            correlation_id,
            image,
            run_id: handle.run_id().map(|id| id.to_string()),
            joined_existing: handle.joined_existing(),
            from_cache: handle.is_ready(),
        };
        // 핸들을 놓아도 실행은 계속된다
        return Ok((StatusCode::ACCEPTED, Json(accepted)).into_response());
    }

    let outcome = handle.wait().await?;
    Ok((StatusCode::OK, Json(scan_response(correlation_id, outcome))).into_response())
}

fn scan_response(correlation_id: String, outcome: ScanOutcome) -> ScanResponse {
    ScanResponse {
        correlation_id,
        image: outcome.image.canonical(),
        from_cache: outcome.from_cache,
        persisted: outcome.persisted(),
        sbom: embed(outcome.sbom.as_bytes()),
        cve: outcome.cve.as_ref().map(|cve| embed(cve.as_bytes())),
    }
}

fn embed(document: &[u8]) -> serde_json::Value {
    serde_json::from_slice(document)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(document).into_owned()))
}
