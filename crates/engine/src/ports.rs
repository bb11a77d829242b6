//! External collaborators of the orchestrator.
//!
//! Each trait has exactly one operation so that production adapters
//! (see [`crate::adapters`]) and test doubles are interchangeable.
//!
//! ```text
//!              ┌──────────────────┐
//!              │ ScanOrchestrator │
//!              └────────┬─────────┘
//!     ┌──────────┬──────┴─────┬───────────┐
//!     ▼          ▼            ▼           ▼
//! SbomGenerator CveResolver ArtifactStore Notifier   (traits)
//!     │          │            │           │
//!   syft       grype     memory/file   log/http
//! ```
//!
//! All traits are `Send + Sync + 'static` and return `Send` futures so the
//! orchestrator can call them from spawned worker tasks.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{NotifyError, StoreError, ToolError};
use crate::image::ImageIdentity;
use crate::types::{ArtifactKind, CveManifest, ScanReport, Sbom};

/// Produces an SBOM for an image.
pub trait SbomGenerator: Send + Sync + 'static {
    /// Generates an SBOM for `image`.
    ///
    /// `deadline` is the time budget the orchestrator enforces around the
    /// call; adapters may pass it on to the underlying tool.
    ///
    /// # Errors
    ///
    /// Any `ToolError`. `ToolError::Timeout` is reported as a stage timeout.
    fn generate(
        &self,
        image: &ImageIdentity,
        deadline: Duration,
    ) -> impl Future<Output = Result<Sbom, ToolError>> + Send;
}

/// Derives a CVE manifest from an SBOM.
pub trait CveResolver: Send + Sync + 'static {
    /// Resolves vulnerabilities for the components listed in `sbom`.
    ///
    /// # Errors
    ///
    /// Any `ToolError`. `ToolError::Timeout` is reported as a stage timeout.
    fn resolve(
        &self,
        image: &ImageIdentity,
        sbom: &Sbom,
        deadline: Duration,
    ) -> impl Future<Output = Result<CveManifest, ToolError>> + Send;
}

/// Key-value persistence for scan artifacts.
///
/// Implementations must write artifacts whole or not at all. A later `put`
/// for the same key replaces the earlier value.
pub trait ArtifactStore: Send + Sync + 'static {
    /// Reads an artifact. `Ok(None)` means absent.
    fn get(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
    ) -> impl Future<Output = Result<Option<Bytes>, StoreError>> + Send;

    /// Writes an artifact.
    fn put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Receives exactly one report per finished run or cache answer.
///
/// Delivery is best effort: the orchestrator logs and counts failures but
/// never fails a scan because of them.
pub trait Notifier: Send + Sync + 'static {
    fn report(
        &self,
        image: &ImageIdentity,
        report: &ScanReport,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}
