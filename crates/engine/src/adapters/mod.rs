//! 포트 구현체
//!
//! 설정 문자열로 백엔드를 고르는 [`StoreBackend`], [`NotifierBackend`]는
//! 오케스트레이터를 하나의 구체 타입으로 조립할 수 있게 해줍니다.

mod command;
mod file;
mod memory;
mod notify;

pub use command::{CommandCveResolver, CommandSbomGenerator, IMAGE_PLACEHOLDER, ToolCommand};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use notify::{HttpNotifier, LogNotifier};

use std::time::Duration;

use bytes::Bytes;

use ironvuln_core::config::{NotifierConfig, StoreConfig, ToolsConfig};

use crate::error::{EngineError, NotifyError, StoreError};
use crate::image::ImageIdentity;
use crate::ports::{ArtifactStore, Notifier};
use crate::types::{ArtifactKind, ScanReport};

/// 설정으로 선택되는 저장소
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    File(FileStore),
}

impl StoreBackend {
    /// `[store]` 설정에서 저장소를 엽니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 백엔드면 `EngineError::Config`, 디렉토리 생성 실패 시 `EngineError::Store`
    pub async fn from_core(config: &StoreConfig) -> Result<Self, EngineError> {
        match config.backend.as_str() {
            "memory" => Ok(Self::Memory(MemoryStore::new())),
            "file" => Ok(Self::File(FileStore::open(&config.path).await?)),
            other => Err(EngineError::Config {
                field: "store.backend".to_owned(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }

    /// 백엔드 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
        }
    }
}

impl ArtifactStore for StoreBackend {
    async fn get(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
    ) -> Result<Option<Bytes>, StoreError> {
        match self {
            Self::Memory(store) => store.get(image, kind).await,
            Self::File(store) => store.get(image, kind).await,
        }
    }

    async fn put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.put(image, kind, content).await,
            Self::File(store) => store.put(image, kind, content).await,
        }
    }
}

/// 설정으로 선택되는 알림
#[derive(Debug, Clone)]
pub enum NotifierBackend {
    Log(LogNotifier),
    Http(HttpNotifier),
}

impl NotifierBackend {
    /// `[notifier]` 설정에서 알림 백엔드를 만듭니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 백엔드면 `EngineError::Config`, HTTP 클라이언트 생성 실패 시 `EngineError::Notify`
    pub fn from_core(config: &NotifierConfig) -> Result<Self, EngineError> {
        match config.backend.as_str() {
            "log" => Ok(Self::Log(LogNotifier::new())),
            "http" => Ok(Self::Http(HttpNotifier::new(
                config.url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            other => Err(EngineError::Config {
                field: "notifier.backend".to_owned(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Http(_) => "http",
        }
    }
}

impl Notifier for NotifierBackend {
    async fn report(&self, image: &ImageIdentity, report: &ScanReport) -> Result<(), NotifyError> {
        match self {
            Self::Log(notifier) => notifier.report(image, report).await,
            Self::Http(notifier) => notifier.report(image, report).await,
        }
    }
}

/// `[tools]` 설정에서 SBOM 생성기와 CVE 분석기를 만듭니다.
pub fn tools_from_core(config: &ToolsConfig) -> (CommandSbomGenerator, CommandCveResolver) {
    (
        CommandSbomGenerator::new(ToolCommand::new(
            config.sbom_program.clone(),
            config.sbom_args.clone(),
        )),
        CommandCveResolver::new(ToolCommand::new(
            config.cve_program.clone(),
            config.cve_args.clone(),
        )),
    )
}
