//! 프로세스 메모리 아티팩트 저장소
//!
//! 재시작하면 내용이 사라집니다. 기본 백엔드이며 테스트에서도 사용됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::image::ImageIdentity;
use crate::ports::ArtifactStore;
use crate::types::ArtifactKind;

type Key = (String, ArtifactKind);

/// 메모리 저장소
///
/// 복제하면 같은 내용을 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: Arc<RwLock<HashMap<Key, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 아티팩트 수
    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    async fn get(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
    ) -> Result<Option<Bytes>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(&(image.canonical(), kind)).cloned())
    }

    async fn put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> Result<(), StoreError> {
        self.artifacts
            .write()
            .await
            .insert((image.canonical(), kind), content);
        Ok(())
    }
}
