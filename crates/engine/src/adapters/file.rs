//! 파일시스템 아티팩트 저장소
//!
//! ```text
//! <root>/sbom/<encoded canonical reference>
//! <root>/cve/<encoded canonical reference>
//! ```
//!
//! 파일 이름은 `[A-Za-z0-9.-]` 외의 바이트를 `_XX`(16진수)로 인코딩합니다.
//! 인코딩 결과가 200바이트를 넘으면 앞부분만 남기고
//! 정규화된 참조의 SHA-256을 붙입니다.
//! 쓰기는 같은 디렉토리의 임시 파일에 기록한 뒤 rename 하므로 읽는 쪽은
//! 이전 값이나 새 값 전체만 보게 됩니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreError;
use crate::image::ImageIdentity;
use crate::ports::ArtifactStore;
use crate::types::ArtifactKind;

/// 파일 이름 최대 길이. 대부분의 파일시스템은 255바이트까지 허용하고
/// 임시 파일 접미사를 위해 여유를 둡니다.
const MAX_FILE_NAME_LEN: usize = 200;

/// 해시 이름에서 인코딩된 참조를 남기는 길이
const HASHED_PREFIX_LEN: usize = MAX_FILE_NAME_LEN - 64 - 1;

/// 파일 저장소
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// 루트 디렉토리와 종류별 하위 디렉토리를 만듭니다.
    ///
    /// # Errors
    ///
    /// 디렉토리 생성 실패 시 `StoreError::Io`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for kind in [ArtifactKind::Sbom, ArtifactKind::CveManifest] {
            let dir = root.join(kind.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| io_error(&dir, source))?;
        }
        debug!(root = %root.display(), "file artifact store opened");
        Ok(Self { root })
    }

    /// 루트 디렉토리
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, image: &ImageIdentity, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(encode_file_name(&image.canonical()))
    }
}

impl ArtifactStore for FileStore {
    async fn get(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
    ) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(image, kind);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    async fn put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> Result<(), StoreError> {
        let path = self.path_for(image, kind);
        let dir = self.root.join(kind.as_str());

        // tempfile은 동기 API이므로 블로킹 풀에서 실행
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &content))
            .await
            .map_err(|e| StoreError::Unavailable(format!("write task failed: {e}")))?
    }
}

fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| io_error(dir, source))?;
    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| io_error(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// 정규화된 참조를 한 단계짜리 파일 이름으로 바꿉니다. 서로 다른 입력은 서로 다른 이름이 됩니다.
fn encode_file_name(canonical: &str) -> String {
    let mut encoded = String::with_capacity(canonical.len() + 8);
    for byte in canonical.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("_{byte:02x}"));
        }
    }
    if encoded.len() <= MAX_FILE_NAME_LEN {
        return encoded;
    }

    // 인코딩 결과는 ASCII이므로 바이트 단위로 잘라도 된다
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    encoded.truncate(HASHED_PREFIX_LEN);
    encoded.push('~');
    encoded.push_str(&digest);
    encoded
}
