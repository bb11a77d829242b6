//! 컨테이너 이미지 참조 정규화
//!
//! [`ImageIdentity`]는 캐시와 진행 중 실행(in-flight) 테이블의 키입니다.
//! 같은 이미지를 가리키는 여러 표기(`alpine`, `docker.io/library/alpine:latest`,
//! `index.docker.io/library/alpine`)는 모두 같은 값으로 정규화됩니다.
//!
//! # 정규화 규칙
//!
//! - 레지스트리가 없으면 `docker.io`, 한 단계짜리 Docker Hub 저장소는 `library/` 접두어
//! - `index.docker.io`, `registry-1.docker.io` → `docker.io`
//! - 레지스트리 호스트는 소문자로 변환, 저장소 경로는 소문자만 허용
//! - 태그와 다이제스트가 모두 없으면 태그 `latest`
//! - 다이제스트가 있으면 태그는 키에서 제외

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Docker Hub 정규 레지스트리 이름
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// 태그가 없을 때 사용하는 기본 태그
pub const DEFAULT_TAG: &str = "latest";

const DOCKER_HUB_ALIASES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];
const MAX_TAG_LEN: usize = 128;
const MAX_REFERENCE_LEN: usize = 4096;

/// 태그 또는 다이제스트
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageReference {
    /// `:tag`
    Tag(String),
    /// `@algorithm:hex`
    Digest(String),
}

/// 정규화된 이미지 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageIdentity {
    registry: String,
    repository: String,
    reference: ImageReference,
}

impl ImageIdentity {
    /// 이미지 참조 문자열을 파싱하고 정규화합니다.
    ///
    /// # Errors
    ///
    /// 형식이 잘못된 경우 `ScanError::InvalidImageReference`
    pub fn parse(raw: &str) -> Result<Self, ScanError> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(ScanError::invalid_reference(raw, "image reference is empty"));
        }
        if input.len() > MAX_REFERENCE_LEN {
            return Err(ScanError::invalid_reference(
                raw,
                format!("image reference exceeds {MAX_REFERENCE_LEN} bytes"),
            ));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(ScanError::invalid_reference(
                raw,
                "image reference contains whitespace",
            ));
        }

        let (name_part, digest) = match input.split_once('@') {
            Some((name, digest)) => (name, Some(normalize_digest(raw, digest)?)),
            None => (input, None),
        };

        // 마지막 '/' 뒤의 ':'만 태그 구분자 (앞쪽은 레지스트리 포트)
        let last_slash = name_part.rfind('/');
        let (name, tag) = match name_part.rfind(':') {
            Some(i) if last_slash.is_none_or(|s| i > s) => {
                (&name_part[..i], Some(&name_part[i + 1..]))
            }
            _ => (name_part, None),
        };
        if let Some(tag) = tag {
            validate_tag(raw, tag)?;
        }

        let (registry, repository) = split_registry(name);
        let registry = normalize_registry(raw, registry)?;
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository.to_owned()
        };
        validate_repository(raw, &repository)?;

        let reference = match digest {
            Some(digest) => ImageReference::Digest(digest),
            None => ImageReference::Tag(tag.unwrap_or(DEFAULT_TAG).to_owned()),
        };

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// 레지스트리 호스트 (`docker.io`, `ghcr.io`, `localhost:5000`)
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// 저장소 경로 (`library/alpine`)
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// 태그 또는 다이제스트
    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    /// 태그 (다이제스트 참조이면 `None`)
    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            ImageReference::Tag(tag) => Some(tag),
            ImageReference::Digest(_) => None,
        }
    }

    /// 다이제스트 (태그 참조이면 `None`)
    pub fn digest(&self) -> Option<&str> {
        match &self.reference {
            ImageReference::Digest(digest) => Some(digest),
            ImageReference::Tag(_) => None,
        }
    }

    /// 정규 문자열 표현 (`docker.io/library/alpine:latest`)
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            ImageReference::Tag(tag) => write!(f, "{}/{}:{}", self.registry, self.repository, tag),
            ImageReference::Digest(digest) => {
                write!(f, "{}/{}@{}", self.registry, self.repository, digest)
            }
        }
    }
}

impl FromStr for ImageIdentity {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 첫 경로 요소가 호스트처럼 보이면 레지스트리로 취급합니다.
fn split_registry(name: &str) -> (&str, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first, rest)
        }
        _ => (DEFAULT_REGISTRY, name),
    }
}

fn normalize_registry(raw: &str, registry: &str) -> Result<String, ScanError> {
    let registry = registry.to_ascii_lowercase();
    if DOCKER_HUB_ALIASES.contains(&registry.as_str()) {
        return Ok(DEFAULT_REGISTRY.to_owned());
    }

    let (host, port) = match registry.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (registry.as_str(), None),
    };
    if host.is_empty()
        || host.starts_with(['.', '-'])
        || host.ends_with(['.', '-'])
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ScanError::invalid_reference(
            raw,
            format!("invalid registry host '{host}'"),
        ));
    }
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(ScanError::invalid_reference(
                raw,
                format!("invalid registry port '{port}'"),
            ));
        }
    }
    Ok(registry)
}

fn validate_repository(raw: &str, repository: &str) -> Result<(), ScanError> {
    for segment in repository.split('/') {
        if segment.is_empty() {
            return Err(ScanError::invalid_reference(
                raw,
                "repository contains an empty path segment",
            ));
        }
        if segment.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ScanError::invalid_reference(
                raw,
                "repository must be lowercase",
            ));
        }
        let valid = segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        let starts_ok = segment
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        if !valid || !starts_ok {
            return Err(ScanError::invalid_reference(
                raw,
                format!("invalid repository path segment '{segment}'"),
            ));
        }
    }
    Ok(())
}

fn validate_tag(raw: &str, tag: &str) -> Result<(), ScanError> {
    let mut chars = tag.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok || tag.len() > MAX_TAG_LEN {
        return Err(ScanError::invalid_reference(
            raw,
            format!("invalid tag '{tag}'"),
        ));
    }
    Ok(())
}

fn normalize_digest(raw: &str, digest: &str) -> Result<String, ScanError> {
    let Some((algorithm, hex)) = digest.split_once(':') else {
        return Err(ScanError::invalid_reference(
            raw,
            "digest must be '<algorithm>:<hex>'",
        ));
    };
    let algorithm = algorithm.to_ascii_lowercase();
    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-'))
    {
        return Err(ScanError::invalid_reference(
            raw,
            format!("invalid digest algorithm '{algorithm}'"),
        ));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ScanError::invalid_reference(
            raw,
            "digest is not hex encoded",
        ));
    }
    let expected_ok = if algorithm == "sha256" {
        hex.len() == 64
    } else {
        hex.len() >= 32
    };
    if !expected_ok {
        return Err(ScanError::invalid_reference(
            raw,
            format!("digest has wrong length for {algorithm}"),
        ));
    }
    Ok(format!("{algorithm}:{}", hex.to_ascii_lowercase()))
}
