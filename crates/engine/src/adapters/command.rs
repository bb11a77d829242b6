//! 외부 CLI 도구 어댑터 (syft, grype)
//!
//! 인자 안의 `{image}`는 정규화된 이미지 참조로 치환됩니다.
//! CVE 분석기는 SBOM을 표준 입력으로 전달받습니다.
//!
//! 프로세스는 `kill_on_drop`으로 생성되므로 제한 시간 초과나 호출 취소 시 함께 종료됩니다.

use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;
use crate::image::ImageIdentity;
use crate::ports::{CveResolver, SbomGenerator};
use crate::types::{CveManifest, Sbom};

/// 인자 안에서 치환되는 이미지 자리표시자
pub const IMAGE_PLACEHOLDER: &str = "{image}";

/// 에러 메시지에 포함할 stderr 최대 문자 수
const MAX_STDERR_CHARS: usize = 2048;

/// 실행할 프로그램과 인자 템플릿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `{image}`를 치환한 인자 목록
    pub fn render_args(&self, image: &ImageIdentity) -> Vec<String> {
        let canonical = image.canonical();
        self.args
            .iter()
            .map(|arg| arg.replace(IMAGE_PLACEHOLDER, &canonical))
            .collect()
    }

    /// 프로그램을 실행하고 표준 출력을 반환합니다.
    async fn run(
        &self,
        image: &ImageIdentity,
        input: Option<Bytes>,
        deadline: Duration,
    ) -> Result<Bytes, ToolError> {
        let args = self.render_args(image);
        debug!(program = %self.program, args = ?args, image = %image, "launching scan tool");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            let program = self.program.clone();
            // 출력 파이프가 차서 교착되지 않도록 대기와 동시에 기록
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(program = %program, error = %e, "tool closed stdin early");
                }
            });
        }

        let output = tokio::time::timeout(deadline, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(deadline))?
            .map_err(|e| ToolError::Failed(format!("'{}' wait failed: {e}", self.program)))?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(ToolError::Exit {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(ToolError::EmptyOutput {
                program: self.program.clone(),
            });
        }

        debug!(program = %self.program, bytes = output.stdout.len(), "scan tool finished");
        Ok(Bytes::from(output.stdout))
    }
}

/// syft 등 CLI 기반 SBOM 생성기
#[derive(Debug, Clone)]
pub struct CommandSbomGenerator {
    command: ToolCommand,
}

impl CommandSbomGenerator {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

impl SbomGenerator for CommandSbomGenerator {
    async fn generate(&self, image: &ImageIdentity, deadline: Duration) -> Result<Sbom, ToolError> {
        self.command.run(image, None, deadline).await.map(Sbom::new)
    }
}

/// grype 등 CLI 기반 CVE 분석기
#[derive(Debug, Clone)]
pub struct CommandCveResolver {
    command: ToolCommand,
}

impl CommandCveResolver {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

impl CveResolver for CommandCveResolver {
    async fn resolve(
        &self,
        image: &ImageIdentity,
        sbom: &Sbom,
        deadline: Duration,
    ) -> Result<CveManifest, ToolError> {
        self.command
            .run(image, Some(sbom.as_bytes().clone()), deadline)
            .await
            .map(CveManifest::new)
    }
}
