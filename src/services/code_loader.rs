//! 源代码载入
//!
//! 调用外部静态分析器解析 Java 项目，返回结构化产物的位置

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::services::doc_generator::{PipelineError, StructuralArtifactHandle};

/// 外部分析器调用器
#[derive(Debug, Clone)]
pub struct CodeModelLoader {
    program: OsString,
    args: Vec<OsString>,
    output_root: PathBuf,
}

impl CodeModelLoader {
    pub fn new(program: impl Into<OsString>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_root: output_root.into(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(&config.program, &config.output_root).args(&config.args)
    }

    /// 追加位于项目目录之前的参数
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 项目对应的产物位置：`<output_root>/<项目目录名>`
    pub fn artifact_location(&self, project_dir: &Path) -> Result<PathBuf, PipelineError> {
        let project_name = project_dir.file_name().ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "project_dir has no final path segment: {}",
                project_dir.display()
            ))
        })?;
        Ok(self.output_root.join(project_name))
    }

    /// 运行分析器并等待结束
    ///
    /// 不解析 stdout，不检查产物是否存在；退出码非零或无法启动时返回 `AnalysisFailed`
    pub async fn load(&self, project_dir: &Path) -> Result<StructuralArtifactHandle, PipelineError> {
        let location = self.artifact_location(project_dir)?;

        info!(
            "Running analyzer: {:?} {:?} {}",
            self.program,
            self.args,
            project_dir.display()
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::AnalysisFailed {
                stderr: format!("failed to launch {:?}: {}", self.program, e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!("Analyzer exited with {}: {}", code, stderr);
            return Err(PipelineError::AnalysisFailed {
                stderr: if stderr.is_empty() {
                    format!("analyzer exited with status {}", code)
                } else {
                    stderr
                },
            });
        }

        if !stderr.is_empty() {
            debug!("Analyzer stderr: {}", stderr);
        }
        info!("Analyzer finished, artifact expected at {}", location.display());

        Ok(StructuralArtifactHandle::new(location))
    }
}
