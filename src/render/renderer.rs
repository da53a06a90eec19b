//! Renderer adapters
//!
//! The layout engine is an external collaborator reached only through the
//! [`DiagramRenderer`] trait. [`CommandRenderer`] drives the PlantUML CLI in
//! pipe mode: source on stdin, artifact on stdout.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::diagram::{DiagramSource, RenderError, RenderResult, RenderedDiagram};

/// Renderer trait
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Version tag folded into every fingerprint
    fn version_tag(&self) -> &str;

    /// Render a normalized diagram
    async fn render(&self, source: &DiagramSource) -> RenderResult<RenderedDiagram>;
}

/// PlantUML command-line renderer
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    base_args: Vec<String>,
    version_tag: String,
}

impl CommandRenderer {
    pub fn new(
        program: impl Into<String>,
        base_args: Vec<String>,
        version_tag: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            base_args,
            version_tag: version_tag.into(),
        }
    }

    /// Ask the PlantUML binary for its version
    ///
    /// The first non-empty line of `-version` output becomes the tag, e.g.
    /// `PlantUML version 1.2024.7 (...)`.
    pub async fn detect_version(program: &str, base_args: &[String]) -> RenderResult<String> {
        let output = Command::new(program)
            .args(base_args)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError::Unavailable(format!("failed to run {}: {}", program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RenderError::Unavailable(format!("{} -version printed nothing", program)))
    }

    fn command_for(&self, source: &DiagramSource) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg("-pipe")
            .arg(format!("-t{}", source.format().as_str()))
            .arg("-charset")
            .arg("UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out or abandoned render must not leave the JVM behind
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl DiagramRenderer for CommandRenderer {
    fn version_tag(&self) -> &str {
        &self.version_tag
    }

    async fn render(&self, source: &DiagramSource) -> RenderResult<RenderedDiagram> {
        let started = Instant::now();

        let mut child = self
            .command_for(source)
            .spawn()
            .map_err(|e| RenderError::Unavailable(format!("failed to spawn {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Internal("renderer stdin not captured".to_string()))?;
        let text = source.text().as_bytes().to_vec();

        // Feed stdin concurrently with draining stdout so large sources cannot
        // deadlock on full pipes
        let writer = async move {
            stdin.write_all(&text).await?;
            stdin.shutdown().await
        };
        let (write_result, output) = tokio::join!(writer, child.wait_with_output());

        let output = output
            .map_err(|e| RenderError::LayoutFault(format!("renderer process failed: {}", e)))?;
        if let Err(e) = write_result {
            tracing::debug!(error = %e, "Renderer closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(output.status.code(), &stderr));
        }

        if output.stdout.is_empty() {
            return Err(RenderError::LayoutFault("renderer produced no output".to_string()));
        }

        Ok(RenderedDiagram::new(
            output.stdout,
            source.format(),
            started.elapsed(),
        ))
    }
}

/// Map a failed PlantUML run to a render error
///
/// In pipe mode PlantUML reports syntax problems on stderr as
/// `ERROR`, the 1-based line number, then the message.
fn classify_failure(code: Option<i32>, stderr: &str) -> RenderError {
    let mut lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() == Some("ERROR") {
        let line = lines.next().and_then(|l| l.parse::<usize>().ok());
        let message = lines.collect::<Vec<_>>().join(" ");
        return RenderError::Syntax {
            line,
            message: if message.is_empty() {
                "Syntax Error?".to_string()
            } else {
                message
            },
        };
    }

    match code {
        Some(code) => RenderError::LayoutFault(format!("renderer exited with status {}", code)),
        None => RenderError::LayoutFault("renderer terminated by signal".to_string()),
    }
}
