//! Text extraction from identity documents.
//!
//! PDFs go through `pdftotext`, images through `tesseract`, and everything
//! else is read as UTF-8 text. Both tools are plain subprocesses so no
//! native library is linked.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use covenant_core::DocumentKind;

use crate::config::ExtractionConfig;

/// Errors from text extraction. Each one skips a single document.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not run {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed on {path}: {stderr}")]
    ToolFailed {
        tool: String,
        path: PathBuf,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout:?} on {path}")]
    Timeout {
        tool: String,
        path: PathBuf,
        timeout: Duration,
    },

    #[error("{0} is not valid UTF-8 text")]
    InvalidUtf8(PathBuf),

    #[error("No text found in {0}")]
    Empty(PathBuf),
}

/// Turns a document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Extractor backed by `pdftotext`, `tesseract`, and the filesystem.
#[derive(Debug, Clone)]
pub struct FileTextExtractor {
    config: ExtractionConfig,
}

impl FileTextExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    async fn run_tool(
        &self,
        tool: &Path,
        args: &[&OsStr],
        path: &Path,
    ) -> Result<String, ExtractionError> {
        let tool_name = tool.display().to_string();
        let child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::ToolUnavailable {
                tool: tool_name.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractionError::Timeout {
                tool: tool_name.clone(),
                path: path.to_path_buf(),
                timeout: self.config.timeout,
            })?
            .map_err(|source| ExtractionError::ToolUnavailable {
                tool: tool_name.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::ToolFailed {
                tool: tool_name,
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ExtractionError::InvalidUtf8(path.to_path_buf()))
    }

    async fn extract_pdf(&self, path: &Path) -> Result<String, ExtractionError> {
        let raw = self
            .run_tool(
                &self.config.pdftotext,
                &[OsStr::new("-layout"), path.as_os_str(), OsStr::new("-")],
                path,
            )
            .await?;
        Ok(join_pdf_pages(&raw))
    }

    async fn extract_image(&self, path: &Path) -> Result<String, ExtractionError> {
        let raw = self
            .run_tool(
                &self.config.tesseract,
                &[path.as_os_str(), OsStr::new("stdout")],
                path,
            )
            .await?;
        Ok(join_ocr_lines(&raw))
    }
}

impl Default for FileTextExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let kind = DocumentKind::from_path(path);
        tracing::debug!(document = %path.display(), kind = ?kind, "Extracting text");

        let text = match kind {
            DocumentKind::Pdf => self.extract_pdf(path).await?,
            DocumentKind::Image => self.extract_image(path).await?,
            DocumentKind::Text => {
                let bytes = tokio::fs::read(path).await.map_err(|source| ExtractionError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                String::from_utf8(bytes)
                    .map_err(|_| ExtractionError::InvalidUtf8(path.to_path_buf()))?
            }
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(path.to_path_buf()));
        }
        Ok(text)
    }
}

/// `pdftotext` separates pages with form feeds; pages are joined by newlines.
fn join_pdf_pages(raw: &str) -> String {
    raw.split('\x0c')
        .map(str::trim_end)
        .filter(|page| !page.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// OCR fragments are joined by single spaces.
fn join_ocr_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
