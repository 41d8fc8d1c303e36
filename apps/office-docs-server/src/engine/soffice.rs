//! Local headless soffice backend
//!
//! Each export is a separate `soffice --headless --convert-to` run over a
//! scratch directory owned by the engine session. The command line offers no
//! way to merge documents, so joining is unsupported here.

use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{EngineConnector, EngineError, OfficeEngine};
use crate::filters::extension_for_filter;

const INPUT_STEM: &str = "document";

/// Spawns soffice sessions
pub struct SofficeConnector {
    binary: String,
}

impl SofficeConnector {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EngineConnector for SofficeConnector {
    fn describe(&self) -> String {
        format!("local {}", self.binary)
    }

    async fn connect(&self) -> Result<Box<dyn OfficeEngine>, EngineError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| EngineError::Connection(format!("Failed to execute {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(EngineError::Connection(format!(
                "{} --version failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        tracing::debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "soffice available"
        );

        Ok(Box::new(SofficeEngine {
            binary: self.binary.clone(),
            scratch: TempDir::new()?,
            input: None,
        }))
    }
}

/// Engine session running soffice on a private scratch directory
pub struct SofficeEngine {
    binary: String,
    scratch: TempDir,
    input: Option<PathBuf>,
}

#[async_trait]
impl OfficeEngine for SofficeEngine {
    async fn put_document(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        let path = self.scratch.path().join(INPUT_STEM);
        tokio::fs::write(&path, data).await?;
        self.input = Some(path);
        Ok(())
    }

    async fn join_documents(&mut self, _documents: Vec<Vec<u8>>) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("joining documents requires the bridge engine"))
    }

    async fn save_by_stream(&mut self, filter: &str) -> Result<Vec<u8>, EngineError> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| EngineError::Rejected("no open document".to_string()))?;
        let extension = extension_for_filter(filter)
            .ok_or_else(|| EngineError::Rejected(format!("unknown export filter {}", filter)))?;

        let out_dir = self.scratch.path().join("out");
        tokio::fs::create_dir_all(&out_dir).await?;
        let profile = self.scratch.path().join("profile");

        let output = Command::new(&self.binary)
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--headless")
            .arg("--convert-to")
            .arg(format!("{}:{}", extension, filter))
            .arg("--outdir")
            .arg(&out_dir)
            .arg(input)
            .output()
            .await
            .map_err(|e| EngineError::Transport(format!("Failed to execute {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(EngineError::Rejected(format!(
                "soffice conversion failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let converted = out_dir.join(format!("{}.{}", INPUT_STEM, extension));
        let data = tokio::fs::read(&converted).await.map_err(|e| {
            EngineError::Rejected(format!("Output not generated at {}: {}", converted.display(), e))
        })?;
        let _ = tokio::fs::remove_file(&converted).await;
        Ok(data)
    }

    async fn close_document(&mut self) -> Result<(), EngineError> {
        if let Some(input) = self.input.take() {
            let _ = tokio::fs::remove_file(input).await;
        }
        Ok(())
    }
}
