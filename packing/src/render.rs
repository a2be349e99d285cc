//! Renderer seam and the plain-text container renderer.
//!
//! The budgeted writer owns all byte/length tallies. A renderer only
//! answers "how big would this file be once rendered" and "write it".

use crate::model::FileRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Characters kept per rendered line; longer lines are cut and marked.
pub const MAX_LINE_CHARS: usize = 110;

/// Extension used for text containers.
pub const CONTAINER_EXTENSION: &str = "txt";

/// Errors raised by a renderer for a single file or container.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Renderer rejected {path}: {reason}")]
    Rejected { path: String, reason: String },
}

/// Estimated cost of adding one file to a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub bytes: u64,
    /// Length proxy (rendered lines).
    pub length: u64,
}

/// A materialized container once closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub path: PathBuf,
    pub bytes_on_disk: u64,
}

/// Produces one container per group.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh container named after the group.
    async fn open(&self, group_name: &str) -> Result<Box<dyn Container>, RenderError>;
}

/// One open output artifact. Files arrive in alphabetical order.
#[async_trait]
pub trait Container: Send {
    async fn estimate_contribution(&mut self, file: &FileRecord)
        -> Result<Contribution, RenderError>;

    async fn write_file(&mut self, file: &FileRecord) -> Result<(), RenderError>;

    async fn finish(self: Box<Self>) -> Result<ContainerInfo, RenderError>;

    /// Drop the container without materializing it. Used when no file made it in.
    async fn discard(self: Box<Self>) -> Result<(), RenderError>;
}

/// Writes `<output_dir>/<group>.txt` containers.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    output_dir: PathBuf,
}

impl TextRenderer {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn container_path(&self, group_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{group_name}.{CONTAINER_EXTENSION}"))
    }
}

#[async_trait]
impl Renderer for TextRenderer {
    async fn open(&self, group_name: &str) -> Result<Box<dyn Container>, RenderError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.container_path(group_name);
        let file = tokio::fs::File::create(&path).await?;
        Ok(Box::new(TextContainer {
            path,
            out: BufWriter::new(file),
            pending: None,
        }))
    }
}

struct TextContainer {
    path: PathBuf,
    out: BufWriter<tokio::fs::File>,
    /// Last estimated block, reused by the matching write.
    pending: Option<(String, String)>,
}

impl TextContainer {
    async fn rendered(&mut self, file: &FileRecord) -> Result<String, RenderError> {
        if let Some((rel, block)) = &self.pending {
            if *rel == file.relative_path {
                return Ok(block.clone());
            }
        }
        let raw = tokio::fs::read(&file.path).await?;
        let content = String::from_utf8_lossy(&raw);
        let block = render_block(file, &content);
        self.pending = Some((file.relative_path.clone(), block.clone()));
        Ok(block)
    }
}

#[async_trait]
impl Container for TextContainer {
    async fn estimate_contribution(
        &mut self,
        file: &FileRecord,
    ) -> Result<Contribution, RenderError> {
        let block = self.rendered(file).await?;
        Ok(Contribution {
            bytes: block.len() as u64,
            length: block.lines().count() as u64,
        })
    }

    async fn write_file(&mut self, file: &FileRecord) -> Result<(), RenderError> {
        let block = self.rendered(file).await?;
        self.pending = None;
        self.out.write_all(block.as_bytes()).await?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<ContainerInfo, RenderError> {
        self.out.flush().await?;
        self.out.get_mut().sync_all().await?;
        let bytes_on_disk = tokio::fs::metadata(&self.path).await?.len();
        Ok(ContainerInfo {
            path: self.path,
            bytes_on_disk,
        })
    }

    async fn discard(self: Box<Self>) -> Result<(), RenderError> {
        let Self { path, out, .. } = *self;
        drop(out);
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}

/// Header, content with long lines truncated, blank separator.
pub fn render_block(file: &FileRecord, content: &str) -> String {
    let mut block = String::with_capacity(content.len() + 128);
    block.push_str(&format!("File: {}\n", file.relative_path));
    block.push_str(&format!(
        "Type: {} | Size: {} bytes\n\n",
        file.category, file.size_bytes
    ));
    for line in content.lines() {
        if line.chars().count() > MAX_LINE_CHARS {
            block.extend(line.chars().take(MAX_LINE_CHARS));
            block.push_str("...");
        } else {
            block.push_str(line);
        }
        block.push('\n');
    }
    block.push('\n');
    block
}
