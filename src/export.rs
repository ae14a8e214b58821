use crate::config::{Postprocessing, TaskDefinition};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("postprocessing `{0}` is not supported")]
    Unsupported(Postprocessing),
    #[error("failed to write export {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Location of an exported answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    pub path: String,
    pub filename: String,
}

/// Writes a final answer to a document format
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(
        &self,
        format: Postprocessing,
        content: &str,
        task: &TaskDefinition,
    ) -> Result<ExportedFile, ExportError>;
}

/// Exports answers as Markdown files in a directory
#[derive(Debug, Clone)]
pub struct FileExporter {
    output_dir: PathBuf,
}

impl FileExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn render_markdown(content: &str, task: &TaskDefinition) -> String {
        format!(
            "# {}\n\n_Generated {} by task `{}`_\n\n{}\n",
            task.display_name,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            task.id,
            content.trim_end()
        )
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn export(
        &self,
        format: Postprocessing,
        content: &str,
        task: &TaskDefinition,
    ) -> Result<ExportedFile, ExportError> {
        if format != Postprocessing::MarkdownFile {
            return Err(ExportError::Unsupported(format));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let filename = format!(
            "{}-{}-{}.md",
            task.id,
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            &id[..8]
        );
        let path = self.output_dir.join(&filename);
        let io_error = |source| ExportError::Io {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(io_error)?;
        tokio::fs::write(&path, Self::render_markdown(content, task))
            .await
            .map_err(io_error)?;

        info!("Exported answer of {} to {}", task.id, path.display());
        Ok(ExportedFile {
            path: path.display().to_string(),
            filename,
        })
    }
}
