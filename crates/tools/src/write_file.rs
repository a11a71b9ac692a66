//! File write tool — create or overwrite a text file.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use wela_core::error::ToolError;
use wela_core::tool::Tool;

pub struct WriteFileTool {
    /// Relative paths resolve against this directory; absolute paths and
    /// `..` may not leave it. `None` = no restriction.
    root: Option<PathBuf>,
}

impl WriteFileTool {
    /// A tool with no path restrictions.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// A tool confined to `root`.
    pub fn confined_to(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, file_path: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(file_path);
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        if path.is_absolute() {
            return if path.starts_with(root) {
                Ok(path.to_path_buf())
            } else {
                Err(denied(format!("{file_path} is outside {}", root.display())))
            };
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(denied(format!("{file_path} escapes {}", root.display())));
        }
        Ok(root.join(path))
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

fn denied(reason: String) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: "write_file".into(),
        reason,
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "write_file".into(),
        reason,
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file (and missing parent directories) if it doesn't exist, overwrites it if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The full path and name of the file, including its extension"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::invalid("write_file", "missing 'file_path'"))?;

        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("write_file", "missing 'content'"))?;

        let path = self.resolve(file_path)?;

        if path.is_dir() {
            return Err(failed(format!("{file_path} is a directory")));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("cannot create {}: {e}", parent.display())))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| failed(e.to_string()))?;

        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(format!(
            "File written successfully:\nPath: {}\nSize: {} bytes",
            path.display(),
            content.len()
        ))
    }
}
