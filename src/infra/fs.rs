//! # File System Operations Module / 文件系统操作模块
//!
//! Small helpers for writing configuration files and reports.
//!
//! 用于写入配置文件和报告的小型辅助函数。

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Creates the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

/// Writes `contents` to a temporary file next to `path`, then renames it into
/// place, so readers never observe a half-written file.
///
/// 先将 `contents` 写入 `path` 旁边的临时文件，然后重命名到目标位置，
/// 使读取方永远不会看到写了一半的文件。
pub fn write_file_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("Failed to resolve the current directory")?,
    };

    let mut temp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    temp.write_all(contents)
        .context("Failed to write the temporary file")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move the temporary file to {}", path.display()))?;
    Ok(())
}
