use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::{Builder, TempPath};
use tokio::fs;

use crate::formats::extension_for;

const UPLOAD_PREFIX: &str = "convertly_upload_";
const OUTPUT_PREFIX: &str = "convertly_output_";

pub async fn ensure_work_root(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create work root at {}", path.display()))
}

/// Output location for a job. Namespaced by id so concurrent jobs never collide.
pub fn job_output_path(work_root: &Path, job_id: &str, target_format: &str) -> PathBuf {
    work_root.join(format!(
        "{OUTPUT_PREFIX}{job_id}{}",
        extension_for(target_format)
    ))
}

/// Writes `bytes` to a fresh temp file under `work_root`. The file is removed
/// when the returned path is dropped.
pub fn write_temp_input(work_root: &Path, suffix: &str, bytes: &[u8]) -> Result<TempPath> {
    let mut file = Builder::new()
        .prefix(UPLOAD_PREFIX)
        .suffix(suffix)
        .tempfile_in(work_root)
        .with_context(|| format!("Failed to create temp file in {}", work_root.display()))?;
    file.write_all(bytes)
        .context("Failed to write temp input")?;
    file.flush().context("Failed to flush temp input")?;
    Ok(file.into_temp_path())
}

pub async fn delete_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}
