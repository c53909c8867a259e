/// JSON dumps of operation results.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes `data` to `{dir}/{label}_{epochMillis}.json` and returns the path.
pub fn save_to_json<T: Serialize + ?Sized>(data: &T, label: &str, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let path = dir.join(file_name(label, chrono::Utc::now().timestamp_millis()));
    let json = serde_json::to_string_pretty(data).context("Failed to serialize results")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), "Saved results");
    Ok(path)
}

fn file_name(label: &str, epoch_millis: i64) -> String {
    format!("{}_{}.json", label, epoch_millis)
}
