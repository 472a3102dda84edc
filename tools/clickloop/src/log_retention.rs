use crate::errors::ClickError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest files in `dir` until it fits `budget_bytes`. The live
/// log at `keep` is never removed.
pub fn enforce_total_budget(
    dir: &Path,
    budget_bytes: u64,
    keep: &Path,
) -> Result<Vec<PathBuf>, ClickError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| ClickError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();

    files.sort_by_key(|path| fs::metadata(path).ok().and_then(|m| m.modified().ok()));

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        if path == keep {
            continue;
        }
        let len = fs::metadata(&path)
            .map_err(|e| ClickError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| ClickError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}
