use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

/// Files under `dir` (recursively) whose extension is in `extensions`,
/// compared case-insensitively, in a stable path order.
///
/// A missing directory is reported and treated as empty.
pub fn collect_files(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        log::warn!("Source directory {} not found, nothing to scan", dir.display());
        return vec![];
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().is_some_and(|ext| {
                let ext = ext.to_string_lossy();
                extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            })
        })
        .collect()
}

/// Reads a source file, replacing invalid UTF-8 rather than failing.
pub fn read_source(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Applies `scan` to every file and concatenates the rows in file order.
/// Files that cannot be read are skipped.
pub fn scan_files<T, F>(files: &[PathBuf], parallel: bool, scan: F) -> Vec<T>
where
    T: Send,
    F: Fn(&Path, &str) -> Vec<T> + Sync,
{
    let scan_one = |path: &PathBuf| match read_source(path) {
        Ok(text) => {
            let rows = scan(path, &text);
            log::debug!("{}: {} rows", path.display(), rows.len());
            rows
        }
        Err(err) => {
            log::warn!("Skipping unreadable file {}: {}", path.display(), err);
            vec![]
        }
    };

    if parallel {
        files
            .par_iter()
            .map(scan_one)
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    } else {
        files.iter().flat_map(scan_one).collect()
    }
}
