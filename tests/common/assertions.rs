//! Filesystem assertions over the output tree

use std::path::Path;
use walkdir::WalkDir;

/// Every file under `root`, as sorted `/`-separated relative paths
pub fn files_under(root: &Path) -> Vec<String> {
    if !root.exists() {
        return Vec::new();
    }
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Read a log file from the temp dir's `logs` folder
pub fn read_log(root: &Path, name: &str) -> String {
    std::fs::read_to_string(root.join("logs").join(name)).unwrap()
}
