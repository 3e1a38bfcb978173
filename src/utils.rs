//! Utility functions for output paths and collision-free file creation

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of suffixes tried when resolving file name collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Make a remote-supplied name safe to use as a single path component
///
/// Path separators and NUL bytes are replaced with `_`, and names that would
/// escape or alias their directory (`""`, `"."`, `".."`) become `fallback`.
/// Ordinary names such as `"TC-1"` or `"screen shot.png"` are returned unchanged.
///
/// # Examples
///
/// ```
/// use evidence_dl::utils::sanitize_segment;
///
/// assert_eq!(sanitize_segment("EXE-7", "run"), "EXE-7");
/// assert_eq!(sanitize_segment("../../etc/passwd", "evidence"), ".._.._etc_passwd");
/// assert_eq!(sanitize_segment("..", "evidence"), "evidence");
/// ```
#[must_use]
pub fn sanitize_segment(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Candidate name number `n` for `file_name`: `name.ext` → `name_<n>.ext`
///
/// `n == 0` returns the name unchanged. Only the last extension is split off,
/// so `archive.tar.gz` becomes `archive.tar_1.gz`.
#[must_use]
pub fn numbered_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{n}.{ext}"),
        None => format!("{stem}_{n}"),
    }
}

/// Create a new file in `dir` named after `file_name`, never touching existing files
///
/// Tries `file_name`, then `name_1.ext`, `name_2.ext`, ... and opens the first one
/// that does not exist yet. Each candidate is opened with `create_new`, so a file
/// that appears between two attempts is skipped rather than overwritten.
///
/// Returns the open file, its path and the resolved file name.
///
/// # Errors
///
/// Returns [`Error::Filesystem`] if a candidate cannot be created for any reason
/// other than already existing, or if all candidates are taken.
pub async fn create_unique_file(
    dir: &Path,
    file_name: &str,
) -> Result<(tokio::fs::File, PathBuf, String)> {
    for n in 0..=MAX_RENAME_ATTEMPTS {
        let candidate = numbered_name(file_name, n);
        let path = dir.join(&candidate);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path, candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::filesystem(path, e)),
        }
    }

    Err(Error::filesystem(
        dir.join(file_name),
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("could not find a free file name after {MAX_RENAME_ATTEMPTS} attempts"),
        ),
    ))
}
