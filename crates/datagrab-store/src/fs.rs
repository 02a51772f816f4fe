//! Filesystem helpers: atomic writes and path discipline.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::StoreError;

/// Maximum accepted symbol token length.
const MAX_SYMBOL_LEN: usize = 128;

/// Creates a directory and its parents if missing.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| StoreError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Writes bytes to `path` atomically: a `.tmp` sibling is written first and
/// then renamed over the final path, so readers never observe a partial
/// file.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn atomic_write_bytes(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, data).map_err(|e| StoreError::WriteFile {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Rename {
        from: tmp,
        to: path.to_path_buf(),
        source: e,
    })
}

/// Writes a string to `path` atomically. See [`atomic_write_bytes`].
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn atomic_write_text(path: &Path, text: &str) -> Result<(), StoreError> {
    atomic_write_bytes(path, text.as_bytes())
}

/// Returns the `.tmp` sibling used for atomic publication of `path`.
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("out"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}

/// Validates a symbol token for use as a path component.
///
/// Accepts `[A-Za-z0-9._+=#@$%&^-]` up to 128 characters; rejects empty
/// tokens and any token containing `..`.
///
/// # Errors
///
/// Returns [`StoreError::UnsafeSymbol`] when the token is unusable.
pub fn validate_symbol(symbol: &str) -> Result<(), StoreError> {
    let ok_char = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '=' | '#' | '@' | '$' | '%' | '&' | '^' | '-')
    };
    if symbol.is_empty()
        || symbol.len() > MAX_SYMBOL_LEN
        || symbol.contains("..")
        || !symbol.chars().all(ok_char)
    {
        return Err(StoreError::UnsafeSymbol(symbol.to_string()));
    }
    Ok(())
}

/// Verifies that `candidate` resolves strictly inside `root`.
///
/// Both paths are compared after lexical normalization; `..` components in
/// the candidate are rejected outright so a not-yet-existing output path can
/// be checked without touching the filesystem.
///
/// # Errors
///
/// Returns [`StoreError::PathEscapesRoot`] on violation.
pub fn ensure_descendant(root: &Path, candidate: &Path) -> Result<(), StoreError> {
    let escape = || StoreError::PathEscapesRoot {
        path: candidate.to_path_buf(),
        root: root.to_path_buf(),
    };
    let root_norm = normalize(root);
    let cand_norm = normalize(candidate);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(escape());
    }
    if cand_norm.starts_with(&root_norm) && cand_norm != root_norm {
        Ok(())
    } else {
        Err(escape())
    }
}

/// Lexically normalizes a path: resolves `.` and applies `..` where
/// possible, without following symlinks.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
