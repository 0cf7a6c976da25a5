//! Path-safe reads for skill resources (`spec.md` §4.3 "Safety"): resolve the
//! target, refuse anything outside the declared root, refuse symlinks.
//! Grounded on the canonicalize + `starts_with` prefix-check pattern used for
//! skill-path validation elsewhere in the corpus.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum SafeReadError {
    Escape { root: PathBuf, requested: PathBuf },
    Symlink(PathBuf),
    NotFound(PathBuf),
    Io(std::io::Error),
}

impl fmt::Display for SafeReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeReadError::Escape { root, requested } => write!(
                f,
                "path {} escapes declared root {}",
                requested.display(),
                root.display()
            ),
            SafeReadError::Symlink(p) => write!(f, "refusing to read symlink: {}", p.display()),
            SafeReadError::NotFound(p) => write!(f, "file not found: {}", p.display()),
            SafeReadError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SafeReadError {}

/// Reads `path` as UTF-8 text, refusing it unless it canonicalizes to
/// somewhere inside `root` and no component of the resolution is a symlink.
pub fn safe_read(root: &Path, path: &Path) -> Result<String, SafeReadError> {
    if !path.exists() {
        return Err(SafeReadError::NotFound(path.to_path_buf()));
    }

    // `symlink_metadata` does not follow the final component, so this catches
    // a symlink at the leaf even before canonicalizing.
    let leaf_meta = fs::symlink_metadata(path).map_err(SafeReadError::Io)?;
    if leaf_meta.file_type().is_symlink() {
        return Err(SafeReadError::Symlink(path.to_path_buf()));
    }

    let canonical_root = root.canonicalize().map_err(SafeReadError::Io)?;
    let canonical_path = path.canonicalize().map_err(SafeReadError::Io)?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(SafeReadError::Escape {
            root: canonical_root,
            requested: canonical_path,
        });
    }

    fs::read_to_string(&canonical_path).map_err(SafeReadError::Io)
}
