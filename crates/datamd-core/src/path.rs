/*
 * path.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Resolution and validation of directive subject paths.
 */

//! Path resolution.
//!
//! Subject paths are resolved relative to the directory of the document that
//! contains the directive. A [`ResolvedPath`] can only be produced by
//! [`resolve`], so holding one means every security check has passed.
//!
//! Checks run in a fixed order, and the first failing check decides the error:
//!
//! 1. blank, NUL byte, or an over-long file name component ([`PathError::Invalid`])
//! 2. the file does not exist ([`PathError::NotFound`])
//! 3. outside the base directory after resolving `.`, `..` and symlinks
//!    ([`PathError::Traversal`], unless traversal is allowed)
//! 4. not a regular file ([`PathError::NotAFile`]) or too large ([`PathError::TooLarge`])
//! 5. extension not allowed ([`PathError::ExtensionNotAllowed`])

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use datamd_config::SecurityConfig;

use crate::error::PathError;

/// A subject path that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute_path: PathBuf,
    size_bytes: u64,
    mtime: SystemTime,
}

impl ResolvedPath {
    pub(crate) fn new(absolute_path: PathBuf, size_bytes: u64, mtime: SystemTime) -> Self {
        Self {
            absolute_path,
            size_bytes,
            mtime,
        }
    }

    /// Canonical absolute path of the file.
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// Modification time as nanoseconds since the Unix epoch (0 for pre-epoch times).
    pub fn mtime_nanos(&self) -> u64 {
        self.mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Lowercase extension without the dot, or an empty string.
    pub fn extension(&self) -> String {
        self.absolute_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Resolve `raw` against `base_dir` and validate it under `security`.
pub fn resolve(
    raw: &str,
    base_dir: &Path,
    security: &SecurityConfig,
) -> Result<ResolvedPath, PathError> {
    check_syntax(raw, security.max_filename_length)?;

    let requested = Path::new(raw);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        base_dir.join(requested)
    };

    let canonical = joined.canonicalize().map_err(|_| PathError::NotFound {
        raw: raw.to_string(),
    })?;

    if !security.allow_directory_traversal {
        let base = base_dir
            .canonicalize()
            .unwrap_or_else(|_| base_dir.to_path_buf());
        if !canonical.starts_with(&base) {
            tracing::debug!(raw, base = %base.display(), "Rejected path outside base directory");
            return Err(PathError::Traversal {
                raw: raw.to_string(),
            });
        }
    }

    let metadata = std::fs::metadata(&canonical).map_err(|_| PathError::NotFound {
        raw: raw.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(PathError::NotAFile {
            raw: raw.to_string(),
        });
    }

    let limit = security.max_file_size_bytes();
    if metadata.len() > limit {
        return Err(PathError::TooLarge {
            raw: raw.to_string(),
            size: metadata.len(),
            limit,
        });
    }

    let extension = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    if !security.is_extension_allowed(&extension) {
        return Err(PathError::ExtensionNotAllowed {
            raw: raw.to_string(),
            extension,
        });
    }

    let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
    Ok(ResolvedPath::new(canonical, metadata.len(), mtime))
}

fn check_syntax(raw: &str, max_filename_length: usize) -> Result<(), PathError> {
    let invalid = |reason: String| PathError::Invalid {
        raw: raw.to_string(),
        reason,
    };

    if raw.trim().is_empty() {
        return Err(invalid("path is empty".to_string()));
    }
    if raw.contains('\0') {
        return Err(invalid("path contains a NUL byte".to_string()));
    }
    for component in Path::new(raw).components() {
        if let Component::Normal(name) = component {
            let len = name.to_string_lossy().chars().count();
            if len > max_filename_length {
                return Err(invalid(format!(
                    "file name component is {} characters, the limit is {}",
                    len, max_filename_length
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> SecurityConfig {
        SecurityConfig::default()
    }

    #[test]
    fn test_resolves_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "a,b\n1,2\n").unwrap();

        let resolved = resolve("data.csv", dir.path(), &security()).unwrap();
        assert!(resolved.absolute_path().is_absolute());
        assert_eq!(resolved.size_bytes(), 8);
        assert_eq!(resolved.extension(), "csv");
        assert!(resolved.mtime_nanos() > 0);
    }

    #[test]
    fn test_blank_and_nul_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve("   ", dir.path(), &security()),
            Err(PathError::Invalid { .. })
        ));
        assert!(matches!(
            resolve("a\0b.csv", dir.path(), &security()),
            Err(PathError::Invalid { .. })
        ));
    }

    #[test]
    fn test_long_component_is_invalid_before_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let config = SecurityConfig {
            max_filename_length: 8,
            ..security()
        };
        let err = resolve("much-too-long-name.csv", dir.path(), &config).unwrap_err();
        assert!(matches!(err, PathError::Invalid { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve("nope.csv", dir.path(), &security()).unwrap_err();
        assert_eq!(
            err,
            PathError::NotFound {
                raw: "nope.csv".to_string()
            }
        );
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub.csv")).unwrap();
        let err = resolve("sub.csv", dir.path(), &security()).unwrap_err();
        assert!(matches!(err, PathError::NotAFile { .. }));
    }

    #[test]
    fn test_too_large() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.csv"), vec![b'x'; 2048]).unwrap();
        let config = SecurityConfig {
            max_file_size_mb: 1.0 / 1024.0,
            ..security()
        };
        let err = resolve("big.csv", dir.path(), &config).unwrap_err();
        assert!(matches!(err, PathError::TooLarge { size: 2048, .. }));
    }

    #[test]
    fn test_extension_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo").unwrap();
        let err = resolve("run.sh", dir.path(), &security()).unwrap_err();
        assert_eq!(err.code(), "DMD-2-6");
    }

    #[test]
    fn test_dot_segments_inside_base_are_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("data.json"), "[]").unwrap();
        let resolved = resolve("./sub/../data.json", dir.path(), &security()).unwrap();
        assert!(resolved.absolute_path().ends_with("data.json"));
    }
}
