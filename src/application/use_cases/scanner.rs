use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::domain::{compute_content_hash, DomainError};

const DENY_LIST: &[&str] = &["node_modules", ".git", ".coderag", "dist", "build"];

/// One scanned file: its path relative to the scan root, its UTF-8 content,
/// and a content-addressed hash stable across runs.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub content: String,
    pub content_hash: String,
}

/// A file that was walked but not readable as a scan result (non-UTF-8
/// content, or a read error), recorded rather than treated as fatal.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub relative_path: String,
    pub reason: String,
}

pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub skipped: Vec<SkippedFile>,
}

pub struct ScannerUseCase;

impl ScannerUseCase {
    pub fn new() -> Self {
        Self
    }

    /// Walks `root`, applying the built-in deny list plus `.gitignore` and
    /// `.coderagignore` semantics. Fails only if the root itself cannot be
    /// walked; per-file read/decode errors are recorded in `skipped`.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, DomainError> {
        if !root.exists() {
            return Err(DomainError::scan(format!(
                "scan root does not exist: {}",
                root.display()
            )));
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .add_custom_ignore_filename(".coderagignore")
            .filter_entry(|entry| {
                !entry
                    .path()
                    .components()
                    .any(|c| DENY_LIST.contains(&c.as_os_str().to_string_lossy().as_ref()))
            })
            .build();

        let mut files = Vec::new();
        let mut skipped = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("scan: failed to walk an entry: {err}");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            let bytes = match std::fs::read(entry.path()) {
                Ok(b) => b,
                Err(err) => {
                    skipped.push(SkippedFile {
                        relative_path,
                        reason: format!("read error: {err}"),
                    });
                    continue;
                }
            };

            let content = match String::from_utf8(bytes.clone()) {
                Ok(s) => s,
                Err(_) => {
                    skipped.push(SkippedFile {
                        relative_path,
                        reason: "non-UTF-8 content".to_string(),
                    });
                    continue;
                }
            };

            let content_hash = compute_content_hash(&bytes);
            debug!("scanned {relative_path} ({} bytes)", bytes.len());
            files.push(ScannedFile {
                relative_path,
                content,
                content_hash,
            });
        }

        Ok(ScanResult { files, skipped })
    }
}

impl Default for ScannerUseCase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scan_reads_files_and_computes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, "fn main() {{}}").unwrap();

        let result = ScannerUseCase::new().scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative_path, "a.rs");
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn scan_excludes_deny_listed_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg.js"), "module.exports = {}").unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

        let result = ScannerUseCase::new().scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative_path, "a.rs");
    }

    #[test]
    fn scan_skips_non_utf8_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.dat"), [0xff, 0xfe, 0x00, 0xff]).unwrap();

        let result = ScannerUseCase::new().scan(dir.path()).unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn scan_fails_on_missing_root() {
        let result = ScannerUseCase::new().scan(Path::new("/nonexistent/path/xyz"));
        assert!(result.is_err());
    }
}
