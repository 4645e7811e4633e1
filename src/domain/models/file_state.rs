use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-file incremental-indexing record. `content_hash` is content-addressed
/// (not mtime-based) so moving a file or touching its mtime without
/// changing its bytes never triggers re-indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub file_path: String,
    pub content_hash: String,
    pub last_indexed_at: String,
    pub chunk_ids: Vec<String>,
}

impl FileState {
    pub fn new(
        file_path: impl Into<String>,
        content_hash: impl Into<String>,
        last_indexed_at: impl Into<String>,
        chunk_ids: Vec<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content_hash: content_hash.into(),
            last_indexed_at: last_indexed_at.into(),
            chunk_ids,
        }
    }
}

/// SHA-256 of raw file bytes, hex-encoded. Stable across runs and unaffected
/// by filesystem metadata.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// `filePath -> FileState` map driving incremental indexing. A `BTreeMap` is
/// used (not `HashMap`) so the serialized form is byte-identical across runs
/// with the same inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexState {
    files: BTreeMap<String, FileState>,
}

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_path: &str) -> Option<&FileState> {
        self.files.get(file_path)
    }

    pub fn insert(&mut self, state: FileState) {
        self.files.insert(state.file_path.clone(), state);
    }

    pub fn remove(&mut self, file_path: &str) -> Option<FileState> {
        self.files.remove(file_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileState)> {
        self.files.iter()
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// A file is dirty if its content hash changed or it has never been
    /// recorded. Unknown-content files (deletions) are detected by the
    /// caller diffing `known_paths()` against the current scan result.
    pub fn is_dirty(&self, file_path: &str, current_hash: &str) -> bool {
        match self.files.get(file_path) {
            Some(state) => state.content_hash != current_hash,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = compute_content_hash(b"fn main() {}");
        let b = compute_content_hash(b"fn main() {}");
        assert_eq!(a, b);
        assert_ne!(a, compute_content_hash(b"fn main() { }"));
    }

    #[test]
    fn dirty_detection() {
        let mut state = IndexState::new();
        assert!(state.is_dirty("a.rs", "hash1"));

        state.insert(FileState::new("a.rs", "hash1", "2026-01-01T00:00:00Z", vec![]));
        assert!(!state.is_dirty("a.rs", "hash1"));
        assert!(state.is_dirty("a.rs", "hash2"));
    }

    #[test]
    fn serializes_as_sorted_map() {
        let mut state = IndexState::new();
        state.insert(FileState::new("z.rs", "h1", "t1", vec![]));
        state.insert(FileState::new("a.rs", "h2", "t2", vec![]));
        let json = serde_json::to_string(&state).unwrap();
        let a_pos = json.find("a.rs").unwrap();
        let z_pos = json.find("z.rs").unwrap();
        assert!(a_pos < z_pos);
    }
}
