//! Content-Address Layer (C1): file hashing, change detection, duplicate
//! registry.
//!
//! `file_hash` is a cheap `(absolute_path, size, mtime)` fingerprint for
//! O(1) change detection; `content_hash` is the SHA-256 of the raw file
//! bytes, computed lazily on first use (only when `file_hash` indicates
//! the file has actually changed).

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};
use crate::models::DuplicateVerdict;

/// Cheap, deterministic fingerprint of `(absolute_path, size, mtime)`.
/// Two calls on an unchanged file always agree; any path/size/mtime
/// change produces a different fingerprint.
pub fn file_hash(path: &Path, size: u64, mtime_unix_nanos: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(size.to_le_bytes());
    hasher.update(mtime_unix_nanos.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of the raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// `fingerprint(path) -> (file_hash, size, bytes)` — reads the file once
/// and returns everything [`content_hash`] needs, without forcing a
/// content hash to be computed unless the caller asks for one.
pub fn fingerprint(path: &Path) -> EngineResult<(String, u64, Vec<u8>)> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let mtime_unix_nanos = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let bytes = std::fs::read(path).map_err(|e| EngineError::Unknown {
        reason: format!("reading {}: {e}", path.display()),
    })?;
    let fh = file_hash(path, size, mtime_unix_nanos);
    Ok((fh, size, bytes))
}

/// A content-hash → doc_id duplicate registry. Backed by whatever the
/// Document Store already knows (queried through `lookup`); this type is
/// the policy layer on top.
pub struct DuplicateRegistry<'a> {
    policy: crate::models::DuplicatePolicy,
    lookup: Box<dyn Fn(&str) -> EngineResult<Option<String>> + 'a>,
}

impl<'a> DuplicateRegistry<'a> {
    pub fn new(
        policy: crate::models::DuplicatePolicy,
        lookup: impl Fn(&str) -> EngineResult<Option<String>> + 'a,
    ) -> Self {
        Self {
            policy,
            lookup: Box::new(lookup),
        }
    }

    /// `register(content_hash) -> DuplicateVerdict` per spec.md §4.1.
    pub fn register(&self, content_hash: &str) -> EngineResult<DuplicateVerdict> {
        use crate::models::DuplicatePolicy::*;
        let existing = (self.lookup)(content_hash)?;
        Ok(match (self.policy, existing) {
            (_, None) => DuplicateVerdict::New,
            (Skip, Some(doc_id)) => DuplicateVerdict::Duplicate(doc_id),
            (IndexAll, Some(_)) => DuplicateVerdict::New,
            (Link, Some(doc_id)) => DuplicateVerdict::Linked(doc_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_hash_stable_for_same_inputs() {
        let p = Path::new("/tmp/a.txt");
        let a = file_hash(p, 10, 1000);
        let b = file_hash(p, 10, 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn file_hash_changes_with_size() {
        let p = Path::new("/tmp/a.txt");
        let a = file_hash(p, 10, 1000);
        let b = file_hash(p, 11, 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let h = content_hash(b"hello world");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn registry_skip_policy_reports_duplicate() {
        let reg = DuplicateRegistry::new(crate::models::DuplicatePolicy::Skip, |_| {
            Ok(Some("doc-1".to_string()))
        });
        assert_eq!(
            reg.register("abc").unwrap(),
            DuplicateVerdict::Duplicate("doc-1".to_string())
        );
    }

    #[test]
    fn registry_index_all_always_new() {
        let reg = DuplicateRegistry::new(crate::models::DuplicatePolicy::IndexAll, |_| {
            Ok(Some("doc-1".to_string()))
        });
        assert_eq!(reg.register("abc").unwrap(), DuplicateVerdict::New);
    }

    #[test]
    fn registry_link_policy() {
        let reg = DuplicateRegistry::new(crate::models::DuplicatePolicy::Link, |_| {
            Ok(Some("doc-1".to_string()))
        });
        assert_eq!(
            reg.register("abc").unwrap(),
            DuplicateVerdict::Linked("doc-1".to_string())
        );
    }

    #[test]
    fn registry_new_content_is_always_new() {
        let reg = DuplicateRegistry::new(crate::models::DuplicatePolicy::Skip, |_| Ok(None));
        assert_eq!(reg.register("abc").unwrap(), DuplicateVerdict::New);
    }
}
