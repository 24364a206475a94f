use crate::error::SnapshotError;
use git2::{Oid, Repository};

/// Size metrics computed from decoded content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentMetrics {
    pub char_length: usize,
    pub line_count: usize,
}

impl ContentMetrics {
    pub fn of(text: &str) -> Self {
        Self {
            char_length: text.chars().count(),
            line_count: text.lines().count(),
        }
    }
}

/// Decoded file content at one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub blob_hash: String,
    pub text: String,
    pub metrics: ContentMetrics,
}

/// Retrieves full file content through the repository layer
#[derive(Debug, Clone, Copy)]
pub struct SnapshotReader {
    max_blob_size: usize,
}

impl SnapshotReader {
    pub fn new(max_blob_size: usize) -> Self {
        Self { max_blob_size }
    }

    /// Read the content of `path` as it exists in `commit`
    pub fn read_at(
        &self,
        repo: &Repository,
        commit: Oid,
        path: &str,
    ) -> Result<Snapshot, SnapshotError> {
        let not_found = || SnapshotError::PathNotFound {
            commit: commit.to_string(),
            path: path.to_string(),
        };
        let tree = repo
            .find_commit(commit)
            .and_then(|c| c.tree())
            .map_err(|_| not_found())?;
        let entry = tree.get_path(std::path::Path::new(path)).map_err(|_| not_found())?;
        self.read_blob(repo, entry.id(), path)
    }

    /// Read a blob by its content-addressed identity
    ///
    /// Binary and oversized blobs are refused. Text is decoded lossily and
    /// NUL characters are dropped so every backend can store it.
    pub fn read_blob(
        &self,
        repo: &Repository,
        blob: Oid,
        path: &str,
    ) -> Result<Snapshot, SnapshotError> {
        let blob_ref = repo.find_blob(blob).map_err(|e| SnapshotError::Unreadable {
            path: path.to_string(),
            reason: e.message().to_string(),
        })?;

        let size = blob_ref.size();
        if size > self.max_blob_size {
            return Err(SnapshotError::TooLarge {
                path: path.to_string(),
                size,
                max: self.max_blob_size,
            });
        }
        if blob_ref.is_binary() {
            return Err(SnapshotError::Binary(path.to_string()));
        }

        let mut text = String::from_utf8_lossy(blob_ref.content()).into_owned();
        if text.contains('\0') {
            text.retain(|c| c != '\0');
        }
        let metrics = ContentMetrics::of(&text);

        Ok(Snapshot {
            blob_hash: blob.to_string(),
            text,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::TestRepo;

    #[test]
    fn test_metrics() {
        assert_eq!(ContentMetrics::of(""), ContentMetrics::default());
        let metrics = ContentMetrics::of("héllo\nworld\n");
        assert_eq!(metrics.char_length, 12);
        assert_eq!(metrics.line_count, 2);
        assert_eq!(ContentMetrics::of("no newline").line_count, 1);
    }

    #[test]
    fn test_read_at_commit() {
        let repo = TestRepo::new();
        let first = repo.commit(&[("a.txt", "one\n")], "first");
        let second = repo.commit(&[("a.txt", "one\ntwo\n")], "second");
        let reader = SnapshotReader::new(1024);

        let old = reader.read_at(repo.raw(), first, "a.txt").unwrap();
        let new = reader.read_at(repo.raw(), second, "a.txt").unwrap();
        assert_eq!(old.text, "one\n");
        assert_eq!(new.metrics.line_count, 2);
        assert_ne!(old.blob_hash, new.blob_hash);
    }

    #[test]
    fn test_read_missing_path() {
        let repo = TestRepo::new();
        let commit = repo.commit(&[("a.txt", "x")], "first");
        let reader = SnapshotReader::new(1024);
        assert!(matches!(
            reader.read_at(repo.raw(), commit, "missing.txt"),
            Err(SnapshotError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_refuses_binary_and_oversized() {
        let repo = TestRepo::new();
        let commit = repo.commit_bytes(&[("img.bin", b"\x00\x01\x02\x00binary")], "bin");
        let reader = SnapshotReader::new(1024);
        assert!(matches!(
            reader.read_at(repo.raw(), commit, "img.bin"),
            Err(SnapshotError::Binary(_))
        ));

        let big = "x".repeat(64);
        let commit = repo.commit(&[("big.txt", big.as_str())], "big");
        let small_reader = SnapshotReader::new(16);
        assert!(matches!(
            small_reader.read_at(repo.raw(), commit, "big.txt"),
            Err(SnapshotError::TooLarge { size: 64, max: 16, .. })
        ));
    }
}
