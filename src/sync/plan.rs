//! Per-file decisions: compare the local candidate with the remote entry.

use crate::meta::FileMetaData;

/// What a pass should do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Local and remote agree.
    Unchanged,
    /// Local candidate is newer, or unknown to the authority.
    Upload,
    /// Remote is newer, or the file is absent locally.
    Download,
    /// Same version number, different content: another client committed
    /// this version first. Adopt the remote state as for a lost conflict.
    Stale,
}

/// Decide the action for a file. Version decides direction; hash lists only
/// break the tie when versions are equal.
pub fn classify(candidate: Option<&FileMetaData>, remote: Option<&FileMetaData>) -> Action {
    match (candidate, remote) {
        (_, None) => Action::Upload,
        (None, Some(_)) => Action::Download,
        (Some(local), Some(remote)) => {
            if remote.version > local.version {
                Action::Download
            } else if local.version > remote.version {
                Action::Upload
            } else if local.block_hash_list == remote.block_hash_list {
                Action::Unchanged
            } else {
                Action::Stale
            }
        }
    }
}

/// Build the local candidate for a file from its freshly computed hash list
/// and the entry persisted by the previous pass. `None` when the file changed
/// but its version is already at the maximum.
pub fn local_candidate(
    filename: &str,
    hashes: Vec<String>,
    previous: Option<&FileMetaData>,
) -> Option<FileMetaData> {
    match previous {
        None => Some(FileMetaData::new(filename, 1, hashes)),
        Some(prev) if prev.block_hash_list == hashes => Some(prev.clone()),
        Some(prev) => prev.next_version(hashes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(version: i32, hashes: &[&str]) -> FileMetaData {
        FileMetaData::new(
            "f",
            version,
            hashes.iter().map(|h| h.to_string()).collect(),
        )
    }

    #[test]
    fn test_classify_directions() {
        let v1 = meta(1, &["a"]);
        let v2 = meta(2, &["b"]);

        assert_eq!(classify(Some(&v1), None), Action::Upload);
        assert_eq!(classify(None, Some(&v1)), Action::Download);
        assert_eq!(classify(Some(&v1), Some(&v2)), Action::Download);
        assert_eq!(classify(Some(&v2), Some(&v1)), Action::Upload);
        assert_eq!(classify(Some(&v1), Some(&v1.clone())), Action::Unchanged);
    }

    #[test]
    fn test_classify_equal_version_different_content() {
        assert_eq!(
            classify(Some(&meta(3, &["mine"])), Some(&meta(3, &["theirs"]))),
            Action::Stale
        );
    }

    #[test]
    fn test_version_beats_matching_content() {
        // Same bytes, but the authority is ahead: still a download
        assert_eq!(
            classify(Some(&meta(1, &["a"])), Some(&meta(2, &["a"]))),
            Action::Download
        );
    }

    #[test]
    fn test_local_candidate_new_file() {
        let c = local_candidate("f", vec!["h".into()], None).unwrap();
        assert_eq!(c.version, 1);
        assert_eq!(c.block_hash_list, vec!["h".to_string()]);
    }

    #[test]
    fn test_local_candidate_unchanged() {
        let prev = meta(4, &["a", "b"]);
        let c = local_candidate("f", vec!["a".into(), "b".into()], Some(&prev)).unwrap();
        assert_eq!(c, prev);
    }

    #[test]
    fn test_local_candidate_changed() {
        let prev = meta(4, &["a", "b"]);
        let c = local_candidate("f", vec!["a".into(), "c".into()], Some(&prev)).unwrap();
        assert_eq!(c.version, 5);
        assert_eq!(c.block_hash_list, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_local_candidate_emptied_file() {
        let prev = meta(2, &["a"]);
        let c = local_candidate("f", vec![], Some(&prev)).unwrap();
        assert_eq!(c.version, 3);
        assert!(c.block_hash_list.is_empty());
    }

    #[test]
    fn test_local_candidate_version_exhausted() {
        let prev = meta(i32::MAX, &["a"]);
        assert_eq!(local_candidate("f", vec!["b".into()], Some(&prev)), None);
        // Unchanged content needs no bump
        assert_eq!(local_candidate("f", vec!["a".into()], Some(&prev)), Some(prev));
    }
}
