//! Two-level change detection
//!
//! The model-level check compares identity fingerprints and short-circuits when
//! nothing changed. Only when it fails are individual files compared against
//! their stored records.

use crate::fingerprint::Fingerprint;
use crate::store::ModelMetadata;
use crate::target::{FileCandidate, FileSelector, DEFAULT_FILE_PATTERN};

/// Outcome of the model-level comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCheck {
    /// Stored and current fingerprints match, nothing to review
    AlreadyVerified,
    /// No fingerprint was ever promoted for this model
    FirstSeen { current: Fingerprint },
    /// The model changed since it was last promoted
    Changed {
        previous: Fingerprint,
        current: Fingerprint,
    },
    /// Same fingerprint, but promoted after reviewing a different set of files
    SelectorChanged { previous: String, current: String },
}

impl ModelCheck {
    pub fn is_verified(&self) -> bool {
        matches!(self, ModelCheck::AlreadyVerified)
    }
}

/// Compare the stored identity fingerprint with the current one
pub fn check_model(stored: Option<&Fingerprint>, current: &Fingerprint) -> ModelCheck {
    match stored {
        Some(previous) if previous == current => ModelCheck::AlreadyVerified,
        Some(previous) => ModelCheck::Changed {
            previous: previous.clone(),
            current: current.clone(),
        },
        None => ModelCheck::FirstSeen {
            current: current.clone(),
        },
    }
}

/// Model-level check that also requires the promotion to cover the current selector.
///
/// A hub fingerprint is the revision id alone, so a promotion made under a pattern
/// matching nothing must not vouch for files a wider pattern selects.
pub fn check_promoted(
    stored: &ModelMetadata,
    current: &Fingerprint,
    selector: &FileSelector,
) -> ModelCheck {
    match check_model(stored.model_hash.as_ref(), current) {
        ModelCheck::AlreadyVerified if !selector.reviewed_under(stored.file_pattern.as_deref()) => {
            ModelCheck::SelectorChanged {
                previous: stored
                    .file_pattern
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FILE_PATTERN.to_string()),
                current: selector.as_str().to_string(),
            }
        }
        check => check,
    }
}

/// A candidate that needs a human decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCandidate {
    pub candidate: FileCandidate,
    /// Fingerprint previously approved at this path, if any
    pub previous: Option<Fingerprint>,
}

/// Candidates split by whether they need review
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Unchanged since their last approval
    pub carried_forward: Vec<FileCandidate>,
    /// New or modified
    pub pending: Vec<PendingCandidate>,
}

impl ChangeSet {
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn total(&self) -> usize {
        self.carried_forward.len() + self.pending.len()
    }

    pub fn pending_paths(&self) -> Vec<&str> {
        self.pending
            .iter()
            .map(|p| p.candidate.relative_path.as_str())
            .collect()
    }
}

/// Split candidates into carried-forward and pending files
pub fn partition(stored: &ModelMetadata, candidates: Vec<FileCandidate>) -> ChangeSet {
    let approved = stored.approved_map();
    let mut changes = ChangeSet::default();

    for candidate in candidates {
        match approved.get(&candidate.relative_path) {
            Some(record) if record.fingerprint == candidate.fingerprint => {
                changes.carried_forward.push(candidate);
            }
            record => {
                let previous = record.map(|r| r.fingerprint.clone());
                changes.pending.push(PendingCandidate { candidate, previous });
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileRecord;

    fn metadata_with(records: &[(&str, &[u8])]) -> ModelMetadata {
        let mut metadata = ModelMetadata::empty();
        for (path, content) in records {
            let candidate = FileCandidate::from_content(*path, content.to_vec());
            metadata.approved_files.push(FileRecord {
                path: candidate.relative_path,
                size: content.len() as u64,
                fingerprint: candidate.fingerprint,
                verified_at: None,
            });
        }
        metadata
    }

    #[test]
    fn test_check_model() {
        let a = Fingerprint::new("a");
        let b = Fingerprint::new("b");

        assert_eq!(check_model(Some(&a), &a), ModelCheck::AlreadyVerified);
        assert_eq!(
            check_model(None, &a),
            ModelCheck::FirstSeen { current: a.clone() }
        );
        assert_eq!(
            check_model(Some(&a), &b),
            ModelCheck::Changed {
                previous: a.clone(),
                current: b.clone()
            }
        );
    }

    #[test]
    fn test_check_promoted_requires_matching_selector() {
        let fp = Fingerprint::new("sha-1");
        let mut stored = ModelMetadata::empty();
        stored.model_hash = Some(fp.clone());

        // Legacy promotion without a recorded pattern counts as the default
        assert_eq!(
            check_promoted(&stored, &fp, &FileSelector::default()),
            ModelCheck::AlreadyVerified
        );

        stored.file_pattern = Some("*.none".to_string());
        let check = check_promoted(&stored, &fp, &FileSelector::default());
        assert_eq!(
            check,
            ModelCheck::SelectorChanged {
                previous: "*.none".to_string(),
                current: "*.py".to_string()
            }
        );
        assert!(!check.is_verified());

        let changed = check_promoted(&stored, &Fingerprint::new("sha-2"), &FileSelector::default());
        assert!(matches!(changed, ModelCheck::Changed { .. }));
    }

    #[test]
    fn test_partition_carries_forward_unchanged_files() {
        let stored = metadata_with(&[("a.py", b"old a"), ("b.py", b"b")]);
        let candidates = vec![
            FileCandidate::from_content("a.py", b"new a".to_vec()),
            FileCandidate::from_content("b.py", b"b".to_vec()),
            FileCandidate::from_content("c.py", b"c".to_vec()),
        ];

        let changes = partition(&stored, candidates);

        assert_eq!(changes.total(), 3);
        assert_eq!(changes.carried_forward.len(), 1);
        assert_eq!(changes.carried_forward[0].relative_path, "b.py");
        assert_eq!(changes.pending_paths(), vec!["a.py", "c.py"]);

        let a = &changes.pending[0];
        assert_eq!(a.previous, Some(stored.record("a.py").unwrap().fingerprint.clone()));
        assert_eq!(changes.pending[1].previous, None);
    }

    #[test]
    fn test_partition_empty_store_is_all_pending() {
        let changes = partition(
            &ModelMetadata::empty(),
            vec![FileCandidate::from_content("a.py", b"a".to_vec())],
        );
        assert!(changes.has_pending());
        assert!(changes.carried_forward.is_empty());
    }
}
