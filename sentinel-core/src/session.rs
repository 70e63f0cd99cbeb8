//! Approval session bookkeeping
//!
//! A session asks the prompter about every pending file exactly once and records
//! the answers next to the carried-forward files. It never touches the store.

use crate::error::PromptError;
use crate::fingerprint::Fingerprint;
use crate::prompt::{ApprovalPrompter, PendingFile};
use crate::target::FileCandidate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a file reached its approval state in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// A human decided during this run
    Decided,
    /// Unchanged since its last approval
    CarriedForward,
}

/// What gets persisted when a run contains rejections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SavePolicy {
    /// Any rejection discards the whole run
    #[default]
    AllOrNothing,
    /// Individually approved files are kept; the model is still not promoted
    PartialSave,
}

/// A file's outcome within one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub filename: String,
    pub fingerprint: Fingerprint,
    pub content: Vec<u8>,
    pub approved: bool,
    pub disposition: Disposition,
}

impl SessionFile {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn carried_forward(candidate: FileCandidate) -> Self {
        SessionFile {
            filename: candidate.relative_path,
            fingerprint: candidate.fingerprint,
            content: candidate.content,
            approved: true,
            disposition: Disposition::CarriedForward,
        }
    }
}

/// The completed set of decisions for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalSession {
    files: Vec<SessionFile>,
}

impl ApprovalSession {
    /// Collect decisions for every pending file.
    ///
    /// Paths the prompter did not answer for count as rejected.
    pub async fn run<P>(
        carried_forward: Vec<FileCandidate>,
        pending: Vec<PendingFile>,
        prompter: &P,
    ) -> Result<Self, PromptError>
    where
        P: ApprovalPrompter + ?Sized,
    {
        let decisions = if pending.is_empty() {
            Default::default()
        } else {
            prompter.collect_batch(&pending).await?
        };

        let mut files: Vec<SessionFile> = carried_forward
            .into_iter()
            .map(SessionFile::carried_forward)
            .collect();

        for file in pending {
            let approved = match decisions.get(&file.path) {
                Some(decision) => *decision,
                None => {
                    warn!("No decision received for {}, treating as rejected", file.path);
                    false
                }
            };
            debug!(
                "{} {}",
                if approved { "Approved" } else { "Rejected" },
                file.path
            );
            files.push(SessionFile {
                filename: file.path,
                fingerprint: file.fingerprint,
                content: file.content,
                approved,
                disposition: Disposition::Decided,
            });
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(ApprovalSession { files })
    }

    /// Build a session from already-known outcomes
    pub fn from_files(files: Vec<SessionFile>) -> Self {
        ApprovalSession { files }
    }

    pub fn files(&self) -> &[SessionFile] {
        &self.files
    }

    /// Files decided during this run
    pub fn decided(&self) -> impl Iterator<Item = &SessionFile> {
        self.files
            .iter()
            .filter(|f| f.disposition == Disposition::Decided)
    }

    pub fn rejected(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.approved)
            .map(|f| f.filename.clone())
            .collect()
    }

    pub fn is_fully_approved(&self) -> bool {
        self.files.iter().all(|f| f.approved)
    }
}
