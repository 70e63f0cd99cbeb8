//! Human approval surfaces
//!
//! The verifier only depends on [`ApprovalPrompter`]. Console and web surfaces are
//! interchangeable implementations of the same decision contract.

pub mod console;
pub mod web;

pub use console::ConsolePrompter;
pub use web::{WebApprovalServer, WebPrompter};

use crate::error::PromptError;
use crate::fingerprint::Fingerprint;
use crate::target::FileCandidate;
use async_trait::async_trait;
use similar::TextDiff;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A file awaiting a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: String,
    pub fingerprint: Fingerprint,
    pub content: Vec<u8>,
    /// Fingerprint approved at this path before, if any
    pub previous_fingerprint: Option<Fingerprint>,
    /// Snapshot of the previously approved content, if one was kept
    pub previous_content: Option<Vec<u8>>,
}

impl PendingFile {
    pub fn new(
        candidate: FileCandidate,
        previous_fingerprint: Option<Fingerprint>,
        previous_content: Option<Vec<u8>>,
    ) -> Self {
        PendingFile {
            path: candidate.relative_path,
            fingerprint: candidate.fingerprint,
            content: candidate.content,
            previous_fingerprint,
            previous_content,
        }
    }

    /// True when nothing was ever approved at this path
    pub fn is_new(&self) -> bool {
        self.previous_fingerprint.is_none()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Unified diff against the previous snapshot, when one exists
    pub fn diff(&self) -> Option<String> {
        let previous = self.previous_content.as_ref()?;
        let old = String::from_utf8_lossy(previous);
        let new = self.text();

        let diff = TextDiff::from_lines(old.as_ref(), new.as_ref());
        Some(
            diff.unified_diff()
                .context_radius(3)
                .header(&format!("a/{}", self.path), &format!("b/{}", self.path))
                .to_string(),
        )
    }

    /// One-line status, e.g. `modified (1a2b3c... -> 4d5e6f...)`
    pub fn change_summary(&self) -> String {
        match &self.previous_fingerprint {
            Some(previous) => format!(
                "modified ({}... -> {}...)",
                previous.short(),
                self.fingerprint.short()
            ),
            None => format!("new ({}...)", self.fingerprint.short()),
        }
    }
}

/// Decision contract every approval surface implements
#[async_trait]
pub trait ApprovalPrompter: Send + Sync {
    /// Ask about a single file
    async fn decide(&self, file: &PendingFile) -> Result<bool, PromptError>;

    /// Ask about a whole batch, answered once.
    ///
    /// The default asks about each file in turn, one at a time.
    async fn collect_batch(
        &self,
        files: &[PendingFile],
    ) -> Result<BTreeMap<String, bool>, PromptError> {
        let mut decisions = BTreeMap::new();
        for file in files {
            let approved = self.decide(file).await?;
            decisions.insert(file.path.clone(), approved);
        }
        Ok(decisions)
    }
}

/// Answers every file the same way. Used for non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompter(pub bool);

#[async_trait]
impl ApprovalPrompter for FixedPrompter {
    async fn decide(&self, _file: &PendingFile) -> Result<bool, PromptError> {
        Ok(self.0)
    }
}
