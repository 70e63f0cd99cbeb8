//! Hub-hosted repository targets
//!
//! The identity fingerprint is the hub's revision id, so an unchanged remote never
//! downloads a single file. Files are fetched only when the verifier asks, pinned to
//! the revision id that was compared.

use super::{FileCandidate, FileSelector, ModelIdentity, Target};
use crate::error::TargetError;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// File lister and content provider for a model hub
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Resolve a revision (branch, tag or sha) to the hub's content-addressed id
    async fn revision_id(&self, repo_id: &str, revision: &str) -> Result<Fingerprint, TargetError>;

    /// Download every file of the revision matching the selector
    async fn list_files(
        &self,
        repo_id: &str,
        revision: &str,
        selector: &FileSelector,
    ) -> Result<Vec<(String, Vec<u8>)>, TargetError>;
}

#[async_trait]
impl<T: HubClient + ?Sized> HubClient for Arc<T> {
    async fn revision_id(&self, repo_id: &str, revision: &str) -> Result<Fingerprint, TargetError> {
        (**self).revision_id(repo_id, revision).await
    }

    async fn list_files(
        &self,
        repo_id: &str,
        revision: &str,
        selector: &FileSelector,
    ) -> Result<Vec<(String, Vec<u8>)>, TargetError> {
        (**self).list_files(repo_id, revision, selector).await
    }
}

/// A repository on a model hub at a given revision
pub struct RemoteTarget<C> {
    client: C,
    repo_id: String,
    revision: String,
    selector: FileSelector,
    identity: ModelIdentity,
    resolved: OnceCell<Fingerprint>,
}

impl<C: HubClient> RemoteTarget<C> {
    pub fn new(
        client: C,
        repo_id: impl Into<String>,
        revision: impl Into<String>,
        selector: FileSelector,
    ) -> Self {
        let repo_id = repo_id.into();
        let revision = revision.into();
        let identity = ModelIdentity::hub(&repo_id, &revision);

        RemoteTarget {
            client,
            repo_id,
            revision,
            selector,
            identity,
            resolved: OnceCell::new(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Resolve the revision once per target so listing and comparison agree
    async fn resolved_revision(&self) -> Result<&Fingerprint, TargetError> {
        self.resolved
            .get_or_try_init(|| async {
                let sha = self.client.revision_id(&self.repo_id, &self.revision).await?;
                debug!("Resolved {}@{} to {}", self.repo_id, self.revision, sha);
                Ok(sha)
            })
            .await
    }
}

#[async_trait]
impl<C: HubClient> Target for RemoteTarget<C> {
    fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    fn describe(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Repository: {}", self.repo_id),
            format!("Revision: {}", self.revision),
        ];
        if let Some(sha) = self.resolved.get() {
            lines.push(format!("Resolved commit: {sha}"));
        }
        lines
    }

    fn selector(&self) -> &FileSelector {
        &self.selector
    }

    async fn compute_identity_fingerprint(&self) -> Result<Fingerprint, TargetError> {
        self.resolved_revision().await.cloned()
    }

    async fn list_candidate_files(&self) -> Result<Vec<FileCandidate>, TargetError> {
        let sha = self.resolved_revision().await?;
        let files = self
            .client
            .list_files(&self.repo_id, sha.as_str(), &self.selector)
            .await?;

        info!(
            "Fetched {} candidate files from {}@{}",
            files.len(),
            self.repo_id,
            sha.short()
        );

        let mut candidates: Vec<FileCandidate> = files
            .into_iter()
            .map(|(path, content)| FileCandidate::from_content(path, content))
            .collect();
        candidates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(candidates)
    }
}
