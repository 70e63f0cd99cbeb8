//! Verifiable targets - hub repositories and local directories
//!
//! A target knows its stable identity, can produce a cheap identity fingerprint,
//! and can list the candidate files that need review. The verifier only ever
//! talks to targets through the [`Target`] trait.

pub mod local;
pub mod remote;

#[cfg(feature = "hub")]
pub mod hub;

pub use local::LocalTarget;
pub use remote::{HubClient, RemoteTarget};

#[cfg(feature = "hub")]
pub use hub::HfHubClient;

use crate::error::TargetError;
use crate::fingerprint::{fingerprint_bytes, Fingerprint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default selector for code shipped with models
pub const DEFAULT_FILE_PATTERN: &str = "*.py";

/// Where a target lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    /// Hub-hosted repository
    #[serde(rename = "hf")]
    Hub,
    /// Directory on the local filesystem
    #[serde(rename = "local")]
    Local,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Hub => "hf",
            TargetKind::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hf" => Some(TargetKind::Hub),
            "local" => Some(TargetKind::Local),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key for a verifiable target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub kind: TargetKind,
    pub id: String,
}

impl ModelIdentity {
    /// Identity of a hub repository at a revision, e.g. `org/model@main`
    pub fn hub(repo_id: &str, revision: &str) -> Self {
        ModelIdentity {
            kind: TargetKind::Hub,
            id: format!("{repo_id}@{revision}"),
        }
    }

    /// Identity of a local directory.
    ///
    /// Derived from the directory name plus a short digest of its canonical path, so
    /// editing files inside the directory never changes the identity.
    pub fn local(canonical_dir: &Path) -> Self {
        let name = canonical_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let path_digest = fingerprint_bytes(canonical_dir.to_string_lossy().as_bytes());

        ModelIdentity {
            kind: TargetKind::Local,
            id: format!("{}_{}", name, &path_digest.as_str()[..8]),
        }
    }

    /// Registry key, `<kind>/<id>`. Also the model's area inside the trust store.
    pub fn registry_key(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }

    /// Inverse of [`ModelIdentity::registry_key`]
    pub fn from_registry_key(key: &str) -> Option<Self> {
        let (kind, id) = key.split_once('/')?;
        if id.is_empty() {
            return None;
        }
        Some(ModelIdentity {
            kind: TargetKind::parse(kind)?,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.registry_key())
    }
}

/// Glob selecting which files of a target are reviewed
#[derive(Debug, Clone)]
pub struct FileSelector {
    pattern: glob::Pattern,
}

impl FileSelector {
    pub fn new(pattern: &str) -> Result<Self, glob::PatternError> {
        Ok(FileSelector {
            pattern: glob::Pattern::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether this selector is the one a promoted fingerprint was reviewed under.
    /// Stores written before patterns were recorded always used the default.
    pub fn reviewed_under(&self, recorded: Option<&str>) -> bool {
        self.as_str() == recorded.unwrap_or(DEFAULT_FILE_PATTERN)
    }

    /// A path matches when either its file name or the whole relative path does
    pub fn matches(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.pattern.matches(file_name) || self.pattern.matches(relative_path)
    }
}

impl Default for FileSelector {
    fn default() -> Self {
        FileSelector {
            pattern: glob::Pattern::new(DEFAULT_FILE_PATTERN).expect("default pattern is valid"),
        }
    }
}

/// A file offered for review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path relative to the target root, `/`-separated
    pub relative_path: String,
    pub fingerprint: Fingerprint,
    pub content: Vec<u8>,
}

impl FileCandidate {
    /// Build a candidate, fingerprinting the content
    pub fn from_content(relative_path: impl Into<String>, content: Vec<u8>) -> Self {
        FileCandidate {
            relative_path: relative_path.into(),
            fingerprint: fingerprint_bytes(&content),
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Capability set every verifiable target provides
#[async_trait]
pub trait Target: Send + Sync {
    /// Stable identity used as the trust store key
    fn identity(&self) -> &ModelIdentity;

    /// Where the target came from, recorded in the registry (e.g. a local path)
    fn origin(&self) -> Option<String> {
        None
    }

    /// Human-readable lines describing the target
    fn describe(&self) -> Vec<String>;

    /// Selector deciding which files are candidates
    fn selector(&self) -> &FileSelector;

    /// Cheap fingerprint of the target as a whole
    async fn compute_identity_fingerprint(&self) -> Result<Fingerprint, TargetError>;

    /// All candidate files with content. Any single failure fails the listing.
    async fn list_candidate_files(&self) -> Result<Vec<FileCandidate>, TargetError>;

    /// Identity fingerprint of exactly the listed candidates.
    ///
    /// Targets whose identity fingerprint is derived from file contents return the
    /// fingerprint of what was listed, so the promoted hash always describes the
    /// reviewed bytes. `None` keeps the fingerprint from
    /// [`Target::compute_identity_fingerprint`].
    fn reviewed_fingerprint(&self, _candidates: &[FileCandidate]) -> Option<Fingerprint> {
        None
    }
}
