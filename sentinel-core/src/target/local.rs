//! Local directory targets

use super::{FileCandidate, FileSelector, ModelIdentity, Target};
use crate::error::TargetError;
use crate::fingerprint::{fingerprint_set, Fingerprint};
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A model directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalTarget {
    root: PathBuf,
    selector: FileSelector,
    identity: ModelIdentity,
}

impl LocalTarget {
    pub fn new(root: impl AsRef<Path>, selector: FileSelector) -> Result<Self, TargetError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(TargetError::NotFound {
                target: root.display().to_string(),
            });
        }

        let root = root.canonicalize().map_err(|_| TargetError::NotFound {
            target: root.display().to_string(),
        })?;
        let identity = ModelIdentity::local(&root);

        Ok(LocalTarget {
            root,
            selector,
            identity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Matching files as `(relative_path, absolute_path)`, sorted by relative path
    fn matching_files(&self) -> Result<Vec<(String, PathBuf)>, TargetError> {
        if !self.root.is_dir() {
            return Err(TargetError::NotFound {
                target: self.root.display().to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                TargetError::Io {
                    path,
                    source: e.into(),
                }
            })?;

            // Follows symlinks so linked files are reviewed by content
            if !entry.path().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.selector.matches(&relative) {
                files.push((relative, entry.path().to_path_buf()));
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(
            "Found {} files matching {} under {}",
            files.len(),
            self.selector.as_str(),
            self.root.display()
        );
        Ok(files)
    }
}

/// Opens the file on first read so large trees never hold every descriptor at once
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl Target for LocalTarget {
    fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    fn origin(&self) -> Option<String> {
        Some(self.root.display().to_string())
    }

    fn describe(&self) -> Vec<String> {
        vec![
            format!("Local model: {}", self.root.display()),
            format!("Model ID: {}", self.identity.id),
        ]
    }

    fn selector(&self) -> &FileSelector {
        &self.selector
    }

    async fn compute_identity_fingerprint(&self) -> Result<Fingerprint, TargetError> {
        let files = self.matching_files()?;
        let readers = files.into_iter().map(|(relative, path)| {
            (
                relative,
                LazyFile {
                    path,
                    file: None,
                },
            )
        });

        fingerprint_set(readers).map_err(|e| TargetError::Io {
            path: self.root.clone(),
            source: e,
        })
    }

    async fn list_candidate_files(&self) -> Result<Vec<FileCandidate>, TargetError> {
        let mut candidates = Vec::new();
        for (relative, path) in self.matching_files()? {
            let content = std::fs::read(&path).map_err(|e| TargetError::Fetch {
                path: relative.clone(),
                reason: e.to_string(),
            })?;
            candidates.push(FileCandidate::from_content(relative, content));
        }
        Ok(candidates)
    }

    fn reviewed_fingerprint(&self, candidates: &[FileCandidate]) -> Option<Fingerprint> {
        let entries = candidates
            .iter()
            .map(|c| (c.relative_path.as_str(), c.content.as_slice()));
        fingerprint_set(entries).ok()
    }
}
