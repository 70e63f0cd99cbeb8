//! Test helpers shared by the integration tests
//!
//! Not every test file uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use sentinel_core::error::{PromptError, TargetError};
use sentinel_core::fingerprint::Fingerprint;
use sentinel_core::prompt::{ApprovalPrompter, PendingFile};
use sentinel_core::target::{FileSelector, HubClient};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Write `(relative path, content)` pairs under `root`
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Prompter with canned answers per path; unlisted paths get `default`
pub struct ScriptedPrompter {
    answers: BTreeMap<String, bool>,
    default: bool,
    asked: Mutex<Vec<PendingFile>>,
}

impl ScriptedPrompter {
    pub fn approve_all() -> Self {
        Self::with_default(true)
    }

    pub fn reject_all() -> Self {
        Self::with_default(false)
    }

    pub fn with_default(default: bool) -> Self {
        Self {
            answers: BTreeMap::new(),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(mut self, path: &str, approved: bool) -> Self {
        self.answers.insert(path.to_string(), approved);
        self
    }

    /// Paths asked about, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn asked_files(&self) -> Vec<PendingFile> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalPrompter for ScriptedPrompter {
    async fn decide(&self, file: &PendingFile) -> Result<bool, PromptError> {
        self.asked.lock().unwrap().push(file.clone());
        Ok(self.answers.get(&file.path).copied().unwrap_or(self.default))
    }
}

/// In-memory hub that counts what it is asked for
#[derive(Default)]
pub struct CountingHub {
    revision: Mutex<String>,
    files: Mutex<Vec<(String, Vec<u8>)>>,
    fail_on: Mutex<Option<String>>,
    pub revision_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
}

impl CountingHub {
    pub fn new(revision: &str, files: &[(&str, &str)]) -> Self {
        let hub = Self::default();
        hub.publish(revision, files);
        hub
    }

    /// Replace the hub's content with a new revision
    pub fn publish(&self, revision: &str, files: &[(&str, &str)]) {
        *self.revision.lock().unwrap() = revision.to_string();
        *self.files.lock().unwrap() = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();
    }

    /// Make the download of one path fail
    pub fn fail_download(&self, path: &str) {
        *self.fail_on.lock().unwrap() = Some(path.to_string());
    }

    pub fn listings(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubClient for CountingHub {
    async fn revision_id(&self, repo_id: &str, _revision: &str) -> Result<Fingerprint, TargetError> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        if repo_id == "missing/model" {
            return Err(TargetError::NotFound {
                target: repo_id.to_string(),
            });
        }
        Ok(Fingerprint::new(self.revision.lock().unwrap().clone()))
    }

    async fn list_files(
        &self,
        _repo_id: &str,
        _revision: &str,
        selector: &FileSelector,
    ) -> Result<Vec<(String, Vec<u8>)>, TargetError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(path) = self.fail_on.lock().unwrap().clone() {
            return Err(TargetError::Fetch {
                path,
                reason: "HTTP 500".to_string(),
            });
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| selector.matches(path))
            .cloned()
            .collect())
    }
}
