//! Trust store - registry, per-model metadata, approved snapshots and run reports
//!
//! Layout, relative to the backend root:
//!
//! ```text
//! registry.json
//! <kind>/<id>/metadata.json
//! <kind>/<id>/files/<relative path>
//! <kind>/<id>/runs/<run id>.json
//! ```
//!
//! Metadata is the source of truth. The registry is an index that
//! [`TrustStore::rebuild_registry`] can regenerate at any time.

pub mod backend;
pub mod metadata;
pub mod registry;
mod timestamp;

pub use backend::{FsBackend, MemoryBackend, StoreBackend};
pub use metadata::{FileRecord, ModelMetadata, SCHEMA_VERSION};
pub use registry::{Registry, RegistryEntry, RegistryStatus};

use crate::error::StoreError;
use crate::fingerprint::{fingerprint_bytes, Fingerprint};
use crate::report::RunReport;
use crate::target::{ModelIdentity, TargetKind};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const REGISTRY_KEY: &str = "registry.json";
const METADATA_FILE: &str = "metadata.json";

/// Metadata together with the tag of the bytes it was decoded from
#[derive(Debug, Clone)]
pub struct VersionedMetadata {
    pub metadata: ModelMetadata,
    /// `None` when no document existed
    pub etag: Option<Fingerprint>,
}

/// A model known to the store
#[derive(Debug, Clone)]
pub struct StoredModel {
    pub identity: ModelIdentity,
    pub entry: Option<RegistryEntry>,
    pub metadata: ModelMetadata,
}

/// Trust store over a pluggable backend
pub struct TrustStore {
    backend: Box<dyn StoreBackend>,
}

impl TrustStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Directory-backed store
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(FsBackend::new(root))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// Create the root and kind areas. Safe to call repeatedly.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        self.backend.ensure_dir("")?;
        self.backend.ensure_dir(TargetKind::Hub.as_str())?;
        self.backend.ensure_dir(TargetKind::Local.as_str())
    }

    fn metadata_key(model: &ModelIdentity) -> String {
        format!("{}/{}", model.registry_key(), METADATA_FILE)
    }

    fn snapshot_key(model: &ModelIdentity, path: &str) -> String {
        format!("{}/files/{}", model.registry_key(), path)
    }

    fn run_key(model: &ModelIdentity, run_id: &str) -> String {
        format!("{}/runs/{}.json", model.registry_key(), run_id)
    }

    fn write_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })?;
        self.backend.write(key, &content)
    }

    /// Load the registry, empty if none was written yet
    pub fn load_registry(&self) -> Result<Registry, StoreError> {
        match self.backend.read(REGISTRY_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
                key: REGISTRY_KEY.to_string(),
                source,
            }),
            None => Ok(Registry::default()),
        }
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<(), StoreError> {
        self.write_json(REGISTRY_KEY, registry)
    }

    /// Load a model's metadata, upgraded to the canonical schema.
    /// A model never seen before gets empty metadata.
    pub fn load_metadata(&self, model: &ModelIdentity) -> Result<ModelMetadata, StoreError> {
        Ok(self.load_metadata_versioned(model)?.metadata)
    }

    /// Unconditional save, last writer wins
    pub fn save_metadata(
        &self,
        model: &ModelIdentity,
        metadata: &ModelMetadata,
    ) -> Result<(), StoreError> {
        let key = Self::metadata_key(model);
        let content = metadata.encode(&key)?;
        self.backend.write(&key, &content)
    }

    pub fn load_metadata_versioned(
        &self,
        model: &ModelIdentity,
    ) -> Result<VersionedMetadata, StoreError> {
        let key = Self::metadata_key(model);
        match self.backend.read(&key)? {
            Some(bytes) => Ok(VersionedMetadata {
                metadata: ModelMetadata::decode(&key, &bytes)?,
                etag: Some(fingerprint_bytes(&bytes)),
            }),
            None => Ok(VersionedMetadata {
                metadata: ModelMetadata::empty(),
                etag: None,
            }),
        }
    }

    /// Save only if the stored document is still the one `expected` was taken from.
    ///
    /// Returns the tag of the newly written document.
    pub fn save_metadata_if_unchanged(
        &self,
        model: &ModelIdentity,
        metadata: &ModelMetadata,
        expected: Option<&Fingerprint>,
    ) -> Result<Fingerprint, StoreError> {
        self.ensure_metadata_unchanged(model, expected)?;

        let key = Self::metadata_key(model);
        let content = metadata.encode(&key)?;
        self.backend.write(&key, &content)?;
        Ok(fingerprint_bytes(&content))
    }

    /// Fail with [`StoreError::Conflict`] unless the stored document still has tag `expected`
    pub fn ensure_metadata_unchanged(
        &self,
        model: &ModelIdentity,
        expected: Option<&Fingerprint>,
    ) -> Result<(), StoreError> {
        let key = Self::metadata_key(model);
        let current = self.backend.read(&key)?.map(|bytes| fingerprint_bytes(&bytes));

        if current.as_ref() != expected {
            warn!("Metadata for {} changed since it was loaded", model);
            return Err(StoreError::Conflict { key });
        }
        Ok(())
    }

    /// Store approved content verbatim, replacing any earlier snapshot
    pub fn save_file_snapshot(
        &self,
        model: &ModelIdentity,
        path: &str,
        content: &[u8],
    ) -> Result<(), StoreError> {
        self.backend.write(&Self::snapshot_key(model, path), content)
    }

    /// Store several snapshots. Every key is validated before the first write, so a
    /// path the store cannot hold fails the batch without touching anything.
    pub fn save_file_snapshots<'a, I>(&self, model: &ModelIdentity, files: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let files: Vec<(String, &[u8])> = files
            .into_iter()
            .map(|(path, content)| (Self::snapshot_key(model, path), content))
            .collect();

        for (key, _) in &files {
            backend::validate_key(key)?;
        }
        for (key, content) in &files {
            self.backend.write(key, content)?;
        }
        debug!("Stored {} snapshot(s) for {}", files.len(), model);
        Ok(())
    }

    pub fn load_file_snapshot(
        &self,
        model: &ModelIdentity,
        path: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.read(&Self::snapshot_key(model, path))
    }

    /// Upsert the registry entry for a model.
    ///
    /// `last_verified` moves only when the model is verified; a pending entry keeps
    /// the previous timestamp.
    pub fn register(
        &self,
        model: &ModelIdentity,
        status: RegistryStatus,
        origin: Option<String>,
    ) -> Result<RegistryEntry, StoreError> {
        let mut registry = self.load_registry()?;
        let key = model.registry_key();
        let previous = registry.get(&key).cloned();

        let last_verified = match status {
            RegistryStatus::Verified => Some(Utc::now()),
            RegistryStatus::Pending => previous.as_ref().and_then(|e| e.last_verified),
        };
        let entry = RegistryEntry {
            kind: model.kind,
            last_verified,
            status,
            origin: origin.or_else(|| previous.and_then(|e| e.origin)),
        };

        registry.upsert(key, entry.clone());
        self.save_registry(&registry)?;
        debug!("Registered {} as {}", model, status);
        Ok(entry)
    }

    /// Identities of every model with a metadata document
    fn model_areas(&self) -> Result<Vec<ModelIdentity>, StoreError> {
        let suffix = format!("/{METADATA_FILE}");
        let candidates: BTreeSet<String> = self
            .backend
            .list("")?
            .into_iter()
            .filter_map(|key| key.strip_suffix(&suffix).map(str::to_string))
            .collect();

        // Snapshots can themselves be called metadata.json; those live inside an area
        let areas = candidates.iter().filter(|area| {
            !candidates
                .iter()
                .any(|other| other != *area && area.starts_with(&format!("{other}/")))
        });

        Ok(areas
            .filter_map(|area| ModelIdentity::from_registry_key(area))
            .collect())
    }

    /// Regenerate the registry purely from metadata documents
    pub fn rebuild_registry(&self) -> Result<Registry, StoreError> {
        let previous = self.load_registry()?;
        let mut registry = Registry::default();

        for identity in self.model_areas()? {
            let metadata = self.load_metadata(&identity)?;
            let key = identity.registry_key();
            let status = if metadata.model_hash.is_some() {
                RegistryStatus::Verified
            } else {
                RegistryStatus::Pending
            };
            let origin = metadata
                .origin
                .clone()
                .or_else(|| previous.get(&key).and_then(|e| e.origin.clone()));

            registry.upsert(
                key,
                RegistryEntry {
                    kind: identity.kind,
                    last_verified: metadata.last_verified,
                    status,
                    origin,
                },
            );
        }

        self.save_registry(&registry)?;
        info!("Rebuilt registry with {} models", registry.len());
        Ok(registry)
    }

    /// Write an audit report under the model's `runs/` area, returning its key
    pub fn save_run_report(
        &self,
        model: &ModelIdentity,
        report: &RunReport,
    ) -> Result<String, StoreError> {
        let key = Self::run_key(model, &report.run_id.to_string());
        self.write_json(&key, report)?;
        Ok(key)
    }

    /// Reports written for a model, oldest first
    pub fn list_run_reports(&self, model: &ModelIdentity) -> Result<Vec<RunReport>, StoreError> {
        let prefix = format!("{}/runs", model.registry_key());
        let mut reports = Vec::new();
        for key in self.backend.list(&prefix)? {
            let Some(bytes) = self.backend.read(&key)? else {
                continue;
            };
            let report: RunReport =
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse { key, source })?;
            reports.push(report);
        }
        // UUIDv7 ids sort by creation time
        reports.sort_by_key(|r| r.run_id);
        Ok(reports)
    }

    /// Every known model: registry entries joined with their metadata
    pub fn list_models(&self) -> Result<Vec<StoredModel>, StoreError> {
        let registry = self.load_registry()?;

        let mut identities: BTreeSet<String> = registry.models.keys().cloned().collect();
        identities.extend(self.model_areas()?.iter().map(ModelIdentity::registry_key));

        let mut models = Vec::new();
        for key in identities {
            let Some(identity) = ModelIdentity::from_registry_key(&key) else {
                warn!("Skipping malformed registry key {:?}", key);
                continue;
            };
            models.push(StoredModel {
                metadata: self.load_metadata(&identity)?,
                entry: registry.get(&key).cloned(),
                identity,
            });
        }
        Ok(models)
    }

    /// Delete the whole store
    pub fn wipe(&self) -> Result<(), StoreError> {
        self.backend.wipe()?;
        info!("Wiped trust store at {}", self.location());
        Ok(())
    }
}
