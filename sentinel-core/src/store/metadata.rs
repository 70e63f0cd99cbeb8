//! Per-model metadata and schema migration
//!
//! Every document carries an explicit `schema_version`; a document without one is
//! version 0. Decoding upgrades one version at a time until the canonical shape is
//! reached, and saving always writes the canonical shape.

use super::timestamp;
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Schema version written by this build
pub const SCHEMA_VERSION: u32 = 2;

/// An approved file: a human accepted exactly this fingerprint at this path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub size: u64,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub verified_at: Option<DateTime<Utc>>,
}

/// The canonical `metadata.json` document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub schema_version: u32,

    /// Identity fingerprint of the last fully approved state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<Fingerprint>,

    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_verified: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Selector the promoted fingerprint was reviewed under. Absent means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pattern: Option<String>,

    /// Path-ordered, one record per path
    #[serde(default)]
    pub approved_files: Vec<FileRecord>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            model_hash: None,
            last_verified: None,
            origin: None,
            file_pattern: None,
            approved_files: Vec::new(),
        }
    }
}

impl ModelMetadata {
    /// Metadata for a model seen for the first time
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stored record for a path
    pub fn record(&self, path: &str) -> Option<&FileRecord> {
        self.approved_files.iter().find(|r| r.path == path)
    }

    /// Approved records keyed by path
    pub fn approved_map(&self) -> BTreeMap<String, FileRecord> {
        self.approved_files
            .iter()
            .map(|r| (r.path.clone(), r.clone()))
            .collect()
    }

    /// Replace approved files from a map, keeping path order
    pub fn set_approved(&mut self, approved: BTreeMap<String, FileRecord>) {
        self.approved_files = approved.into_values().collect();
    }

    /// Record that every file of `fingerprint` has been approved
    pub fn promote(&mut self, fingerprint: Fingerprint, now: DateTime<Utc>) {
        self.model_hash = Some(fingerprint);
        self.last_verified = Some(now);
    }

    /// Promote, remembering which selector chose the reviewed files
    pub fn promote_under(&mut self, fingerprint: Fingerprint, pattern: &str, now: DateTime<Utc>) {
        self.promote(fingerprint, now);
        self.file_pattern = Some(pattern.to_string());
    }

    /// Decode any supported schema version into the canonical shape
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })?;

        let mut document = match schema_version_of(key, &value)? {
            0 => Versioned::V0(from_value(key, value)?),
            1 => Versioned::V1(from_value(key, value)?),
            _ => Versioned::V2(from_value(key, value)?),
        };

        loop {
            document = match document {
                Versioned::V0(v0) => {
                    debug!("Upgrading {} from schema 0", key);
                    Versioned::V1(upgrade_v0(v0))
                }
                Versioned::V1(v1) => {
                    debug!("Upgrading {} from schema 1", key);
                    Versioned::V2(upgrade_v1(v1))
                }
                Versioned::V2(mut current) => {
                    current.normalize();
                    return Ok(current);
                }
            };
        }
    }

    /// Serialize in the canonical shape
    pub fn encode(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut canonical = self.clone();
        canonical.schema_version = SCHEMA_VERSION;
        canonical.normalize();
        serde_json::to_vec_pretty(&canonical).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })
    }

    /// Collapse duplicate paths (later entries win) and restore path order
    fn normalize(&mut self) {
        let mut approved = BTreeMap::new();
        for record in self.approved_files.drain(..) {
            approved.insert(record.path.clone(), record);
        }
        self.set_approved(approved);
    }
}

/// Read the explicit version tag. Absent means 0; anything unsupported is refused.
fn schema_version_of(key: &str, value: &Value) -> Result<u32, StoreError> {
    let mismatch = |found: String| StoreError::SchemaMismatch {
        key: key.to_string(),
        found,
        supported: SCHEMA_VERSION,
    };

    if !value.is_object() {
        return Err(mismatch("a non-object document".to_string()));
    }

    match value.get("schema_version") {
        None | Some(Value::Null) => Ok(0),
        Some(tag) => match tag.as_u64() {
            Some(v) if v <= u64::from(SCHEMA_VERSION) => Ok(v as u32),
            _ => Err(mismatch(tag.to_string())),
        },
    }
}

fn from_value<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Parse {
        key: key.to_string(),
        source,
    })
}

enum Versioned {
    V0(MetadataV0),
    V1(MetadataV1),
    V2(ModelMetadata),
}

/// Untagged legacy shape: a map of files keyed by path
#[derive(Debug, Deserialize)]
struct MetadataV0 {
    #[serde(default)]
    model_hash: Option<Fingerprint>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    last_verified: Option<DateTime<Utc>>,
    #[serde(default)]
    files: BTreeMap<String, FileV0>,
    /// Placeholder list some early stores wrote next to (or instead of) `files`
    #[serde(default)]
    approved_files: Vec<FileV1>,
}

#[derive(Debug, Deserialize)]
struct FileV0 {
    #[serde(default)]
    hash: Option<Fingerprint>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    verified_at: Option<DateTime<Utc>>,
}

/// Version 1: a list of per-run file results with a status each
#[derive(Debug, Deserialize)]
struct MetadataV1 {
    #[serde(default)]
    model_hash: Option<Fingerprint>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    last_verified: Option<DateTime<Utc>>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    files: Vec<FileV1>,
}

#[derive(Debug, Deserialize)]
struct FileV1 {
    #[serde(default)]
    path: String,
    #[serde(default, alias = "fingerprint")]
    hash: Option<Fingerprint>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default = "status_ok")]
    status: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    verified_at: Option<DateTime<Utc>>,
}

fn status_ok() -> String {
    "ok".to_string()
}

fn upgrade_v0(v0: MetadataV0) -> MetadataV1 {
    let mut files: Vec<FileV1> = v0.approved_files;
    files.extend(v0.files.into_iter().map(|(path, file)| FileV1 {
        path,
        hash: file.hash,
        size: file.size,
        status: status_ok(),
        verified_at: file.verified_at,
    }));

    MetadataV1 {
        model_hash: v0.model_hash,
        last_verified: v0.last_verified,
        origin: None,
        files,
    }
}

fn upgrade_v1(v1: MetadataV1) -> ModelMetadata {
    let mut approved = BTreeMap::new();

    for file in v1.files {
        if file.status != "ok" || file.path.is_empty() {
            continue;
        }
        // No fingerprint, no approval
        let Some(fingerprint) = file.hash.filter(|h| !h.as_str().is_empty()) else {
            warn!("Dropping legacy record for {} without a fingerprint", file.path);
            continue;
        };

        approved.insert(
            file.path.clone(),
            FileRecord {
                path: file.path,
                fingerprint,
                size: file.size.unwrap_or(0),
                verified_at: file.verified_at,
            },
        );
    }

    let mut metadata = ModelMetadata {
        schema_version: SCHEMA_VERSION,
        model_hash: v1.model_hash.filter(|h| !h.as_str().is_empty()),
        last_verified: v1.last_verified,
        origin: v1.origin,
        file_pattern: None,
        approved_files: Vec::new(),
    };
    metadata.set_approved(approved);
    metadata
}
