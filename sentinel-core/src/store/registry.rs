//! Registry of known models
//!
//! A derived index over per-model metadata. It can always be regenerated and is
//! never consulted as the source of approval truth.

use super::timestamp;
use crate::target::TargetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trust state recorded for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStatus {
    /// Every file of the current identity fingerprint is approved
    Verified,
    /// Some files were approved but the model has not been promoted
    Pending,
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryStatus::Verified => write!(f, "verified"),
            RegistryStatus::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(rename = "type")]
    pub kind: TargetKind,

    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub last_verified: Option<DateTime<Utc>>,

    pub status: RegistryStatus,

    /// Local path or other provenance. Older stores call it `original_path`.
    #[serde(default, alias = "original_path", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// The `registry.json` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub models: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.models.get(key)
    }

    pub fn upsert(&mut self, key: impl Into<String>, entry: RegistryEntry) {
        self.models.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
