//! Audit report for a single verification run

use crate::fingerprint::Fingerprint;
use crate::session::Disposition;
use crate::target::TargetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Nothing was rejected
    Ok,
    /// At least one file was rejected
    Ng,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTarget {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub ok: usize,
    pub ng: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    pub path: String,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub disposition: Disposition,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool_version: String,
    pub target: ReportTarget,
    pub overall_status: RunStatus,
    pub summary: RunSummary,
    pub files: Vec<ReportFile>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.overall_status == RunStatus::Ok
    }

    /// Paths rejected during the run, in report order
    pub fn rejected_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.approved)
            .map(|f| f.path.clone())
            .collect()
    }
}
