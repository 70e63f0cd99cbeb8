//! Metadata compiler
//!
//! Folds a completed approval session into the stored metadata. Pure: timestamps
//! and ids come in through [`CompileContext`], and nothing is read or written.

use crate::report::{ReportFile, ReportTarget, RunReport, RunStatus, RunSummary};
use crate::session::ApprovalSession;
use crate::store::{FileRecord, ModelMetadata};
use crate::target::ModelIdentity;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Inputs the compiler must not produce itself
#[derive(Debug, Clone)]
pub struct CompileContext<'a> {
    pub identity: &'a ModelIdentity,
    pub tool_version: &'a str,
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
}

/// New metadata plus the audit report for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRun {
    pub metadata: ModelMetadata,
    pub report: RunReport,
}

impl CompiledRun {
    /// True when nothing was rejected, so the model may be promoted
    pub fn is_promotable(&self) -> bool {
        self.report.summary.ng == 0
    }
}

pub fn compile(
    existing: &ModelMetadata,
    session: &ApprovalSession,
    ctx: &CompileContext<'_>,
) -> CompiledRun {
    let mut approved = existing.approved_map();
    let mut summary = RunSummary {
        total: session.files().len(),
        ..RunSummary::default()
    };

    for file in session.files() {
        if !file.approved {
            summary.ng += 1;
            continue;
        }
        summary.ok += 1;

        // An unchanged approval keeps its original record and timestamp
        let unchanged = approved
            .get(&file.filename)
            .is_some_and(|record| record.fingerprint == file.fingerprint);
        if !unchanged {
            approved.insert(
                file.filename.clone(),
                FileRecord {
                    path: file.filename.clone(),
                    fingerprint: file.fingerprint.clone(),
                    size: file.size(),
                    verified_at: Some(ctx.now),
                },
            );
        }
    }

    let mut metadata = existing.clone();
    metadata.set_approved(approved);

    let report = RunReport {
        run_id: ctx.run_id,
        timestamp: ctx.now,
        tool_version: ctx.tool_version.to_string(),
        target: ReportTarget {
            kind: ctx.identity.kind,
            id: ctx.identity.id.clone(),
        },
        overall_status: if summary.ng == 0 {
            RunStatus::Ok
        } else {
            RunStatus::Ng
        },
        summary,
        files: session
            .files()
            .iter()
            .map(|file| ReportFile {
                path: file.filename.clone(),
                fingerprint: file.fingerprint.clone(),
                size: file.size(),
                disposition: file.disposition,
                approved: file.approved,
            })
            .collect(),
    };

    CompiledRun { metadata, report }
}
