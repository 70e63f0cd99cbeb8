//! Verification orchestrator
//!
//! Runs strictly in order: identity fingerprint, model-level check, file listing,
//! file-level partition, prompting, compilation, persistence. Nothing is written
//! before the last step, so an aborted run leaves the store untouched. Within
//! persistence the metadata document is written after the snapshots; it is the
//! commit point, and a run that fails before it never promotes anything.

use crate::compiler::{compile, CompileContext};
use crate::detect::{check_promoted, partition, ModelCheck, PendingCandidate};
use crate::error::VerifyError;
use crate::fingerprint::{fingerprint_bytes, Fingerprint};
use crate::prompt::{ApprovalPrompter, PendingFile};
use crate::report::RunReport;
use crate::session::{ApprovalSession, SavePolicy};
use crate::store::{RegistryStatus, TrustStore};
use crate::target::{ModelIdentity, Target};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Knobs for a verification run
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Compare files even when the model fingerprint is unchanged
    pub force_file_check: bool,
    pub save_policy: SavePolicy,
    /// Write an audit report for each run that persists anything
    pub run_reports: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            force_file_check: false,
            save_policy: SavePolicy::AllOrNothing,
            run_reports: true,
        }
    }
}

/// Successful verification outcomes
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Nothing changed since the last promotion; no files were looked at
    AlreadyVerified {
        identity: ModelIdentity,
        fingerprint: Fingerprint,
    },
    /// Every pending file was approved and the model was promoted
    Approved {
        identity: ModelIdentity,
        fingerprint: Fingerprint,
        /// Files approved during this run
        newly_approved: Vec<String>,
        carried_forward: usize,
        report: RunReport,
        /// Store key of the written report, if reports are enabled
        report_key: Option<String>,
    },
}

impl Verdict {
    pub fn identity(&self) -> &ModelIdentity {
        match self {
            Verdict::AlreadyVerified { identity, .. } | Verdict::Approved { identity, .. } => {
                identity
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Verdict::AlreadyVerified { identity, .. } => {
                format!("{identity} is already verified")
            }
            Verdict::Approved {
                identity,
                newly_approved,
                carried_forward,
                ..
            } => format!(
                "{identity} verified: {} file(s) approved, {carried_forward} unchanged",
                newly_approved.len()
            ),
        }
    }
}

/// Collapse a run result into `(trusted, message)` for embedders
pub fn into_outcome(result: Result<Verdict, VerifyError>) -> (bool, String) {
    match result {
        Ok(verdict) => (true, verdict.message()),
        Err(err) => (false, err.to_string()),
    }
}

pub struct Verifier {
    store: TrustStore,
    options: VerifyOptions,
    tool_version: String,
}

impl Verifier {
    pub fn new(store: TrustStore) -> Self {
        Self {
            store,
            options: VerifyOptions::default(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tool_version(mut self, tool_version: impl Into<String>) -> Self {
        self.tool_version = tool_version.into();
        self
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Verify a target, asking `prompter` about anything new or changed
    pub async fn verify<T, P>(&self, target: &T, prompter: &P) -> Result<Verdict, VerifyError>
    where
        T: Target + ?Sized,
        P: ApprovalPrompter + ?Sized,
    {
        let identity = target.identity().clone();
        info!("Verifying {}", identity);

        let loaded = self.store.load_metadata_versioned(&identity)?;
        let current = target.compute_identity_fingerprint().await?;
        let check = check_promoted(&loaded.metadata, &current, target.selector());

        match &check {
            ModelCheck::AlreadyVerified if !self.options.force_file_check => {
                info!("{} unchanged ({}), skipping file checks", identity, current.short());
                return Ok(Verdict::AlreadyVerified {
                    identity,
                    fingerprint: current,
                });
            }
            ModelCheck::AlreadyVerified => {
                debug!("{} unchanged, checking files anyway", identity);
            }
            ModelCheck::FirstSeen { .. } => info!("{} seen for the first time", identity),
            ModelCheck::Changed { previous, .. } => warn!(
                "{} changed: {} -> {}",
                identity,
                previous.short(),
                current.short()
            ),
            ModelCheck::SelectorChanged { previous, current: selected } => warn!(
                "{} was verified for {}, now selecting {}; checking files",
                identity, previous, selected
            ),
        }

        let candidates = target.list_candidate_files().await?;
        // Promote what was actually listed, not what an earlier read saw
        let reviewed = target
            .reviewed_fingerprint(&candidates)
            .unwrap_or_else(|| current.clone());
        if reviewed != current {
            warn!(
                "{} changed while being read ({} -> {}); promoting the reviewed contents",
                identity,
                current.short(),
                reviewed.short()
            );
        }
        let changes = partition(&loaded.metadata, candidates);
        info!(
            "{} candidate files: {} unchanged, {} need review",
            changes.total(),
            changes.carried_forward.len(),
            changes.pending.len()
        );

        if check.is_verified() && reviewed == current && !changes.has_pending() {
            return Ok(Verdict::AlreadyVerified {
                identity,
                fingerprint: current,
            });
        }

        let carried_forward = changes.carried_forward.len();
        let pending = self.pending_files(&identity, changes.pending)?;
        let session = ApprovalSession::run(changes.carried_forward, pending, prompter).await?;

        let now = Utc::now();
        let compiled = compile(
            &loaded.metadata,
            &session,
            &CompileContext {
                identity: &identity,
                tool_version: &self.tool_version,
                run_id: Uuid::now_v7(),
                now,
            },
        );

        let rejected = session.rejected();
        if !rejected.is_empty() && self.options.save_policy == SavePolicy::AllOrNothing {
            warn!("{} file(s) rejected, nothing recorded", rejected.len());
            return Err(VerifyError::RejectedApproval {
                rejected,
                partially_saved: false,
            });
        }

        let promotable = compiled.is_promotable();
        let mut metadata = compiled.metadata;
        if let Some(origin) = target.origin() {
            metadata.origin = Some(origin);
        }
        if promotable {
            metadata.promote_under(reviewed.clone(), target.selector().as_str(), now);
        }

        // Persist: snapshots, then metadata as the commit point, then the index
        self.store.ensure_layout()?;
        self.store
            .ensure_metadata_unchanged(&identity, loaded.etag.as_ref())?;

        let newly_approved: Vec<String> = session
            .decided()
            .filter(|file| file.approved)
            .map(|file| file.filename.clone())
            .collect();
        self.store.save_file_snapshots(
            &identity,
            session
                .decided()
                .filter(|file| file.approved)
                .map(|file| (file.filename.as_str(), file.content.as_slice())),
        )?;

        self.store
            .save_metadata_if_unchanged(&identity, &metadata, loaded.etag.as_ref())?;

        let status = if promotable {
            RegistryStatus::Verified
        } else {
            RegistryStatus::Pending
        };
        self.store.register(&identity, status, target.origin())?;

        let report_key = if self.options.run_reports {
            Some(self.store.save_run_report(&identity, &compiled.report)?)
        } else {
            None
        };

        if !rejected.is_empty() {
            warn!(
                "{} file(s) rejected; kept {} approval(s) without promoting the model",
                rejected.len(),
                newly_approved.len()
            );
            return Err(VerifyError::RejectedApproval {
                rejected,
                partially_saved: true,
            });
        }

        info!("{} verified at {}", identity, reviewed.short());
        Ok(Verdict::Approved {
            identity,
            fingerprint: reviewed,
            newly_approved,
            carried_forward,
            report: compiled.report,
            report_key,
        })
    }

    /// Attach the previously approved snapshot to each pending file.
    ///
    /// A snapshot is only a diff base when it hashes to the approved fingerprint;
    /// anything else is dropped so the reviewer sees the full content.
    fn pending_files(
        &self,
        identity: &ModelIdentity,
        pending: Vec<PendingCandidate>,
    ) -> Result<Vec<PendingFile>, VerifyError> {
        let mut files = Vec::with_capacity(pending.len());
        for PendingCandidate { candidate, previous } in pending {
            let snapshot = match &previous {
                Some(approved) => self
                    .store
                    .load_file_snapshot(identity, &candidate.relative_path)?
                    .filter(|snapshot| {
                        let matches = fingerprint_bytes(snapshot) == *approved;
                        if !matches {
                            warn!(
                                "Snapshot of {} does not match its approval, showing full content",
                                candidate.relative_path
                            );
                        }
                        matches
                    }),
                None => None,
            };
            files.push(PendingFile::new(candidate, previous, snapshot));
        }
        Ok(files)
    }
}
