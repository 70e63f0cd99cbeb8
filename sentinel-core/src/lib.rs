//! Model Sentinel - trust-on-first-use integrity verification for model code
//!
//! Models that ship executable code alongside their weights are only as safe as
//! that code. This crate detects when such code changed since a human last
//! reviewed it, asks for re-approval of exactly the changed files, and remembers
//! approvals so unchanged code is never reviewed twice.
//!
//! Design Principles:
//! - Fail closed - an unreadable or unanswered file is never trusted
//! - All-or-nothing promotion - the model fingerprint moves only when every change is approved
//! - Approval history is never lost, and legacy metadata upgrades without corruption

pub mod compiler;
pub mod config;
pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod prompt;
pub mod report;
pub mod session;
pub mod store;
pub mod target;
pub mod verify;

pub use config::SentinelConfig;
pub use error::{PromptError, StoreError, TargetError, VerifyError};
pub use fingerprint::Fingerprint;
pub use prompt::{ApprovalPrompter, ConsolePrompter, PendingFile, WebPrompter};
pub use session::SavePolicy;
pub use store::TrustStore;
pub use target::{FileSelector, LocalTarget, ModelIdentity, RemoteTarget, Target, TargetKind};
pub use verify::{Verdict, Verifier, VerifyOptions};

#[cfg(feature = "hub")]
pub use target::HfHubClient;
