//! Verification commands: `verify` and `serve`

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use sentinel_core::{
    ApprovalPrompter, ConsolePrompter, FileSelector, LocalTarget, SavePolicy, SentinelConfig,
    Target, Verdict, Verifier, VerifyError, VerifyOptions, WebPrompter,
};

use crate::Settings;

/// Where the model comes from
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TargetSource {
    /// Hub repository id, e.g. `org/model`
    #[clap(long)]
    pub repo: Option<String>,

    /// Local model directory
    #[clap(long)]
    pub local: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[clap(flatten)]
    pub source: TargetSource,

    /// Hub revision (branch, tag or commit). Defaults to the configured revision.
    #[clap(long, requires = "repo")]
    pub revision: Option<String>,

    /// Glob selecting reviewed files. Defaults to the configured pattern.
    #[clap(long)]
    pub pattern: Option<String>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// Compare files even when the model fingerprint is unchanged
    #[clap(long)]
    pub check_files_only: bool,

    /// Record approved files even when others are rejected
    #[clap(long)]
    pub save_partial: bool,

    /// Review through the local web approval surface instead of the console
    #[clap(long)]
    pub web: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// Address to bind. Defaults to the configured host.
    #[clap(long)]
    pub host: Option<String>,

    /// Port to bind; 0 picks a free port. Defaults to the configured port.
    #[clap(long)]
    pub port: Option<u16>,
}

impl TargetArgs {
    fn selector(&self, config: &SentinelConfig) -> Result<FileSelector> {
        let pattern = self.pattern.as_deref().unwrap_or(&config.file_pattern);
        FileSelector::new(pattern).with_context(|| format!("Invalid file pattern: {pattern}"))
    }

    /// Build the target the arguments describe
    pub fn build(&self, config: &SentinelConfig) -> Result<Box<dyn Target>> {
        let selector = self.selector(config)?;

        match (&self.source.repo, &self.source.local) {
            (Some(repo), _) => {
                let revision = self
                    .revision
                    .clone()
                    .unwrap_or_else(|| config.default_revision.clone());
                hub_target(config, repo, &revision, selector)
            }
            (None, Some(dir)) => {
                let target = LocalTarget::new(dir, selector).map_err(VerifyError::from)?;
                Ok(Box::new(target))
            }
            (None, None) => anyhow::bail!("Either --repo or --local is required"),
        }
    }
}

#[cfg(feature = "hub")]
fn hub_target(
    config: &SentinelConfig,
    repo: &str,
    revision: &str,
    selector: FileSelector,
) -> Result<Box<dyn Target>> {
    use sentinel_core::{HfHubClient, RemoteTarget};

    let client = HfHubClient::new(&config.hub).context("Failed to create hub client")?;
    Ok(Box::new(RemoteTarget::new(client, repo, revision, selector)))
}

#[cfg(not(feature = "hub"))]
fn hub_target(
    _config: &SentinelConfig,
    repo: &str,
    _revision: &str,
    _selector: FileSelector,
) -> Result<Box<dyn Target>> {
    anyhow::bail!(
        "Cannot verify {repo}: model-sentinel was built without hub support (enable the `hub` feature)"
    )
}

fn verify_options(config: &SentinelConfig, args: &VerifyArgs) -> VerifyOptions {
    VerifyOptions {
        force_file_check: args.check_files_only,
        save_policy: if args.save_partial {
            SavePolicy::PartialSave
        } else {
            SavePolicy::AllOrNothing
        },
        run_reports: config.run_reports,
    }
}

fn web_prompter(config: &SentinelConfig) -> WebPrompter {
    WebPrompter::new(config.web.clone())
        .with_announce(|url| println!("🌐 Review pending files at {url}"))
}

/// `model-sentinel verify`
pub async fn execute_verify(settings: &Settings, args: &VerifyArgs) -> Result<()> {
    let config = &settings.config;
    let target = args.target.build(config)?;

    let prompter: Box<dyn ApprovalPrompter> = if args.web {
        Box::new(web_prompter(config))
    } else {
        Box::new(ConsolePrompter::stdio().with_pager(config.pager.clone()))
    };

    run_verification(settings, target.as_ref(), prompter.as_ref(), verify_options(config, args))
        .await
}

/// `model-sentinel serve`
pub async fn execute_serve(settings: &Settings, args: &ServeArgs) -> Result<()> {
    let mut config = settings.config.clone();
    if let Some(host) = &args.host {
        config.web.host = host.clone();
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }

    let target = args.target.build(&config)?;
    let options = VerifyOptions {
        run_reports: config.run_reports,
        ..VerifyOptions::default()
    };

    run_verification(settings, target.as_ref(), &web_prompter(&config), options).await
}

async fn run_verification(
    settings: &Settings,
    target: &dyn Target,
    prompter: &dyn ApprovalPrompter,
    options: VerifyOptions,
) -> Result<()> {
    println!("🔍 Verifying {}", target.identity());
    for line in target.describe() {
        println!("   {line}");
    }

    let verifier = Verifier::new(settings.store()).with_options(options);
    match verifier.verify(target, prompter).await {
        Ok(verdict) => {
            print_verdict(&verdict);
            Ok(())
        }
        Err(err) => {
            err.log_if_security_critical();
            println!("\n❌ {err}");
            if let VerifyError::RejectedApproval {
                partially_saved: true,
                ..
            } = &err
            {
                println!("   Approved files were recorded; the model remains pending");
            }
            std::process::exit(1);
        }
    }
}

fn print_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::AlreadyVerified { fingerprint, .. } => {
            println!("✅ {}", verdict.message());
            println!("   Fingerprint: {}", fingerprint.short());
        }
        Verdict::Approved {
            fingerprint,
            newly_approved,
            report_key,
            ..
        } => {
            println!("\n✅ {}", verdict.message());
            for path in newly_approved {
                println!("   ✓ {path}");
            }
            println!("   Fingerprint: {}", fingerprint.short());
            if let Some(key) = report_key {
                println!("📝 Run report: {key}");
            }
        }
    }
}
