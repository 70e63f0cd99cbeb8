//! Model Sentinel - review and approve code shipped with ML models
//!
//! Thin command-line shell over `sentinel_core`: parses arguments, sets up tracing,
//! resolves configuration and renders results. All trust decisions live in the core.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sentinel_core::{SentinelConfig, TrustStore};

mod store_cli;
mod verify_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "model-sentinel",
    about = "Trust-on-first-use integrity verification for code shipped with ML models",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Trust store directory (overrides config and MODEL_SENTINEL_HOME)
    #[clap(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Configuration file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Verify a hub repository or local directory, prompting for changed files
    Verify {
        #[clap(flatten)]
        args: verify_cli::VerifyArgs,
    },

    /// Verify a target through the local web approval surface
    Serve {
        #[clap(flatten)]
        args: verify_cli::ServeArgs,
    },

    /// List models in the trust store
    List {
        /// Show every approved file
        #[clap(long)]
        files: bool,
    },

    /// Delete the whole trust store
    Delete {
        /// Skip confirmation prompt
        #[clap(long)]
        force: bool,
    },

    /// Regenerate registry.json from per-model metadata
    RebuildRegistry,
}

/// Resolved configuration shared by every command
pub(crate) struct Settings {
    pub config: SentinelConfig,
    pub store_dir: PathBuf,
}

impl Settings {
    fn load(config_path: Option<&PathBuf>, store_dir: Option<&PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => SentinelConfig::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => SentinelConfig::load().context("Failed to load configuration")?,
        };
        if let Some(dir) = store_dir {
            config.store_dir = Some(dir.clone());
        }

        let store_dir = config
            .resolve_store_dir()
            .context("Failed to resolve trust store directory")?;
        debug!("Using trust store at {}", store_dir.display());

        Ok(Settings { config, store_dir })
    }

    pub fn store(&self) -> TrustStore {
        TrustStore::open(&self.store_dir)
    }
}

fn initialize_tracing(log_level: &LogLevel) {
    // Logs go to stderr so stdout stays reserved for prompts and results
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_filter_directive()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let settings = Settings::load(cli.config.as_ref(), cli.store_dir.as_ref())?;

    match cli.command {
        Command::Verify { args } => verify_cli::execute_verify(&settings, &args).await,
        Command::Serve { args } => verify_cli::execute_serve(&settings, &args).await,
        Command::List { files } => store_cli::execute_list(&settings.store(), files),
        Command::Delete { force } => store_cli::execute_delete(&settings.store(), force),
        Command::RebuildRegistry => store_cli::execute_rebuild(&settings.store()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_repo_parses() {
        let cli = Cli::try_parse_from([
            "model-sentinel",
            "verify",
            "--repo",
            "org/model",
            "--revision",
            "v1.0",
            "--check-files-only",
        ])
        .unwrap();

        match cli.command {
            Command::Verify { args } => {
                assert_eq!(args.target.source.repo.as_deref(), Some("org/model"));
                assert_eq!(args.target.revision.as_deref(), Some("v1.0"));
                assert!(args.check_files_only);
                assert!(!args.save_partial);
                assert!(!args.web);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verify_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["model-sentinel", "verify"]).is_err());
        assert!(Cli::try_parse_from([
            "model-sentinel",
            "verify",
            "--repo",
            "org/model",
            "--local",
            "./model",
        ])
        .is_err());
    }

    #[test]
    fn test_revision_needs_repo() {
        let result = Cli::try_parse_from([
            "model-sentinel",
            "verify",
            "--local",
            "./model",
            "--revision",
            "main",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "model-sentinel",
            "list",
            "--files",
            "--store-dir",
            "/tmp/store",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/store")));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Command::List { files: true }));
    }

    #[test]
    fn test_serve_parses_host_and_port() {
        let cli = Cli::try_parse_from([
            "model-sentinel",
            "serve",
            "--local",
            "./model",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .unwrap();

        match cli.command {
            Command::Serve { args } => {
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.target.source.local, Some(PathBuf::from("./model")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_settings_flag_overrides_config_store_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        fs::write(&config_path, "store_dir: /from/config\nfile_pattern: \"*.txt\"\n").unwrap();

        let from_config = Settings::load(Some(&config_path), None).unwrap();
        assert_eq!(from_config.store_dir, PathBuf::from("/from/config"));
        assert_eq!(from_config.config.file_pattern, "*.txt");

        let flag = temp.path().join("store");
        let overridden = Settings::load(Some(&config_path), Some(&flag)).unwrap();
        assert_eq!(overridden.store_dir, flag);
    }
}
