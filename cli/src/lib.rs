pub mod config_io;

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use restsync::save::{SaveEngine, SaveOptions, SaveReport};
use restsync::store::fs::{FileSecretStore, FsMetadataService, FsResourceStore};
use restsync::store::http::HttpRemote;
use restsync::store::{ListPolicy, Orchestrator, Resource};
use restsync_core::Error;
use serde_json::Value;

use config_io::LoadedConfig;

#[derive(Debug, Parser)]
#[command(name = "restsync", version)]
pub struct Cli {
    /// Repository config file (.toml or .json). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save a remote resource, collection or wildcard path into the repository.
    Save(SaveArgs),
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Logical path; `_` segments expand against the remote, a trailing `/`
    /// reads the collection itself.
    pub path: String,

    /// Read the payload from a JSON file (`-` for stdin) instead of the remote.
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub as_items: bool,

    #[arg(long)]
    pub as_one_resource: bool,

    /// Save even if plaintext-looking secrets are present.
    #[arg(long)]
    pub ignore: bool,

    /// Overwrite resources that already exist in the repository.
    #[arg(long)]
    pub overwrite: bool,

    /// Move detected secrets into the secret store; optionally only the
    /// listed attributes.
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_delimiter = ','
    )]
    pub handle_secrets: Option<Vec<String>>,
}

impl SaveArgs {
    pub fn options(&self) -> SaveOptions {
        let requested_secrets = self
            .handle_secrets
            .iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        SaveOptions {
            as_items: self.as_items,
            as_one_resource: self.as_one_resource,
            ignore: self.ignore,
            force: self.overwrite,
            handle_secrets: self.handle_secrets.is_some(),
            requested_secrets,
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<SaveReport> {
    let loaded = match &cli.config {
        Some(path) => config_io::load_config(path)?,
        None => config_io::default_config(),
    };
    match cli.command {
        Command::Save(args) => run_save(&loaded, &args),
    }
}

pub fn run_save(loaded: &LoadedConfig, args: &SaveArgs) -> anyhow::Result<SaveReport> {
    let input = args.input.as_deref().map(read_input).transpose()?;
    let config = &loaded.config;

    let mut store = FsResourceStore::new(loaded.resolve(&config.repository_dir));
    let mut metadata = FsMetadataService::new(loaded.resolve(&config.metadata_dir));
    let mut secrets = FileSecretStore::new(loaded.resolve(&config.secrets_file));
    let mut remote = match HttpRemote::new(&config.remote, config.save.clone()) {
        Ok(remote) => Some(remote),
        Err(err) if input.is_some() => {
            tracing::debug!(err = %err, "remote not configured; saving supplied input only");
            None
        }
        Err(err) => return Err(err.into()),
    };
    let mut offline = Offline;
    let orchestrator: &mut dyn Orchestrator = match remote.as_mut() {
        Some(remote) => remote,
        None => &mut offline,
    };

    let mut engine = SaveEngine::new(orchestrator, &mut store)
        .with_metadata(&mut metadata)
        .with_secrets(&mut secrets)
        .with_rules(config.save.clone());
    let report = engine.execute(&args.path, input, &args.options())?;
    Ok(report)
}

fn read_input(path: &Path) -> anyhow::Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        std::fs::read_to_string(path)?
    };
    let value = serde_json::from_str(&raw)
        .map_err(|err| Error::Validation(format!("invalid input json: {err}")))?;
    Ok(value)
}

/// Stands in for the remote when only supplied input is saved.
struct Offline;

impl Orchestrator for Offline {
    fn get_remote(&mut self, logical_path: &str) -> restsync_core::Result<Value> {
        Err(Error::Validation(format!(
            "remote.base_url is required to read {logical_path:?} from the remote server"
        )))
    }

    fn list_remote(
        &mut self,
        logical_path: &str,
        _policy: ListPolicy,
    ) -> restsync_core::Result<Vec<Resource>> {
        self.get_remote(logical_path).map(|_| Vec::new())
    }
}

/// Process exit status for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(err) = err.downcast_ref::<Error>() else {
        return 1;
    };
    match err {
        Error::Validation(_) => 2,
        Error::NotFound(_) => 3,
        Error::Conflict(_) => 4,
        Error::Auth(_) => 5,
        Error::Transport(_) => 6,
        Error::Cancelled => 130,
        _ => 1,
    }
}
