use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::Config;
use serde::Deserialize;

const ENV_PREFIX: &str = "INJECTOR";
const SETTINGS_FILE: &str = "injector";
const UNKNOWN_ACTOR: &str = "unknown";
const DRY_RUN_ACTOR: &str = "dry-run-user-id";

/// Values read once at startup from `injector.toml` and `INJECTOR_*`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub project_id: Option<String>,
    pub actor_id: Option<String>,
    pub db_path: Option<PathBuf>,
}

pub fn load() -> Result<Settings> {
    let cfg = Config::builder()
        .add_source(config::File::with_name(SETTINGS_FILE).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .build()
        .context("Failed to load settings")?;
    from_config(cfg)
}

pub fn from_config(cfg: Config) -> Result<Settings> {
    cfg.try_deserialize().context("Invalid settings")
}

impl Settings {
    /// Required before any file is processed.
    pub fn project_id(&self) -> Result<&str> {
        match self.project_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => bail!("{}_PROJECT_ID is not set", ENV_PREFIX),
        }
    }

    pub fn actor_id(&self, dry_run: bool) -> String {
        match self.actor_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ if dry_run => DRY_RUN_ACTOR.to_string(),
            _ => UNKNOWN_ACTOR.to_string(),
        }
    }

    /// Explicit path, else `data/<project>.sqlite`.
    pub fn db_path(&self, project_id: &str) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("data/{}.sqlite", project_id)))
    }
}

/// Everything the orchestrator needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub domain_id: String,
    pub project_id: String,
    pub actor_id: String,
    pub dry_run: bool,
    pub verbose: bool,
}

impl RunConfig {
    /// Root collection for shared data: `project-<domain-id>`.
    pub fn root_collection(&self) -> String {
        format!("project-{}", self.domain_id)
    }
}
