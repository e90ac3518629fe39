use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// Runtime settings: defaults, then `txevents.toml`, then `TXEV_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub days_ahead: u32,
    pub output_csv: PathBuf,
    pub output_ics: PathBuf,
    pub output_log: PathBuf,
    pub db_path: PathBuf,
    pub snapshots: bool,
    pub user_agent: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub sources_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            days_ahead: 90,
            output_csv: PathBuf::from("events.csv"),
            output_ics: PathBuf::from("events.ics"),
            output_log: PathBuf::from("run_log.json"),
            db_path: PathBuf::from("data/events.sqlite"),
            snapshots: true,
            user_agent: USER_AGENT.to_string(),
            request_delay_ms: 500,
            timeout_secs: 30,
            max_retries: 2,
            backoff_ms: 1000,
            sources_file: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from("txevents", "TXEV")
    }

    fn load_from(file: &str, env_prefix: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Failed to load settings")
    }
}
