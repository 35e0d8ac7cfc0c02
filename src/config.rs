use crate::store::{atomic_write, state_root};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FILENAME: &str = "config.toml";

const PERMISSION_MODES: &[&str] = &["", "default", "acceptEdits", "plan", "bypassPermissions"];

/// User configuration stored in `~/.hail-mary/config.toml`.
///
/// ```toml
/// assistant_command = "bunx"
/// assistant_args = ["@anthropic-ai/claude-code@latest"]
/// permission_mode = "plan"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Program used to launch the Assistant.
    #[serde(default = "default_assistant_command")]
    pub assistant_command: String,

    /// Arguments placed before all generated ones.
    #[serde(default)]
    pub assistant_args: Vec<String>,

    /// Pass `--dangerously-skip-permissions`.
    #[serde(default = "default_true")]
    pub skip_permissions: bool,

    /// Value for `--permission-mode`; empty omits the flag.
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,

    #[serde(default = "default_true")]
    pub enable_background_tasks: bool,

    #[serde(default = "default_true")]
    pub maintain_working_dir: bool,

    /// Age after which `sessions clean` removes parent records.
    #[serde(default = "default_stale_session_days")]
    pub stale_session_days: u64,
}

fn default_assistant_command() -> String {
    "claude".into()
}

fn default_permission_mode() -> String {
    "plan".into()
}

fn default_true() -> bool {
    true
}

fn default_stale_session_days() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant_command: default_assistant_command(),
            assistant_args: Vec::new(),
            skip_permissions: true,
            permission_mode: default_permission_mode(),
            enable_background_tasks: true,
            maintain_working_dir: true,
            stale_session_days: default_stale_session_days(),
        }
    }
}

pub fn default_path() -> Result<PathBuf> {
    Ok(state_root()?.join(FILENAME))
}

fn display(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

impl Config {
    /// Load from `path`. A missing file yields defaults; missing keys are
    /// filled in via serde.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("serializing config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        atomic_write(path, toml_str.as_bytes())?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.assistant_command.trim().is_empty() {
            bail!("assistant_command must not be empty");
        }
        if !PERMISSION_MODES.contains(&self.permission_mode.as_str()) {
            bail!(
                "permission_mode must be one of {}",
                PERMISSION_MODES[1..].join(", ")
            );
        }
        Ok(())
    }

    fn table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self).context("serializing config")? {
            toml::Value::Table(table) => Ok(table),
            _ => bail!("config did not serialize to a table"),
        }
    }

    /// `(key, value)` pairs, sorted by key.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .table()?
            .iter()
            .map(|(key, value)| (key.clone(), display(value)))
            .collect())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        let table = self.table()?;
        match table.get(key) {
            Some(value) => Ok(display(value)),
            None => bail!(
                "unknown config key `{key}` (known: {})",
                table.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// Parse `raw` according to the current type of `key` and return the
    /// updated configuration. Lists are comma separated.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self> {
        let mut table = self.table()?;
        let Some(current) = table.get(key) else {
            bail!("unknown config key `{key}`");
        };
        let value = match current {
            toml::Value::Boolean(_) => toml::Value::Boolean(
                raw.trim()
                    .parse()
                    .with_context(|| format!("`{key}` expects true or false, got {raw:?}"))?,
            ),
            toml::Value::Integer(_) => toml::Value::Integer(
                raw.trim()
                    .parse()
                    .with_context(|| format!("`{key}` expects an integer, got {raw:?}"))?,
            ),
            toml::Value::Array(_) => toml::Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| toml::Value::String(s.to_string()))
                    .collect(),
            ),
            _ => toml::Value::String(raw.to_string()),
        };
        table.insert(key.to_string(), value);
        let updated: Config = toml::Value::Table(table)
            .try_into()
            .with_context(|| format!("invalid value for `{key}`"))?;
        updated.validate()?;
        Ok(updated)
    }
}
