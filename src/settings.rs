//! Settings Merger: layers the tool's hooks onto the Assistant's existing
//! settings without dropping anything the user already had.

use crate::error::{Error, Result};
use crate::store::atomic_write;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PARENT_TOKEN_ENV: &str = "HAIL_MARY_PARENT_PID";
pub const FEATURE_PATH_ENV: &str = "HAIL_MARY_FEATURE_PATH";

/// One command invocation inside a matcher group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCommand {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    pub hooks: Vec<HookCommand>,
}

/// Hooks to add, keyed by event kind, in the order they should appear.
pub type HookSet = Vec<(String, Vec<MatcherGroup>)>;

// ---------------------------------------------------------------
// The tool's own hooks
// ---------------------------------------------------------------

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Shell command line the Assistant runs for each injected hook.
pub fn hook_command(exe: &Path, token: &str, feature_path: Option<&Path>) -> String {
    let mut command = format!("{PARENT_TOKEN_ENV}={}", shell_quote(token));
    if let Some(feature) = feature_path {
        command.push_str(&format!(
            " {FEATURE_PATH_ENV}={}",
            shell_quote(&feature.to_string_lossy())
        ));
    }
    command.push_str(&format!(" {} hook", shell_quote(&exe.to_string_lossy())));
    command
}

/// SessionStart, UserPromptSubmit and Stop, each invoking `<exe> hook`.
pub fn tool_hooks(exe: &Path, token: &str, feature_path: Option<&Path>) -> HookSet {
    let command = hook_command(exe, token, feature_path);
    [("SessionStart", 5), ("UserPromptSubmit", 2), ("Stop", 2)]
        .into_iter()
        .map(|(kind, timeout)| {
            let group = MatcherGroup {
                matcher: None,
                hooks: vec![HookCommand {
                    kind: "command".into(),
                    command: command.clone(),
                    timeout: Some(timeout),
                }],
            };
            (kind.to_string(), vec![group])
        })
        .collect()
}

// ---------------------------------------------------------------
// Merge
// ---------------------------------------------------------------

/// Load an existing settings file. A missing file (or no path) is empty.
pub fn load_existing(path: Option<&Path>) -> Result<Map<String, Value>> {
    let Some(path) = path else {
        return Ok(Map::new());
    };
    let contents = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no existing settings");
            return Ok(Map::new());
        }
        Err(e) => return Err(Error::io("reading", path, e)),
    };
    match serde_json::from_str(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Config(format!(
            "{}: settings must be a JSON object",
            path.display()
        ))),
        Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
    }
}

/// Append `new_hooks` to `settings.hooks`, existing groups first.
///
/// Keys other than `hooks`, and hook kinds not named in `new_hooks`, are
/// left untouched. Existing groups stay raw JSON so fields this crate does
/// not model survive. A `null` hooks table or kind list counts as empty.
pub fn merge(mut settings: Map<String, Value>, new_hooks: &HookSet) -> Result<Map<String, Value>> {
    let hooks = settings
        .entry("hooks")
        .or_insert_with(|| Value::Object(Map::new()));
    if hooks.is_null() {
        *hooks = Value::Object(Map::new());
    }
    let Value::Object(hooks) = hooks else {
        return Err(Error::Config("`hooks` must be a JSON object".into()));
    };

    for (kind, groups) in new_hooks {
        let entry = hooks
            .entry(kind.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if entry.is_null() {
            *entry = Value::Array(Vec::new());
        }
        let Value::Array(existing) = entry else {
            return Err(Error::Config(format!("`hooks.{kind}` must be an array")));
        };
        for group in groups {
            let value = serde_json::to_value(group)
                .map_err(|e| Error::Config(format!("encoding {kind} hook: {e}")))?;
            existing.push(value);
        }
    }
    Ok(settings)
}

// ---------------------------------------------------------------
// Temporary merged file
// ---------------------------------------------------------------

/// A merged settings file handed to the Assistant; removed on release or drop.
#[derive(Debug)]
pub struct TempSettings {
    path: PathBuf,
    released: bool,
}

impl TempSettings {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, reporting failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("removing", &self.path, e)),
        }
    }
}

impl Drop for TempSettings {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "could not remove temporary settings");
            }
        }
    }
}

/// Merge `new_hooks` into the settings at `existing` and write the result to
/// `<tmp_dir>/hail-mary-settings-<pid>.json`.
pub fn write_merged(existing: Option<&Path>, new_hooks: &HookSet, tmp_dir: &Path) -> Result<TempSettings> {
    let merged = merge(load_existing(existing)?, new_hooks)?;
    let bytes = serde_json::to_vec_pretty(&Value::Object(merged))
        .map_err(|e| Error::Config(format!("encoding merged settings: {e}")))?;
    let path = tmp_dir.join(format!("hail-mary-settings-{}.json", std::process::id()));
    atomic_write(&path, &bytes).map_err(|e| Error::Config(format!("writing merged settings: {e}")))?;
    debug!(path = %path.display(), "wrote merged settings");
    Ok(TempSettings {
        path,
        released: false,
    })
}
