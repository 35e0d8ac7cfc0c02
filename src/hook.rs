//! The hidden `hook` subcommand: one event in, at most one JSON line out.

use crate::error::Result;
use crate::settings::{FEATURE_PATH_ENV, PARENT_TOKEN_ENV};
use crate::store::{FeatureSessionsStore, ParentInvocationStore};
use crate::types::{HookInput, HookOutput, SessionStartSource};
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the launching process put in the environment.
#[derive(Debug, Clone, Default)]
pub struct HookEnv {
    /// `None` means standalone mode: log only, write nothing.
    pub parent_token: Option<String>,
    pub feature_path: Option<PathBuf>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl HookEnv {
    pub fn from_env() -> Self {
        Self {
            parent_token: non_empty(std::env::var(PARENT_TOKEN_ENV).ok()),
            feature_path: non_empty(std::env::var(FEATURE_PATH_ENV).ok()).map(PathBuf::from),
        }
    }
}

pub struct HookContext {
    pub parents: ParentInvocationStore,
    pub env: HookEnv,
}

impl HookContext {
    pub fn new(parents: ParentInvocationStore, env: HookEnv) -> Self {
        Self { parents, env }
    }

    /// Apply one decoded event to the session store.
    pub fn handle(&self, input: &HookInput, now: DateTime<Utc>) -> Result<Option<HookOutput>> {
        let common = input.common();
        debug!(
            event = input.event_name(),
            session_id = %common.session_id,
            parent = self.env.parent_token.as_deref().unwrap_or("-"),
            "hook event"
        );

        match input {
            HookInput::SessionStart(e) => self.session_start(
                &common.session_id,
                Path::new(&common.transcript_path),
                Path::new(&common.cwd),
                e.source,
                now,
            ),
            HookInput::UserPromptSubmit(_) => self.user_prompt_submit(now),
            HookInput::Stop(e) => {
                if !e.stop_hook_active {
                    self.touch(now)?;
                }
                Ok(None)
            }
            HookInput::PreToolUse(e) => {
                debug!(tool = %e.tool_name, "pre tool use");
                Ok(None)
            }
            HookInput::PostToolUse(e) => {
                debug!(tool = %e.tool_name, "post tool use");
                Ok(None)
            }
            HookInput::Notification(e) => {
                debug!(message = %e.message, "notification");
                Ok(None)
            }
            HookInput::SubagentStop(e) => {
                debug!(stop_hook_active = e.stop_hook_active, "subagent stop");
                Ok(None)
            }
            HookInput::PreCompact(e) => {
                debug!(trigger = ?e.trigger, "pre compact");
                Ok(None)
            }
        }
    }

    fn session_start(
        &self,
        session_id: &str,
        transcript_path: &Path,
        project_dir: &Path,
        source: SessionStartSource,
        now: DateTime<Utc>,
    ) -> Result<Option<HookOutput>> {
        if !transcript_path.exists() {
            debug!(path = %transcript_path.display(), "transcript not created yet");
        }

        let context = match &self.env.parent_token {
            Some(token) => {
                let record = self
                    .parents
                    .record_start(token, session_id, transcript_path, project_dir, now)?;
                info!(parent = %token, session_id = %session_id, ?source, "session started");

                if let Some(feature) = &self.env.feature_path {
                    if let Err(e) = FeatureSessionsStore::new(feature).upsert(record) {
                        warn!(feature = %feature.display(), error = %e, "could not update feature sessions");
                    }
                }
                format!("Hail Mary session tracking enabled (PID: {token})")
            }
            None => {
                info!(session_id = %session_id, "no parent token; standalone mode");
                "Hail Mary running in standalone mode; session tracking disabled".to_string()
            }
        };

        Ok((source == SessionStartSource::Startup).then(|| HookOutput::session_start_context(context)))
    }

    fn user_prompt_submit(&self, now: DateTime<Utc>) -> Result<Option<HookOutput>> {
        let Some(record) = self.touch(now)? else {
            return Ok(None);
        };
        let started = record.started_at.with_timezone(&Local).format("%H:%M:%S");
        Ok(Some(HookOutput::prompt_context(format!(
            "[Session: {}, Started: {started}]",
            record.short_id()
        ))))
    }

    /// Advance `last_updated`; a missing record is not an error.
    fn touch(&self, now: DateTime<Utc>) -> Result<Option<crate::store::SessionRecord>> {
        let Some(token) = &self.env.parent_token else {
            return Ok(None);
        };
        match self.parents.touch(token, now) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => {
                debug!(parent = %token, "no session record to touch");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
