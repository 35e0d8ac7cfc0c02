//! The `prd` flows: create a feature and launch the Assistant, or resume
//! (optionally redoing from an earlier turn) a recorded session.

use crate::assistant::{AssistantCommand, Launch, Launcher, Resume};
use crate::config::Config;
use crate::layout::{Feature, SpecLayout};
use crate::picker::Picker;
use crate::prompts;
use crate::settings::{self, TempSettings};
use crate::store::{FeatureSessionsStore, SessionRecord};
use crate::transcript::{self, UserTurn};
use anyhow::{Context, Result, bail};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest slice of a user turn shown in the redo picker.
const TURN_PREVIEW_CHARS: usize = 80;

/// What the resume picker settled on.
#[derive(Debug, Clone)]
pub struct ResumeSelection {
    pub feature: String,
    pub session_id: String,
    /// The turn to redo from; ignored when `is_continue`.
    pub selected_input: Option<UserTurn>,
    pub is_continue: bool,
}

pub struct Orchestrator<'a, P: Picker, L: Launcher> {
    pub layout: SpecLayout,
    pub config: Config,
    pub picker: &'a P,
    pub launcher: &'a L,
    /// This binary, invoked by the injected hooks.
    pub exe: PathBuf,
    pub tmp_dir: PathBuf,
    /// Parent-identity token handed to the Assistant and echoed by hooks.
    pub parent_token: String,
}

fn format_session(record: &SessionRecord) -> String {
    format!(
        "{}  started {}  updated {}",
        record.short_id(),
        record.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        record.last_updated.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
    )
}

fn format_turn(turn: &UserTurn) -> String {
    let one_line = turn.text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "Redo from turn {}: {}",
        turn.turn_number,
        prompts::truncate_chars(&one_line, TURN_PREVIEW_CHARS)
    )
}

fn print_completion(requirements: &Path) {
    println!("\n\nPRD session completed.");
    println!("\nRequirements file location: {}", requirements.display());
    println!("\nYou can now edit this file to update your PRD based on the session.");
}

impl<P: Picker, L: Launcher> Orchestrator<'_, P, L> {
    // ---------------------------------------------------------------
    // prd init
    // ---------------------------------------------------------------

    pub fn new_prd(&self) -> Result<()> {
        let title = self.picker.feature_title()?;
        let feature = self
            .layout
            .create_feature(&title)
            .context("failed to create feature directory")?;
        info!(feature = %feature.name, path = %feature.path.display(), "feature directory ready");

        if feature.ensure_requirements()? {
            println!("Created requirements file at: {}", feature.requirements_path().display());
        }
        self.launch(&feature, Resume::New, None)
    }

    // ---------------------------------------------------------------
    // prd resume
    // ---------------------------------------------------------------

    /// Walk the user through feature, session and action, then resume.
    pub fn resume_prd(&self) -> Result<()> {
        match self.pick_resume()? {
            Some(selection) => self.resume(&selection),
            None => {
                println!("Cancelled.");
                Ok(())
            }
        }
    }

    fn pick_resume(&self) -> Result<Option<ResumeSelection>> {
        let features = self.layout.list_features()?;
        if features.is_empty() {
            bail!(
                "no features under {}; run `hail-mary prd init` first",
                self.layout.spec_dir().display()
            );
        }
        let Some(idx) = self.picker.select("Feature", &features)? else {
            return Ok(None);
        };
        let feature = self.layout.feature(&features[idx]);

        let sessions = FeatureSessionsStore::new(&feature.path)
            .load()
            .context("failed to load feature sessions")?;
        if sessions.records.is_empty() {
            bail!("no recorded sessions for feature `{}`", feature.name);
        }
        let items: Vec<String> = sessions.records.iter().map(format_session).collect();
        let Some(idx) = self.picker.select("Session", &items)? else {
            return Ok(None);
        };
        let record = &sessions.records[idx];

        let turns = match transcript::user_turns(&record.transcript_path) {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "transcript unavailable; only continue is possible");
                Vec::new()
            }
        };
        let mut actions = vec!["Continue this session".to_string()];
        actions.extend(turns.iter().map(format_turn));
        let Some(action) = self.picker.select("Action", &actions)? else {
            return Ok(None);
        };

        Ok(Some(ResumeSelection {
            feature: feature.name,
            session_id: record.session_id.clone(),
            selected_input: action.checked_sub(1).and_then(|i| turns.get(i).cloned()),
            is_continue: action == 0,
        }))
    }

    /// Resume a chosen session, truncating its transcript first for a redo.
    pub fn resume(&self, selection: &ResumeSelection) -> Result<()> {
        let feature = self.layout.feature(&selection.feature);
        let session_id = selection.session_id.as_str();

        let prompt = match (&selection.selected_input, selection.is_continue) {
            (Some(turn), false) => {
                self.prepare_redo(&feature, session_id, turn)?;
                prompts::redo_prompt(&feature.name, session_id, turn.turn_number, &turn.text)?
            }
            _ => prompts::continue_prompt(&feature.name, session_id)?,
        };
        self.launch(&feature, Resume::Session(session_id.to_string()), Some(prompt))
    }

    /// Cut the transcript back so the selected turn and everything after it
    /// are gone, then swap the result over the original.
    fn prepare_redo(&self, feature: &Feature, session_id: &str, turn: &UserTurn) -> Result<()> {
        let record = FeatureSessionsStore::new(&feature.path)
            .find(session_id)
            .with_context(|| format!("session {session_id} is not recorded for `{}`", feature.name))?;
        let keep = turn.turn_number.saturating_sub(1);
        info!(
            selected_turn = turn.turn_number,
            truncate_at_turn = keep,
            redo = %prompts::truncate_chars(&turn.text, 80),
            "truncating session for redo"
        );

        let truncation = transcript::truncate(&record.transcript_path, keep)
            .context("failed to truncate transcript")?;
        transcript::swap_in(&truncation, &record.transcript_path)
            .context("failed to replace transcript")?;
        println!("Transcript backup: {}", truncation.backup.display());
        Ok(())
    }

    // ---------------------------------------------------------------
    // prd continue
    // ---------------------------------------------------------------

    /// Hand off to the Assistant's own "most recent conversation" resume.
    pub fn continue_latest(&self) -> Result<()> {
        let launch = Launch {
            resume: Resume::Latest,
            prompt: None,
            system_prompt: None,
            settings_path: None,
            parent_token: self.parent_token.clone(),
            feature_path: None,
        };
        let command = AssistantCommand::build(&self.config, &launch)?;
        println!("Launching the assistant to continue the most recent session...");
        let code = self.launcher.run(&command)?;
        if code != 0 {
            warn!(code, "assistant exited with a non-zero status");
        }
        println!("\n\nPRD session completed.");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Launch
    // ---------------------------------------------------------------

    fn install_hooks(&self, feature: &Feature) -> Result<TempSettings> {
        let feature_path = std::path::absolute(&feature.path)
            .with_context(|| format!("resolving {}", feature.path.display()))?;
        let hooks = settings::tool_hooks(&self.exe, &self.parent_token, Some(&feature_path));
        let existing = self.layout.settings_path();
        let temp = settings::write_merged(Some(&existing), &hooks, &self.tmp_dir)
            .context("failed to set up hooks")?;
        debug!(path = %temp.path().display(), "merged settings");
        Ok(temp)
    }

    fn launch(&self, feature: &Feature, resume: Resume, prompt: Option<String>) -> Result<()> {
        let requirements = feature.requirements_path();
        let temp = self.install_hooks(feature)?;
        let launch = Launch {
            resume,
            prompt,
            system_prompt: Some(prompts::system_prompt(&requirements.to_string_lossy())?),
            settings_path: Some(temp.path().to_path_buf()),
            parent_token: self.parent_token.clone(),
            feature_path: Some(std::path::absolute(&feature.path)?),
        };
        let command = AssistantCommand::build(&self.config, &launch)?;

        println!("Launching the assistant for PRD editing...");
        println!("Press Ctrl+C to exit the assistant.");
        let outcome = self.launcher.run(&command);

        if let Err(e) = temp.release() {
            warn!(error = %e, "could not remove merged settings");
        }
        let code = outcome?;
        if code != 0 {
            warn!(code, "assistant exited with a non-zero status");
        }
        print_completion(&requirements);
        Ok(())
    }
}
