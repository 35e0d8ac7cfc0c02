//! Launching the Assistant CLI as an interactive child process.

use crate::config::Config;
use crate::settings::{FEATURE_PATH_ENV, PARENT_TOKEN_ENV};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";
const BACKGROUND_TASKS_ENV: &str = "ENABLE_BACKGROUND_TASKS";
const MAINTAIN_WORKING_DIR_ENV: &str = "CLAUDE_BASH_MAINTAIN_PROJECT_WORKING_DIR";

const MAX_PROMPT_CHARS: usize = 10_000;
const SESSION_ID_CHARS: std::ops::RangeInclusive<usize> = 8..=100;

/// Which conversation the Assistant should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    New,
    Session(String),
    /// The most recent conversation in the working directory.
    Latest,
}

/// Everything that varies between launches.
#[derive(Debug, Clone)]
pub struct Launch {
    pub resume: Resume,
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub settings_path: Option<PathBuf>,
    pub parent_token: String,
    pub feature_path: Option<PathBuf>,
}

/// A fully resolved command line, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

fn validate(launch: &Launch) -> Result<()> {
    if let Resume::Session(id) = &launch.resume {
        let len = id.trim().chars().count();
        if !SESSION_ID_CHARS.contains(&len) {
            bail!(
                "session id must be {}-{} characters, got {len}",
                SESSION_ID_CHARS.start(),
                SESSION_ID_CHARS.end()
            );
        }
    }
    if let Some(prompt) = &launch.prompt {
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            bail!("prompt exceeds {MAX_PROMPT_CHARS} characters");
        }
    }
    Ok(())
}

impl AssistantCommand {
    /// `[assistant_args..] [--dangerously-skip-permissions] [--settings p]
    /// [--permission-mode m] [--append-system-prompt s]`, then the resume
    /// flag, then the prompt.
    pub fn build(config: &Config, launch: &Launch) -> Result<Self> {
        validate(launch)?;

        let mut args = config.assistant_args.clone();
        if config.skip_permissions {
            args.push(SKIP_PERMISSIONS_FLAG.into());
        }
        if let Some(settings) = &launch.settings_path {
            args.push("--settings".into());
            args.push(settings.to_string_lossy().into_owned());
        }
        if !config.permission_mode.is_empty() {
            args.push("--permission-mode".into());
            args.push(config.permission_mode.clone());
        }
        if let Some(system_prompt) = launch.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            args.push("--append-system-prompt".into());
            args.push(system_prompt.to_string());
        }
        match &launch.resume {
            Resume::New => {}
            Resume::Session(id) => {
                args.push("--resume".into());
                args.push(id.trim().to_string());
            }
            Resume::Latest => args.push("--continue".into()),
        }
        if let Some(prompt) = launch.prompt.as_deref().filter(|p| !p.is_empty()) {
            args.push(prompt.to_string());
        }

        let mut env = vec![(PARENT_TOKEN_ENV.to_string(), launch.parent_token.clone())];
        if let Some(feature) = &launch.feature_path {
            env.push((FEATURE_PATH_ENV.to_string(), feature.to_string_lossy().into_owned()));
        }
        if config.enable_background_tasks {
            env.push((BACKGROUND_TASKS_ENV.to_string(), "1".into()));
        }
        if config.maintain_working_dir {
            env.push((MAINTAIN_WORKING_DIR_ENV.to_string(), "1".into()));
        }

        Ok(Self {
            program: config.assistant_command.clone(),
            args,
            env,
        })
    }
}

/// Runs the Assistant and waits for it to exit.
pub trait Launcher {
    /// Returns the child's exit code (`-1` when killed by a signal).
    fn run(&self, command: &AssistantCommand) -> Result<i32>;
}

/// Spawns the real process with the terminal attached.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn run(&self, command: &AssistantCommand) -> Result<i32> {
        // Ctrl+C belongs to the child; keep this process alive so cleanup runs.
        if let Err(e) = ctrlc::set_handler(|| {}) {
            debug!(error = %e, "Ctrl+C handler already installed");
        }

        info!(program = %command.program, args = command.args.len(), "launching assistant");
        let status = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env_remove("CLAUDECODE")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to launch `{}`", command.program))?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(resume: Resume) -> Launch {
        Launch {
            resume,
            prompt: None,
            system_prompt: None,
            settings_path: None,
            parent_token: "4242".into(),
            feature_path: None,
        }
    }

    #[test]
    fn default_config_new_session() {
        let mut l = launch(Resume::New);
        l.settings_path = Some(PathBuf::from("/tmp/hail-mary-settings-1.json"));
        l.system_prompt = Some("be brief".into());
        let cmd = AssistantCommand::build(&Config::default(), &l).unwrap();

        assert_eq!(cmd.program, "claude");
        assert_eq!(
            cmd.args,
            vec![
                "--dangerously-skip-permissions",
                "--settings",
                "/tmp/hail-mary-settings-1.json",
                "--permission-mode",
                "plan",
                "--append-system-prompt",
                "be brief",
            ]
        );
        assert_eq!(
            cmd.env,
            vec![
                ("HAIL_MARY_PARENT_PID".to_string(), "4242".to_string()),
                ("ENABLE_BACKGROUND_TASKS".to_string(), "1".to_string()),
                ("CLAUDE_BASH_MAINTAIN_PROJECT_WORKING_DIR".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn resume_flag_precedes_prompt() {
        let config = Config {
            assistant_command: "bunx".into(),
            assistant_args: vec!["@anthropic-ai/claude-code@latest".into()],
            skip_permissions: false,
            permission_mode: String::new(),
            ..Config::default()
        };
        let mut l = launch(Resume::Session("abcdef0123".into()));
        l.prompt = Some("pick up again".into());
        l.feature_path = Some(PathBuf::from("/p/.kiro/spec/x"));

        let cmd = AssistantCommand::build(&config, &l).unwrap();
        assert_eq!(cmd.program, "bunx");
        assert_eq!(
            cmd.args,
            vec!["@anthropic-ai/claude-code@latest", "--resume", "abcdef0123", "pick up again"]
        );
        assert!(cmd.env.contains(&("HAIL_MARY_FEATURE_PATH".to_string(), "/p/.kiro/spec/x".to_string())));
    }

    #[test]
    fn latest_uses_continue() {
        let cmd = AssistantCommand::build(&Config::default(), &launch(Resume::Latest)).unwrap();
        assert_eq!(cmd.args.last().map(String::as_str), Some("--continue"));
    }

    #[test]
    fn env_flags_follow_config() {
        let config = Config {
            enable_background_tasks: false,
            maintain_working_dir: false,
            ..Config::default()
        };
        let cmd = AssistantCommand::build(&config, &launch(Resume::New)).unwrap();
        assert_eq!(cmd.env.len(), 1);
    }

    #[test]
    fn rejects_bad_session_ids_and_huge_prompts() {
        assert!(AssistantCommand::build(&Config::default(), &launch(Resume::Session("short".into()))).is_err());
        assert!(AssistantCommand::build(&Config::default(), &launch(Resume::Session("x".repeat(101)))).is_err());

        let mut l = launch(Resume::New);
        l.prompt = Some("p".repeat(MAX_PROMPT_CHARS + 1));
        assert!(AssistantCommand::build(&Config::default(), &l).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn process_launcher_reports_exit_code() {
        let cmd = AssistantCommand {
            program: "sh".into(),
            args: vec!["-c".into(), "test \"$HAIL_MARY_PARENT_PID\" = 7 && exit 3".into()],
            env: vec![("HAIL_MARY_PARENT_PID".into(), "7".into())],
        };
        assert_eq!(ProcessLauncher.run(&cmd).unwrap(), 3);
    }

    #[test]
    fn process_launcher_missing_program_is_error() {
        let cmd = AssistantCommand {
            program: "/definitely/not/a/real/assistant".into(),
            args: Vec::new(),
            env: Vec::new(),
        };
        assert!(ProcessLauncher.run(&cmd).is_err());
    }
}
