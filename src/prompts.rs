//! Prompt text handed to the Assistant, rendered with minijinja.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const SYSTEM_PROMPT: &str = r#"# Product Requirements Document Specialist

Your documentation environment is configured as:
- **Output location**: {{ requirements_path }}

You are a requirements documentation specialist. Help the user turn a feature
idea into clear, minimal and actionable requirements written in EARS format
("WHEN <trigger> THE SYSTEM SHALL <response>").

Work in small steps: ask clarifying questions first, then propose the
requirements, then write the agreed document to the output location above.
Keep the document focused on observable behavior rather than implementation."#;

const CONTINUE_PROMPT: &str = r#"I'm resuming work on the Product Requirements Document (PRD) for the feature: "{{ feature }}"

Please continue helping me develop this PRD. The previous session ID is: {{ session }}

Let's continue where we left off."#;

const REDO_PROMPT: &str = r#"I'm resuming work on the Product Requirements Document (PRD) for the feature: "{{ feature }}"

I want to redo the conversation from Turn {{ turn }} onwards. The session ID is: {{ session }}
The conversation was truncated, removing the following input and everything after it:
"{{ removed }}"

Let's continue with a fresh approach from where we left off."#;

/// Longest slice of removed input quoted back in a redo prompt.
const REMOVED_PREVIEW_CHARS: usize = 120;

fn render(name: &str, source: &str, ctx: minijinja::Value) -> Result<String> {
    let env = Environment::new();
    let tmpl = env
        .template_from_str(source)
        .with_context(|| format!("parsing {name} template"))?;
    tmpl.render(ctx)
        .with_context(|| format!("rendering {name} template"))
}

/// `user-auth` reads as `user auth`.
pub fn readable_title(feature: &str) -> String {
    feature.replace('-', " ")
}

/// Cut `s` to at most `max` characters, ending in `...` when shortened.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn system_prompt(requirements_path: &str) -> Result<String> {
    render("system", SYSTEM_PROMPT, context! { requirements_path })
}

pub fn continue_prompt(feature: &str, session_id: &str) -> Result<String> {
    render(
        "continue",
        CONTINUE_PROMPT,
        context! {
            feature => readable_title(feature),
            session => crate::store::short_id(session_id),
        },
    )
}

pub fn redo_prompt(feature: &str, session_id: &str, turn: usize, removed: &str) -> Result<String> {
    render(
        "redo",
        REDO_PROMPT,
        context! {
            feature => readable_title(feature),
            session => crate::store::short_id(session_id),
            turn,
            removed => truncate_chars(removed, REMOVED_PREVIEW_CHARS),
        },
    )
}
