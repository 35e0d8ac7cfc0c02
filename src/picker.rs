//! Terminal pickers used by the `prd` flows.

use crate::layout::normalize_feature_name;
use anyhow::{Context, Result, bail};
use dialoguer::{Input, Select};
use std::io::IsTerminal;

/// Interactive choices, behind a trait so flows can run without a terminal.
pub trait Picker {
    /// Ask for a feature title; must normalize to a non-empty name.
    fn feature_title(&self) -> Result<String>;

    /// Pick one of `items`. `None` when the user cancels.
    fn select(&self, prompt: &str, items: &[String]) -> Result<Option<usize>>;
}

pub struct TerminalPicker;

fn require_terminal() -> Result<()> {
    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        bail!("an interactive terminal is required");
    }
    Ok(())
}

impl Picker for TerminalPicker {
    fn feature_title(&self) -> Result<String> {
        require_terminal()?;
        Input::<String>::new()
            .with_prompt("Feature title")
            .validate_with(|title: &String| -> std::result::Result<(), String> {
                normalize_feature_name(title)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text()
            .context("failed to read feature title")
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<Option<usize>> {
        require_terminal()?;
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()
            .with_context(|| format!("failed to select: {prompt}"))
    }
}
