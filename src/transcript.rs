//! Transcript Editor: counts real user turns in an Assistant `.jsonl`
//! transcript and cuts it back to a chosen turn.

use crate::error::{Error, Result};
use crate::store::atomic_write;
use chrono::Local;
use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker the Assistant puts in turns it synthesizes from hook output.
const HOOK_MARKER: &str = "-hook>";

// ===================================================================
// Entry shape: only the fields the editor reads
// ===================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(serde_json::Value),
}

/// Any array item. Only objects with a string `text` contribute text;
/// everything else is skipped without rejecting the entry.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct ContentPart(serde_json::Value);

impl ContentPart {
    fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(serde_json::Value::as_str)
    }
}

impl Entry {
    /// `type == user`, `message.role == user`, and no hook marker in the
    /// string content or any text part.
    fn is_real_user_turn(&self) -> bool {
        if self.kind.as_deref() != Some("user") {
            return false;
        }
        let Some(message) = &self.message else {
            return false;
        };
        if message.role.as_deref() != Some("user") {
            return false;
        }
        match &message.content {
            Some(Content::Text(text)) => !text.contains(HOOK_MARKER),
            Some(Content::Parts(parts)) => !parts
                .iter()
                .filter_map(ContentPart::text)
                .any(|t| t.contains(HOOK_MARKER)),
            Some(Content::Other(_)) | None => false,
        }
    }

    fn display_text(&self) -> String {
        match self.message.as_ref().and_then(|m| m.content.as_ref()) {
            Some(Content::Text(text)) => text.clone(),
            Some(Content::Parts(parts)) => parts
                .iter()
                .filter_map(ContentPart::text)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// Split into lines without the trailing newline; a final empty segment
/// (file ending in `\n`) is dropped.
fn lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Lines that are not JSON objects (or lack the expected shape) parse to
/// `None` and never count as turns.
fn parse_entry(line: &[u8]) -> Option<Entry> {
    serde_json::from_slice(line).ok()
}

fn count(lines: &[&[u8]]) -> usize {
    lines
        .iter()
        .filter_map(|l| parse_entry(l))
        .filter(Entry::is_real_user_turn)
        .count()
}

fn write_all_lines(file: &mut fs::File, lines: &[&[u8]]) -> io::Result<()> {
    for line in lines {
        file.write_all(line)?;
        file.write_all(b"\n")?;
    }
    file.sync_all()
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io("reading transcript", path, e))
}

// ===================================================================
// Turn listing
// ===================================================================

/// A real user turn, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTurn {
    pub turn_number: usize,
    pub uuid: Option<String>,
    pub text: String,
    pub timestamp: Option<String>,
}

pub fn user_turns(path: &Path) -> Result<Vec<UserTurn>> {
    let bytes = read(path)?;
    let turns = lines(&bytes)
        .into_iter()
        .filter_map(parse_entry)
        .filter(Entry::is_real_user_turn)
        .enumerate()
        .map(|(idx, entry)| UserTurn {
            turn_number: idx + 1,
            text: entry.display_text(),
            uuid: entry.uuid,
            timestamp: entry.timestamp,
        })
        .collect();
    Ok(turns)
}

pub fn count_user_turns(path: &Path) -> Result<usize> {
    let bytes = read(path)?;
    Ok(count(&lines(&bytes)))
}

// ===================================================================
// Truncation
// ===================================================================

/// Result of a successful truncate.
#[derive(Debug)]
pub struct Truncation {
    /// Sibling `truncated-*.jsonl` holding the kept entries.
    pub path: PathBuf,
    /// `<original>.backup.<timestamp>` with the original bytes.
    pub backup: PathBuf,
}

/// Number of leading lines to keep so the output ends right after the
/// reply to turn `turn`, or `TurnNotFound`.
fn cut_point(lines: &[&[u8]], turn: usize) -> Result<usize> {
    let mut seen = 0;
    let mut anchor: Option<String> = None;

    for (idx, line) in lines.iter().enumerate() {
        let Some(entry) = parse_entry(line) else {
            continue;
        };
        if let Some(anchor) = &anchor {
            if entry.parent_uuid.as_deref() == Some(anchor.as_str()) {
                return Ok(idx + 1);
            }
            continue;
        }
        if entry.is_real_user_turn() {
            seen += 1;
            if seen == turn {
                // A turn without a uuid has no reply we can match; keep the rest.
                match entry.uuid {
                    Some(uuid) => anchor = Some(uuid),
                    None => return Ok(lines.len()),
                }
            }
        }
    }

    if anchor.is_some() {
        // The selected turn has no reply in the file.
        return Ok(lines.len());
    }
    Err(Error::TurnNotFound {
        requested: turn,
        available: seen,
    })
}

fn backup_path(original: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let mut base = original.as_os_str().to_owned();
    base.push(format!(".backup.{stamp}"));
    let first = PathBuf::from(&base);
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| {
            let mut name = base.clone();
            name.push(format!("-{n}"));
            PathBuf::from(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Create `path` (never replacing an existing file) and fsync the bytes
/// before anything else is written.
fn write_backup(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Write a copy of `original` that ends after the Assistant's reply to real
/// user turn `turn` (1-based), plus a timestamped backup of the original.
///
/// The original is never modified. Nothing is written when the turn does
/// not exist.
pub fn truncate(original: &Path, turn: usize) -> Result<Truncation> {
    let bytes = read(original)?;
    let all = lines(&bytes);
    if turn == 0 {
        return Err(Error::TurnNotFound {
            requested: 0,
            available: count(&all),
        });
    }
    let keep = cut_point(&all, turn)?;

    let backup = backup_path(original);
    write_backup(&backup, &bytes).map_err(|e| Error::io("writing backup", &backup, e))?;

    let dir = original.parent().unwrap_or_else(|| Path::new("."));
    let mut out = tempfile::Builder::new()
        .prefix("truncated-")
        .suffix(".jsonl")
        .tempfile_in(dir)
        .map_err(|e| Error::io("creating truncated transcript in", dir, e))?;
    if let Err(e) = write_all_lines(out.as_file_mut(), &all[..keep]) {
        return Err(Error::io("writing", out.path(), e));
    }
    let (_, path) = out
        .keep()
        .map_err(|e| Error::io("keeping truncated transcript", dir, e.error))?;

    info!(
        original = %original.display(),
        backup = %backup.display(),
        turn,
        kept = keep,
        dropped = all.len() - keep,
        "truncated transcript"
    );
    Ok(Truncation { path, backup })
}

/// Move a truncated copy over the original transcript.
pub fn swap_in(truncation: &Truncation, original: &Path) -> Result<()> {
    fs::rename(&truncation.path, original)
        .map_err(|e| Error::io("replacing transcript", original, e))?;
    debug!(original = %original.display(), "swapped in truncated transcript");
    Ok(())
}

/// Copy a backup's bytes back over the transcript.
pub fn restore(original: &Path, backup: &Path) -> Result<()> {
    let bytes = fs::read(backup).map_err(|e| Error::io("reading backup", backup, e))?;
    atomic_write(original, &bytes)
}
