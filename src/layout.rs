//! Where features live: `<project>/.kiro/spec/<feature>/requirements.md`.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SPEC_DIR: &str = ".kiro/spec";
pub const REQUIREMENTS_FILE: &str = "requirements.md";
pub const ASSISTANT_SETTINGS: &str = ".claude/settings.json";

/// Normalize a human title into a directory name.
///
/// Lowercased; keeps `[a-z0-9_]`; every other run of characters becomes a
/// single `-`; no leading or trailing `-`.
pub fn normalize_feature_name(title: &str) -> Result<String> {
    let mut name = String::with_capacity(title.len());
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            name.push(ch);
        } else if !name.is_empty() && !name.ends_with('-') {
            name.push('-');
        }
    }
    let name = name.trim_end_matches('-').to_string();
    if name.is_empty() {
        return Err(Error::Config(format!(
            "feature title {title:?} has no usable characters"
        )));
    }
    Ok(name)
}

pub fn feature_path(base: &Path, spec_dir: &str, name: &str) -> PathBuf {
    base.join(spec_dir).join(name)
}

/// The enclosing git work tree of `cwd`, or `cwd` itself.
pub fn project_root(cwd: &Path) -> PathBuf {
    match git2::Repository::discover(cwd) {
        Ok(repo) => match repo.workdir() {
            Some(workdir) => workdir.to_path_buf(),
            None => cwd.to_path_buf(),
        },
        Err(e) => {
            debug!(cwd = %cwd.display(), error = %e, "not in a git repository");
            cwd.to_path_buf()
        }
    }
}

fn create_dir_755(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path)
}

/// A feature directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub path: PathBuf,
}

impl Feature {
    pub fn requirements_path(&self) -> PathBuf {
        self.path.join(REQUIREMENTS_FILE)
    }

    /// Create an empty requirements file if none exists. Returns whether
    /// it was created.
    pub fn ensure_requirements(&self) -> Result<bool> {
        let path = self.requirements_path();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io("creating", &path, e)),
        }
    }
}

/// Paths for one project.
#[derive(Debug, Clone)]
pub struct SpecLayout {
    root: PathBuf,
}

impl SpecLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn discover(cwd: &Path) -> Self {
        Self::new(project_root(cwd))
    }

    pub fn spec_dir(&self) -> PathBuf {
        self.root.join(SPEC_DIR)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(ASSISTANT_SETTINGS)
    }

    pub fn feature(&self, name: &str) -> Feature {
        Feature {
            name: name.to_string(),
            path: feature_path(&self.root, SPEC_DIR, name),
        }
    }

    /// Normalize `title` and create its directory (mode 0755).
    pub fn create_feature(&self, title: &str) -> Result<Feature> {
        let name = normalize_feature_name(title)?;
        let feature = self.feature(&name);
        create_dir_755(&feature.path).map_err(|e| Error::io("creating", &feature.path, e))?;
        Ok(feature)
    }

    /// Feature directory names, sorted. A missing `.kiro/spec` is empty.
    pub fn list_features(&self) -> Result<Vec<String>> {
        let dir = self.spec_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io("listing", &dir, e)),
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}
