//! Session Store: parent invocation records and per-feature session indices.
//!
//! Both stores persist through [`atomic_write`], so a concurrent reader sees
//! either the previous complete record or the new one. Cross-process exclusion is left
//! to the rename; the in-process locks only serialize writes made through a
//! single store instance.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Directory name under the user's home that holds all tool state.
pub const STATE_DIR_NAME: &str = ".hail-mary";

/// Root of the tool's state (`<home>/.hail-mary`).
pub fn state_root() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(STATE_DIR_NAME))
        .ok_or_else(|| Error::Config("cannot determine home directory".into()))
}

// ---------------------------------------------------------------
// Atomic write
// ---------------------------------------------------------------

fn staging_file(dir: &Path, path: &Path) -> io::Result<NamedTempFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    Ok(file)
}

/// Stage `bytes` in a uniquely named sibling of `path`, fsync, then rename
/// over `path`.
///
/// Each call stages in its own file; it is removed if any step fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = staging_file(dir, path).map_err(|e| Error::io("staging a write in", dir, e))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| Error::io("writing", staged.path(), e))?;
    staged
        .persist(path)
        .map_err(|e| Error::io("renaming onto", path, e.error))?;
    Ok(())
}

/// Read a file to string, mapping a missing file to `None`.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("reading", path, e)),
    }
}

fn parse_record(path: &Path, contents: &str) -> Result<SessionRecord> {
    serde_json::from_str(contents)
        .map_err(|e| Error::Decode(format!("{}: {e}", path.display())))
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io("listing", dir, e)),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------

/// Persisted summary of one Assistant run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub transcript_path: PathBuf,
    pub project_dir: PathBuf,
}

impl SessionRecord {
    pub fn new(
        session_id: impl Into<String>,
        transcript_path: impl Into<PathBuf>,
        project_dir: impl Into<PathBuf>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: now,
            last_updated: now,
            transcript_path: transcript_path.into(),
            project_dir: project_dir.into(),
        }
    }

    /// Advance `last_updated`; never moves it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// First eight characters of the session id, for display.
    pub fn short_id(&self) -> &str {
        short_id(&self.session_id)
    }
}

pub fn short_id(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

// ---------------------------------------------------------------
// Parent invocation records
// ---------------------------------------------------------------

/// Records keyed by the parent-identity token, one JSON file per token.
pub struct ParentInvocationStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl ParentInvocationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    /// Store rooted at `<home>/.hail-mary/sessions`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(state_root()?.join("sessions")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, token: &str) -> Result<PathBuf> {
        if token.is_empty() || token == "." || token == ".." || token.contains(['/', '\\']) {
            return Err(Error::Config(format!("invalid parent token {token:?}")));
        }
        Ok(self.dir.join(format!("{token}.json")))
    }

    fn read_unlocked(&self, token: &str) -> Result<SessionRecord> {
        let path = self.path_for(token)?;
        match read_optional(&path)? {
            Some(contents) => parse_record(&path, &contents),
            None => Err(Error::NotFound(format!("parent invocation {token}"))),
        }
    }

    fn write_unlocked(&self, token: &str, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(token)?;
        fs::create_dir_all(&self.dir).map_err(|e| Error::io("creating", &self.dir, e))?;
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Decode(format!("encoding session record: {e}")))?;
        atomic_write(&path, &bytes)
    }

    pub fn write(&self, token: &str, record: &SessionRecord) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        self.write_unlocked(token, record)
    }

    /// Read the record for `token`; a missing file is `Error::NotFound`.
    pub fn read(&self, token: &str) -> Result<SessionRecord> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        self.read_unlocked(token)
    }

    /// Advance `last_updated` on an existing record.
    pub fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<SessionRecord> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut record = self.read_unlocked(token)?;
        record.touch(now);
        self.write_unlocked(token, &record)?;
        Ok(record)
    }

    /// Create or refresh the record for a starting session.
    ///
    /// The same session id keeps its `started_at`; a different one replaces
    /// the record outright.
    pub fn record_start(
        &self,
        token: &str,
        session_id: &str,
        transcript_path: &Path,
        project_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let existing = match self.read_unlocked(token) {
            Ok(record) => Some(record),
            Err(Error::NotFound(_)) => None,
            Err(e) => {
                warn!(parent = %token, error = %e, "replacing unreadable parent record");
                None
            }
        };
        let record = match existing {
            Some(mut record) if record.session_id == session_id => {
                record.touch(now);
                record.transcript_path = transcript_path.to_path_buf();
                record.project_dir = project_dir.to_path_buf();
                record
            }
            _ => SessionRecord::new(session_id, transcript_path, project_dir, now),
        };
        self.write_unlocked(token, &record)?;
        Ok(record)
    }

    /// All readable records as `(token, record)`, most recently updated first.
    pub fn list(&self) -> Result<Vec<(String, SessionRecord)>> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let mut records = Vec::new();
        for path in json_files(&self.dir)? {
            let Some(token) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let parsed = read_optional(&path).and_then(|contents| match contents {
                Some(contents) => parse_record(&path, &contents).map(Some),
                None => Ok(None),
            });
            match parsed {
                Ok(Some(record)) => records.push((token.to_string(), record)),
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping session file"),
            }
        }
        records.sort_by(|a, b| b.1.last_updated.cmp(&a.1.last_updated));
        Ok(records)
    }

    /// Remove records whose file modification time is older than `max_age`.
    /// Returns the number of files removed; per-file failures are skipped.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let now = SystemTime::now();
        let mut removed = 0;
        for path in json_files(&self.dir)? {
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age > max_age => match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => debug!(path = %path.display(), error = %e, "cleanup skipped"),
                },
                _ => {}
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------
// Feature session index
// ---------------------------------------------------------------

/// Ordered session records for one feature, most recently inserted first.
#[derive(Debug, Default)]
pub struct FeatureSessions {
    pub records: Vec<SessionRecord>,
    /// Legacy per-session files this index was migrated from.
    legacy_files: Vec<PathBuf>,
}

impl FeatureSessions {
    /// Update in place when the session id is known, otherwise prepend.
    pub fn upsert(&mut self, mut record: SessionRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.session_id == record.session_id)
        {
            Some(existing) => {
                record.started_at = record.started_at.min(existing.started_at);
                record.last_updated = record.last_updated.max(existing.last_updated);
                *existing = record;
            }
            None => self.records.insert(0, record),
        }
    }

    pub fn find(&self, session_id: &str) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.session_id == session_id)
    }

    pub fn is_migrated(&self) -> bool {
        !self.legacy_files.is_empty()
    }
}

/// `<feature-dir>/sessions.json`, with lazy migration from the legacy
/// `<feature-dir>/sessions/*.json` layout.
pub struct FeatureSessionsStore {
    feature_dir: PathBuf,
    lock: Mutex<()>,
}

impl FeatureSessionsStore {
    pub fn new(feature_dir: impl Into<PathBuf>) -> Self {
        Self {
            feature_dir: feature_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.feature_dir.join("sessions.json")
    }

    fn legacy_dir(&self) -> PathBuf {
        self.feature_dir.join("sessions")
    }

    pub fn load(&self) -> Result<FeatureSessions> {
        let path = self.index_path();
        if let Some(contents) = read_optional(&path)? {
            let records = serde_json::from_str(&contents)
                .map_err(|e| Error::Decode(format!("{}: {e}", path.display())))?;
            return Ok(FeatureSessions {
                records,
                legacy_files: Vec::new(),
            });
        }
        self.load_legacy()
    }

    fn load_legacy(&self) -> Result<FeatureSessions> {
        let mut sessions = FeatureSessions::default();
        for path in json_files(&self.legacy_dir())? {
            let record = read_optional(&path).and_then(|contents| match contents {
                Some(contents) => parse_record(&path, &contents).map(Some),
                None => Ok(None),
            });
            match record {
                Ok(Some(record)) => {
                    sessions.records.push(record);
                    sessions.legacy_files.push(path);
                }
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping legacy session"),
            }
        }
        sessions
            .records
            .sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(sessions)
    }

    /// Write the combined index; legacy files are removed once it is on disk.
    pub fn save(&self, sessions: &FeatureSessions) -> Result<()> {
        fs::create_dir_all(&self.feature_dir)
            .map_err(|e| Error::io("creating", &self.feature_dir, e))?;
        let bytes = serde_json::to_vec_pretty(&sessions.records)
            .map_err(|e| Error::Decode(format!("encoding session index: {e}")))?;
        atomic_write(&self.index_path(), &bytes)?;
        for legacy in &sessions.legacy_files {
            if let Err(e) = fs::remove_file(legacy) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %legacy.display(), error = %e, "could not remove migrated session file");
                }
            }
        }
        if sessions.is_migrated() {
            // Only succeeds once the directory is empty.
            let _ = fs::remove_dir(self.legacy_dir());
        }
        Ok(())
    }

    pub fn upsert(&self, record: SessionRecord) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sessions = self.load()?;
        sessions.upsert(record);
        self.save(&sessions)
    }

    pub fn find(&self, session_id: &str) -> Result<SessionRecord> {
        self.load()?
            .find(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(id: &str, secs: i64) -> SessionRecord {
        SessionRecord::new(id, "/t/x.jsonl", "/p", at(secs))
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // =================================================================
    // atomic_write
    // =================================================================

    #[test]
    fn atomic_write_replaces_contents_and_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(file_names(dir.path()), vec!["state.json"]);
    }

    #[test]
    fn atomic_write_failure_removes_tmp() {
        let dir = TempDir::new().unwrap();
        // Renaming a file onto a non-empty directory fails.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner"), "x").unwrap();

        let err = atomic_write(&path, b"data").unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err}");
        assert_eq!(file_names(dir.path()), vec!["occupied"]);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_uses_0644() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mode.json");
        atomic_write(&path, b"{}").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    // =================================================================
    // SessionRecord
    // =================================================================

    #[test]
    fn touch_never_moves_backwards() {
        let mut r = record("s", 10);
        r.touch(at(5));
        assert_eq!(r.last_updated, at(10));
        r.touch(at(20));
        assert_eq!(r.last_updated, at(20));
        assert_eq!(r.started_at, at(10));
    }

    #[test]
    fn short_id_takes_eight_chars() {
        assert_eq!(short_id("abcdef0123456789"), "abcdef01");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn record_uses_snake_case_fields() {
        let v = serde_json::to_value(record("s1", 0)).unwrap();
        for key in [
            "session_id",
            "started_at",
            "last_updated",
            "transcript_path",
            "project_dir",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    // =================================================================
    // ParentInvocationStore
    // =================================================================

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path().join("sessions"));
        store.write("42", &record("abc123", 0)).unwrap();
        assert_eq!(store.read("42").unwrap(), record("abc123", 0));
        assert!(dir.path().join("sessions/42.json").exists());
    }

    #[test]
    fn read_distinguishes_missing_from_malformed() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        assert!(store.read("missing").unwrap_err().is_not_found());

        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(matches!(store.read("bad"), Err(Error::Decode(_))));
    }

    #[test]
    fn token_with_separator_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        assert!(matches!(store.read("../x"), Err(Error::Config(_))));
        assert!(matches!(store.read(""), Err(Error::Config(_))));
    }

    #[test]
    fn touch_keeps_identity() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        store.write("7", &record("keep-me", 0)).unwrap();

        let touched = store.touch("7", at(30)).unwrap();
        assert_eq!(touched.session_id, "keep-me");
        assert_eq!(touched.started_at, at(0));
        assert_eq!(touched.last_updated, at(30));

        store.touch("7", at(15)).unwrap();
        assert_eq!(store.read("7").unwrap().last_updated, at(30));
    }

    #[test]
    fn touch_without_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        assert!(store.touch("nobody", at(0)).unwrap_err().is_not_found());
        assert!(!dir.path().join("nobody.json").exists());
    }

    #[test]
    fn record_start_is_idempotent_for_same_session() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        let t = Path::new("/t/x.jsonl");
        let p = Path::new("/p");

        store.record_start("9", "sess-a", t, p, at(0)).unwrap();
        let again = store.record_start("9", "sess-a", t, p, at(40)).unwrap();
        assert_eq!(again.started_at, at(0));
        assert_eq!(again.last_updated, at(40));

        let replaced = store.record_start("9", "sess-b", t, p, at(50)).unwrap();
        assert_eq!(replaced.session_id, "sess-b");
        assert_eq!(replaced.started_at, at(50));
    }

    #[test]
    fn list_skips_malformed_files() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        store.write("1", &record("older", 0)).unwrap();
        store.write("2", &record("newer", 100)).unwrap();
        fs::write(dir.path().join("3.json"), "garbage").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        let ids: Vec<_> = listed.iter().map(|(t, r)| (t.as_str(), r.session_id.as_str())).collect();
        assert_eq!(ids, vec![("2", "newer"), ("1", "older")]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let dir = TempDir::new().unwrap();
        let store = ParentInvocationStore::new(dir.path());
        store.write("old", &record("o", 0)).unwrap();
        store.write("fresh", &record("f", 0)).unwrap();

        let old_path = dir.path().join("old.json");
        let file = fs::OpenOptions::new().write(true).open(&old_path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3 * 86_400))
            .unwrap();

        let removed = store
            .cleanup_older_than(Duration::from_secs(86_400))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!old_path.exists());
        assert!(dir.path().join("fresh.json").exists());
    }

    // =================================================================
    // FeatureSessionsStore
    // =================================================================

    #[test]
    fn upsert_prepends_then_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let store = FeatureSessionsStore::new(dir.path());

        store.upsert(record("first", 0)).unwrap();
        store.upsert(record("second", 10)).unwrap();
        let ids: Vec<_> = store.load().unwrap().records.into_iter().map(|r| r.session_id).collect();
        assert_eq!(ids, vec!["second", "first"]);

        store.upsert(record("first", 20)).unwrap();
        let loaded = store.load().unwrap();
        let ids: Vec<_> = loaded.records.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
        let first = loaded.find("first").unwrap();
        assert_eq!(first.started_at, at(0));
        assert_eq!(first.last_updated, at(20));
    }

    #[test]
    fn index_is_a_json_array() {
        let dir = TempDir::new().unwrap();
        let store = FeatureSessionsStore::new(dir.path());
        store.upsert(record("only", 0)).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.index_path()).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_feature_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FeatureSessionsStore::new(dir.path());
        let sessions = store.load().unwrap();
        assert!(sessions.records.is_empty());
        assert!(!sessions.is_migrated());
        assert!(store.find("x").unwrap_err().is_not_found());
    }

    #[test]
    fn legacy_files_migrate_on_next_save() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("sessions");
        fs::create_dir(&legacy).unwrap();
        for (id, secs) in [("a", 0), ("b", 50)] {
            let bytes = serde_json::to_vec(&record(id, secs)).unwrap();
            fs::write(legacy.join(format!("{id}.json")), bytes).unwrap();
        }
        fs::write(legacy.join("broken.json"), "nope").unwrap();

        let store = FeatureSessionsStore::new(dir.path());
        let sessions = store.load().unwrap();
        assert!(sessions.is_migrated());
        let ids: Vec<_> = sessions.records.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        store.upsert(record("c", 60)).unwrap();
        assert!(store.index_path().exists());
        assert!(!legacy.join("a.json").exists());
        assert!(!legacy.join("b.json").exists());
        // Unparseable legacy files are left for the user.
        assert!(legacy.join("broken.json").exists());

        let ids: Vec<_> = store.load().unwrap().records.into_iter().map(|r| r.session_id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn malformed_index_is_decode_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sessions.json"), "{").unwrap();
        let store = FeatureSessionsStore::new(dir.path());
        assert!(matches!(store.load(), Err(Error::Decode(_))));
    }

    // =================================================================
    // Concurrent readers and writers
    // =================================================================

    /// A record large enough that a torn write would be visible.
    fn bulky(id: &str, secs: i64) -> SessionRecord {
        let transcript = format!("/t/{}.jsonl", "x".repeat(20_000));
        SessionRecord::new(id, transcript, "/p", at(secs))
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_writers_never_expose_a_partial_record() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        ParentInvocationStore::new(&root)
            .write("42", &bulky("seed", 0))
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                // One store per thread, like separate hook processes.
                let store = ParentInvocationStore::new(&root);
                thread::spawn(move || {
                    for i in 0..150 {
                        store.write("42", &bulky(&format!("w{w}"), i)).unwrap();
                        store.touch("42", at(i + 1)).unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = ParentInvocationStore::new(&root);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::SeqCst) {
                    let record = store
                        .read("42")
                        .unwrap_or_else(|e| panic!("read {reads} saw a broken record: {e}"));
                    assert_eq!(record.transcript_path.as_os_str().len(), 20_000 + 9);
                    reads += 1;
                }
                reads
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().unwrap() > 0);
        assert_eq!(file_names(&root), vec!["42.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_index_upserts_keep_sessions_json_readable() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let dir = TempDir::new().unwrap();
        let feature = dir.path().to_path_buf();
        FeatureSessionsStore::new(&feature)
            .upsert(bulky("seed", 0))
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = FeatureSessionsStore::new(&feature);
                thread::spawn(move || {
                    for i in 0..100 {
                        store.upsert(bulky(&format!("w{w}-{}", i % 5), i)).unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = FeatureSessionsStore::new(&feature);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut loads = 0;
                while !done.load(Ordering::SeqCst) {
                    let sessions = store
                        .load()
                        .unwrap_or_else(|e| panic!("load {loads} saw a broken index: {e}"));
                    assert!(!sessions.records.is_empty());
                    loads += 1;
                }
                loads
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().unwrap() > 0);
        assert_eq!(file_names(&feature), vec!["sessions.json"]);
    }
}
