//! Output paths of a generation run.
//!
//! The store is built at `<store>.partial` and only renamed into place once
//! the transaction has committed, so an aborted run leaves no store behind.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::GenerationError;

pub const REPORT_FILE: &str = "generation_report.json";

/// SQLite side files that belong to a store.
const SIDE_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// A store under construction. Dropping it without [`commit`](Self::commit)
/// removes the partial file.
#[derive(Debug)]
pub struct StagedStore {
    target: PathBuf,
    partial: PathBuf,
    committed: bool,
}

impl StagedStore {
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    pub fn commit(mut self) -> Result<PathBuf, GenerationError> {
        fs::rename(&self.partial, &self.target)?;
        remove_side_files(&self.partial)?;
        if let Some(parent) = non_empty_parent(&self.target) {
            sync_dir(parent)?;
        }
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedStore {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = remove_file_if_exists(&self.partial).and_then(|_| remove_side_files(&self.partial)) {
            warn!(path = %self.partial.display(), error = %err, "failed to remove partial store");
        }
    }
}

/// Discard the previous store, its side files and the derived analytics
/// directory, then stage a fresh partial path.
pub fn prepare_output(store: &Path, analytics_dir: &Path) -> Result<StagedStore, GenerationError> {
    if let Some(parent) = non_empty_parent(store) {
        fs::create_dir_all(parent)?;
    }

    remove_file_if_exists(store)?;
    remove_side_files(store)?;
    if analytics_dir.exists() {
        debug!(path = %analytics_dir.display(), "removing stale analytics cache");
        fs::remove_dir_all(analytics_dir)?;
    }

    let partial = sibling_with_suffix(store, ".partial")?;
    remove_file_if_exists(&partial)?;
    remove_side_files(&partial)?;

    Ok(StagedStore {
        target: store.to_path_buf(),
        partial,
        committed: false,
    })
}

pub fn report_path(store: &Path) -> PathBuf {
    store.with_file_name(REPORT_FILE)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), GenerationError> {
    let data = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &data)
}

pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<(), GenerationError> {
    if let Some(parent) = non_empty_parent(path) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = sibling_with_suffix(path, ".tmp")?;
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&tmp_path, path)?;
    if let Some(parent) = non_empty_parent(path) {
        sync_dir(parent)?;
    }
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> Result<PathBuf, GenerationError> {
    let file_name = path.file_name().ok_or_else(|| {
        GenerationError::InvalidConfig(format!("output path '{}' has no file name", path.display()))
    })?;
    Ok(path.with_file_name(format!("{}{suffix}", file_name.to_string_lossy())))
}

fn remove_side_files(store: &Path) -> io::Result<()> {
    let Some(file_name) = store.file_name() else {
        return Ok(());
    };
    for suffix in SIDE_SUFFIXES {
        let side = store.with_file_name(format!("{}{suffix}", file_name.to_string_lossy()));
        remove_file_if_exists(&side)?;
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("inboxforge_output_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn prepare_removes_previous_outputs() {
        let dir = temp_dir();
        let store = dir.join("msgvault.db");
        let analytics = dir.join("analytics");
        fs::write(&store, b"old").expect("store");
        fs::write(dir.join("msgvault.db-wal"), b"old").expect("wal");
        fs::create_dir_all(analytics.join("messages")).expect("analytics");

        let staged = prepare_output(&store, &analytics).expect("prepare");
        assert!(!store.exists());
        assert!(!dir.join("msgvault.db-wal").exists());
        assert!(!analytics.exists());
        assert_eq!(staged.partial_path(), dir.join("msgvault.db.partial"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn dropped_stage_leaves_no_store() {
        let dir = temp_dir();
        let store = dir.join("msgvault.db");
        let staged = prepare_output(&store, &dir.join("analytics")).expect("prepare");
        fs::write(staged.partial_path(), b"half").expect("partial");
        let partial = staged.partial_path().to_path_buf();
        drop(staged);
        assert!(!partial.exists());
        assert!(!store.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn commit_moves_partial_into_place() {
        let dir = temp_dir();
        let store = dir.join("msgvault.db");
        let staged = prepare_output(&store, &dir.join("analytics")).expect("prepare");
        fs::write(staged.partial_path(), b"done").expect("partial");
        let committed = staged.commit().expect("commit");
        assert_eq!(committed, store);
        assert_eq!(fs::read(&store).expect("read"), b"done");
        assert_eq!(report_path(&store), dir.join(REPORT_FILE));
        let _ = fs::remove_dir_all(dir);
    }
}
