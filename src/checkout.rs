//! The Checkout Manager (`spec.md` §4.11): atomic multi-file deployment of a
//! stored file (and, for multi-file kinds, its related files) to the
//! filesystem, with a compensating rollback when the deployment can't be
//! recorded. The append-only `checkouts` log row follows the teacher's
//! `storage/audit.rs` pattern; the `DeployedSet` guard is the RAII
//! "commit() disarms rollback" shape called for in `spec.md` §9.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::recompose::recompose;
use crate::storage::{queries, Storage};
use crate::types::{Checkout, File, FileKind};

/// Tracks every path (and parent directory) written during one checkout so
/// a failed deploy can be compensated. [`DeployedSet::commit`] disarms the
/// rollback once the deployment has been durably recorded; otherwise
/// dropping the set rolls back whatever was written.
struct DeployedSet {
    paths: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
    armed: bool,
}

impl DeployedSet {
    fn new() -> Self {
        Self {
            paths: Vec::new(),
            created_dirs: Vec::new(),
            armed: true,
        }
    }

    fn record(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn record_dir(&mut self, dir: PathBuf) {
        self.created_dirs.push(dir);
    }

    fn deployed_paths(&self) -> Vec<String> {
        self.paths.iter().map(|p| p.display().to_string()).collect()
    }

    /// Best-effort compensating rollback: removes every tracked file
    /// (ok-if-missing), then any parent directories created along the way,
    /// innermost first, skipping any that are non-empty. Returns the number
    /// of files actually removed.
    fn rollback(&self) -> usize {
        let mut removed = 0;
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "rollback failed to remove file"),
            }
        }
        for dir in self.created_dirs.iter().rev() {
            let _ = std::fs::remove_dir(dir);
        }
        removed
    }

    /// Disarms the rollback: the deployment was recorded successfully.
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for DeployedSet {
    fn drop(&mut self) {
        if self.armed {
            self.rollback();
        }
    }
}

/// Writes `content` to `path` atomically: a sibling temp file, then a
/// rename. Creates the immediate parent directory if missing and tracks it
/// in `deployed` for best-effort cleanup on rollback.
fn write_atomic(path: &Path, content: &str, deployed: &mut DeployedSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            deployed.record_dir(parent.to_path_buf());
        }
    }

    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let tmp_name = format!(".{file_name}.tmp{}", std::process::id());
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content.as_bytes())?;
    std::fs::rename(&tmp_path, path)?;
    deployed.record(path.to_path_buf());
    Ok(())
}

/// Discovers the related files deployed alongside a multi-file kind.
/// `Plugin`/`Hook` files are conventionally stored next to sibling library
/// files in the same source directory; every other stored file sharing
/// `primary`'s parent directory is deployed alongside it, keyed by its own
/// basename. Every other kind deploys alone.
fn discover_related(storage: &Storage, primary: &File) -> Result<Vec<(String, String)>> {
    if !matches!(primary.kind, FileKind::Plugin | FileKind::Hook) {
        return Ok(Vec::new());
    }

    let parent = match Path::new(&primary.path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => return Ok(Vec::new()),
    };

    let like_pattern = format!("{}%", parent.display());
    let candidate_paths: Vec<String> = storage.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT path FROM files WHERE path != ?1 AND path LIKE ?2")?;
        let rows = stmt.query_map(rusqlite::params![primary.path, like_pattern], |r| {
            r.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })?;

    let mut related = Vec::new();
    for path in candidate_paths {
        if Path::new(&path).parent() != Some(parent.as_path()) {
            continue;
        }
        let (file, sections) = storage.get_file(&path)?;
        let content = recompose(&file, &sections)?;
        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        related.push((name, content));
    }
    Ok(related)
}

/// Deploys `file_id`'s stored bytes to `target_path`. For `Plugin`/`Hook`
/// kinds, also deploys every sibling library file discovered by
/// [`discover_related`] next to the primary target. Recording the
/// deployment in the `checkouts` log is the transaction boundary: if it
/// fails, every path written so far is rolled back (best-effort) and the
/// call fails with [`Error::RollbackFailure`] naming how many files were
/// removed.
pub fn checkout(storage: &Storage, file_id: i64, target_path: &str, user: Option<&str>) -> Result<String> {
    let file = storage.get_file_by_id(file_id)?;
    let (_, sections) = storage.get_file(&file.path)?;
    let content = recompose(&file, &sections)?;

    let target = PathBuf::from(target_path);
    let mut deployed = DeployedSet::new();
    write_atomic(&target, &content, &mut deployed)?;

    let related = discover_related(storage, &file)?;
    let target_dir = target.parent().map(Path::to_path_buf).unwrap_or_default();
    for (name, related_content) in &related {
        let related_target = target_dir.join(name);
        write_atomic(&related_target, related_content, &mut deployed)?;
    }

    let deployed_paths = deployed.deployed_paths();
    let record_result = storage
        .with_transaction(|conn| queries::record_checkout(conn, file_id, target_path, &deployed_paths, user));

    match record_result {
        Ok(checkout_id) => {
            info!(
                checkout_id,
                file_id,
                target_path,
                deployed = deployed_paths.len(),
                "checked out file"
            );
            deployed.commit();
            Ok(target_path.to_string())
        }
        Err(e) => {
            let removed = deployed.rollback();
            deployed.commit(); // already rolled back explicitly; disarm the Drop
            warn!(file_id, target_path, removed, error = %e, "checkout recording failed, rolled back");
            Err(Error::RollbackFailure(format!(
                "rolled back {removed} file(s) after checkout recording failed: {e}"
            )))
        }
    }
}

/// Withdraws a checkout: deletes the deployed primary file (ok if already
/// missing), then marks the checkout row `checked_in`. If the status update
/// fails after the file was already removed, surfaces a clear
/// "inconsistent state" error naming the checkout id rather than silently
/// leaving the log row stale (`spec.md` §4.11 checkin contract).
pub fn checkin(storage: &Storage, checkout_id: i64) -> Result<()> {
    let record: Checkout = storage.get_checkout(checkout_id)?;

    match std::fs::remove_file(&record.target_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Io(e)),
    }

    storage
        .with_transaction(|conn| queries::update_checkout_status(conn, checkout_id, "checked_in", true))
        .map_err(|e| {
            Error::InvariantViolation(format!(
                "checkout {checkout_id} left in inconsistent state: file deleted but status update failed: {e}"
            ))
        })
}

/// Lists checkouts currently in the `deployed` state (the `status` CLI
/// command).
pub fn list_active(storage: &Storage) -> Result<Vec<Checkout>> {
    storage.list_checkouts(Some("deployed"))
}
