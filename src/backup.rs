//! Backup/Restore (`spec.md` §4.13): a compressed logical dump of the Store
//! (files, sections, checkouts, embeddings) and an integrity-checked
//! restore. The teacher has no local compressed-dump facility of its own
//! (its `sync/cloud.rs` targets S3 specifically, out of scope per
//! `SPEC_FULL.md`'s Non-goals); this is grounded instead on
//! `wrath-codes-agents-ctx-plus`'s `zen-cli` use of `flate2` for packaging
//! archives, adapted to gzip a JSON logical export instead of a tarball.

use std::io::{Read, Write};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::recompose::recompose;
use crate::storage::{Storage, StorageConfig, StorageMode};

const MANIFEST_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRow {
    id: i64,
    path: String,
    kind: String,
    format: String,
    content_hash: String,
    frontmatter_raw: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionRow {
    id: i64,
    file_id: i64,
    parent_id: Option<i64>,
    order_index: i32,
    kind: String,
    level: i64,
    title: String,
    content: String,
    closing_tag_prefix: String,
    line_start: i64,
    line_end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckoutRow {
    id: i64,
    file_id: i64,
    target_path: String,
    deployed_paths: String,
    user_id: Option<String>,
    status: String,
    created_at: String,
    checked_in_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRow {
    section_id: i64,
    model_name: String,
    embedding: Vec<u8>,
    dimensions: i64,
    created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupManifest {
    version: i32,
    created_at: String,
    files: Vec<FileRow>,
    sections: Vec<SectionRow>,
    checkouts: Vec<CheckoutRow>,
    embeddings: Vec<EmbeddingRow>,
}

/// Counts + pass/fail reported by [`restore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub files: usize,
    pub sections: usize,
    pub checkouts: usize,
    pub embeddings: usize,
    /// Whether every restored file recomposed back to its stored hash (I1).
    pub round_trip_ok: bool,
    /// One entry per file that failed the round-trip check, if any.
    pub failures: Vec<String>,
}

fn gather_manifest(conn: &Connection) -> Result<BackupManifest> {
    let mut files = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, path, kind, format, content_hash, frontmatter_raw, created_at, updated_at FROM files",
        )?;
        for row in stmt.query_map([], |r| {
            Ok(FileRow {
                id: r.get(0)?,
                path: r.get(1)?,
                kind: r.get(2)?,
                format: r.get(3)?,
                content_hash: r.get(4)?,
                frontmatter_raw: r.get(5)?,
                created_at: r.get(6)?,
                updated_at: r.get(7)?,
            })
        })? {
            files.push(row?);
        }
    }

    let mut sections = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, file_id, parent_id, order_index, kind, level, title, content, \
             closing_tag_prefix, line_start, line_end FROM sections",
        )?;
        for row in stmt.query_map([], |r| {
            Ok(SectionRow {
                id: r.get(0)?,
                file_id: r.get(1)?,
                parent_id: r.get(2)?,
                order_index: r.get(3)?,
                kind: r.get(4)?,
                level: r.get(5)?,
                title: r.get(6)?,
                content: r.get(7)?,
                closing_tag_prefix: r.get(8)?,
                line_start: r.get(9)?,
                line_end: r.get(10)?,
            })
        })? {
            sections.push(row?);
        }
    }

    let mut checkouts = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, file_id, target_path, deployed_paths, user_id, status, created_at, checked_in_at FROM checkouts",
        )?;
        for row in stmt.query_map([], |r| {
            Ok(CheckoutRow {
                id: r.get(0)?,
                file_id: r.get(1)?,
                target_path: r.get(2)?,
                deployed_paths: r.get(3)?,
                user_id: r.get(4)?,
                status: r.get(5)?,
                created_at: r.get(6)?,
                checked_in_at: r.get(7)?,
            })
        })? {
            checkouts.push(row?);
        }
    }

    let mut embeddings = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT section_id, model_name, embedding, dimensions, created_at FROM section_embeddings",
        )?;
        for row in stmt.query_map([], |r| {
            Ok(EmbeddingRow {
                section_id: r.get(0)?,
                model_name: r.get(1)?,
                embedding: r.get(2)?,
                dimensions: r.get(3)?,
                created_at: r.get(4)?,
            })
        })? {
            embeddings.push(row?);
        }
    }

    Ok(BackupManifest {
        version: MANIFEST_VERSION,
        created_at: Utc::now().to_rfc3339(),
        files,
        sections,
        checkouts,
        embeddings,
    })
}

/// A timestamped default filename: `skillsplit-backup-<UTC timestamp>.json.gz`.
#[must_use]
pub fn default_filename() -> String {
    format!(
        "skillsplit-backup-{}.json.gz",
        Utc::now().format("%Y%m%dT%H%M%SZ")
    )
}

/// Writes a compressed logical dump of every table to `output_path`.
/// Returns the size in bytes of the written file.
pub fn backup(storage: &Storage, output_path: &str) -> Result<usize> {
    let manifest = storage.with_connection(gather_manifest)?;
    let json = serde_json::to_vec(&manifest)?;

    let file = std::fs::File::create(output_path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()?;

    let size = std::fs::metadata(output_path)?.len() as usize;
    info!(
        output_path,
        files = manifest.files.len(),
        sections = manifest.sections.len(),
        size,
        "wrote backup"
    );
    Ok(size)
}

/// Restores a dump produced by [`backup`] into a fresh store at
/// `target_db_path`. The `sections_fts` shadow table is never read from the
/// dump; it is rebuilt from the restored `sections` rows (spec's explicit
/// instruction). Runs a round-trip integrity check over every restored file
/// afterwards and reports counts plus pass/fail.
pub fn restore(dump_path: &str, target_db_path: &str, overwrite: bool) -> Result<RestoreReport> {
    if std::path::Path::new(target_db_path).exists() {
        if !overwrite {
            return Err(Error::InvariantViolation(format!(
                "target database already exists: {target_db_path} (pass overwrite to replace it)"
            )));
        }
        std::fs::remove_file(target_db_path)?;
    }

    let compressed = std::fs::File::open(dump_path)?;
    let mut decoder = GzDecoder::new(compressed);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    let manifest: BackupManifest = serde_json::from_slice(&json)?;

    let storage = Storage::open(StorageConfig {
        db_path: target_db_path.to_string(),
        storage_mode: StorageMode::Local,
    })?;

    let result = storage.with_transaction(|conn| {
        for f in &manifest.files {
            conn.execute(
                "INSERT INTO files (id, path, kind, format, content_hash, frontmatter_raw, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    f.id, f.path, f.kind, f.format, f.content_hash, f.frontmatter_raw,
                    f.created_at, f.updated_at
                ],
            )?;
        }
        for s in &manifest.sections {
            conn.execute(
                "INSERT INTO sections (id, file_id, parent_id, order_index, kind, level, title, \
                 content, closing_tag_prefix, line_start, line_end)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    s.id, s.file_id, s.parent_id, s.order_index, s.kind, s.level, s.title,
                    s.content, s.closing_tag_prefix, s.line_start, s.line_end
                ],
            )?;
        }
        for c in &manifest.checkouts {
            conn.execute(
                "INSERT INTO checkouts (id, file_id, target_path, deployed_paths, user_id, status, created_at, checked_in_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    c.id, c.file_id, c.target_path, c.deployed_paths, c.user_id, c.status,
                    c.created_at, c.checked_in_at
                ],
            )?;
        }
        for e in &manifest.embeddings {
            conn.execute(
                "INSERT INTO section_embeddings (section_id, model_name, embedding, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![e.section_id, e.model_name, e.embedding, e.dimensions, e.created_at],
            )?;
        }

        for file_id in manifest.files.iter().map(|f| f.id) {
            crate::storage::queries::sync_fts(conn, file_id)?;
        }
        Ok(())
    });
    result?;

    let mut failures = Vec::new();
    for f in &manifest.files {
        match storage.get_file(&f.path) {
            Ok((file, sections)) => {
                if let Err(e) = recompose(&file, &sections) {
                    failures.push(format!("{}: {e}", f.path));
                }
            }
            Err(e) => failures.push(format!("{}: {e}", f.path)),
        }
    }

    let round_trip_ok = failures.is_empty();
    if !round_trip_ok {
        warn!(failures = failures.len(), "restore integrity check found round-trip failures");
    }

    Ok(RestoreReport {
        files: manifest.files.len(),
        sections: manifest.sections.len(),
        checkouts: manifest.checkouts.len(),
        embeddings: manifest.embeddings.len(),
        round_trip_ok,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backup_then_restore_preserves_content_and_sections() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\nbody1\n## B\nbody2\n").unwrap();
        storage.store("b.md", "# C\nbody3\n").unwrap();

        let dir = tempdir().unwrap();
        let dump_path = dir.path().join("dump.json.gz");
        let size = backup(&storage, &dump_path.to_string_lossy()).unwrap();
        assert!(size > 0);

        let target_db = dir.path().join("restored.db");
        let report = restore(
            &dump_path.to_string_lossy(),
            &target_db.to_string_lossy(),
            false,
        )
        .unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.sections, 3);
        assert!(report.round_trip_ok);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn restore_refuses_to_overwrite_without_flag() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\nbody\n").unwrap();

        let dir = tempdir().unwrap();
        let dump_path = dir.path().join("dump.json.gz");
        backup(&storage, &dump_path.to_string_lossy()).unwrap();

        let target_db = dir.path().join("restored.db");
        std::fs::write(&target_db, b"not a real db").unwrap();

        let err = restore(&dump_path.to_string_lossy(), &target_db.to_string_lossy(), false)
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        let report = restore(&dump_path.to_string_lossy(), &target_db.to_string_lossy(), true)
            .unwrap();
        assert_eq!(report.files, 1);
    }
}
