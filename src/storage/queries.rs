//! CRUD operations over the `files`/`sections`/`sections_fts` tables
//! (`spec.md` §4.8).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{
    Checkout, CheckoutStatus, File, FileFormat, FileKind, ParsedDocument, Section, SectionKind,
    TocEntry,
};

fn kind_to_str(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Skill => "skill",
        FileKind::Command => "command",
        FileKind::Reference => "reference",
        FileKind::Agent => "agent",
        FileKind::Plugin => "plugin",
        FileKind::Hook => "hook",
        FileKind::OutputStyle => "output_style",
        FileKind::Config => "config",
        FileKind::Documentation => "documentation",
        FileKind::Script => "script",
    }
}

fn kind_from_str(s: &str) -> Result<FileKind> {
    Ok(match s {
        "skill" => FileKind::Skill,
        "command" => FileKind::Command,
        "reference" => FileKind::Reference,
        "agent" => FileKind::Agent,
        "plugin" => FileKind::Plugin,
        "hook" => FileKind::Hook,
        "output_style" => FileKind::OutputStyle,
        "config" => FileKind::Config,
        "documentation" => FileKind::Documentation,
        "script" => FileKind::Script,
        other => return Err(Error::InvariantViolation(format!("unknown file kind {other}"))),
    })
}

fn format_to_str(format: FileFormat) -> &'static str {
    match format {
        FileFormat::MarkdownHeadings => "markdown_headings",
        FileFormat::XmlTags => "xml_tags",
        FileFormat::JsonUnit => "json_unit",
        FileFormat::ScriptPython => "script_python",
        FileFormat::ScriptJs => "script_js",
        FileFormat::ScriptTs => "script_ts",
        FileFormat::ScriptShell => "script_shell",
    }
}

fn format_from_str(s: &str) -> Result<FileFormat> {
    Ok(match s {
        "markdown_headings" => FileFormat::MarkdownHeadings,
        "xml_tags" => FileFormat::XmlTags,
        "json_unit" => FileFormat::JsonUnit,
        "script_python" => FileFormat::ScriptPython,
        "script_js" => FileFormat::ScriptJs,
        "script_ts" => FileFormat::ScriptTs,
        "script_shell" => FileFormat::ScriptShell,
        other => {
            return Err(Error::InvariantViolation(format!(
                "unknown file format {other}"
            )))
        }
    })
}

fn section_kind_to_parts(kind: SectionKind) -> (&'static str, u8) {
    match kind {
        SectionKind::Heading(level) => ("heading", level),
        SectionKind::Leading => ("leading", 0),
        SectionKind::Tag => ("tag", 0),
        SectionKind::Module => ("module", 0),
        SectionKind::Symbol => ("symbol", 0),
        SectionKind::Footer => ("footer", 0),
    }
}

fn section_kind_from_parts(kind: &str, level: u8) -> Result<SectionKind> {
    Ok(match kind {
        "heading" => SectionKind::Heading(level),
        "leading" => SectionKind::Leading,
        "tag" => SectionKind::Tag,
        "module" => SectionKind::Module,
        "symbol" => SectionKind::Symbol,
        "footer" => SectionKind::Footer,
        other => {
            return Err(Error::InvariantViolation(format!(
                "unknown section kind {other}"
            )))
        }
    })
}

/// Rebuilds every `sections_fts` row for `file_id` from the current contents
/// of `sections`. The single routine every section mutation path calls,
/// rather than sprinkling triggers across insert/update/delete.
pub fn sync_fts(conn: &Connection, file_id: i64) -> Result<()> {
    // Sweep rows left behind by hard-deleted sections (callers may delete a
    // file's old sections outright before re-inserting, so their ids are
    // already gone from `sections` by the time this runs).
    conn.execute(
        "DELETE FROM sections_fts WHERE section_id NOT IN (SELECT id FROM sections)",
        [],
    )?;
    conn.execute(
        "DELETE FROM sections_fts WHERE section_id IN (SELECT id FROM sections WHERE file_id = ?1)",
        params![file_id],
    )?;
    conn.execute(
        "INSERT INTO sections_fts(title, content, section_id)
         SELECT title, content, id FROM sections WHERE file_id = ?1",
        params![file_id],
    )?;
    Ok(())
}

/// Upserts `path`'s parsed document: replaces all prior sections and FTS
/// rows for this file in one transaction (`spec.md` §4.8 `store_file`).
pub fn store_file(
    conn: &Connection,
    path: &str,
    kind: FileKind,
    format: FileFormat,
    content_hash: &str,
    document: &ParsedDocument,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    let existing_id: Option<i64> = conn
        .query_row("SELECT id FROM files WHERE path = ?1", params![path], |r| {
            r.get(0)
        })
        .optional()?;

    let file_id = if let Some(id) = existing_id {
        conn.execute(
            "UPDATE files SET kind = ?1, format = ?2, content_hash = ?3, frontmatter_raw = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                kind_to_str(kind),
                format_to_str(format),
                content_hash,
                document.frontmatter_raw,
                now,
                id
            ],
        )?;
        // CASCADE removes old sections; sections_fts rows for this file are
        // rebuilt below by sync_fts regardless of whether any survived.
        conn.execute("DELETE FROM sections WHERE file_id = ?1", params![id])?;
        id
    } else {
        conn.execute(
            "INSERT INTO files (path, kind, format, content_hash, frontmatter_raw, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                path,
                kind_to_str(kind),
                format_to_str(format),
                content_hash,
                document.frontmatter_raw,
                now
            ],
        )?;
        conn.last_insert_rowid()
    };

    // Map each parsed section's arena index to its assigned db id, in
    // input order, so later sections can resolve `parent_id` from `parent`.
    let mut db_ids = Vec::with_capacity(document.sections.len());
    for section in &document.sections {
        let parent_id: Option<i64> = section.parent.map(|idx| db_ids[idx]);
        let (kind_str, level) = section_kind_to_parts(section.kind);
        conn.execute(
            "INSERT INTO sections
                (file_id, parent_id, order_index, kind, level, title, content,
                 closing_tag_prefix, line_start, line_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                file_id,
                parent_id,
                section.order_index,
                kind_str,
                level,
                section.title,
                section.content,
                section.closing_tag_prefix,
                section.line_start as i64,
                section.line_end as i64,
            ],
        )?;
        db_ids.push(conn.last_insert_rowid());
    }

    sync_fts(conn, file_id)?;

    Ok(file_id)
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<File> {
    let kind_str: String = row.get(2)?;
    let format_str: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(File {
        id: row.get(0)?,
        path: row.get(1)?,
        kind: kind_from_str(&kind_str).unwrap_or(FileKind::Documentation),
        format: format_from_str(&format_str).unwrap_or(FileFormat::MarkdownHeadings),
        content_hash: row.get(4)?,
        frontmatter_raw: row.get(5)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
    let kind_str: String = row.get(4)?;
    let level: i64 = row.get(5)?;
    Ok(Section {
        id: row.get(0)?,
        file_id: row.get(1)?,
        parent_id: row.get(2)?,
        order_index: row.get(3)?,
        kind: section_kind_from_parts(&kind_str, level as u8)
            .unwrap_or(SectionKind::Leading),
        title: row.get(6)?,
        content: row.get(7)?,
        closing_tag_prefix: row.get(8)?,
        line_start: row.get::<_, i64>(9)? as usize,
        line_end: row.get::<_, i64>(10)? as usize,
        file_type: None,
    })
}

const FILE_COLUMNS: &str =
    "id, path, kind, format, content_hash, frontmatter_raw, created_at, updated_at";
const SECTION_COLUMNS: &str = "id, file_id, parent_id, order_index, kind, level, title, content, \
     closing_tag_prefix, line_start, line_end";

/// Fetches `(File, ordered Sections)` for `path`.
pub fn get_file(conn: &Connection, path: &str) -> Result<(File, Vec<Section>)> {
    let file = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
            params![path],
            row_to_file,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("file: {path}")))?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {SECTION_COLUMNS} FROM sections WHERE file_id = ?1 ORDER BY parent_id, order_index"
    ))?;
    let sections = stmt
        .query_map(params![file.id], row_to_section)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((file, sections))
}

/// Fetches one section with its owning file's kind denormalized in.
pub fn get_section(conn: &Connection, id: i64) -> Result<Section> {
    let mut section = conn
        .query_row(
            &format!("SELECT {SECTION_COLUMNS} FROM sections WHERE id = ?1"),
            params![id],
            row_to_section,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("section: {id}")))?;

    let kind_str: Option<String> = conn
        .query_row(
            "SELECT kind FROM files WHERE id = ?1",
            params![section.file_id],
            |r| r.get(0),
        )
        .optional()?;
    section.file_type = kind_str.and_then(|k| kind_from_str(&k).ok());
    Ok(section)
}

/// Fetches the owning path for `file_id`, used by the Composer to record
/// source file paths without exposing a full `get_file` lookup per section.
pub fn get_file_path(conn: &Connection, file_id: i64) -> Result<String> {
    conn.query_row("SELECT path FROM files WHERE id = ?1", params![file_id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("file id: {file_id}")))
}

/// Fetches the `File` row for `file_id`, used by the Checkout Manager which
/// addresses files by id rather than path.
pub fn get_file_by_id(conn: &Connection, file_id: i64) -> Result<File> {
    conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
        params![file_id],
        row_to_file,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("file id: {file_id}")))
}

fn row_to_checkout(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkout> {
    let deployed_paths_json: String = row.get(3)?;
    let status_str: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let checked_in_at: Option<String> = row.get(7)?;

    let status = match status_str.as_str() {
        "checked_in" => CheckoutStatus::CheckedIn,
        _ => CheckoutStatus::Deployed,
    };

    Ok(Checkout {
        id: row.get(0)?,
        file_id: row.get(1)?,
        target_path: row.get(2)?,
        deployed_paths: serde_json::from_str(&deployed_paths_json).unwrap_or_default(),
        user_id: row.get(4)?,
        status,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        checked_in_at: checked_in_at.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
        }),
    })
}

const CHECKOUT_COLUMNS: &str =
    "id, file_id, target_path, deployed_paths, user_id, status, created_at, checked_in_at";

/// Appends a new `checkouts` row in "deployed" status (`spec.md` §4.11 step
/// 4). One append-only log row per deployment, in the style of the teacher's
/// `audit_log` insert.
pub fn record_checkout(
    conn: &Connection,
    file_id: i64,
    target_path: &str,
    deployed_paths: &[String],
    user_id: Option<&str>,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let deployed_json = serde_json::to_string(deployed_paths)?;
    conn.execute(
        "INSERT INTO checkouts (file_id, target_path, deployed_paths, user_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'deployed', ?5)",
        params![file_id, target_path, deployed_json, user_id, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetches one checkout row by id.
pub fn get_checkout(conn: &Connection, id: i64) -> Result<Checkout> {
    conn.query_row(
        &format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE id = ?1"),
        params![id],
        row_to_checkout,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("checkout: {id}")))
}

/// Transitions a checkout to `status`; when `mark_checked_in` is set, also
/// stamps `checked_in_at` with the current time.
pub fn update_checkout_status(
    conn: &Connection,
    id: i64,
    status: &str,
    mark_checked_in: bool,
) -> Result<()> {
    let checked_in_at = mark_checked_in.then(|| Utc::now().to_rfc3339());
    let rows = conn.execute(
        "UPDATE checkouts SET status = ?1, checked_in_at = COALESCE(?2, checked_in_at) WHERE id = ?3",
        params![status, checked_in_at, id],
    )?;
    if rows == 0 {
        return Err(Error::NotFound(format!("checkout: {id}")));
    }
    Ok(())
}

/// Lists checkouts, most recent first, optionally restricted to one status
/// (the `status` CLI command's "active checkouts" view passes `"deployed"`).
pub fn list_checkouts(conn: &Connection, status_filter: Option<&str>) -> Result<Vec<Checkout>> {
    let rows: Vec<Checkout> = if let Some(status) = status_filter {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE status = ?1 ORDER BY created_at DESC"
        ))?;
        let mapped = stmt
            .query_map(params![status], row_to_checkout)?
            .collect::<std::result::Result<_, _>>()?;
        mapped
    } else {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHECKOUT_COLUMNS} FROM checkouts ORDER BY created_at DESC"
        ))?;
        let mapped = stmt
            .query_map([], row_to_checkout)?
            .collect::<std::result::Result<_, _>>()?;
        mapped
    };
    Ok(rows)
}

/// `spec.md` §4.8 `get_next_section`: first child by `order_index` when
/// `first_child`, else the next sibling; falls back to next sibling when
/// `first_child` is requested but the section has no children.
pub fn get_next_section(conn: &Connection, id: i64, first_child: bool) -> Result<Option<i64>> {
    if first_child {
        let child: Option<i64> = conn
            .query_row(
                "SELECT id FROM sections WHERE parent_id = ?1 ORDER BY order_index LIMIT 1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        if child.is_some() {
            return Ok(child);
        }
    }

    let (file_id, parent_id, order_index): (i64, Option<i64>, i32) = conn.query_row(
        "SELECT file_id, parent_id, order_index FROM sections WHERE id = ?1",
        params![id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let next = if let Some(parent_id) = parent_id {
        conn.query_row(
            "SELECT id FROM sections WHERE file_id = ?1 AND parent_id = ?2 AND order_index = ?3",
            params![file_id, parent_id, order_index + 1],
            |r| r.get(0),
        )
        .optional()?
    } else {
        conn.query_row(
            "SELECT id FROM sections WHERE file_id = ?1 AND parent_id IS NULL AND order_index = ?2",
            params![file_id, order_index + 1],
            |r| r.get(0),
        )
        .optional()?
    };

    Ok(next)
}

/// Deletes `path` and its sections/FTS rows, verifying no orphan FTS rows
/// remain afterwards (invariant I6) and repairing any that do.
pub fn delete_file(conn: &Connection, path: &str) -> Result<()> {
    let file_id: Option<i64> = conn
        .query_row("SELECT id FROM files WHERE path = ?1", params![path], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(file_id) = file_id else {
        return Err(Error::NotFound(format!("file: {path}")));
    };

    conn.execute(
        "DELETE FROM sections_fts WHERE section_id IN (SELECT id FROM sections WHERE file_id = ?1)",
        params![file_id],
    )?;
    conn.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;

    let orphans: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sections_fts WHERE section_id NOT IN (SELECT id FROM sections)",
        [],
        |r| r.get(0),
    )?;
    if orphans > 0 {
        warn!(orphans, "repairing orphaned sections_fts rows after delete_file");
        conn.execute(
            "DELETE FROM sections_fts WHERE section_id NOT IN (SELECT id FROM sections)",
            [],
        )?;
    }

    Ok(())
}

/// Lists every stored file, most recently updated first (the
/// `list-library` CLI command), optionally restricted to one `kind`.
pub fn list_files(conn: &Connection, kind_filter: Option<FileKind>) -> Result<Vec<File>> {
    let files = if let Some(kind) = kind_filter {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE kind = ?1 ORDER BY updated_at DESC"
        ))?;
        let mapped = stmt
            .query_map(params![kind_to_str(kind)], row_to_file)?
            .collect::<std::result::Result<_, _>>()?;
        mapped
    } else {
        let mut stmt =
            conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY updated_at DESC"))?;
        let mapped = stmt
            .query_map([], row_to_file)?
            .collect::<std::result::Result<_, _>>()?;
        mapped
    };
    Ok(files)
}

/// Builds the `tree` CLI command's hierarchical view: each root section
/// (no `parent_id`) becomes a [`TocEntry`], with its descendants nested by
/// `order_index`.
#[must_use]
pub fn build_toc(sections: &[Section]) -> Vec<TocEntry> {
    fn children_of(sections: &[Section], parent_id: i64) -> Vec<TocEntry> {
        sections
            .iter()
            .filter(|s| s.parent_id == Some(parent_id))
            .map(|s| TocEntry {
                section_id: s.id,
                title: s.title.clone(),
                level: s.kind.level(),
                children: children_of(sections, s.id),
            })
            .collect()
    }

    sections
        .iter()
        .filter(|s| s.parent_id.is_none())
        .map(|s| TocEntry {
            section_id: s.id,
            title: s.title.clone(),
            level: s.kind.level(),
            children: children_of(sections, s.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use crate::types::ParsedSection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample_doc() -> ParsedDocument {
        ParsedDocument {
            frontmatter_raw: String::new(),
            sections: vec![
                ParsedSection {
                    parent: None,
                    order_index: 0,
                    kind: SectionKind::Heading(1),
                    title: "A".to_string(),
                    content: "body1\n".to_string(),
                    closing_tag_prefix: String::new(),
                    line_start: 1,
                    line_end: 2,
                },
                ParsedSection {
                    parent: Some(0),
                    order_index: 0,
                    kind: SectionKind::Heading(2),
                    title: "B".to_string(),
                    content: "body2\n".to_string(),
                    closing_tag_prefix: String::new(),
                    line_start: 3,
                    line_end: 4,
                },
            ],
            diagnostics: vec![],
        }
    }

    #[test]
    fn store_and_get_round_trip() {
        let conn = setup();
        let doc = sample_doc();
        store_file(
            &conn,
            "f.md",
            FileKind::Skill,
            FileFormat::MarkdownHeadings,
            "hash1",
            &doc,
        )
        .unwrap();

        let (file, sections) = get_file(&conn, "f.md").unwrap();
        assert_eq!(file.content_hash, "hash1");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "A");
        assert_eq!(sections[1].parent_id, Some(sections[0].id));
    }

    #[test]
    fn restore_replaces_all_sections() {
        let conn = setup();
        store_file(
            &conn,
            "f.md",
            FileKind::Skill,
            FileFormat::MarkdownHeadings,
            "hash1",
            &sample_doc(),
        )
        .unwrap();

        let mut doc2 = sample_doc();
        doc2.sections.truncate(1);
        store_file(
            &conn,
            "f.md",
            FileKind::Skill,
            FileFormat::MarkdownHeadings,
            "hash2",
            &doc2,
        )
        .unwrap();

        let (file, sections) = get_file(&conn, "f.md").unwrap();
        assert_eq!(file.content_hash, "hash2");
        assert_eq!(sections.len(), 1);

        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sections_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 1);
    }

    #[test]
    fn delete_file_removes_everything() {
        let conn = setup();
        store_file(
            &conn,
            "f.md",
            FileKind::Skill,
            FileFormat::MarkdownHeadings,
            "hash1",
            &sample_doc(),
        )
        .unwrap();
        delete_file(&conn, "f.md").unwrap();

        assert!(get_file(&conn, "f.md").is_err());
        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sections_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 0);
    }

    #[test]
    fn next_section_progressive_disclosure() {
        let conn = setup();
        store_file(
            &conn,
            "f.md",
            FileKind::Skill,
            FileFormat::MarkdownHeadings,
            "hash1",
            &sample_doc(),
        )
        .unwrap();
        let (_file, sections) = get_file(&conn, "f.md").unwrap();
        let a_id = sections[0].id;
        let b_id = sections[1].id;

        let first_child = get_next_section(&conn, a_id, true).unwrap();
        assert_eq!(first_child, Some(b_id));

        let next_sibling = get_next_section(&conn, a_id, false).unwrap();
        assert_eq!(next_sibling, None);
    }
}
