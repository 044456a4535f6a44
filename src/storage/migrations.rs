//! Versioned schema migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Runs every migration not yet applied to `conn`, in order.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Initial schema (v1): files, sections, the `sections_fts` mirror kept in
/// sync by triggers, and the checkouts log.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            format TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            frontmatter_raw TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            parent_id INTEGER,
            order_index INTEGER NOT NULL,
            kind TEXT NOT NULL,
            level INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            closing_tag_prefix TEXT NOT NULL DEFAULT '',
            line_start INTEGER NOT NULL DEFAULT 0,
            line_end INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES sections(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sections_file_parent_order
            ON sections(file_id, parent_id, order_index);
        CREATE INDEX IF NOT EXISTS idx_sections_file_parent
            ON sections(file_id, parent_id);

        -- A standalone (non-external-content) FTS5 table: `section_id` is a
        -- plain unindexed column rather than the FTS rowid, so it can be
        -- kept in sync by an explicit `sync_fts` routine (see queries.rs)
        -- instead of a trigger per insert/update/delete path.
        CREATE VIRTUAL TABLE IF NOT EXISTS sections_fts USING fts5(
            title,
            content,
            section_id UNINDEXED,
            tokenize='porter unicode61'
        );

        CREATE TABLE IF NOT EXISTS checkouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            target_path TEXT NOT NULL,
            deployed_paths TEXT NOT NULL DEFAULT '[]',
            user_id TEXT,
            status TEXT NOT NULL DEFAULT 'deployed',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            checked_in_at TEXT,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_checkouts_file ON checkouts(file_id);
        CREATE INDEX IF NOT EXISTS idx_checkouts_status ON checkouts(status);
        CREATE INDEX IF NOT EXISTS idx_checkouts_target ON checkouts(target_path);

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Embedding side tables (v2): optional, additive — a store with no
/// embeddings configured simply never populates these.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS section_embeddings (
            section_id INTEGER NOT NULL,
            model_name TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dimensions INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (section_id, model_name),
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS embedding_metadata (
            section_id INTEGER NOT NULL,
            model_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            error TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (section_id, model_name),
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_embedding_metadata_status
            ON embedding_metadata(status);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn sections_fts_table_accepts_explicit_rows() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO files (path, kind, format, content_hash) VALUES ('p', 'skill', 'markdown_headings', 'h')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sections (file_id, parent_id, order_index, kind, level, title, content)
             VALUES (1, NULL, 0, 'heading', 1, 'A', 'hello world')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sections_fts(title, content, section_id) VALUES ('A', 'hello world', 1)",
            [],
        )
        .unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sections_fts WHERE sections_fts MATCH 'hello'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        conn.execute("DELETE FROM sections_fts WHERE section_id = 1", [])
            .unwrap();
        conn.execute("DELETE FROM sections WHERE id = 1", []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sections_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
