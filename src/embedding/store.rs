//! Persists embedding results into `section_embeddings`/`embedding_metadata`.

use rusqlite::{params, Connection};

use crate::error::Result;

/// Records a successful embedding for `section_id` under `model_name`.
pub fn store_embedding(
    conn: &Connection,
    section_id: i64,
    model_name: &str,
    embedding: &[f32],
) -> Result<()> {
    let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
    conn.execute(
        "INSERT OR REPLACE INTO section_embeddings (section_id, model_name, embedding, dimensions)
         VALUES (?1, ?2, ?3, ?4)",
        params![section_id, model_name, bytes, embedding.len() as i64],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO embedding_metadata (section_id, model_name, status, error, updated_at)
         VALUES (?1, ?2, 'complete', NULL, CURRENT_TIMESTAMP)",
        params![section_id, model_name],
    )?;
    Ok(())
}

/// Records that embedding generation failed for `section_id`, so it can be
/// retried later without silently looking "pending forever".
pub fn store_failure(
    conn: &Connection,
    section_id: i64,
    model_name: &str,
    error: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO embedding_metadata (section_id, model_name, status, error, updated_at)
         VALUES (?1, ?2, 'failed', ?3, CURRENT_TIMESTAMP)",
        params![section_id, model_name, error],
    )?;
    Ok(())
}

/// Fetches a stored embedding, if one exists for `section_id`/`model_name`.
pub fn get_embedding(conn: &Connection, section_id: i64, model_name: &str) -> Result<Option<Vec<f32>>> {
    let row: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM section_embeddings WHERE section_id = ?1 AND model_name = ?2",
            params![section_id, model_name],
            |r| r.get(0),
        )
        .ok();
    Ok(row.map(|bytes| {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }))
}
