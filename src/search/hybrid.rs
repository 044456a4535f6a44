//! Hybrid keyword + vector search (`spec.md` §4.9).

use rusqlite::Connection;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::search::bm25::{self, Bm25Match};

/// Which signal(s) to use when ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    KeywordOnly,
    SemanticOnly,
    Hybrid,
}

/// A ranked search hit combining text and/or vector evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub section_id: i64,
    pub title: String,
    pub level: u8,
    pub score: f32,
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn vector_candidates(
    conn: &Connection,
    model_name: &str,
    query_vector: &[f32],
    file_id: Option<i64>,
    limit: usize,
) -> Result<Vec<(i64, String, u8, f32)>> {
    let mut sql = String::from(
        "SELECT se.section_id, s.title, s.level, se.embedding
         FROM section_embeddings se
         JOIN sections s ON s.id = se.section_id
         WHERE se.model_name = ?1",
    );
    if file_id.is_some() {
        sql.push_str(" AND s.file_id = ?2");
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(i64, String, i64, Vec<u8>)> = if let Some(fid) = file_id {
        stmt.query_map(rusqlite::params![model_name, fid], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?
    } else {
        stmt.query_map(rusqlite::params![model_name], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?
    };

    let mut scored: Vec<(i64, String, u8, f32)> = rows
        .into_iter()
        .map(|(id, title, level, blob)| {
            let vec = decode_embedding(&blob);
            let sim = cosine_similarity(query_vector, &vec);
            (id, title, level as u8, sim)
        })
        .collect();

    scored.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

/// Runs a search under the given strategy. `query_vector`/`model_name` are
/// ignored under `KeywordOnly`; when no embeddings have been generated for
/// `model_name`, `SemanticOnly`/`Hybrid` degrade silently to text-only
/// results rather than erroring.
#[allow(clippy::too_many_arguments)]
pub fn search(
    conn: &Connection,
    strategy: SearchStrategy,
    query: &str,
    query_vector: Option<&[f32]>,
    model_name: &str,
    vector_weight: f32,
    file_id: Option<i64>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let pool = limit.saturating_mul(2).max(1);

    let text_matches: Vec<Bm25Match> = if strategy == SearchStrategy::SemanticOnly {
        Vec::new()
    } else {
        bm25::search(conn, query, file_id, pool as i64)?
    };

    let vector_matches = if strategy == SearchStrategy::KeywordOnly {
        Vec::new()
    } else {
        match query_vector {
            Some(qv) => vector_candidates(conn, model_name, qv, file_id, pool)?,
            None => Vec::new(),
        }
    };

    if strategy != SearchStrategy::KeywordOnly && vector_matches.is_empty() {
        // No embeddings available: degrade to pure text ranking.
        let mut hits: Vec<SearchHit> = text_matches
            .into_iter()
            .map(|m| SearchHit {
                section_id: m.section_id,
                title: m.title,
                level: m.level,
                score: m.score,
            })
            .collect();
        hits.truncate(limit);
        return Ok(hits);
    }

    if strategy == SearchStrategy::SemanticOnly {
        let mut hits: Vec<SearchHit> = vector_matches
            .into_iter()
            .map(|(section_id, title, level, score)| SearchHit {
                section_id,
                title,
                level,
                score,
            })
            .collect();
        hits.truncate(limit);
        return Ok(hits);
    }

    // Hybrid: union candidates from both sides, weight-combine scores.
    use std::collections::HashMap;
    let mut combined: HashMap<i64, SearchHit> = HashMap::new();

    for m in &text_matches {
        combined.insert(
            m.section_id,
            SearchHit {
                section_id: m.section_id,
                title: m.title.clone(),
                level: m.level,
                score: (1.0 - vector_weight) * m.score,
            },
        );
    }

    for (section_id, title, level, sim) in &vector_matches {
        combined
            .entry(*section_id)
            .and_modify(|hit| hit.score += vector_weight * sim)
            .or_insert(SearchHit {
                section_id: *section_id,
                title: title.clone(),
                level: *level,
                score: vector_weight * sim,
            });
    }

    let mut hits: Vec<SearchHit> = combined.into_values().collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn store_embedding(storage: &Storage, section_id: i64, model: &str, vec: &[f32]) {
        let bytes: Vec<u8> = vec.iter().flat_map(|f| f.to_le_bytes()).collect();
        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO section_embeddings (section_id, model_name, embedding, dimensions)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![section_id, model, bytes, vec.len() as i64],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn degrades_to_text_when_no_embeddings() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\npython handler\n").unwrap();

        let hits = storage
            .with_connection(|conn| {
                search(
                    conn,
                    SearchStrategy::Hybrid,
                    "python",
                    Some(&[1.0, 0.0]),
                    "test-model",
                    0.5,
                    None,
                    10,
                )
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn hybrid_combines_text_and_vector_signal() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\npython handler\n").unwrap();
        storage.store("b.md", "# B\nunrelated content\n").unwrap();
        let (file_a, sections_a) = storage.get_file("a.md").unwrap();
        let (file_b, sections_b) = storage.get_file("b.md").unwrap();
        let _ = (file_a, file_b);

        store_embedding(&storage, sections_a[0].id, "m", &[1.0, 0.0]);
        store_embedding(&storage, sections_b[0].id, "m", &[0.0, 1.0]);

        let hits = storage
            .with_connection(|conn| {
                search(
                    conn,
                    SearchStrategy::Hybrid,
                    "python",
                    Some(&[1.0, 0.0]),
                    "m",
                    0.5,
                    None,
                    10,
                )
            })
            .unwrap();

        assert_eq!(hits[0].section_id, sections_a[0].id);
    }

    #[test]
    fn keyword_only_ignores_vectors() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\npython handler\n").unwrap();
        let (_, sections) = storage.get_file("a.md").unwrap();
        store_embedding(&storage, sections[0].id, "m", &[1.0, 0.0]);

        let hits = storage
            .with_connection(|conn| {
                search(conn, SearchStrategy::KeywordOnly, "python", None, "m", 0.5, None, 10)
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
