//! Ranked BM25 text search over `sections_fts` (`spec.md` §4.8's
//! `search_sections_ranked`).

use rusqlite::Connection;

use crate::error::Result;

/// One ranked match: a section id and its text score, normalized to
/// `[0, 1]` (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Match {
    pub section_id: i64,
    pub title: String,
    pub level: u8,
    pub score: f32,
}

/// Preprocesses user text into the FTS5 query grammar (`spec.md` §4.8):
/// empty stays empty; text already using operators (`AND`, `OR`, `NEAR`, or
/// `"..."`) passes through; a single token passes through; otherwise split
/// on whitespace and OR each token as an exact-term match, biasing
/// multi-word queries toward recall.
#[must_use]
pub fn preprocess_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let upper = trimmed.to_ascii_uppercase();
    if trimmed.contains('"')
        || upper.contains(" AND ")
        || upper.contains(" OR ")
        || upper.contains(" NEAR ")
    {
        return trimmed.to_string();
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() <= 1 {
        return trimmed.to_string();
    }

    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Runs a BM25-ranked search over `sections_fts`, restricted to `file_id`
/// when given. Returns matches sorted by score descending, scores
/// normalized into `[0, 1]` by negating the FTS5 "smaller is better"
/// convention and dividing by the max positive score.
pub fn search(
    conn: &Connection,
    query: &str,
    file_id: Option<i64>,
    limit: i64,
) -> Result<Vec<Bm25Match>> {
    let fts_query = preprocess_query(query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT s.id, s.title, s.level, bm25(sections_fts) as raw_score
         FROM sections_fts
         JOIN sections s ON s.id = sections_fts.section_id
         WHERE sections_fts MATCH ?1",
    );
    if file_id.is_some() {
        sql.push_str(" AND s.file_id = ?2 ORDER BY raw_score LIMIT ?3");
    } else {
        sql.push_str(" ORDER BY raw_score LIMIT ?2");
    }

    let mut stmt = conn.prepare(&sql)?;
    let fetch_limit = limit.max(0) * 2 + 1;
    let rows: Vec<(i64, String, i64, f64)> = if let Some(fid) = file_id {
        stmt.query_map(rusqlite::params![fts_query, fid, fetch_limit], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?
    } else {
        stmt.query_map(rusqlite::params![fts_query, fetch_limit], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?
    };

    // FTS5's bm25() is "smaller is better"; negate so larger is better, then
    // rescale per query to [0, 1] by the max positive score.
    let negated: Vec<(i64, String, i64, f32)> = rows
        .into_iter()
        .map(|(id, title, level, raw)| (id, title, level, -(raw as f32)))
        .collect();
    let max_score = negated.iter().map(|(_, _, _, s)| *s).fold(0.0f32, f32::max);

    let mut matches: Vec<Bm25Match> = negated
        .into_iter()
        .map(|(section_id, title, level, score)| Bm25Match {
            section_id,
            title,
            level: level as u8,
            score: if max_score > 0.0 { score / max_score } else { 0.0 },
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(limit.max(0) as usize);
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn empty_query_returns_no_results_without_running() {
        assert_eq!(preprocess_query(""), "");
        assert_eq!(preprocess_query("   "), "");
    }

    #[test]
    fn multi_word_query_becomes_or_of_exact_terms() {
        assert_eq!(preprocess_query("git setup"), "\"git\" OR \"setup\"");
    }

    #[test]
    fn single_token_passes_through() {
        assert_eq!(preprocess_query("solo"), "solo");
    }

    #[test]
    fn operator_query_passes_through_unchanged() {
        assert_eq!(preprocess_query("git AND setup"), "git AND setup");
    }

    #[test]
    fn ranked_search_orders_by_relevance() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\npython handler error\n").unwrap();
        storage.store("b.md", "# B\npython reference\n").unwrap();
        storage.store("c.md", "# C\nshell script\n").unwrap();

        let results = storage
            .with_connection(|conn| search(conn, "\"python\" OR \"handler\"", None, 10))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_query_short_circuits() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\nbody\n").unwrap();
        let results = storage
            .with_connection(|conn| search(conn, "", None, 10))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn file_filter_restricts_results() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store("a.md", "# A\nshared term\n").unwrap();
        storage.store("b.md", "# B\nshared term\n").unwrap();
        let (file_a, _) = storage.get_file("a.md").unwrap();

        let results = storage
            .with_connection(|conn| search(conn, "shared", Some(file_a.id), 10))
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
