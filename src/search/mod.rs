//! The Query Layer (`spec.md` §4.9): progressive disclosure plus ranked
//! keyword and hybrid search, built on top of the Store.

pub mod bm25;
pub mod hybrid;

pub use bm25::Bm25Match;
pub use hybrid::{SearchHit, SearchStrategy};

use crate::error::Result;
use crate::storage::Storage;

/// Default vector weight when a caller doesn't specify one for hybrid
/// search (`spec.md` §4.9).
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.5;

/// Thin facade over [`Storage`] exposing progressive disclosure and search,
/// without callers needing to reach into `storage::queries` directly.
pub struct Query {
    storage: Storage,
}

impl Query {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Fetches one section by id.
    pub fn get_section(&self, id: i64) -> Result<crate::types::Section> {
        self.storage.get_section(id)
    }

    /// Progressive disclosure: `first_child` ? first child : next sibling.
    pub fn next(&self, id: i64, first_child: bool) -> Result<Option<i64>> {
        self.storage.get_next_section(id, first_child)
    }

    /// Ranked BM25 keyword search, optionally restricted to one file.
    pub fn search(&self, query: &str, file_id: Option<i64>, limit: i64) -> Result<Vec<Bm25Match>> {
        self.storage.with_connection(|conn| bm25::search(conn, query, file_id, limit))
    }

    /// Hybrid keyword + vector search; degrades to text-only when no
    /// embeddings exist for `model_name`.
    #[allow(clippy::too_many_arguments)]
    pub fn search_hybrid(
        &self,
        strategy: SearchStrategy,
        query: &str,
        query_vector: Option<&[f32]>,
        model_name: &str,
        vector_weight: f32,
        file_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.storage.with_connection(|conn| {
            hybrid::search(
                conn,
                strategy,
                query,
                query_vector,
                model_name,
                vector_weight,
                file_id,
                limit,
            )
        })
    }
}
