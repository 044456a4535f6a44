//! The Embedding Adapter (`spec.md` §4.12): a provider-agnostic seam plus
//! the batching/backoff machinery that drives it.
//!
//! The wire format of any real embedding provider is an external
//! collaborator (`SPEC_FULL.md` §1); what lives here is the contract
//! ([`Embedder`]) and the generic batch/worker-pool/backoff logic that
//! works with any implementation of it, plus a local, network-free
//! [`tfidf::TfIdfEmbedder`] fallback for tests and offline use.

pub mod store;
pub mod tfidf;

pub use tfidf::TfIdfEmbedder;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Per-call caps from `spec.md` §4.12.
pub const MAX_BATCH_TEXTS: usize = 2048;
pub const MAX_BATCH_TOKENS: usize = 8000;
/// Default bounded worker pool size (`spec.md` §5).
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Generates embeddings for text. Implementations may call a remote API or
/// compute locally; either way `embed_batch`'s default just loops `embed`,
/// so a provider only needs to override it when the wire format supports
/// true batch calls.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Cosine similarity in `[-1, 1]`; `0.0` for mismatched or zero-length
/// vectors (treated as "no signal" rather than an error).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Rough token estimate (`spec.md` §4.12: tokens ≈ bytes / 4).
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Groups `texts`' indices into batches no larger than `MAX_BATCH_TEXTS`
/// items or `MAX_BATCH_TOKENS` estimated tokens.
fn token_aware_batches(texts: &[String]) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;

    for (idx, text) in texts.iter().enumerate() {
        let tokens = estimate_tokens(text);
        let would_overflow = !current.is_empty()
            && (current.len() >= MAX_BATCH_TEXTS || current_tokens + tokens > MAX_BATCH_TOKENS);
        if would_overflow {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(idx);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Configuration for [`batch_generate_parallel`]'s retry/concurrency
/// behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Generates embeddings for `texts` in token-aware batches, sequentially.
/// A batch that fails after retries contributes `None` for each of its
/// texts rather than aborting the whole call (`spec.md` §4.12's partial
/// result guarantee).
pub fn batch_generate(embedder: &dyn Embedder, texts: &[String]) -> Vec<Option<Vec<f32>>> {
    let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    for batch in token_aware_batches(texts) {
        let refs: Vec<&str> = batch.iter().map(|&i| texts[i].as_str()).collect();
        if let Ok(embeddings) = embedder.embed_batch(&refs) {
            for (pos, idx) in batch.iter().enumerate() {
                if let Some(embedding) = embeddings.get(pos) {
                    results[*idx] = Some(embedding.clone());
                }
            }
        }
    }
    results
}

/// Generates embeddings for `texts` via up to `config.max_workers`
/// concurrent batch calls, retrying a failing batch with exponential
/// backoff up to `config.max_retries` times before giving up on it and
/// recording `None` for its texts. `progress` is invoked with
/// `(completed_batches, total_batches)` after each batch finishes
/// (successfully or not).
pub async fn batch_generate_parallel<F>(
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
    config: RetryConfig,
    progress: F,
) -> Result<Vec<Option<Vec<f32>>>>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    let batches = token_aware_batches(&texts);
    let total = batches.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
    let texts = Arc::new(texts);
    let progress = Arc::new(progress);
    let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(batches.len());
    for batch in batches {
        let embedder = embedder.clone();
        let texts = texts.clone();
        let semaphore = semaphore.clone();
        let progress = progress.clone();
        let completed = completed.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();

            let mut attempt = 0u32;
            let outcome = loop {
                let refs: Vec<&str> = batch_texts.iter().map(String::as_str).collect();
                match embedder.embed_batch(&refs) {
                    Ok(embeddings) => break Some(embeddings),
                    Err(e) if attempt < config.max_retries && e.is_recoverable() => {
                        attempt += 1;
                        tokio::time::sleep(config.base_delay * 2u32.pow(attempt - 1)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, batch_size = batch.len(), "embedding batch failed");
                        break None;
                    }
                }
            };

            let n = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            progress(n, total);
            (batch, outcome)
        }));
    }

    let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    for handle in handles {
        let (batch, outcome) = handle.await.map_err(Error::Join)?;
        if let Some(embeddings) = outcome {
            for (pos, idx) in batch.iter().enumerate() {
                if let Some(embedding) = embeddings.get(pos) {
                    results[*idx] = Some(embedding.clone());
                }
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_matches_expected_extremes() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn token_aware_batches_respect_text_cap() {
        let texts: Vec<String> = (0..MAX_BATCH_TEXTS + 10).map(|i| i.to_string()).collect();
        let batches = token_aware_batches(&texts);
        assert!(batches.iter().all(|b| b.len() <= MAX_BATCH_TEXTS));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), texts.len());
    }

    #[test]
    fn token_aware_batches_respect_token_cap() {
        let long = "x".repeat(MAX_BATCH_TOKENS * 4);
        let texts = vec![long.clone(), long.clone(), "short".to_string()];
        let batches = token_aware_batches(&texts);
        assert_eq!(batches.len(), 3, "each oversized text gets its own batch, plus the short one");
    }

    #[tokio::test]
    async fn batch_generate_parallel_returns_embeddings_in_order() {
        let embedder: Arc<dyn Embedder> = Arc::new(TfIdfEmbedder::new(16));
        let texts: Vec<String> = vec!["alpha".into(), "beta".into(), "gamma".into()];
        let results = batch_generate_parallel(embedder, texts, RetryConfig::default(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Option::is_some));
    }

    struct FlakyEmbedder {
        calls: std::sync::atomic::AtomicU32,
    }

    impl Embedder for FlakyEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            unreachable!("embed_batch is overridden")
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Err(Error::RemoteFailure("rate limited".to_string()))
            } else {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn batch_generate_parallel_retries_recoverable_failures() {
        let embedder: Arc<dyn Embedder> = Arc::new(FlakyEmbedder {
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let texts = vec!["one".to_string()];
        let results = batch_generate_parallel(
            embedder,
            texts,
            RetryConfig {
                max_workers: 1,
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            },
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(results, vec![Some(vec![1.0, 0.0])]);
    }

    struct AlwaysFailEmbedder;

    impl Embedder for AlwaysFailEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::RemoteFailure("down".to_string()))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "always-fail"
        }
    }

    #[tokio::test]
    async fn exhausted_retries_yield_none_sentinel_not_error() {
        let embedder: Arc<dyn Embedder> = Arc::new(AlwaysFailEmbedder);
        let texts = vec!["one".to_string(), "two".to_string()];
        let results = batch_generate_parallel(
            embedder,
            texts,
            RetryConfig {
                max_workers: 2,
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(results, vec![None, None]);
    }
}
