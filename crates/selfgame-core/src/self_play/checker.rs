//! CHECK stage: novelty as next-chunk prediction error.
//!
//! Content is cut into fixed-size token chunks. Each chunk's embedding is
//! compared with a prediction: the running mean of the chunks before it,
//! seeded with the previous round's mean embedding. The error is the
//! cosine distance mapped into 0..=1, and novelty is the mean error.

use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use futures::future::join_all;

use selfgame_collab::{call_with_retry, CallPolicy, CancelSignal, EmbeddingBackend};

use crate::domain::digest::seeded_unit;
use crate::domain::{ChunkStat, GameError, NoveltyReport, Result, Stage};
use crate::obs;
use crate::self_play::{absorb_failure, missing_collaborator};
use crate::text;

pub struct Checker {
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    calls: CallPolicy,
    cancel: CancelSignal,
    chunk_tokens: usize,
    seed: u64,
    strict: bool,
    /// Mean embedding of the previous round's content.
    previous_mean: Option<Vec<f32>>,
}

impl Checker {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        calls: CallPolicy,
        chunk_tokens: usize,
        seed: u64,
        strict: bool,
    ) -> Self {
        Self {
            embedder,
            calls,
            cancel: CancelSignal::never(),
            chunk_tokens: chunk_tokens.max(1),
            seed,
            strict,
            previous_mean: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn check(&mut self, round: u32, content: &str) -> Result<NoveltyReport> {
        let started = Instant::now();
        let chunks = chunk(content, self.chunk_tokens);

        let embedded = match &self.embedder {
            Some(embedder) => match self.embed_all(embedder.as_ref(), &chunks).await {
                Ok(vectors) => Some(vectors),
                Err(e) => {
                    absorb_failure(e, Stage::Check, round, self.strict)?;
                    None
                }
            },
            None => {
                missing_collaborator("embedder", Stage::Check, round, self.strict)?;
                None
            }
        };

        let measured = match embedded {
            Some(vectors) if vectors.is_empty() => Some(((0.0, Vec::new()), None)),
            Some(vectors) => {
                match prediction_errors(&chunks, &vectors, self.previous_mean.as_deref()) {
                    Some(report) => Some((report, mean_vector(&vectors))),
                    None if self.strict => {
                        return Err(GameError::MissingStage {
                            stage: Stage::Check,
                            round,
                            detail: "embedding dimensions disagree".to_string(),
                        });
                    }
                    None => {
                        obs::emit_fallback_used("embedder", "embedding dimensions disagree");
                        None
                    }
                }
            }
            None => None,
        };

        let (novelty_score, stats, simulated) = match measured {
            Some(((score, stats), mean)) => {
                if mean.is_some() {
                    self.previous_mean = mean;
                }
                (score, stats, false)
            }
            None => {
                let (score, stats) = simulated_novelty(self.seed, &chunks);
                (score, stats, true)
            }
        };

        Ok(NoveltyReport {
            novelty_score: novelty_score.clamp(0.0, 1.0),
            simulated,
            chunks: stats,
            duration: started.elapsed(),
        })
    }

    async fn embed_all(
        &self,
        embedder: &dyn EmbeddingBackend,
        chunks: &[Chunk],
    ) -> selfgame_collab::CollabResult<Vec<Vec<f32>>> {
        let outcomes = join_all(chunks.iter().map(|c| {
            let text = c.text.as_str();
            call_with_retry("embedder", &self.calls, &self.cancel, move |_| async move {
                let vector = embedder.embed(text).await?;
                if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
                    bail!("embedding is empty or not finite");
                }
                Ok(vector)
            })
        }))
        .await;
        outcomes.into_iter().collect()
    }
}

/// One chunk of content.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub token_count: usize,
    pub text: String,
}

/// Split into chunks of `size` tokens; the last chunk may be shorter.
pub fn chunk(content: &str, size: usize) -> Vec<Chunk> {
    let tokens = text::split_tokens(content);
    tokens
        .chunks(size.max(1))
        .enumerate()
        .map(|(index, part)| Chunk {
            index,
            token_count: part.len(),
            text: part.join(" "),
        })
        .collect()
}

/// `(1 − cos) / 2`; `None` for zero vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    let cos = (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0);
    Some((1.0 - cos) / 2.0)
}

fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|s| s / n).collect())
}

/// Per-chunk errors against the running-mean prediction. `None` when the
/// vectors disagree on dimension.
fn prediction_errors(
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    seed_mean: Option<&[f32]>,
) -> Option<(f64, Vec<ChunkStat>)> {
    let dims = vectors.first().map(Vec::len)?;
    if vectors.iter().any(|v| v.len() != dims) || seed_mean.is_some_and(|m| m.len() != dims) {
        return None;
    }

    let mut sum: Vec<f64> = vec![0.0; dims];
    let mut count = 0usize;
    if let Some(mean) = seed_mean {
        for (s, x) in sum.iter_mut().zip(mean) {
            *s += f64::from(*x);
        }
        count = 1;
    }

    let mut stats = Vec::with_capacity(chunks.len());
    let mut errors = Vec::new();
    for (chunk, vector) in chunks.iter().zip(vectors) {
        let error = if count > 0 {
            let prediction: Vec<f32> = sum.iter().map(|s| (s / count as f64) as f32).collect();
            cosine_distance(&prediction, vector)
        } else {
            None
        };
        if let Some(e) = error {
            errors.push(e);
        }
        stats.push(ChunkStat {
            index: chunk.index,
            token_count: chunk.token_count,
            prediction_error: error,
        });
        for (s, x) in sum.iter_mut().zip(vector) {
            *s += f64::from(*x);
        }
        count += 1;
    }

    let novelty = if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    };
    Some((novelty, stats))
}

/// Seeded per-chunk placeholder errors; novelty is their mean.
pub fn simulated_novelty(seed: u64, chunks: &[Chunk]) -> (f64, Vec<ChunkStat>) {
    let stats: Vec<ChunkStat> = chunks
        .iter()
        .map(|c| ChunkStat {
            index: c.index,
            token_count: c.token_count,
            prediction_error: Some(seeded_unit(
                seed,
                &[b"novelty", c.text.as_bytes(), &(c.index as u64).to_le_bytes()],
            )),
        })
        .collect();
    let errors: Vec<f64> = stats.iter().filter_map(|s| s.prediction_error).collect();
    let novelty = if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    };
    (novelty, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfgame_collab::fakes::{HashEmbedder, Scripted};

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_chunking_keeps_short_tail() {
        let chunks = chunk(&words(250), 100);
        let counts: Vec<_> = chunks.iter().map(|c| c.token_count).collect();
        assert_eq!(counts, vec![100, 100, 50]);
        assert!(chunk("", 100).is_empty());
    }

    #[test]
    fn test_cosine_distance_bounds() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 1.0]), Some(0.5));
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), None);
    }

    #[tokio::test]
    async fn test_simulated_novelty_is_reproducible() {
        let content = words(230);
        let mut a = Checker::new(None, CallPolicy::default(), 100, 42, false);
        let mut b = Checker::new(None, CallPolicy::default(), 100, 42, false);
        let ra = a.check(1, &content).await.unwrap();
        let rb = b.check(1, &content).await.unwrap();
        assert!(ra.simulated);
        assert_eq!(ra.novelty_score, rb.novelty_score);
        assert_eq!(ra.chunks.len(), 3);
        assert!((0.0..=1.0).contains(&ra.novelty_score));
    }

    #[tokio::test]
    async fn test_repeated_content_is_not_novel() {
        let mut checker = Checker::new(
            Some(Arc::new(HashEmbedder::default())),
            CallPolicy::default(),
            4,
            1,
            false,
        );
        let report = checker.check(1, "alpha beta gamma delta alpha beta gamma delta").await.unwrap();
        assert!(!report.simulated);
        assert_eq!(report.chunks[0].prediction_error, None);
        assert!(report.novelty_score.abs() < 1e-6);

        let next = checker.check(2, "alpha beta gamma delta").await.unwrap();
        assert_eq!(next.chunks[0].prediction_error.map(|e| e < 1e-6), Some(true));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_falls_back_to_simulated() {
        let embedder = Arc::new(Scripted::new(vec![
            selfgame_collab::fakes::ScriptStep::Respond(vec![1.0f32, 0.0]),
            selfgame_collab::fakes::ScriptStep::Respond(vec![1.0f32, 0.0, 0.0]),
        ]));
        let mut checker = Checker::new(Some(embedder), CallPolicy::default(), 1, 3, false);
        let report = checker.check(1, "one two").await.unwrap();
        assert!(report.simulated);
        assert_eq!(report.chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_single_chunk_without_history_scores_zero() {
        let mut checker = Checker::new(
            Some(Arc::new(HashEmbedder::default())),
            CallPolicy::default(),
            100,
            1,
            false,
        );
        let report = checker.check(1, "short answer").await.unwrap();
        assert!(!report.simulated);
        assert_eq!(report.novelty_score, 0.0);
    }
}
