//! Embedder seam for the memory engine.
//!
//! Implementations wrap a real embeddings API or a deterministic local
//! fallback; the engine only needs fixed-size vectors for chunk text on
//! index and query text on search.

use async_trait::async_trait;

use crate::memory::MemoryError;

/// Produces fixed-size float vectors from text.
///
/// Implementations must be `Send + Sync`; the engine holds one behind
/// `Arc<dyn Embedder>` and calls it from async contexts.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each text into a vector of dimension [`Embedder::dimension`],
    /// one vector per input in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MemoryError>;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Label stored next to each vector so stale embeddings are
    /// distinguishable after a model switch.
    fn model(&self) -> &str;
}

/// Deterministic hash-based embedder: token hashes bucketed into a small
/// fixed-size vector, L2-normalized. No network and stable across runs,
/// so it serves as the offline fallback and the test embedder.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MemoryError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dimension];
                for token in text.split_whitespace() {
                    let token = token.to_lowercase();
                    let mut hash: u64 = 0xcbf29ce484222325;
                    for b in token.bytes() {
                        hash ^= b as u64;
                        hash = hash.wrapping_mul(0x100000001b3);
                    }
                    v[(hash % self.dimension as u64) as usize] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut v {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hash-v1"
    }
}
