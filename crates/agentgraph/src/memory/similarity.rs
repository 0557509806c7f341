//! Cosine similarity over `f32` embeddings — the same metric pgvector's
//! `<=>` operator computes when an index uses `vector_cosine_ops`, so the
//! in-memory store and the Postgres backend rank results identically.

/// Returns a value in `[-1.0, 1.0]`; `0.0` if either vector has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
