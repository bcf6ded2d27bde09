//! Cosine similarity ranking.

use rayon::prelude::*;

/// A scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<K> {
    pub id: K,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Compute L2 norm of a vector.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_with_norm(query: &[f32], query_norm: f32, target: &[f32]) -> Option<f32> {
    if target.len() != query.len() {
        return None;
    }

    let target_norm = l2_norm(target);
    if !target_norm.is_finite() || target_norm == 0.0 {
        return None;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    let score = dot_product / (query_norm * target_norm);

    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}

/// Cosine similarity of two vectors.
///
/// `None` when the score is undefined: different or zero lengths, a zero-norm
/// side, or non-finite components.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() {
        return None;
    }

    let a_norm = l2_norm(a);
    if !a_norm.is_finite() || a_norm == 0.0 {
        return None;
    }

    cosine_with_norm(a, a_norm, b)
}

/// Rank candidates by cosine similarity to `query`, highest first.
///
/// Candidates whose score is undefined (dimension mismatch, zero norm) are
/// excluded rather than scored. Equal scores keep their input order.
pub fn rank<'a, K, I>(query: &[f32], candidates: I) -> Vec<Ranked<K>>
where
    K: Send,
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    let candidates = candidates.into_iter().collect::<Vec<_>>();
    let total = candidates.len();

    let query_norm = l2_norm(query);
    if query.is_empty() || !query_norm.is_finite() || query_norm == 0.0 {
        log::warn!("query embedding has zero norm, nothing can match");
        return vec![];
    }

    // collect() keeps input order, which the stable sort below relies on
    let mut ranked = candidates
        .into_par_iter()
        .filter_map(|(id, embedding)| {
            cosine_with_norm(query, query_norm, embedding).map(|score| Ranked { id, score })
        })
        .collect::<Vec<_>>();

    if ranked.len() < total {
        log::debug!(
            "{} of {total} candidates excluded from ranking (dimension mismatch or zero norm)",
            total - ranked.len()
        );
    }

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    ranked
}
