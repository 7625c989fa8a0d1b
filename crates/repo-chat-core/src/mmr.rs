//! Maximal marginal relevance selection.
//!
//! Picks `k` items from a candidate pool, one at a time, each time taking the
//! candidate that maximizes
//!
//! ```text
//! λ × sim(candidate, query) − (1 − λ) × max sim(candidate, selected)
//! ```
//!
//! The redundancy term is `0` while nothing has been selected yet. Ties go to
//! the candidate with higher query similarity, then to the earlier pool
//! position, so `λ = 1` is exactly top-k by similarity and every `λ` starts
//! from the most relevant candidate.

use crate::embedding::cosine_similarity;

/// Select up to `k` indices into `candidates`, in selection order.
///
/// `lambda` is clamped to `[0, 1]`. Returns fewer than `k` indices only when
/// the pool is exhausted.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    let lambda = lambda.clamp(0.0, 1.0);
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    // Highest similarity of each candidate to anything selected so far.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() {
                0.0
            } else {
                redundancy[idx]
            };
            let score = lambda * relevance[idx] - (1.0 - lambda) * penalty;
            let best_idx = remaining[best_pos];
            let better = score > best_score
                || (score == best_score && relevance[idx] > relevance[best_idx]);
            if better {
                best_pos = pos;
                best_score = score;
            }
        }

        let chosen = remaining.remove(best_pos);
        selected.push(chosen);

        for &idx in &remaining {
            let sim = cosine_similarity(candidates[idx], candidates[chosen]);
            if sim > redundancy[idx] {
                redundancy[idx] = sim;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],  // exact match
            vec![0.99, 0.1, 0.0], // near-duplicate of 0
            vec![0.6, 0.0, 0.8],  // relevant, different direction
            vec![0.0, 1.0, 0.0],  // irrelevant
        ]
    }

    fn refs(v: &[Vec<f32>]) -> Vec<&[f32]> {
        v.iter().map(|x| x.as_slice()).collect()
    }

    #[test]
    fn test_lambda_one_is_top_k_by_similarity() {
        let pool = pool();
        let query = [1.0, 0.0, 0.0];
        let picked = mmr_select(&query, &refs(&pool), 3, 1.0);
        assert_eq!(picked, vec![0, 1, 2]);
    }

    #[test]
    fn test_lambda_zero_maximizes_diversity() {
        let pool = pool();
        let query = [1.0, 0.0, 0.0];
        let picked = mmr_select(&query, &refs(&pool), 2, 0.0);
        // Starts from the most relevant, then takes whatever is least
        // similar to it regardless of relevance.
        assert_eq!(picked, vec![0, 3]);
    }

    #[test]
    fn test_balanced_lambda_skips_near_duplicate() {
        let pool = pool();
        let query = [1.0, 0.0, 0.2];
        assert_eq!(mmr_select(&query, &refs(&pool), 2, 1.0), vec![0, 1]);
        assert_eq!(mmr_select(&query, &refs(&pool), 2, 0.5), vec![0, 2]);
    }

    #[test]
    fn test_pool_smaller_than_k() {
        let pool = pool();
        let picked = mmr_select(&[1.0, 0.0, 0.0], &refs(&pool), 10, 0.5);
        assert_eq!(picked.len(), 4);
        let mut sorted = picked.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_pool_and_zero_k() {
        assert!(mmr_select(&[1.0], &[], 5, 0.5).is_empty());
        let pool = pool();
        assert!(mmr_select(&[1.0, 0.0, 0.0], &refs(&pool), 0, 0.5).is_empty());
    }

    #[test]
    fn test_lambda_is_clamped() {
        let pool = pool();
        let query = [1.0, 0.0, 0.0];
        assert_eq!(
            mmr_select(&query, &refs(&pool), 3, 7.0),
            mmr_select(&query, &refs(&pool), 3, 1.0)
        );
    }
}
