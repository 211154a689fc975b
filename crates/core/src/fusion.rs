use crate::models::ScoredPoint;
use std::collections::HashMap;

/// Standard RRF constant.
pub const RRF_K: f64 = 60.0;

struct Fused {
    point: ScoredPoint,
    score: f64,
    first_seen: usize,
}

/// Reciprocal rank fusion over ranked lists of points keyed by id.
///
/// A point scores `1 / (k + rank)` (rank starting at 1) for every list it
/// appears in. The payload of the first occurrence is kept. Results are
/// ordered by fused score, ties by first appearance, and cut to `limit`.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredPoint>], k: f64, limit: usize) -> Vec<ScoredPoint> {
    let mut fused: HashMap<u64, Fused> = HashMap::new();
    let mut seen = 0usize;

    for list in lists {
        for (position, point) in list.iter().enumerate() {
            let contribution = 1.0 / (k + position as f64 + 1.0);
            let entry = fused.entry(point.id).or_insert_with(|| {
                seen += 1;
                Fused {
                    point: point.clone(),
                    score: 0.0,
                    first_seen: seen,
                }
            });
            entry.score += contribution;
        }
    }

    let mut ranked = fused.into_values().collect::<Vec<_>>();
    ranked.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then(left.first_seen.cmp(&right.first_seen))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|item| ScoredPoint {
            score: item.score,
            ..item.point
        })
        .collect()
}
