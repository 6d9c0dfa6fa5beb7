//! Candidate ordering

use std::cmp::Ordering;

use super::AlternativeCandidate;

/// Rating descending (missing ratings last), then distance ascending
fn compare(a: &AlternativeCandidate, b: &AlternativeCandidate) -> Ordering {
    let by_rating = match (a.rating, b.rating) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rating.then_with(|| a.distance_km.total_cmp(&b.distance_km))
}

/// Sort candidates and keep the best `top_n`
///
/// The sort is stable, so equal keys keep provider order.
pub fn rank_candidates(mut candidates: Vec<AlternativeCandidate>, top_n: usize) -> Vec<AlternativeCandidate> {
    candidates.sort_by(compare);
    candidates.truncate(top_n);
    candidates
}
