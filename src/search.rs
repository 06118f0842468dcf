// Search ranking
//
// Exact tag overlap is cheap and precise, so it always runs first;
// embedding similarity only kicks in when overlap finds nothing at all.

use chrono::{DateTime, Utc};

use crate::constants::{DEFAULT_MAX_RESULTS, RECENCY_HALF_LIFE_HOURS};
use crate::model::AssetRecord;
use crate::semantic;

/// Per-query knobs for `search_images` / `search_videos`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_width: Option<i32>,
    pub min_height: Option<i32>,
    /// Video-only hard filter; ignored for image queries.
    pub min_duration_ms: Option<i64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            min_width: None,
            min_height: None,
            min_duration_ms: None,
        }
    }
}

/// Exponential decay on time since last use: 1.0 now, 0.5 after one
/// half-life.
fn recency_score(last_used_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - last_used_at).num_seconds().max(0) as f64 / 3600.0;
    0.5f64.powf(age_hours / RECENCY_HALF_LIFE_HOURS)
}

fn overlap_score(tags: &[String], query: &[String]) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let hits = query.iter().filter(|q| tags.contains(q)).count();
    hits as f64 / query.len() as f64
}

/// Order candidates by blended overlap/recency score, best first.
/// Ties go to the more recently used asset.
pub(crate) fn rank_overlap(
    candidates: Vec<AssetRecord>,
    query: &[String],
    recency_boost: f64,
    now: DateTime<Utc>,
) -> Vec<AssetRecord> {
    let boost = recency_boost.clamp(0.0, 1.0);
    let mut scored: Vec<(f64, AssetRecord)> = candidates
        .into_iter()
        .map(|record| {
            let score = (1.0 - boost) * overlap_score(&record.tags, query)
                + boost * recency_score(record.last_used_at, now);
            (score, record)
        })
        .collect();

    scored.sort_by(|(sa, ra), (sb, rb)| {
        sb.total_cmp(sa)
            .then_with(|| rb.last_used_at.cmp(&ra.last_used_at))
    });
    scored.into_iter().map(|(_, record)| record).collect()
}

/// Order candidates by cosine similarity against the query embedding,
/// dropping anything under `min_score`. Candidates without a stored
/// embedding never match.
pub(crate) fn rank_semantic(
    candidates: Vec<AssetRecord>,
    query_embedding: &[f32],
    min_score: f32,
) -> Vec<AssetRecord> {
    let mut scored: Vec<(f32, AssetRecord)> = candidates
        .into_iter()
        .filter_map(|record| {
            let score = semantic::cosine(query_embedding, &record.embedding);
            if score >= min_score {
                Some((score, record))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|(sa, ra), (sb, rb)| {
        sb.total_cmp(sa)
            .then_with(|| rb.last_used_at.cmp(&ra.last_used_at))
    });
    scored.into_iter().map(|(_, record)| record).collect()
}
