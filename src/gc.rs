// Garbage collection planning
//
// Victim selection is pure: given every record ordered oldest-used first
// and the current total, take victims until the projected remaining
// total fits the budget — and not one asset more. Execution (file and
// record deletion) lives with the repository, which owns the store and
// metadata handles.

use serde::Serialize;

use crate::model::AssetRecord;

/// Outcome of a garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Select eviction victims from `assets` (must be ordered by ascending
/// `last_used_at`) until the projected total is at or under `budget_bytes`.
pub(crate) fn plan_evictions(
    assets: &[AssetRecord],
    total_bytes: u64,
    budget_bytes: u64,
) -> Vec<AssetRecord> {
    if total_bytes <= budget_bytes {
        return Vec::new();
    }

    let mut excess = total_bytes - budget_bytes;
    let mut victims = Vec::new();

    for asset in assets {
        if excess == 0 {
            break;
        }
        let size = asset.bytes.max(0) as u64;
        victims.push(asset.clone());
        excess = excess.saturating_sub(size);
    }

    victims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetKind;
    use chrono::{Duration, Utc};

    fn record(id: &str, bytes: i64, age_hours: i64) -> AssetRecord {
        let ts = Utc::now() - Duration::hours(age_hours);
        AssetRecord {
            id: id.to_string(),
            kind: AssetKind::Image,
            sha256: id.to_string(),
            original_sha256: id.to_string(),
            filename: format!("{}.jpg", id),
            ext: "jpg".to_string(),
            bytes,
            width: 100,
            height: 100,
            video: None,
            provider: None,
            source_url: None,
            path: format!("/lib/media/{}.jpg", id),
            thumb_path: None,
            embedding: Vec::new(),
            tags: Vec::new(),
            created_at: ts,
            last_used_at: ts,
        }
    }

    #[test]
    fn test_under_budget_plans_nothing() {
        let assets = vec![record("a", 100, 10)];
        assert!(plan_evictions(&assets, 100, 100).is_empty());
        assert!(plan_evictions(&assets, 100, 500).is_empty());
    }

    #[test]
    fn test_evicts_oldest_first_and_stops_at_budget() {
        // Ordered oldest-used first, as the metadata query returns them
        let assets = vec![record("old", 400, 48), record("new", 400, 1)];

        // Total 800, budget 500: removing "old" (400) is enough
        let victims = plan_evictions(&assets, 800, 500);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].id, "old");
    }

    #[test]
    fn test_takes_multiple_victims_when_needed() {
        let assets = vec![
            record("a", 300, 72),
            record("b", 300, 48),
            record("c", 300, 1),
        ];

        // Total 900, budget 350: need to free 550, so a and b go
        let victims = plan_evictions(&assets, 900, 350);
        assert_eq!(
            victims.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
