use std::time::Duration;

use chrono::NaiveDate;
use log::warn;
use metrics::counter;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cache::CacheBackend;
use crate::repo::{OrderRepo, Repo, RepoResult, TicketRepo};

/// Version counter key. Bumping it makes every cached snapshot (all days)
/// stale at once; snapshots are then lazily recomputed. The counter never
/// expires.
const VERSION_KEY: &str = "service:dashboard:version";

fn stats_key(version: i64, today: NaiveDate) -> String {
    format!("service:dashboard:stats:v{version}:{today}")
}

/// Operational KPI snapshot shown above the staff panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardCounts {
    pub waiting_tickets: i64,
    pub orders_new: i64,
    pub orders_in_progress: i64,
    pub orders_done_today: i64,
    pub unfinished: i64,
    pub open_tickets: i64,
    pub completed_last_7_days: i64,
    pub avg_repair_days: f64,
}

/// Bump the dashboard version counter. Invalidation never deletes snapshot
/// keys directly; an uninitialized or corrupted counter is reset to 1.
pub async fn invalidate_dashboard_cache(cache: &dyn CacheBackend) {
    if cache.add(VERSION_KEY, 1.into(), None).await {
        return;
    }
    if let Err(e) = cache.incr(VERSION_KEY).await {
        warn!("dashboard version incr failed, resetting: {e}");
        cache.set(VERSION_KEY, 1.into(), None).await;
    }
}

/// Average repair duration in days over the most recent completed orders,
/// rounded to one decimal. Spans with completion before creation are
/// excluded; no eligible orders yields exactly 0.
fn avg_repair_days(spans: &[(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)]) -> f64 {
    let durations: Vec<f64> = spans
        .iter()
        .filter(|(created, completed)| completed >= created)
        .map(|(created, completed)| (*completed - *created).num_seconds() as f64 / 86_400.0)
        .collect();
    if durations.is_empty() {
        return 0.0;
    }
    let avg = durations.iter().sum::<f64>() / durations.len() as f64;
    (avg * 10.0).round() / 10.0
}

/// Compute (or fetch from cache) the KPI snapshot for `today`.
///
/// The cache key embeds both the calendar day and the version counter, so a
/// single atomic increment invalidates every cached day at once while the TTL
/// bounds staleness even without invalidation.
pub async fn staff_dashboard_counts(
    repo: &dyn Repo,
    cache: &dyn CacheBackend,
    today: NaiveDate,
    ttl: Duration,
) -> RepoResult<DashboardCounts> {
    // Materialize the counter on first read; otherwise the first invalidation
    // would `add` version 1 itself and the stale snapshot would keep its key.
    cache.add(VERSION_KEY, 1.into(), None).await;
    let version = cache.get(VERSION_KEY).await.and_then(|v| v.as_i64()).unwrap_or(1);
    let key = stats_key(version, today);

    if let Some(hit) = cache.get(&key).await {
        if let Ok(counts) = serde_json::from_value::<DashboardCounts>(hit) {
            counter!("dashboard_cache_hits", 1);
            return Ok(counts);
        }
        // Unreadable snapshot: fall through and recompute.
        warn!("discarding undecodable dashboard snapshot under {key}");
    }
    counter!("dashboard_cache_misses", 1);

    let spans = repo.recent_completed_spans(200).await?;
    let counts = DashboardCounts {
        waiting_tickets: repo.count_tickets_waiting_on_staff().await?,
        orders_new: repo.count_unfinished_with_status(crate::models::OrderStatus::New).await?,
        orders_in_progress: repo
            .count_unfinished_with_status(crate::models::OrderStatus::InProgress)
            .await?,
        orders_done_today: repo.count_completed_on(today).await?,
        unfinished: repo.count_not_done().await?,
        open_tickets: repo.count_tickets_open().await?,
        completed_last_7_days: repo.count_completed_since(today - chrono::Duration::days(6)).await?,
        avg_repair_days: avg_repair_days(&spans),
    };

    match serde_json::to_value(&counts) {
        Ok(v) => cache.set(&key, v, Some(ttl)).await,
        Err(e) => warn!("failed to serialize dashboard snapshot: {e}"),
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn avg_over_zero_orders_is_exactly_zero() {
        assert_eq!(avg_repair_days(&[]), 0.0);
    }

    #[test]
    fn avg_rounds_to_one_decimal_and_skips_invalid_spans() {
        let now = Utc::now();
        let spans = vec![
            (now - ChronoDuration::days(3), now),          // 3.0 days
            (now - ChronoDuration::hours(24), now),        // 1.0 day
            (now, now - ChronoDuration::days(1)),          // negative span, excluded
        ];
        assert_eq!(avg_repair_days(&spans), 2.0);
    }
}
