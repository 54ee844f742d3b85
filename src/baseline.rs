// Baseline module - temporal sampling and week-over-week comparison
//
// This module implements the algorithmic core:
// 1. fetch_window: one history query over a symmetric time window
// 2. closest_sample: nearest-to-target selection, bounded by a sentinel
// 3. compare_weeks: current sample vs. the mean of closest samples at the
//    same time-of-day over N prior weeks
//
// Anchors for the historical walk are pure data and computed up front; the
// corresponding fetches run concurrently with bounded, order-preserving
// parallelism. Missing weeks shrink the averaging set, never fill in zeros.

use futures_util::{stream, StreamExt};
use tracing::{debug, warn};

use crate::api::{ApiError, HistorySample, ItemRecord, ZabbixApi};

/// Seconds in one week: the step of the historical walk
pub const ONE_WEEK_SECS: i64 = 7 * 24 * 3600;

/// Closest-match distance sentinel. A candidate must beat this to be
/// selected at all, so a sample a year or more away from the target is
/// treated as unmatched even if it is nominally the closest available.
pub const UNMATCHED_DISTANCE_SECS: i64 = 365 * 24 * 3600;

/// Result of one week-over-week comparison
///
/// `deviation` is NaN when no current sample (or no parseable current value)
/// was found; callers check before emitting output. `clock` is the current
/// sample's timestamp, or the query instant when no sample existed.
#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    pub deviation: f64,
    pub clock: i64,
    /// Number of historical samples that contributed to the mean
    pub history_count: usize,
}

impl Comparison {
    fn unmatched(clock: i64) -> Self {
        Comparison {
            deviation: f64::NAN,
            clock,
            history_count: 0,
        }
    }
}

/// Fetches candidate samples in `[instant - half_width, instant + half_width]`
///
/// An item with no samples in range yields an empty vec; transport and
/// protocol failures propagate as errors, keeping "no data" and "query
/// failed" distinguishable for the caller.
pub async fn fetch_window(
    api: &dyn ZabbixApi,
    item: &ItemRecord,
    instant: i64,
    half_width: i64,
) -> Result<Vec<HistorySample>, ApiError> {
    api.history(
        &item.item_id,
        item.value_type,
        instant - half_width,
        instant + half_width,
    )
    .await
}

/// Picks the sample closest to the target instant
///
/// Scans in order, keeping the first sample at any given distance: a later
/// candidate replaces the current best only by strictly improving on it.
/// Returns None when no candidate beats the unmatched sentinel.
pub fn closest_sample(target: i64, samples: &[HistorySample]) -> Option<&HistorySample> {
    let mut best: Option<&HistorySample> = None;
    let mut best_distance = UNMATCHED_DISTANCE_SECS;

    for sample in samples {
        let distance = (target - sample.clock).abs();
        if distance < best_distance {
            best_distance = distance;
            best = Some(sample);
        }
    }

    best
}

/// Arithmetic mean over exactly the values present
///
/// An empty list yields NaN, which propagates through the deviation rather
/// than turning into a divide-by-zero or a fabricated zero baseline.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Parses a sample's decimal string value, degrading failures to "missing"
fn numeric_value(sample: &HistorySample) -> Option<f64> {
    match sample.value.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                "Unparseable sample value '{}' at clock {}, treating as missing",
                sample.value, sample.clock
            );
            None
        }
    }
}

/// Computes the week-over-week deviation for one item
///
/// # Arguments
/// * `api` - Query capability
/// * `item` - The discovered item to compare
/// * `weeks` - Number of prior weeks to average over
/// * `half_width` - Half of the search window, in seconds
/// * `now` - Query instant (epoch seconds) for the current sample
/// * `parallelism` - Concurrent historical fetches in flight at once
///
/// # Procedure
/// 1. Select the closest-to-now sample in a window around `now`; if none,
///    the result is `(NaN, now)` and the caller decides what to do.
/// 2. Anchor the walk to the current sample's exact timestamp, so lookups
///    follow the item's real cadence instead of wall-clock drift.
/// 3. For week i, the anchor is `current.clock - i * ONE_WEEK_SECS`; fetch a
///    window around each anchor and keep the closest parseable match.
/// 4. Deviation is the current value minus the mean of the matches found.
pub async fn compare_weeks(
    api: &dyn ZabbixApi,
    item: &ItemRecord,
    weeks: u32,
    half_width: i64,
    now: i64,
    parallelism: usize,
) -> Comparison {
    let samples = match fetch_window(api, item, now, half_width).await {
        Ok(samples) => samples,
        Err(e) => {
            warn!("Current-sample fetch failed for item {}: {e}", item.item_id);
            return Comparison::unmatched(now);
        }
    };

    let current = match closest_sample(now, &samples) {
        Some(sample) => sample.clone(),
        None => {
            warn!(
                "No current sample for item {} in window [{}, {}]",
                item.item_id,
                now - half_width,
                now + half_width
            );
            return Comparison::unmatched(now);
        }
    };

    let current_value = match numeric_value(&current) {
        Some(value) => value,
        None => return Comparison::unmatched(now),
    };
    debug!(
        "Current value {} for item {} at clock {}.{:09}",
        current_value, item.item_id, current.clock, current.ns
    );

    // Anchors depend only on the current sample, not on fetched data, so the
    // per-week fetches are independent and safe to run concurrently.
    let anchors: Vec<i64> = (1..=i64::from(weeks))
        .map(|week| current.clock - week * ONE_WEEK_SECS)
        .collect();

    let matches: Vec<Option<f64>> = stream::iter(anchors)
        .map(|anchor| async move {
            let candidates = match fetch_window(api, item, anchor, half_width).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        "Historical fetch failed for item {} at anchor {}: {e}",
                        item.item_id, anchor
                    );
                    return None;
                }
            };
            match closest_sample(anchor, &candidates) {
                Some(sample) => {
                    let value = numeric_value(sample)?;
                    debug!(
                        "Historic value {} for item {} at clock {} (anchor {})",
                        value, item.item_id, sample.clock, anchor
                    );
                    Some(value)
                }
                None => {
                    debug!("No historic sample for item {} at anchor {}", item.item_id, anchor);
                    None
                }
            }
        })
        .buffered(parallelism.max(1))
        .collect()
        .await;

    let history: Vec<f64> = matches.into_iter().flatten().collect();
    let baseline = mean(&history);
    debug!(
        "Baseline {} over {} of {} week(s) for item {}",
        baseline,
        history.len(),
        weeks,
        item.item_id
    );

    Comparison {
        deviation: current_value - baseline,
        clock: current.clock,
        history_count: history.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{self, MockApi};

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_closest_picks_minimum_distance() {
        let samples = vec![
            mock::sample("1", "1", 900),
            mock::sample("1", "2", 1050),
            mock::sample("1", "3", 1200),
        ];
        let closest = closest_sample(1000, &samples).unwrap();
        assert_eq!(closest.clock, 1050);
    }

    #[test]
    fn test_closest_first_wins_on_exact_tie() {
        let samples = vec![mock::sample("1", "a", 900), mock::sample("1", "b", 1100)];
        let closest = closest_sample(1000, &samples).unwrap();
        assert_eq!(closest.clock, 900);
    }

    #[test]
    fn test_closest_unmatched_beyond_sentinel() {
        let samples = vec![mock::sample("1", "1", UNMATCHED_DISTANCE_SECS + 5000)];
        assert!(closest_sample(0, &samples).is_none());
    }

    #[test]
    fn test_closest_empty_input() {
        assert!(closest_sample(1000, &[]).is_none());
    }

    #[test]
    fn test_mean_skips_nothing_and_fills_nothing() {
        // one missing week: only the values present are averaged
        assert_eq!(mean(&[10.0, 20.0]), 15.0);
        assert!(mean(&[]).is_nan());
    }

    #[tokio::test]
    async fn test_compare_weeks_uses_fixed_anchor_steps() {
        let current_clock = NOW - 10;
        let mut api = MockApi::default();
        api.history = vec![
            mock::sample("23973", "5.0", current_clock),
            mock::sample("23973", "3.0", current_clock - ONE_WEEK_SECS + 5),
        ];
        let item = mock::item("23973", "10109", "system.cpu.load");

        let comparison = compare_weeks(&api, &item, 2, 1800, NOW, 2).await;

        // one of two weeks matched: mean over exactly that value
        assert_eq!(comparison.deviation, 5.0 - 3.0);
        assert_eq!(comparison.clock, current_clock);
        assert_eq!(comparison.history_count, 1);

        // every anchor steps back from the current sample's timestamp
        let calls = api.history_calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&("23973".to_string(), NOW - 1800, NOW + 1800)));
        for week in 1..=2i64 {
            let anchor = current_clock - week * ONE_WEEK_SECS;
            assert!(
                calls.contains(&("23973".to_string(), anchor - 1800, anchor + 1800)),
                "missing window around anchor {anchor}"
            );
        }
    }

    #[tokio::test]
    async fn test_compare_weeks_missing_current_yields_nan() {
        let api = MockApi::default();
        let item = mock::item("1", "10", "a.b");
        let comparison = compare_weeks(&api, &item, 3, 1800, NOW, 2).await;
        assert!(comparison.deviation.is_nan());
        assert_eq!(comparison.clock, NOW);
    }

    #[tokio::test]
    async fn test_compare_weeks_fetch_failure_is_nonfatal() {
        let mut api = MockApi::default();
        api.fail_history = true;
        let item = mock::item("1", "10", "a.b");
        let comparison = compare_weeks(&api, &item, 3, 1800, NOW, 2).await;
        assert!(comparison.deviation.is_nan());
    }

    #[tokio::test]
    async fn test_compare_weeks_unparseable_history_is_excluded() {
        let current_clock = NOW - 30;
        let mut api = MockApi::default();
        api.history = vec![
            mock::sample("7", "5.0", current_clock),
            mock::sample("7", "4.0", current_clock - ONE_WEEK_SECS),
            mock::sample("7", "garbage", current_clock - 2 * ONE_WEEK_SECS),
        ];
        let item = mock::item("7", "10", "net.if.in");

        let comparison = compare_weeks(&api, &item, 2, 1800, NOW, 2).await;
        assert_eq!(comparison.deviation, 1.0);
        assert_eq!(comparison.history_count, 1);
    }

    #[tokio::test]
    async fn test_compare_weeks_no_history_propagates_nan() {
        let current_clock = NOW - 5;
        let mut api = MockApi::default();
        api.history = vec![mock::sample("9", "2.5", current_clock)];
        let item = mock::item("9", "10", "db.connections");

        let comparison = compare_weeks(&api, &item, 4, 1800, NOW, 2).await;
        assert!(comparison.deviation.is_nan());
        assert_eq!(comparison.clock, current_clock);
        assert_eq!(comparison.history_count, 0);
    }
}
