// Pipeline module - drives one processing pass over the discovered items
//
// Consumes a frozen discovery result: per item group, dispatches on the
// configured algorithm, runs the comparison, and writes one ingestion line
// per item that produced a usable deviation.
//
// # Error Handling
// - An item with no current sample (or no usable data at all) is skipped
//   with a warning; the batch continues.
// - Only sink I/O failures abort the pass: if lines cannot be written,
//   continuing would silently discard every remaining result.

use tracing::{info, warn};

use crate::api::ZabbixApi;
use crate::baseline;
use crate::config::Algorithm;
use crate::discovery::Discovery;
use crate::output::{format_line, LineWriter, OutputError};

/// Concurrent historical fetches in flight per item
const DEFAULT_FETCH_PARALLELISM: usize = 4;

/// Counters for one processing pass
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    /// Items considered across all groups
    pub items: usize,
    /// Lines written
    pub emitted: usize,
    /// Items skipped for missing data
    pub skipped: usize,
}

/// Single-pass processor over a discovery result
pub struct Processor {
    /// Query instant for the current sample, epoch seconds
    now: i64,
    fetch_parallelism: usize,
}

impl Processor {
    pub fn new(now: i64) -> Self {
        Processor {
            now,
            fetch_parallelism: DEFAULT_FETCH_PARALLELISM,
        }
    }

    /// Runs the comparison for every discovered item and writes the lines
    ///
    /// # Arguments
    /// * `api` - Query capability
    /// * `discovery` - Frozen discovery result (catalogs fully populated)
    /// * `writer` - Open line sink
    ///
    /// # Returns
    /// * `Ok(RunStats)` - The pass completed, possibly with skipped items
    /// * `Err(OutputError)` - The sink failed; the pass is aborted
    pub async fn run(
        &self,
        api: &dyn ZabbixApi,
        discovery: &Discovery,
        writer: &mut LineWriter,
    ) -> Result<RunStats, OutputError> {
        let mut stats = RunStats::default();

        for group in &discovery.groups {
            let Algorithm::WeekOverWeek { weeks, window } = &group.config.algorithm;
            let half_width = *window / 2;

            for item in &group.items {
                stats.items += 1;

                let comparison = baseline::compare_weeks(
                    api,
                    item,
                    *weeks,
                    half_width,
                    self.now,
                    self.fetch_parallelism,
                )
                .await;

                if comparison.deviation.is_nan() {
                    warn!(
                        "Skipping item {} ({}): no usable samples",
                        item.item_id, item.key
                    );
                    stats.skipped += 1;
                    continue;
                }

                // Items found under all_hosts may reference hosts outside
                // the catalog; the raw id is still a valid sender name.
                let host_name = discovery
                    .hosts
                    .name_of(&item.host_id)
                    .unwrap_or(&item.host_id);

                info!(
                    "Deviation {:.6} for {}:{} over {} week(s)",
                    comparison.deviation, host_name, item.key, comparison.history_count
                );

                let line = format_line(
                    host_name,
                    &item.key,
                    &group.config.postfix,
                    comparison.clock,
                    comparison.deviation,
                );
                writer.write_line(&line)?;
                stats.emitted += 1;
            }
        }

        writer.flush()?;
        info!(
            "Pass complete: {} item(s), {} line(s) written, {} skipped",
            stats.items, stats.emitted, stats.skipped
        );

        Ok(stats)
    }
}
