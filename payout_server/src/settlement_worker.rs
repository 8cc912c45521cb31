use std::time::Duration;

use log::*;
use payout_engine::{payout_objects::RunSummary, SettlementApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::integrations::ConfiguredRail;

/// Starts the settlement worker, which runs the settlement scheduler every `interval`. Do not await the returned
/// JoinHandle, as it will run indefinitely.
///
/// The first run happens one `interval` after start-up unless `run_immediately` is set. A failed run has already
/// raised an operator alert inside the engine; the worker logs it and waits for the next tick.
pub fn start_settlement_worker(
    api: SettlementApi<SqliteDatabase, ConfiguredRail>,
    interval: Duration,
    run_immediately: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick of an interval completes immediately
        if !run_immediately {
            timer.tick().await;
        }
        info!("🕰️ Settlement worker started. Runs every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            info!("🕰️ Running settlement");
            match api.run_settlement().await {
                Ok(summary) => log_summary(&summary),
                Err(e) => error!("🕰️ Settlement run failed. {e}"),
            }
        }
    })
}

fn log_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    info!("🕰️ Settlement run finished in {}ms. {summary}", elapsed.num_milliseconds());
    if summary.failed > 0 {
        warn!("🕰️ {} payouts failed in this run and need an operator to retry them", summary.failed);
    }
}
