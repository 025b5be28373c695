use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::refresh::{RefreshAck, RefreshPipeline};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Triggers the pipeline every `period`, starting one period from now. A
/// trigger never waits for the cycle it starts, so a slow portal cannot push
/// back the next tick.
pub(super) async fn ticker_loop(
    pipeline: Arc<RefreshPipeline>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if pipeline.trigger() == RefreshAck::RefreshInProgress {
                    log_info!("scheduled refresh skipped, previous cycle still running");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("refresh ticker ({:?}) shutting down", period);
                break;
            }
        }
    }
}
