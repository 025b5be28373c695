use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::refresh::{RefreshAck, RefreshPipeline};

use super::ticker::ticker_loop;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const TICKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Ticker {
    period: Duration,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fires the refresh pipeline on an interval and on demand.
#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<RefreshPipeline>,
    ticker: Arc<Mutex<Option<Ticker>>>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<RefreshPipeline>) -> Self {
        Self {
            pipeline,
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pipeline(&self) -> &Arc<RefreshPipeline> {
        &self.pipeline
    }

    /// Arms the ticker and kicks off an immediate first cycle.
    pub async fn start(&self, period: Duration) -> RefreshAck {
        self.spawn_ticker(period).await;
        self.pipeline.trigger()
    }

    /// Replaces the running ticker with one using `period`. The old ticker is
    /// gone before the new one is spawned.
    pub async fn reschedule(&self, period: Duration) {
        self.spawn_ticker(period).await;
    }

    pub fn trigger_now(&self) -> RefreshAck {
        self.pipeline.trigger()
    }

    pub async fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.handle.is_finished())
    }

    pub async fn period(&self) -> Option<Duration> {
        self.ticker.lock().await.as_ref().map(|ticker| ticker.period)
    }

    /// Stops the ticker. A cycle already running is left alone.
    pub async fn stop(&self) {
        let Some(ticker) = self.ticker.lock().await.take() else {
            return;
        };
        ticker.cancel_token.cancel();
        let mut handle = ticker.handle;
        if tokio::time::timeout(TICKER_STOP_TIMEOUT, &mut handle)
            .await
            .is_err()
        {
            log_warn!("refresh ticker did not stop in time, aborting it");
            handle.abort();
        }
    }

    /// Stops the ticker, then gives an in-flight cycle up to `grace` to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.stop().await;
        self.pipeline.finish(grace).await;
        log_info!("scheduler shut down");
    }

    async fn spawn_ticker(&self, period: Duration) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(ticker_loop(
            Arc::clone(&self.pipeline),
            period,
            cancel_token.clone(),
        ));
        log_info!("refresh ticker armed every {:?}", period);

        *ticker_guard = Some(Ticker {
            period,
            cancel_token,
            handle,
        });
    }
}
