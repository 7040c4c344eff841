use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::manager::OfferManager;

/// `tokio::time::interval` panics on a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically expires offers whose trading period is over
pub struct ExpirySweeper {
    offers: OfferManager,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(offers: OfferManager, interval: Duration) -> Self {
        Self {
            offers,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Sweep on every tick until `shutdown` fires. The first tick is immediate.
    ///
    /// A failed sweep is logged and the next tick tries again.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.offers.sweep_expired().await {
                        Ok(0) => {}
                        Ok(expired) => info!(expired, "Expired offers past their period"),
                        Err(e) => error!("Expiry sweep failed: {}", e),
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}
