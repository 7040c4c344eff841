use std::sync::Arc;
use std::time::Duration;

use enermarket_core::{Clock, MarketStore, PaymentAdapter};
use enermarket_offer::{ExpirySweeper, OfferManager};
use enermarket_purchase::{
    PaymentOrchestrator, PurchaseManager, PurchasePolicy, RetryPolicy, SettlementDelays,
    SettlementQueue, SettlementService, SettlementWorker,
};
use enermarket_store::Config;

use crate::metrics::ApiMetrics;
use crate::worker::Background;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub offers: OfferManager,
    pub purchases: PurchaseManager,
    pub settlement: SettlementService,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    /// Wire the engines over `store`; the returned background tasks are not started yet.
    pub fn assemble(
        store: Arc<dyn MarketStore>,
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentAdapter>,
        config: &Config,
    ) -> Result<(Self, Background), prometheus::Error> {
        let delays = SettlementDelays {
            pix: Duration::from_secs(config.settlement.pix_delay_seconds),
            card: Duration::from_secs(config.settlement.card_delay_seconds),
            billet: Duration::from_secs(config.settlement.billet_delay_seconds),
        };
        let (queue, jobs) = SettlementQueue::new(delays);

        let settlement = SettlementService::new(
            store.clone(),
            PaymentOrchestrator::new(payments),
            RetryPolicy {
                compensation_attempts: config.settlement.compensation_attempts,
                base_delay: Duration::from_millis(config.settlement.retry_base_delay_ms),
            },
        );
        let offers = OfferManager::new(store.clone(), clock.clone());
        let purchases = PurchaseManager::new(
            store,
            clock.clone(),
            queue,
            PurchasePolicy {
                cancel_window: config.market.cancel_window(),
                max_conflict_retries: config.market.max_conflict_retries,
            },
        );

        let background = Background {
            sweeper: ExpirySweeper::new(offers.clone(), config.market.sweep_interval()),
            settlement: SettlementWorker::new(
                settlement.clone(),
                clock,
                delays,
                config.settlement.max_in_flight,
            ),
            jobs,
        };

        let state = AppState {
            offers,
            purchases,
            settlement,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            webhook_secret: config.settlement.webhook_secret.clone(),
            metrics: Arc::new(ApiMetrics::new()?),
        };

        Ok((state, background))
    }
}
