//! Deferred settlement of waiting purchases.
//!
//! The `waiting` rows are the durable record of pending work: the queue only
//! carries wake-up times, and [`SettlementWorker::run`] rebuilds it from the
//! store on startup.

use chrono::{DateTime, Utc};
use enermarket_core::{Clock, MarketError, MarketResult, MarketStore, PaymentStatus};
use enermarket_shared::{PaymentMethod, Purchase, PurchaseStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::manager::{cancel_purchase, CancelOrigin, CancelOutcome};
use crate::orchestrator::PaymentOrchestrator;

/// Simulated payment-processing delay per method
#[derive(Debug, Clone, Copy)]
pub struct SettlementDelays {
    pub pix: Duration,
    pub card: Duration,
    pub billet: Duration,
}

impl Default for SettlementDelays {
    fn default() -> Self {
        Self {
            pix: Duration::ZERO,
            card: Duration::from_secs(5 * 60),
            billet: Duration::from_secs(2 * 24 * 60 * 60),
        }
    }
}

impl SettlementDelays {
    pub fn immediate() -> Self {
        Self {
            pix: Duration::ZERO,
            card: Duration::ZERO,
            billet: Duration::ZERO,
        }
    }

    pub fn for_method(&self, method: PaymentMethod) -> Duration {
        match method {
            PaymentMethod::Pix => self.pix,
            PaymentMethod::Card => self.card,
            PaymentMethod::Billet => self.billet,
        }
    }

    pub fn job_for(&self, purchase: &Purchase) -> SettlementJob {
        let delay = chrono::Duration::from_std(self.for_method(purchase.payment_method))
            .unwrap_or_else(|_| chrono::Duration::zero());
        SettlementJob {
            purchase_uuid: purchase.uuid,
            payment_method: purchase.payment_method,
            due_at: purchase.created_at + delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementJob {
    pub purchase_uuid: Uuid,
    pub payment_method: PaymentMethod,
    pub due_at: DateTime<Utc>,
}

/// Handle for handing accepted purchases to the settlement worker
#[derive(Clone)]
pub struct SettlementQueue {
    sender: mpsc::UnboundedSender<SettlementJob>,
    delays: SettlementDelays,
}

impl SettlementQueue {
    pub fn new(delays: SettlementDelays) -> (Self, mpsc::UnboundedReceiver<SettlementJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, delays }, receiver)
    }

    /// False when no worker is listening anymore
    pub fn schedule(&self, purchase: &Purchase) -> bool {
        self.sender.send(self.delays.job_for(purchase)).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Completed,
    /// Payment did not go through; the purchase was canceled and its quantity restored
    Compensated,
    /// Nothing to do: the purchase was already final or no longer exists
    Skipped,
    /// Every compensation attempt failed; the reserved quantity stays held
    CompensationFailed,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub compensation_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            compensation_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

    /// Delay before retry number `attempt + 1`: doubles per attempt, capped at [`Self::MAX_BACKOFF`]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(Self::MAX_BACKOFF, |delay| delay.min(Self::MAX_BACKOFF))
    }
}

struct ServiceInner {
    store: Arc<dyn MarketStore>,
    payments: PaymentOrchestrator,
    retry: RetryPolicy,
}

/// Drives a waiting purchase to `completed` or, failing that, to `canceled`
#[derive(Clone)]
pub struct SettlementService {
    inner: Arc<ServiceInner>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn MarketStore>, payments: PaymentOrchestrator, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(ServiceInner { store, payments, retry }),
        }
    }

    /// Ask the payment provider about a due purchase and apply its answer.
    pub async fn settle(&self, uuid: Uuid) -> SettlementOutcome {
        let purchase = match self.inner.store.find_purchase(uuid).await {
            Ok(Some(purchase)) => purchase,
            Ok(None) => {
                error!(purchase = %uuid, "purchase vanished before settlement");
                return SettlementOutcome::Skipped;
            }
            Err(e) => {
                error!(purchase = %uuid, "could not load purchase for settlement: {}", e);
                return self.compensate(uuid).await;
            }
        };

        if !purchase.is_waiting() {
            debug!(purchase = %uuid, status = %purchase.status, "purchase already final, skipping settlement");
            return SettlementOutcome::Skipped;
        }

        let status = match self.inner.payments.confirm(&purchase).await {
            Ok(status) => status,
            Err(e) => {
                error!(purchase = %uuid, "payment confirmation failed: {}", e);
                PaymentStatus::Failed
            }
        };
        self.finalize(uuid, status).await
    }

    /// Settle ahead of schedule after the provider signalled a change.
    ///
    /// The verdict always comes from the provider, never from the caller. If
    /// the provider cannot be reached the purchase stays waiting for its
    /// scheduled settlement.
    pub async fn confirm_payment(&self, uuid: Uuid) -> MarketResult<SettlementOutcome> {
        let purchase = self
            .inner
            .store
            .find_purchase(uuid)
            .await?
            .ok_or(MarketError::PurchaseNotFound)?;
        if !purchase.is_waiting() {
            debug!(purchase = %uuid, status = %purchase.status, "purchase already final, ignoring confirmation");
            return Ok(SettlementOutcome::Skipped);
        }

        let status = self.inner.payments.confirm(&purchase).await.map_err(|e| {
            MarketError::Internal(format!("payment provider unavailable: {}", e))
        })?;
        Ok(self.finalize(uuid, status).await)
    }

    pub async fn finalize(&self, uuid: Uuid, status: PaymentStatus) -> SettlementOutcome {
        if !status.is_success() {
            warn!(purchase = %uuid, ?status, "payment not approved, rolling back reservation");
            return self.compensate(uuid).await;
        }

        match self.complete(uuid).await {
            Ok(true) => {
                info!(purchase = %uuid, "purchase settled");
                SettlementOutcome::Completed
            }
            Ok(false) => SettlementOutcome::Skipped,
            Err(e) => {
                error!(purchase = %uuid, "settlement failed: {}", e);
                self.compensate(uuid).await
            }
        }
    }

    /// True when this call moved the purchase from waiting to completed
    async fn complete(&self, uuid: Uuid) -> MarketResult<bool> {
        let mut tx = self.inner.store.begin().await?;
        let purchase = tx.lock_purchase(uuid).await?.ok_or(MarketError::PurchaseNotFound)?;
        if !purchase.is_waiting() {
            debug!(purchase = %uuid, status = %purchase.status, "purchase already final");
            return Ok(false);
        }

        tx.set_purchase_status(purchase.id, PurchaseStatus::Waiting, PurchaseStatus::Completed)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn compensate(&self, uuid: Uuid) -> SettlementOutcome {
        let attempts = self.inner.retry.compensation_attempts.max(1);

        for attempt in 1..=attempts {
            match cancel_purchase(self.inner.store.as_ref(), uuid, CancelOrigin::System).await {
                Ok(CancelOutcome::Canceled(_)) => return SettlementOutcome::Compensated,
                Ok(CancelOutcome::Unchanged(status)) => {
                    if status == PurchaseStatus::Completed {
                        warn!(purchase = %uuid, "payment failed for a completed purchase, leaving it completed");
                    }
                    return SettlementOutcome::Skipped;
                }
                Err(MarketError::PurchaseNotFound) => {
                    error!(purchase = %uuid, "purchase vanished before compensation");
                    return SettlementOutcome::Skipped;
                }
                Err(e) if attempt < attempts => {
                    let backoff = self.inner.retry.backoff(attempt);
                    warn!(purchase = %uuid, attempt, "compensation failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    let quantity = self
                        .inner
                        .store
                        .find_purchase(uuid)
                        .await
                        .ok()
                        .flatten()
                        .map(|p| p.quantity_mwh);
                    error!(
                        purchase = %uuid,
                        quantity = ?quantity,
                        attempts,
                        "compensation gave up, reserved quantity is held until reconciled: {}",
                        e
                    );
                    return SettlementOutcome::CompensationFailed;
                }
            }
        }
        SettlementOutcome::CompensationFailed
    }
}

/// Consumes the settlement queue, one sleeping task per job
pub struct SettlementWorker {
    service: SettlementService,
    clock: Arc<dyn Clock>,
    delays: SettlementDelays,
    max_in_flight: usize,
}

impl SettlementWorker {
    pub fn new(
        service: SettlementService,
        clock: Arc<dyn Clock>,
        delays: SettlementDelays,
        max_in_flight: usize,
    ) -> Self {
        Self {
            service,
            clock,
            delays,
            max_in_flight,
        }
    }

    /// Reschedule every waiting purchase, then serve the queue until `shutdown`.
    ///
    /// Jobs still sleeping at shutdown are dropped; their rows stay waiting
    /// and are recovered on the next run.
    pub async fn run(self, mut jobs: mpsc::UnboundedReceiver<SettlementJob>, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        self.recover(&permits, &mut tasks).await;
        info!("Settlement worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => self.spawn(job, &permits, &mut tasks),
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Settlement task failed: {}", e);
                    }
                }
            }
        }

        tasks.shutdown().await;
        info!("Settlement worker stopped");
    }

    async fn recover(&self, permits: &Arc<Semaphore>, tasks: &mut JoinSet<()>) {
        match self.service.inner.store.list_waiting_purchases().await {
            Ok(waiting) => {
                if !waiting.is_empty() {
                    info!(count = waiting.len(), "Rescheduling waiting purchases");
                }
                for purchase in &waiting {
                    self.spawn(self.delays.job_for(purchase), permits, tasks);
                }
            }
            Err(e) => error!("Could not load waiting purchases for settlement: {}", e),
        }
    }

    fn spawn(&self, job: SettlementJob, permits: &Arc<Semaphore>, tasks: &mut JoinSet<()>) {
        let service = self.service.clone();
        let clock = self.clock.clone();
        let permits = permits.clone();

        tasks.spawn(async move {
            let wait = (job.due_at - clock.now()).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(purchase = %job.purchase_uuid, "settlement permits closed, dropping job");
                    return;
                }
            };
            let outcome = service.settle(job.purchase_uuid).await;
            debug!(purchase = %job.purchase_uuid, ?outcome, "settlement job finished");
        });
    }
}
