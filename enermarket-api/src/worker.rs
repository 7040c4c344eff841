use enermarket_offer::ExpirySweeper;
use enermarket_purchase::{SettlementJob, SettlementWorker};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Long-running tasks that live beside the HTTP server
pub struct Background {
    pub sweeper: ExpirySweeper,
    pub settlement: SettlementWorker,
    pub jobs: UnboundedReceiver<SettlementJob>,
}

impl Background {
    /// Start the expiry sweeper and the settlement worker. Both stop when `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.sweeper.run(shutdown.clone())),
            tokio::spawn(self.settlement.run(self.jobs, shutdown)),
        ]
    }
}
