pub mod manager;
pub mod orchestrator;
pub mod settlement;

pub use manager::{
    cancel_purchase, CancelOrigin, CancelOutcome, PurchaseManager, PurchasePolicy, PurchaseRequest,
};
pub use orchestrator::{PaymentOrchestrator, SimulatedPaymentAdapter};
pub use settlement::{
    RetryPolicy, SettlementDelays, SettlementJob, SettlementOutcome, SettlementQueue,
    SettlementService, SettlementWorker,
};
