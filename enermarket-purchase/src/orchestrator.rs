use async_trait::async_trait;
use enermarket_core::{PaymentAdapter, PaymentStatus};
use enermarket_shared::Purchase;
use std::sync::Arc;

#[derive(Clone)]
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    /// Ask the provider for the outcome of a purchase's payment
    pub async fn confirm(
        &self,
        purchase: &Purchase,
    ) -> Result<PaymentStatus, Box<dyn std::error::Error + Send + Sync>> {
        // One adapter for now; routing by payment method would live here.
        self.adapter.confirm(purchase).await
    }
}

/// Stands in for a provider by approving every payment once its delay has passed
pub struct SimulatedPaymentAdapter;

#[async_trait]
impl PaymentAdapter for SimulatedPaymentAdapter {
    async fn confirm(
        &self,
        _purchase: &Purchase,
    ) -> Result<PaymentStatus, Box<dyn std::error::Error + Send + Sync>> {
        Ok(PaymentStatus::Succeeded)
    }
}
