use async_trait::async_trait;
use enermarket_shared::Purchase;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Final word of a payment provider on a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELED" => Ok(PaymentStatus::Canceled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Ask the provider how the payment for `purchase` ended
    async fn confirm(
        &self,
        purchase: &Purchase,
    ) -> Result<PaymentStatus, Box<dyn std::error::Error + Send + Sync>>;
}
