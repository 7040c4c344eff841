use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use enermarket_core::PaymentStatus;
use enermarket_purchase::SettlementOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub purchase_uuid: Uuid,
    /// What the provider claims; only logged
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub purchase_uuid: Uuid,
    pub outcome: SettlementOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// A provider notification: re-check the purchase's payment with the provider now
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<WebhookResponse>, AppError> {
    let presented = headers
        .get(SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();
    if !secrets_match(presented, state.webhook_secret.as_bytes()) {
        tracing::warn!(purchase = %payload.purchase_uuid, "Rejected payment webhook with a bad secret");
        return Err(AppError::Unauthorized("Invalid webhook secret".into()));
    }

    tracing::info!(purchase = %payload.purchase_uuid, reported = ?payload.status, "Received payment webhook");

    let result = state.settlement.confirm_payment(payload.purchase_uuid).await;
    let outcome = state.metrics.track("payment_webhook", result)?;

    Ok(Json(WebhookResponse {
        purchase_uuid: payload.purchase_uuid,
        outcome,
    }))
}

/// Compares without stopping at the first differing byte
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    if expected.is_empty() || presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
