use axum::{extract::State, http::header, response::IntoResponse};
use enermarket_core::MarketResult;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("enermarket_requests_total", "Marketplace operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        Ok(Self { registry, requests })
    }

    /// Count the result of `operation` under `ok` or its error code.
    pub fn track<T>(&self, operation: &str, result: MarketResult<T>) -> Result<T, AppError> {
        let result = result.map_err(AppError::from);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        self.requests.with_label_values(&[operation, outcome]).inc();
        result
    }

    pub fn encode(&self) -> Result<String, AppError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| AppError::Internal(format!("metrics encode error: {}", e)))?;
        String::from_utf8(buf).map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// GET /metrics
pub async fn render(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.encode()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use enermarket_core::MarketError;

    #[test]
    fn test_track_labels_by_outcome() {
        let metrics = ApiMetrics::new().unwrap();
        assert_eq!(metrics.track("get_offer", Ok(7)).unwrap(), 7);
        let _ = metrics.track::<()>("get_offer", Err(MarketError::OfferNotFound));

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"enermarket_requests_total{operation="get_offer",outcome="ok"} 1"#));
        assert!(text.contains(r#"enermarket_requests_total{operation="get_offer",outcome="OFFER_NOT_FOUND"} 1"#));
    }
}
