use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Offset, TimeZone, Utc};
use enermarket_api::auth::issue_token;
use enermarket_api::{app, AppState, Background};
use enermarket_core::ManualClock;
use enermarket_purchase::SimulatedPaymentAdapter;
use enermarket_shared::{Participant, Submarket};
use enermarket_store::app_config::{
    AuthConfig, DatabaseConfig, MarketConfig, ServerConfig, SettlementConfig,
};
use enermarket_store::{Config, MemoryStore, StoreKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const SELLER: Participant = Participant { id: 11, submarket: Submarket::Northeast };
const BUYER: Participant = Participant { id: 22, submarket: Submarket::SoutheastCenterWest };
const WEBHOOK_SECRET: &str = "provider-shared-secret";
const STRANGER: Participant = Participant { id: 33, submarket: Submarket::North };

fn test_config() -> Config {
    Config {
        server: ServerConfig { port: 0 },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: "integration-secret".into(),
            jwt_expiration_seconds: 600,
        },
        market: MarketConfig {
            store: StoreKind::Memory,
            utc_offset_hours: -3,
            cancel_window_minutes: 120,
            max_conflict_retries: 3,
            sweep_interval_seconds: 600,
        },
        settlement: SettlementConfig {
            webhook_secret: WEBHOOK_SECRET.into(),
            pix_delay_seconds: 0,
            card_delay_seconds: 0,
            billet_delay_seconds: 0,
            max_in_flight: 4,
            compensation_attempts: 3,
            retry_base_delay_ms: 1,
        },
    }
}

struct Harness {
    router: Router,
    state: AppState,
}

fn harness() -> (Harness, Background) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 11, 2, 15, 0, 0).unwrap(),
        Utc.fix(),
    ));
    let (state, background) = AppState::assemble(
        Arc::new(MemoryStore::new()),
        clock,
        Arc::new(SimulatedPaymentAdapter),
        &test_config(),
    )
    .unwrap();

    (
        Harness {
            router: app(state.clone()),
            state,
        },
        background,
    )
}

impl Harness {
    async fn call(&self, method: Method, uri: &str, user: Option<&Participant>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let token = issue_token(&self.state.auth, user).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder, body).await
    }

    async fn webhook(&self, secret: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::POST).uri("/v1/webhooks/payments");
        if let Some(secret) = secret {
            builder = builder.header("x-webhook-secret", secret);
        }
        self.send(builder, Some(body)).await
    }

    async fn send(&self, builder: axum::http::request::Builder, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn create_offer(&self, quantity: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/v1/offers",
                Some(&SELLER),
                Some(json!({
                    "price_per_mwh": "180.50",
                    "quantity_mwh": quantity,
                    "description": "run-of-river surplus",
                    "period_start": "2026-11-03",
                    "period_end": "2026-11-30",
                    "energy_type": "hydroelectric",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn error_kind(body: &Value) -> &str {
    body["error"]["kind"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health_is_public() {
    let (h, _background) = harness();
    let (status, body) = h.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let (h, _background) = harness();
    let (status, body) = h.call(Method::GET, "/v1/offers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_kind(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_offer_listing_and_purchase_flow() {
    let (h, _background) = harness();
    let offer = h.create_offer("50").await;
    let uuid = offer["uuid"].as_str().unwrap().to_string();
    assert_eq!(offer["status"], "fresh");
    assert_eq!(offer["submarket"], "NE");

    // own offers are hidden from the seller's marketplace view
    let (_, page) = h.call(Method::GET, "/v1/offers", Some(&SELLER), None).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 0);

    let (status, page) = h
        .call(Method::GET, "/v1/offers?energy_type=hydroelectric&page_size=5", Some(&BUYER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"][0]["uuid"], uuid.as_str());
    assert_eq!(page["has_next"], false);
    assert_eq!(page["has_prev"], false);

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&SELLER),
            Some(json!({ "quantity_mwh": "1", "payment_method": "pix" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "CANNOT_PURCHASE_OWN_OFFER");

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&BUYER),
            Some(json!({ "quantity_mwh": "60", "payment_method": "pix" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "INSUFFICIENT_QUANTITY");

    let (status, purchase) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&BUYER),
            Some(json!({ "quantity_mwh": "12.5", "payment_method": "card" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", purchase);
    assert_eq!(purchase["status"], "waiting");
    let purchase_uuid = purchase["uuid"].as_str().unwrap().to_string();

    let (_, offer) = h.call(Method::GET, &format!("/v1/offers/{}", uuid), Some(&BUYER), None).await;
    assert_eq!(offer["status"], "open");
    assert_eq!(offer["remaining_quantity_mwh"], "37.5");

    let (status, body) = h.call(Method::DELETE, &format!("/v1/offers/{}", uuid), Some(&SELLER), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "CANNOT_DELETE_OFFER");

    let (status, body) = h
        .call(Method::GET, &format!("/v1/purchases/{}", purchase_uuid), Some(&STRANGER), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "NOT_PURCHASE_OWNER");

    let (status, _) = h
        .call(Method::GET, &format!("/v1/purchases/{}", purchase_uuid), Some(&SELLER), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, sales) = h.call(Method::GET, "/v1/purchases/sales", Some(&SELLER), None).await;
    assert_eq!(sales["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_settles_and_cancel_restores_quantity() {
    let (h, _background) = harness();
    let offer = h.create_offer("10").await;
    let uuid = offer["uuid"].as_str().unwrap().to_string();

    let (_, purchase) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&BUYER),
            Some(json!({ "quantity_mwh": "10", "payment_method": "billet" })),
        )
        .await;
    let purchase_uuid = purchase["uuid"].as_str().unwrap().to_string();

    let (_, offer) = h.call(Method::GET, &format!("/v1/offers/{}", uuid), Some(&SELLER), None).await;
    assert_eq!(offer["status"], "fulfilled");

    let (status, body) = h
        .webhook(Some(WEBHOOK_SECRET), json!({ "purchase_uuid": purchase_uuid }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");

    let (_, completed) = h
        .call(Method::GET, &format!("/v1/offers/{}/purchases", uuid), Some(&SELLER), None)
        .await;
    assert_eq!(completed["data"][0]["uuid"], purchase_uuid.as_str());

    let (status, body) = h
        .call(Method::GET, &format!("/v1/offers/{}/purchases", uuid), Some(&BUYER), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "NOT_OFFER_OWNER");

    let (status, canceled) = h
        .call(Method::POST, &format!("/v1/purchases/{}/cancel", purchase_uuid), Some(&BUYER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");

    let (_, offer) = h.call(Method::GET, &format!("/v1/offers/{}", uuid), Some(&SELLER), None).await;
    assert_eq!(offer["status"], "open");
    assert_eq!(offer["remaining_quantity_mwh"], "10");

    let (status, body) = h
        .call(Method::POST, &format!("/v1/purchases/{}/cancel", purchase_uuid), Some(&BUYER), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "PURCHASE_NOT_CANCELABLE");
}

#[tokio::test]
async fn test_webhook_cannot_dictate_payment_outcome() {
    let (h, _background) = harness();
    let offer = h.create_offer("10").await;
    let uuid = offer["uuid"].as_str().unwrap().to_string();

    let (_, purchase) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&BUYER),
            Some(json!({ "quantity_mwh": "4", "payment_method": "billet" })),
        )
        .await;
    let purchase_uuid = purchase["uuid"].as_str().unwrap().to_string();
    let failed = json!({ "purchase_uuid": purchase_uuid, "status": "FAILED" });

    for secret in [None, Some("guessed-secret")] {
        let (status, body) = h.webhook(secret, failed.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_kind(&body), "UNAUTHORIZED");
    }

    let (_, current) = h
        .call(Method::GET, &format!("/v1/purchases/{}", purchase_uuid), Some(&BUYER), None)
        .await;
    assert_eq!(current["status"], "waiting");
    let (_, offer) = h.call(Method::GET, &format!("/v1/offers/{}", uuid), Some(&SELLER), None).await;
    assert_eq!(offer["remaining_quantity_mwh"], "6");

    // a signed notification still defers to the provider, which approved the payment
    let (status, body) = h.webhook(Some(WEBHOOK_SECRET), failed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");

    let (_, current) = h
        .call(Method::GET, &format!("/v1/purchases/{}", purchase_uuid), Some(&BUYER), None)
        .await;
    assert_eq!(current["status"], "completed");
}

#[tokio::test]
async fn test_validation_errors_use_422() {
    let (h, _background) = harness();

    let (status, body) = h.call(Method::GET, "/v1/offers?page_size=0", Some(&BUYER), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "INVALID_PAGINATION");

    let (status, body) = h.call(Method::GET, "/v1/offers?energy_type=nuclear", Some(&BUYER), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "INVALID_ENERGY_TYPE");

    let (status, body) = h
        .call(
            Method::POST,
            "/v1/offers",
            Some(&SELLER),
            Some(json!({
                "price_per_mwh": "10.001",
                "quantity_mwh": "5",
                "period_start": "2026-11-03",
                "period_end": "2026-11-04",
                "energy_type": "solar",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_kind(&body), "INVALID_PRICE");

    let (status, body) = h
        .call(Method::GET, &format!("/v1/offers/{}", uuid::Uuid::new_v4()), Some(&BUYER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_kind(&body), "OFFER_NOT_FOUND");
}

#[tokio::test]
async fn test_background_worker_settles_new_purchases() {
    let (h, background) = harness();
    let shutdown = CancellationToken::new();
    let workers = background.spawn(shutdown.clone());

    let offer = h.create_offer("20").await;
    let uuid = offer["uuid"].as_str().unwrap().to_string();
    let (_, purchase) = h
        .call(
            Method::POST,
            &format!("/v1/offers/{}/purchases", uuid),
            Some(&BUYER),
            Some(json!({ "quantity_mwh": "5", "payment_method": "pix" })),
        )
        .await;
    let path = format!("/v1/purchases/{}", purchase["uuid"].as_str().unwrap());

    let settled = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let (_, current) = h.call(Method::GET, &path, Some(&BUYER), None).await;
            if current["status"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(settled.is_ok());

    shutdown.cancel();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_metrics_count_operations() {
    let (h, _background) = harness();
    h.create_offer("5").await;

    let (status, body) = h.call(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains(r#"enermarket_requests_total{operation="create_offer",outcome="ok"} 1"#));
}
