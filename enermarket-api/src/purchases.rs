use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use enermarket_offer::rules;
use enermarket_shared::{Page, Purchase, PurchaseFilter, PurchaseStatus, SortDirection};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::offers::page_request;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/purchases", get(list_purchases))
        .route("/v1/purchases/sales", get(list_sales))
        .route("/v1/purchases/{uuid}", get(get_purchase))
        .route("/v1/purchases/{uuid}/cancel", post(cancel_purchase))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<PurchaseStatus>,
    pub payment_method: Option<String>,
    pub order_price: Option<SortDirection>,
    pub order_quantity: Option<SortDirection>,
}

impl PurchaseQuery {
    pub(crate) fn filter(&self) -> Result<PurchaseFilter, AppError> {
        let payment_method = match &self.payment_method {
            Some(name) => Some(rules::parse_payment_method(name)?),
            None => None,
        };
        Ok(PurchaseFilter {
            status: self.status,
            payment_method,
            order_price: self.order_price,
            order_quantity: self.order_quantity,
        })
    }
}

/// GET /v1/purchases
async fn list_purchases(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Query(query): Query<PurchaseQuery>,
) -> Result<Json<Page<Purchase>>, AppError> {
    let filter = query.filter()?;
    let page = page_request(query.page, query.page_size)?;

    let result = state.purchases.list(buyer.id, &filter, page).await;
    Ok(Json(state.metrics.track("list_purchases", result)?))
}

/// GET /v1/purchases/sales
/// Purchases made against the caller's offers
async fn list_sales(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
    Query(query): Query<PurchaseQuery>,
) -> Result<Json<Page<Purchase>>, AppError> {
    let filter = query.filter()?;
    let page = page_request(query.page, query.page_size)?;

    let result = state.purchases.list_sales(seller.id, &filter, page).await;
    Ok(Json(state.metrics.track("list_sales", result)?))
}

/// GET /v1/purchases/{uuid}
async fn get_purchase(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Purchase>, AppError> {
    let result = state.purchases.find(uuid, user.id).await;
    Ok(Json(state.metrics.track("get_purchase", result)?))
}

/// POST /v1/purchases/{uuid}/cancel
async fn cancel_purchase(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Purchase>, AppError> {
    let result = state.purchases.cancel(uuid, buyer.id).await;
    Ok(Json(state.metrics.track("cancel_purchase", result)?))
}
