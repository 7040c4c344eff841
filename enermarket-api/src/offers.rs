use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use enermarket_offer::{rules, OfferDraft};
use enermarket_purchase::PurchaseRequest;
use enermarket_shared::{Offer, OfferFilter, Page, PageRequest, Purchase, Submarket};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::purchases::PurchaseQuery;
use crate::state::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/offers", get(list_offers).post(create_offer))
        .route("/v1/offers/mine", get(list_my_offers))
        .route(
            "/v1/offers/{uuid}",
            get(get_offer).put(update_offer).delete(delete_offer),
        )
        .route(
            "/v1/offers/{uuid}/purchases",
            get(list_offer_purchases).post(create_purchase),
        )
}

pub(crate) fn page_request(page: Option<u32>, page_size: Option<u32>) -> Result<PageRequest, AppError> {
    PageRequest::new(page.unwrap_or(1), page_size.unwrap_or(DEFAULT_PAGE_SIZE))
        .map_err(|e| AppError::Market(e.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListOffersQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub submarket: Option<Submarket>,
    pub energy_type: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

impl ListOffersQuery {
    fn filter(&self) -> Result<OfferFilter, AppError> {
        let energy_type = match &self.energy_type {
            Some(name) => Some(rules::parse_energy_type(name)?),
            None => None,
        };
        Ok(OfferFilter {
            submarket: self.submarket,
            energy_type,
            period_start: self.period_start,
            period_end: self.period_end,
        })
    }
}

/// POST /v1/offers
async fn create_offer(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
    Json(draft): Json<OfferDraft>,
) -> Result<(StatusCode, Json<Offer>), AppError> {
    let result = state.offers.create(&seller, draft).await;
    let offer = state.metrics.track("create_offer", result)?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /v1/offers
/// Tradable offers of other sellers
async fn list_offers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListOffersQuery>,
) -> Result<Json<Page<Offer>>, AppError> {
    let filter = query.filter()?;
    let page = page_request(query.page, query.page_size)?;

    let result = state.offers.list(&filter, user.id, page).await;
    Ok(Json(state.metrics.track("list_offers", result)?))
}

/// GET /v1/offers/mine
async fn list_my_offers(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
) -> Result<Json<Vec<Offer>>, AppError> {
    let result = state.offers.list_for_seller(seller.id).await;
    Ok(Json(state.metrics.track("list_seller_offers", result)?))
}

/// GET /v1/offers/{uuid}
async fn get_offer(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Offer>, AppError> {
    let result = state.offers.get(uuid).await;
    Ok(Json(state.metrics.track("get_offer", result)?))
}

/// PUT /v1/offers/{uuid}
/// Replace a fresh offer; the remaining quantity resets to the new quantity
async fn update_offer(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
    Path(uuid): Path<Uuid>,
    Json(draft): Json<OfferDraft>,
) -> Result<Json<Offer>, AppError> {
    let result = state.offers.update(uuid, seller.id, draft).await;
    Ok(Json(state.metrics.track("update_offer", result)?))
}

/// DELETE /v1/offers/{uuid}
async fn delete_offer(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
    Path(uuid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = state.offers.delete(uuid, seller.id).await;
    state.metrics.track("delete_offer", result)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/offers/{uuid}/purchases
/// Completed purchases of the caller's offer
async fn list_offer_purchases(
    State(state): State<AppState>,
    AuthUser(seller): AuthUser,
    Path(uuid): Path<Uuid>,
    Query(query): Query<PurchaseQuery>,
) -> Result<Json<Page<Purchase>>, AppError> {
    let filter = query.filter()?;
    let page = page_request(query.page, query.page_size)?;

    let result = state.offers.purchases(uuid, seller.id, filter, page).await;
    Ok(Json(state.metrics.track("list_offer_purchases", result)?))
}

/// POST /v1/offers/{uuid}/purchases
async fn create_purchase(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Path(uuid): Path<Uuid>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Purchase>), AppError> {
    let result = state.purchases.create(&buyer, uuid, request).await;
    let purchase = state.metrics.track("create_purchase", result)?;
    Ok((StatusCode::CREATED, Json(purchase)))
}
