use chrono::{DateTime, NaiveDate, Utc};
use enermarket_core::{StoreError, StoreResult};
use enermarket_shared::{NewOffer, Offer, OfferFilter, OfferStatus, PageRequest, Period, UserId};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::pg_store::db_err;

const OFFER_SELECT: &str = r#"
    SELECT o.id, o.uuid, o.price_per_mwh, o.initial_quantity_mwh, o.remaining_quantity_mwh,
           o.description, o.period_start, o.period_end, o.status,
           et.name AS energy_type, sm.name AS submarket, o.seller_id, o.created_at
    FROM offers o
    JOIN energy_types et ON et.id = o.energy_type_id
    JOIN submarkets sm ON sm.id = o.submarket_id
"#;

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: i64,
    uuid: Uuid,
    price_per_mwh: Decimal,
    initial_quantity_mwh: Decimal,
    remaining_quantity_mwh: Decimal,
    description: String,
    period_start: NaiveDate,
    period_end: NaiveDate,
    status: String,
    energy_type: String,
    submarket: String,
    seller_id: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = StoreError;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        let corrupt = |e: enermarket_shared::ParseEnumError| {
            StoreError::Corrupt(format!("offer {}: {}", row.uuid, e))
        };

        Ok(Offer {
            id: row.id,
            uuid: row.uuid,
            price_per_mwh: row.price_per_mwh,
            initial_quantity_mwh: row.initial_quantity_mwh,
            remaining_quantity_mwh: row.remaining_quantity_mwh,
            description: row.description.clone(),
            period: Period::new(row.period_start, row.period_end),
            status: row.status.parse().map_err(corrupt)?,
            energy_type: row.energy_type.parse().map_err(corrupt)?,
            submarket: row.submarket.parse().map_err(corrupt)?,
            seller_id: row.seller_id,
            created_at: row.created_at,
        })
    }
}

fn into_offers(rows: Vec<OfferRow>) -> StoreResult<Vec<Offer>> {
    rows.into_iter().map(Offer::try_from).collect()
}

pub(crate) async fn insert<'e, E: PgExecutor<'e>>(ex: E, offer: &NewOffer) -> StoreResult<Offer> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO offers (uuid, price_per_mwh, initial_quantity_mwh, remaining_quantity_mwh,
                            description, period_start, period_end, status,
                            energy_type_id, submarket_id, seller_id, created_at)
        VALUES ($1, $2, $3, $3, $4, $5, $6, 'fresh',
                (SELECT id FROM energy_types WHERE name = $7),
                (SELECT id FROM submarkets WHERE name = $8),
                $9, $10)
        RETURNING id
        "#,
    )
    .bind(offer.uuid)
    .bind(offer.price_per_mwh)
    .bind(offer.quantity_mwh)
    .bind(&offer.description)
    .bind(offer.period.start)
    .bind(offer.period.end)
    .bind(offer.energy_type.as_str())
    .bind(offer.submarket.as_str())
    .bind(offer.seller_id)
    .bind(offer.created_at)
    .fetch_one(ex)
    .await
    .map_err(db_err)?;

    Ok(offer.clone().into_offer(id))
}

pub(crate) async fn find_by_uuid<'e, E: PgExecutor<'e>>(
    ex: E,
    uuid: Uuid,
    for_update: bool,
) -> StoreResult<Option<Offer>> {
    let sql = format!("{OFFER_SELECT} WHERE o.uuid = $1{}", lock_clause(for_update));
    let row = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(uuid)
        .fetch_optional(ex)
        .await
        .map_err(db_err)?;

    row.map(Offer::try_from).transpose()
}

pub(crate) async fn find_by_id<'e, E: PgExecutor<'e>>(
    ex: E,
    id: i64,
    for_update: bool,
) -> StoreResult<Option<Offer>> {
    let sql = format!("{OFFER_SELECT} WHERE o.id = $1{}", lock_clause(for_update));
    let row = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(id)
        .fetch_optional(ex)
        .await
        .map_err(db_err)?;

    row.map(Offer::try_from).transpose()
}

fn lock_clause(for_update: bool) -> &'static str {
    if for_update { " FOR UPDATE OF o" } else { "" }
}

pub(crate) async fn list_tradable<'e, E: PgExecutor<'e>>(
    ex: E,
    filter: &OfferFilter,
    exclude_seller: UserId,
    page: &PageRequest,
) -> StoreResult<Vec<Offer>> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(OFFER_SELECT);
    qb.push(" WHERE o.status IN ('fresh', 'open') AND o.seller_id <> ")
        .push_bind(exclude_seller);

    if let Some(submarket) = filter.submarket {
        qb.push(" AND sm.name = ").push_bind(submarket.as_str());
    }
    if let Some(energy_type) = filter.energy_type {
        qb.push(" AND et.name = ").push_bind(energy_type.as_str());
    }
    if let Some(from) = filter.period_start {
        qb.push(" AND o.period_end >= ").push_bind(from);
    }
    if let Some(to) = filter.period_end {
        qb.push(" AND o.period_start <= ").push_bind(to);
    }

    qb.push(" ORDER BY o.id ASC LIMIT ")
        .push_bind(page.fetch_limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb
        .build_query_as::<OfferRow>()
        .fetch_all(ex)
        .await
        .map_err(db_err)?;

    into_offers(rows)
}

pub(crate) async fn list_by_seller<'e, E: PgExecutor<'e>>(ex: E, seller: UserId) -> StoreResult<Vec<Offer>> {
    let sql = format!("{OFFER_SELECT} WHERE o.seller_id = $1 ORDER BY o.id ASC");
    let rows = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(seller)
        .fetch_all(ex)
        .await
        .map_err(db_err)?;

    into_offers(rows)
}

pub(crate) async fn update<'e, E: PgExecutor<'e>>(
    ex: E,
    offer: &Offer,
    expected: OfferStatus,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE offers
        SET price_per_mwh = $1,
            initial_quantity_mwh = $2,
            remaining_quantity_mwh = $3,
            description = $4,
            period_start = $5,
            period_end = $6,
            status = $7,
            energy_type_id = (SELECT id FROM energy_types WHERE name = $8)
        WHERE id = $9 AND status = $10
        "#,
    )
    .bind(offer.price_per_mwh)
    .bind(offer.initial_quantity_mwh)
    .bind(offer.remaining_quantity_mwh)
    .bind(&offer.description)
    .bind(offer.period.start)
    .bind(offer.period.end)
    .bind(offer.status.as_str())
    .bind(offer.energy_type.as_str())
    .bind(offer.id)
    .bind(expected.as_str())
    .execute(ex)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!("offer {} is no longer {}", offer.uuid, expected)));
    }
    Ok(())
}

pub(crate) async fn delete<'e, E: PgExecutor<'e>>(ex: E, id: i64, expected: OfferStatus) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM offers WHERE id = $1 AND status = $2")
        .bind(id)
        .bind(expected.as_str())
        .execute(ex)
        .await
        .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!("offer #{id} is no longer {expected}")));
    }
    Ok(())
}

pub(crate) async fn expire_elapsed<'e, E: PgExecutor<'e>>(ex: E, today: NaiveDate) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE offers SET status = 'expired' WHERE period_end < $1 AND status IN ('fresh', 'open')",
    )
    .bind(today)
    .execute(ex)
    .await
    .map_err(db_err)?;

    Ok(result.rows_affected())
}
