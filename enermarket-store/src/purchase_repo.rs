use chrono::{DateTime, Utc};
use enermarket_core::{PurchaseScope, StoreError, StoreResult};
use enermarket_shared::{NewPurchase, PageRequest, Purchase, PurchaseFilter, PurchaseStatus};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::pg_store::db_err;

const PURCHASE_COLUMNS: &str = r#"
    p.id, p.uuid, p.quantity_mwh, p.price_per_mwh, p.status, p.payment_method,
    p.buyer_id, p.offer_id, o.uuid AS offer_uuid, o.seller_id, p.created_at
"#;

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: i64,
    uuid: Uuid,
    quantity_mwh: Decimal,
    price_per_mwh: Decimal,
    status: String,
    payment_method: String,
    buyer_id: i64,
    offer_id: i64,
    offer_uuid: Uuid,
    seller_id: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = StoreError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let corrupt = |e: enermarket_shared::ParseEnumError| {
            StoreError::Corrupt(format!("purchase {}: {}", row.uuid, e))
        };

        Ok(Purchase {
            id: row.id,
            uuid: row.uuid,
            quantity_mwh: row.quantity_mwh,
            price_per_mwh: row.price_per_mwh,
            status: row.status.parse().map_err(corrupt)?,
            payment_method: row.payment_method.parse().map_err(corrupt)?,
            buyer_id: row.buyer_id,
            offer_id: row.offer_id,
            offer_uuid: row.offer_uuid,
            seller_id: row.seller_id,
            created_at: row.created_at,
        })
    }
}

fn into_purchases(rows: Vec<PurchaseRow>) -> StoreResult<Vec<Purchase>> {
    rows.into_iter().map(Purchase::try_from).collect()
}

pub(crate) async fn insert<'e, E: PgExecutor<'e>>(ex: E, purchase: &NewPurchase) -> StoreResult<Purchase> {
    let sql = format!(
        r#"
        WITH p AS (
            INSERT INTO purchases (uuid, quantity_mwh, price_per_mwh, status, payment_method,
                                   buyer_id, offer_id, created_at)
            VALUES ($1, $2, $3, 'waiting', $4, $5, $6, $7)
            RETURNING *
        )
        SELECT {PURCHASE_COLUMNS} FROM p JOIN offers o ON o.id = p.offer_id
        "#
    );

    let row = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(purchase.uuid)
        .bind(purchase.quantity_mwh)
        .bind(purchase.price_per_mwh)
        .bind(purchase.payment_method.as_str())
        .bind(purchase.buyer_id)
        .bind(purchase.offer_id)
        .bind(purchase.created_at)
        .fetch_one(ex)
        .await
        .map_err(db_err)?;

    Purchase::try_from(row)
}

pub(crate) async fn find_by_uuid<'e, E: PgExecutor<'e>>(
    ex: E,
    uuid: Uuid,
    for_update: bool,
) -> StoreResult<Option<Purchase>> {
    let lock = if for_update { " FOR UPDATE OF p" } else { "" };
    let sql = format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases p JOIN offers o ON o.id = p.offer_id WHERE p.uuid = $1{lock}"
    );
    let row = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(uuid)
        .fetch_optional(ex)
        .await
        .map_err(db_err)?;

    row.map(Purchase::try_from).transpose()
}

pub(crate) async fn list<'e, E: PgExecutor<'e>>(
    ex: E,
    scope: PurchaseScope,
    filter: &PurchaseFilter,
    page: &PageRequest,
) -> StoreResult<Vec<Purchase>> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases p JOIN offers o ON o.id = p.offer_id WHERE "
    ));

    match scope {
        PurchaseScope::Buyer(buyer) => qb.push("p.buyer_id = ").push_bind(buyer),
        PurchaseScope::Seller(seller) => qb.push("o.seller_id = ").push_bind(seller),
        PurchaseScope::Offer(offer_id) => qb.push("p.offer_id = ").push_bind(offer_id),
    };

    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(method) = filter.payment_method {
        qb.push(" AND p.payment_method = ").push_bind(method.as_str());
    }

    // Sort directions come from a closed enum, never from caller text.
    qb.push(" ORDER BY ");
    if let Some(direction) = filter.order_price {
        qb.push(format_args!("p.price_per_mwh {}, ", direction.as_sql()));
    }
    if let Some(direction) = filter.order_quantity {
        qb.push(format_args!("p.quantity_mwh {}, ", direction.as_sql()));
    }
    qb.push("p.id ASC LIMIT ")
        .push_bind(page.fetch_limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb
        .build_query_as::<PurchaseRow>()
        .fetch_all(ex)
        .await
        .map_err(db_err)?;

    into_purchases(rows)
}

pub(crate) async fn list_waiting<'e, E: PgExecutor<'e>>(ex: E) -> StoreResult<Vec<Purchase>> {
    let sql = format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases p JOIN offers o ON o.id = p.offer_id \
         WHERE p.status = 'waiting' ORDER BY p.created_at ASC, p.id ASC"
    );
    let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
        .fetch_all(ex)
        .await
        .map_err(db_err)?;

    into_purchases(rows)
}

pub(crate) async fn set_status<'e, E: PgExecutor<'e>>(
    ex: E,
    id: i64,
    expected: PurchaseStatus,
    status: PurchaseStatus,
) -> StoreResult<()> {
    let result = sqlx::query("UPDATE purchases SET status = $1 WHERE id = $2 AND status = $3")
        .bind(status.as_str())
        .bind(id)
        .bind(expected.as_str())
        .execute(ex)
        .await
        .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!("purchase #{id} is no longer {expected}")));
    }
    Ok(())
}
