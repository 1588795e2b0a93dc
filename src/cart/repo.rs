use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{Cart, CartItem, CartStatus};
use crate::error::is_unique_violation;

/// Row shape: the item list lives in a JSONB column, so every mutation is
/// a whole-document replace rather than a per-line patch.
#[derive(Debug, FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    items: Json<Vec<CartItem>>,
    total_amount: Decimal,
    total_items: i32,
    status: String,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<CartRow> for Cart {
    type Error = anyhow::Error;

    fn try_from(r: CartRow) -> anyhow::Result<Cart> {
        Ok(Cart {
            id: r.id,
            user_id: r.user_id,
            items: r.items.0,
            total_amount: r.total_amount,
            total_items: r.total_items,
            status: CartStatus::parse(&r.status)?,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub async fn find_active(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Cart>> {
    let row = sqlx::query_as::<_, CartRow>(
        r#"
        SELECT id, user_id, items, total_amount, total_items, status, version, created_at, updated_at
        FROM carts
        WHERE user_id = $1 AND status = 'active'
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    row.map(Cart::try_from).transpose()
}

/// Persist a brand-new cart. Returns false when another request created
/// the user's active cart first (partial unique index), in which case the
/// caller re-reads and retries.
pub async fn insert(db: &PgPool, cart: &Cart) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO carts (id, user_id, items, total_amount, total_items, status, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(cart.id)
    .bind(cart.user_id)
    .bind(Json(&cart.items))
    .bind(cart.total_amount)
    .bind(cart.total_items)
    .bind(cart.status.as_str())
    .bind(cart.version)
    .bind(cart.created_at)
    .bind(cart.updated_at)
    .execute(db)
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Whole-document replace, conditional on the version the cart was read
/// at. Returns false on a lost race; the caller retries the full
/// read-modify-write.
pub async fn replace(db: &PgPool, cart: &Cart) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE carts
        SET items = $1, total_amount = $2, total_items = $3, status = $4,
            updated_at = $5, version = version + 1
        WHERE id = $6 AND version = $7
        "#,
    )
    .bind(Json(&cart.items))
    .bind(cart.total_amount)
    .bind(cart.total_items)
    .bind(cart.status.as_str())
    .bind(cart.updated_at)
    .bind(cart.id)
    .bind(cart.version)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}
