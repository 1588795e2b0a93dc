use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{Cart, CartItem, CartStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_amount: Decimal,
    pub total_items: i32,
    pub status: CartStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Cart> for CartDto {
    fn from(c: Cart) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            items: c.items,
            total_amount: c.total_amount,
            total_items: c.total_items,
            status: c.status,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub message: String,
    pub cart: CartDto,
}

impl CartResponse {
    pub fn new(message: &str, cart: Cart) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            cart: cart.into(),
        }
    }
}
