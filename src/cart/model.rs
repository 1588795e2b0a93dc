use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::catalog::repo::Product;
use crate::error::ApiError;

/// One cart line. Name, image and unit price are snapshots taken when the
/// line was first added; they do not track later catalog edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i32,
    pub price_at_time: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Abandoned,
    Converted,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Converted => "converted",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "active" => Ok(CartStatus::Active),
            "abandoned" => Ok(CartStatus::Abandoned),
            "converted" => Ok(CartStatus::Converted),
            other => anyhow::bail!("unknown cart status {other:?}"),
        }
    }
}

/// What the engine needs from the catalog at mutation time.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub stock: i32,
}

impl From<&Product> for ProductSnapshot {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            image_url: p.image_url.clone(),
            price: p.price,
            stock: p.stock,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    QuantityNotPositive,
    #[error("Quantity cannot be negative")]
    NegativeQuantity,
    #[error("Item not found in cart")]
    ItemNotFound,
    #[error("insufficient stock, {available} available")]
    InsufficientStock { available: i32 },
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::QuantityNotPositive | CartError::NegativeQuantity => {
                ApiError::InvalidInput(e.to_string())
            }
            CartError::ItemNotFound => ApiError::NotFound("Item not found in cart".into()),
            CartError::InsufficientStock { available } => {
                ApiError::InsufficientStock { available }
            }
        }
    }
}

/// A user's active cart. Totals are derived state: they are recomputed in
/// full from the item list after every mutation, never patched
/// incrementally. `version` backs the optimistic replace in the repo.
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_amount: Decimal,
    pub total_items: i32,
    pub status: CartStatus,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Cart {
    pub fn new(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            total_items: 0,
            status: CartStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add `quantity` of a product. An existing line keeps its original
    /// price/name/image snapshot and only grows; a new line snapshots the
    /// product as it is right now.
    ///
    /// The stock check is point-in-time only: nothing is reserved, and
    /// another cart may drain the stock after this returns.
    pub fn add_item(
        &mut self,
        product: &ProductSnapshot,
        quantity: i32,
        now: OffsetDateTime,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            return Err(CartError::QuantityNotPositive);
        }

        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(line) => {
                // Remaining allowance, not raw stock, drives the error.
                let remaining = product.stock - line.quantity;
                if remaining < quantity {
                    return Err(CartError::InsufficientStock {
                        available: remaining.max(0),
                    });
                }
                line.quantity += quantity;
                line.added_at = now;
            }
            None => {
                if product.stock < quantity {
                    return Err(CartError::InsufficientStock {
                        available: product.stock,
                    });
                }
                self.items.push(CartItem {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    product_image: product.image_url.clone(),
                    quantity,
                    price_at_time: product.price,
                    added_at: now,
                });
            }
        }

        self.touch(now);
        Ok(())
    }

    /// Set a line to an absolute quantity (> 0), re-validating stock.
    /// A quantity of zero is handled by `remove_item` at the call site.
    pub fn set_item_quantity(
        &mut self,
        product: &ProductSnapshot,
        quantity: i32,
        now: OffsetDateTime,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            return Err(CartError::QuantityNotPositive);
        }
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product.id)
            .ok_or(CartError::ItemNotFound)?;
        if product.stock < quantity {
            return Err(CartError::InsufficientStock {
                available: product.stock,
            });
        }
        line.quantity = quantity;
        line.added_at = now;
        self.touch(now);
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid, now: OffsetDateTime) -> Result<(), CartError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound)?;
        self.items.remove(idx);
        self.touch(now);
        Ok(())
    }

    /// Empty the cart in place. The document survives and stays active.
    pub fn clear(&mut self, now: OffsetDateTime) {
        self.items.clear();
        self.touch(now);
    }

    pub fn recompute_totals(&mut self) {
        self.total_amount = self
            .items
            .iter()
            .map(|i| i.price_at_time * Decimal::from(i.quantity))
            .sum();
        self.total_items = self.items.iter().map(|i| i.quantity).sum();
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.recompute_totals();
        self.updated_at = now;
    }
}
