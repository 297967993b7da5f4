//! OpenSASE Storefront
//!
//! Cart, wishlist and order service for the OpenSASE storefront.
//!
//! ## Features
//! - Variant resolution over a sparse size × color matrix
//! - Side-effect-free stock checks
//! - Per-user carts with one line per (product, variant, product type)
//! - Wishlists with all-or-nothing move to cart
//! - Order groups with price snapshots, cancellation and restocking

pub mod api;
pub mod config;
pub mod domain;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError, ProductError, WishlistError};
use crate::domain::value_objects::QuantityError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Out of stock")]
    OutOfStock,

    #[error("Size and color combination is not available")]
    InvalidCombination,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EcommerceError {
    pub fn product_not_found(id: impl std::fmt::Display) -> Self { Self::NotFound(format!("Product {id}")) }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(err: sqlx::Error) -> Self {
        // 23505: unique_violation, two writers raced on the same key
        match err.as_database_error().and_then(|e| e.code()) {
            Some(code) if code == "23505" => Self::Conflict("concurrent update, please retry".to_string()),
            _ => Self::Database(err),
        }
    }
}

impl From<ProductError> for EcommerceError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::VariantNotFound(id) => Self::NotFound(format!("Variant {id}")),
            ProductError::InsufficientStock => Self::OutOfStock,
            ProductError::VariantRequired | ProductError::VariantNotOffered => Self::InvalidCombination,
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<CartError> for EcommerceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::LineNotFound(id) => Self::NotFound(format!("Cart item {id}")),
            CartError::Quantity(_) => Self::InvalidQuantity,
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<WishlistError> for EcommerceError {
    fn from(err: WishlistError) -> Self {
        match err { WishlistError::ItemNotFound(id) => Self::NotFound(format!("Wishlist item {id}")) }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::ItemNotFound(id) => Self::NotFound(format!("Order item {id}")),
            OrderError::VariantNotFound(id) => Self::NotFound(format!("Variant {id}")),
            OrderError::AlreadyCancelled => Self::Conflict(err.to_string()),
            OrderError::UnknownStatus(_) => Self::Storage(err.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<QuantityError> for EcommerceError {
    fn from(_: QuantityError) -> Self { Self::InvalidQuantity }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
