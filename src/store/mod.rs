//! Persistence.
//!
//! Every method is one atomic unit: either all of its writes land or none do.
//! `MemoryStore` gets this from a single lock, `PgStore` from transactions
//! and conditional updates.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, CartLine, NewCartLine, OrderGroup, Product, QuantityChange, QuantityOutcome, Wishlist, WishlistItem,
};
use crate::domain::value_objects::{Pricing, ProductType};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page { pub page: u32, pub limit: u32 }

impl Page {
    pub fn new(page: u32, limit: u32) -> Self { Self { page: page.max(1), limit: limit.clamp(1, 100) } }
    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> { pub data: Vec<T>, pub total: u64, pub page: u32, pub limit: u32 }

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // catalog
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_product(&self, id_or_slug: &str) -> Result<Option<Product>>;
    async fn update_pricing(&self, product_id: Uuid, variant_id: Option<Uuid>, pricing: Pricing) -> Result<Product>;
    async fn set_stock(&self, product_id: Uuid, variant_id: Option<Uuid>, stock: u32) -> Result<Product>;

    // cart
    async fn cart(&self, user_id: Uuid) -> Result<Cart>;
    /// Upserts on (product, variant, product type): an existing line grows.
    async fn add_cart_line(&self, user_id: Uuid, line: NewCartLine) -> Result<CartLine>;
    async fn change_cart_quantity(&self, user_id: Uuid, line_id: Uuid, change: QuantityChange) -> Result<QuantityOutcome>;
    async fn change_cart_variant(&self, user_id: Uuid, line_id: Uuid, variant_id: Option<Uuid>) -> Result<CartLine>;
    async fn set_cart_rent_days(&self, user_id: Uuid, line_id: Uuid, rent_days: Option<u32>) -> Result<CartLine>;
    /// Returns whether a line was removed.
    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool>;
    async fn empty_cart(&self, user_id: Uuid) -> Result<usize>;

    // wishlist
    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist>;
    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem>;
    async fn change_wishlist_variant(&self, user_id: Uuid, item_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem>;
    async fn remove_wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool>;
    /// Upserts the cart line and drops the wishlist item together.
    async fn move_to_cart(&self, user_id: Uuid, item_id: Uuid, line: NewCartLine) -> Result<CartLine>;

    // orders
    /// Decrements stock, records the group and removes exactly `line_ids` from the cart.
    async fn place_order(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<OrderGroup>;
    async fn order_groups(&self, user_id: Uuid, product_type: ProductType, page: Page) -> Result<Paginated<OrderGroup>>;
    async fn order_group(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<OrderGroup>>;
    async fn cancel_order(&self, user_id: Uuid, group_id: Uuid) -> Result<OrderGroup>;
    async fn cancel_order_item(&self, user_id: Uuid, item_id: Uuid) -> Result<OrderGroup>;
}
