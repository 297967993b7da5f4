//! Domain events
//!
//! Every storefront mutation produces one event. The tags say which cached
//! views the event makes stale.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Cached read models an event can invalidate. `Catalog` covers every view
/// that embeds live product data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTag { Catalog, Cart, Wishlist }

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Cart(CartEvent),
    Wishlist(WishlistEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid },
    Repriced { product_id: Uuid, variant_id: Option<Uuid> },
    Restocked { product_id: Uuid, variant_id: Option<Uuid>, stock: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    LineAdded { user_id: Uuid, line_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32 },
    LineUpdated { user_id: Uuid, line_id: Uuid },
    LineRemoved { user_id: Uuid, line_id: Uuid },
    Emptied { user_id: Uuid, removed: usize },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WishlistEvent {
    ItemAdded { user_id: Uuid, item_id: Uuid, product_id: Uuid },
    ItemUpdated { user_id: Uuid, item_id: Uuid },
    ItemRemoved { user_id: Uuid, item_id: Uuid },
    MovedToCart { user_id: Uuid, item_id: Uuid, line_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { user_id: Uuid, order_group_id: Uuid, items: usize, total: Decimal },
    Cancelled { user_id: Uuid, order_group_id: Uuid },
    ItemCancelled { user_id: Uuid, order_group_id: Uuid, order_item_id: Uuid },
}

impl DomainEvent {
    /// The user whose views are affected; catalog events affect everyone.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Product(_) => None,
            Self::Cart(CartEvent::LineAdded { user_id, .. } | CartEvent::LineUpdated { user_id, .. }
                | CartEvent::LineRemoved { user_id, .. } | CartEvent::Emptied { user_id, .. }) => Some(*user_id),
            Self::Wishlist(WishlistEvent::ItemAdded { user_id, .. } | WishlistEvent::ItemUpdated { user_id, .. }
                | WishlistEvent::ItemRemoved { user_id, .. } | WishlistEvent::MovedToCart { user_id, .. }) => Some(*user_id),
            Self::Order(OrderEvent::Placed { user_id, .. } | OrderEvent::Cancelled { user_id, .. }
                | OrderEvent::ItemCancelled { user_id, .. }) => Some(*user_id),
        }
    }

    pub fn tags(&self) -> &'static [CacheTag] {
        match self {
            Self::Product(_) => &[CacheTag::Catalog],
            Self::Cart(_) => &[CacheTag::Cart],
            Self::Wishlist(WishlistEvent::MovedToCart { .. }) => &[CacheTag::Wishlist, CacheTag::Cart],
            Self::Wishlist(_) => &[CacheTag::Wishlist],
            // placing and cancelling move stock
            Self::Order(OrderEvent::Placed { .. }) => &[CacheTag::Catalog, CacheTag::Cart],
            Self::Order(_) => &[CacheTag::Catalog],
        }
    }

    /// Message subject, e.g. `storefront.cart.line_added`.
    pub fn subject(&self) -> String {
        let (stream, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Repriced { .. } => "repriced",
                ProductEvent::Restocked { .. } => "restocked",
            }),
            Self::Cart(e) => ("cart", match e {
                CartEvent::LineAdded { .. } => "line_added",
                CartEvent::LineUpdated { .. } => "line_updated",
                CartEvent::LineRemoved { .. } => "line_removed",
                CartEvent::Emptied { .. } => "emptied",
            }),
            Self::Wishlist(e) => ("wishlist", match e {
                WishlistEvent::ItemAdded { .. } => "item_added",
                WishlistEvent::ItemUpdated { .. } => "item_updated",
                WishlistEvent::ItemRemoved { .. } => "item_removed",
                WishlistEvent::MovedToCart { .. } => "moved_to_cart",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::ItemCancelled { .. } => "item_cancelled",
            }),
        };
        format!("storefront.{stream}.{name}")
    }
}
