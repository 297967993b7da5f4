//! Wishlist service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::cart::{prepare_line, LineRequest};
use super::Deps;
use crate::domain::aggregates::{CartLine, WishlistItem};
use crate::domain::events::{DomainEvent, WishlistEvent};
use crate::domain::value_objects::{Money, ProductType};
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistViewItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_price: Money,
    pub in_stock: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistView { pub items: Vec<WishlistViewItem> }

#[derive(Clone)]
pub struct WishlistService { deps: Deps }

impl WishlistService {
    pub(crate) fn new(deps: Deps) -> Self { Self { deps } }

    pub async fn view(&self, user_id: Uuid) -> Result<Arc<WishlistView>> {
        let caches = &self.deps.caches;
        if let Some(view) = caches.wishlists.get(&user_id) {
            return Ok(view);
        }
        let ticket = caches.wishlists.ticket(&user_id);
        let list = self.deps.store.wishlist(user_id).await?;
        let mut items = Vec::with_capacity(list.len());
        for item in list.items() {
            let Some(product) = self.deps.store.product(item.product_id).await? else {
                warn!(%user_id, item_id = %item.id, product_id = %item.product_id, "wishlist item points at a missing product");
                continue;
            };
            let variant = item.variant_id.and_then(|id| product.variant(id));
            items.push(WishlistViewItem {
                id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                slug: product.slug().to_string(),
                title: product.title().to_string(),
                size: variant.map(|v| v.size.clone()),
                color: variant.map(|v| v.color.clone()),
                unit_price: product.pricing_for(item.variant_id).unit_price().clone(),
                in_stock: product.in_stock(item.variant_id).unwrap_or(false),
                added_at: item.added_at,
            });
        }
        let view = Arc::new(WishlistView { items });
        caches.wishlists.insert(user_id, ticket, view.clone());
        Ok(view)
    }

    /// Adds a product (and optional variant). Adding it again returns the existing item.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        self.check_target(product_id, variant_id).await?;
        let item = self.deps.store.add_wishlist_item(user_id, product_id, variant_id).await?;
        info!(item_id = %item.id, "added to wishlist");
        self.deps.bus.publish(DomainEvent::Wishlist(WishlistEvent::ItemAdded { user_id, item_id: item.id, product_id })).await;
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn change_variant(&self, user_id: Uuid, item_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        let list = self.deps.store.wishlist(user_id).await?;
        let item = list.item(item_id).ok_or_else(|| EcommerceError::NotFound(format!("Wishlist item {item_id}")))?;
        self.check_target(item.product_id, variant_id).await?;
        let item = self.deps.store.change_wishlist_variant(user_id, item_id, variant_id).await?;
        self.deps.bus.publish(DomainEvent::Wishlist(WishlistEvent::ItemUpdated { user_id, item_id: item.id })).await;
        Ok(item)
    }

    /// Idempotent: removing an unknown item succeeds.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let removed = self.deps.store.remove_wishlist_item(user_id, item_id).await?;
        if removed {
            self.deps.bus.publish(DomainEvent::Wishlist(WishlistEvent::ItemRemoved { user_id, item_id })).await;
        }
        Ok(removed)
    }

    /// Moves an item into the cart. The item is only dropped once the cart
    /// accepted it; an out-of-stock product stays on the wishlist.
    #[instrument(skip(self))]
    pub async fn move_to_cart(
        &self, user_id: Uuid, item_id: Uuid, quantity: u32, product_type: ProductType, rent_days: Option<u32>,
    ) -> Result<CartLine> {
        let list = self.deps.store.wishlist(user_id).await?;
        let item = list.item(item_id).ok_or_else(|| EcommerceError::NotFound(format!("Wishlist item {item_id}")))?;
        let req = LineRequest { product_id: item.product_id, variant_id: item.variant_id, quantity, product_type, rent_days };
        let line = prepare_line(&self.deps, &req).await?;
        let line = self.deps.store.move_to_cart(user_id, item_id, line).await?;
        info!(line_id = %line.id, "wishlist item moved to cart");
        self.deps.bus.publish(DomainEvent::Wishlist(WishlistEvent::MovedToCart { user_id, item_id, line_id: line.id })).await;
        Ok(line)
    }

    async fn check_target(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Result<()> {
        let product = self.deps.store.product(product_id).await?
            .ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        product.check_selection(variant_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_shirt, seed_simple, services};

    #[tokio::test]
    async fn test_add_dedups() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let user = Uuid::new_v4();
        let small = shirt.variants()[0].id;
        let a = s.wishlist.add(user, shirt.id(), Some(small)).await.unwrap();
        let b = s.wishlist.add(user, shirt.id(), Some(small)).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(s.wishlist.view(user).await.unwrap().items.len(), 1);
        assert!(matches!(s.wishlist.add(user, Uuid::new_v4(), None).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_move_to_cart_out_of_stock_keeps_item() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let user = Uuid::new_v4();
        let medium = shirt.variants()[1].id;
        let item = s.wishlist.add(user, shirt.id(), Some(medium)).await.unwrap();

        let res = s.wishlist.move_to_cart(user, item.id, 1, ProductType::Buy, None).await;
        assert!(matches!(res, Err(EcommerceError::OutOfStock)));
        let view = s.wishlist.view(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert!(!view.items[0].in_stock);
        assert!(s.cart.view(user).await.unwrap().lines.is_empty());
    }

    #[tokio::test]
    async fn test_move_to_cart_moves() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 3).await;
        let user = Uuid::new_v4();
        let item = s.wishlist.add(user, mug.id(), None).await.unwrap();
        // warm both caches so the move has to invalidate them
        assert_eq!(s.wishlist.view(user).await.unwrap().items.len(), 1);
        assert!(s.cart.view(user).await.unwrap().lines.is_empty());

        let line = s.wishlist.move_to_cart(user, item.id, 2, ProductType::Buy, None).await.unwrap();
        assert_eq!(line.quantity.value(), 2);
        assert!(s.wishlist.view(user).await.unwrap().items.is_empty());
        assert_eq!(s.cart.view(user).await.unwrap().lines.len(), 1);
        assert!(matches!(
            s.wishlist.move_to_cart(user, item.id, 1, ProductType::Buy, None).await,
            Err(EcommerceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_variant_and_remove() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let (small, medium) = (shirt.variants()[0].id, shirt.variants()[1].id);
        let user = Uuid::new_v4();
        let item = s.wishlist.add(user, shirt.id(), Some(small)).await.unwrap();
        let moved = s.wishlist.change_variant(user, item.id, Some(medium)).await.unwrap();
        assert_eq!(moved.variant_id, Some(medium));
        assert!(matches!(s.wishlist.change_variant(user, item.id, None).await, Err(EcommerceError::InvalidCombination)));
        assert!(s.wishlist.remove(user, item.id).await.unwrap());
        assert!(!s.wishlist.remove(user, item.id).await.unwrap());
    }
}
