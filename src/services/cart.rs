//! Cart service.
//!
//! Adds are checked against the catalog before the store upserts the line,
//! so a failed check never writes anything.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Deps;
use crate::domain::aggregates::{CartLine, NewCartLine, Product, QuantityChange, QuantityOutcome};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{Money, ProductType, Quantity};
use crate::{EcommerceError, Result};

/// What a buyer asks to put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub product_type: ProductType,
    pub rent_days: Option<u32>,
}

impl LineRequest {
    pub fn buy(product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Self {
        Self { product_id, variant_id, quantity, product_type: ProductType::Buy, rent_days: None }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartViewLine {
    #[serde(flatten)]
    pub line: CartLine,
    pub title: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_price: Money,
    pub shipping: Money,
    pub line_total: Money,
    pub in_stock: bool,
}

/// The cart priced at current catalog prices.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartViewLine>,
    pub item_count: u32,
    pub subtotal: Money,
    pub shipping_total: Money,
    pub total: Money,
}

/// Validates a line request against the catalog and rental rules.
pub(crate) async fn prepare_line(deps: &Deps, req: &LineRequest) -> Result<NewCartLine> {
    let quantity = Quantity::new(req.quantity)?;
    match (req.product_type, req.rent_days) {
        (ProductType::Rent, _) if !deps.settings.rentals_enabled => {
            return Err(EcommerceError::Validation("renting is not available".to_string()));
        }
        (ProductType::Buy, Some(_)) => {
            return Err(EcommerceError::Validation("rent days only apply to rentals".to_string()));
        }
        (ProductType::Rent, Some(0)) => {
            return Err(EcommerceError::Validation("rent days must be positive".to_string()));
        }
        _ => {}
    }
    let product = deps.store.product(req.product_id).await?
        .ok_or_else(|| EcommerceError::product_not_found(req.product_id))?;
    product.check_selection(req.variant_id)?;
    if !product.in_stock(req.variant_id)? {
        warn!(product_id = %req.product_id, variant_id = ?req.variant_id, "rejected, out of stock");
        return Err(EcommerceError::OutOfStock);
    }
    Ok(NewCartLine {
        product_id: req.product_id,
        variant_id: req.variant_id,
        product_type: req.product_type,
        quantity,
        rent_days: req.rent_days,
    })
}

#[derive(Clone)]
pub struct CartService { deps: Deps }

impl CartService {
    pub(crate) fn new(deps: Deps) -> Self { Self { deps } }

    pub async fn view(&self, user_id: Uuid) -> Result<Arc<CartView>> {
        let caches = &self.deps.caches;
        if let Some(view) = caches.carts.get(&user_id) {
            return Ok(view);
        }
        let ticket = caches.carts.ticket(&user_id);
        let cart = self.deps.store.cart(user_id).await?;
        let mut products: HashMap<Uuid, Option<Product>> = HashMap::new();
        for line in cart.lines() {
            if !products.contains_key(&line.product_id) {
                products.insert(line.product_id, self.deps.store.product(line.product_id).await?);
            }
        }

        let currency = self.deps.settings.currency.as_str();
        let mut view = CartView {
            lines: Vec::with_capacity(cart.len()),
            item_count: 0,
            subtotal: Money::zero(currency),
            shipping_total: Money::zero(currency),
            total: Money::zero(currency),
        };
        for line in cart.lines() {
            let Some(product) = products.get(&line.product_id).and_then(Option::as_ref) else {
                warn!(%user_id, line_id = %line.id, product_id = %line.product_id, "cart line points at a missing product");
                continue;
            };
            let variant = line.variant_id.and_then(|id| product.variant(id));
            let pricing = product.pricing_for(line.variant_id);
            let line_total = pricing.unit_price().multiply(line.quantity.value());
            view.subtotal = view.subtotal.add(&line_total).map_err(|e| EcommerceError::Storage(e.to_string()))?;
            view.shipping_total = view.shipping_total.add(&pricing.shipping).map_err(|e| EcommerceError::Storage(e.to_string()))?;
            view.item_count = view.item_count.saturating_add(line.quantity.value());
            view.lines.push(CartViewLine {
                line: line.clone(),
                title: product.title().to_string(),
                size: variant.map(|v| v.size.clone()),
                color: variant.map(|v| v.color.clone()),
                unit_price: pricing.unit_price().clone(),
                shipping: pricing.shipping.clone(),
                line_total,
                in_stock: product.in_stock(line.variant_id).unwrap_or(false),
            });
        }
        view.total = view.subtotal.add(&view.shipping_total).map_err(|e| EcommerceError::Storage(e.to_string()))?;

        let view = Arc::new(view);
        caches.carts.insert(user_id, ticket, view.clone());
        Ok(view)
    }

    /// Adds to the cart; the same (product, variant, product type) grows the existing line.
    #[instrument(skip(self, req), fields(product_id = %req.product_id, variant_id = ?req.variant_id))]
    pub async fn add(&self, user_id: Uuid, req: LineRequest) -> Result<CartLine> {
        let new = prepare_line(&self.deps, &req).await?;
        let added = new.quantity.value();
        let line = self.deps.store.add_cart_line(user_id, new).await?;
        info!(line_id = %line.id, quantity = line.quantity.value(), "added to cart");
        self.deps.bus.publish(DomainEvent::Cart(CartEvent::LineAdded {
            user_id, line_id: line.id, product_id: line.product_id, variant_id: line.variant_id, quantity: added,
        })).await;
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn change_quantity(&self, user_id: Uuid, line_id: Uuid, change: QuantityChange) -> Result<QuantityOutcome> {
        let outcome = self.deps.store.change_cart_quantity(user_id, line_id, change).await?;
        let event = match &outcome {
            QuantityOutcome::Updated(line) => {
                info!(quantity = line.quantity.value(), "cart quantity changed");
                CartEvent::LineUpdated { user_id, line_id }
            }
            QuantityOutcome::Removed(_) => {
                info!("cart line removed by zero quantity");
                CartEvent::LineRemoved { user_id, line_id }
            }
        };
        self.deps.bus.publish(DomainEvent::Cart(event)).await;
        Ok(outcome)
    }

    /// Swaps the variant of a line. The new variant must belong to the product and be in stock.
    #[instrument(skip(self))]
    pub async fn change_variant(&self, user_id: Uuid, line_id: Uuid, variant_id: Option<Uuid>) -> Result<CartLine> {
        let cart = self.deps.store.cart(user_id).await?;
        let line = cart.line(line_id).ok_or_else(|| EcommerceError::NotFound(format!("Cart item {line_id}")))?;
        let product = self.deps.store.product(line.product_id).await?
            .ok_or_else(|| EcommerceError::product_not_found(line.product_id))?;
        product.check_selection(variant_id)?;
        if !product.in_stock(variant_id)? {
            warn!("variant change rejected, out of stock");
            return Err(EcommerceError::OutOfStock);
        }
        let line = self.deps.store.change_cart_variant(user_id, line_id, variant_id).await?;
        if line.id != line_id {
            info!(merged_into = %line.id, "cart line merged into existing line");
            self.deps.bus.publish(DomainEvent::Cart(CartEvent::LineRemoved { user_id, line_id })).await;
        }
        self.deps.bus.publish(DomainEvent::Cart(CartEvent::LineUpdated { user_id, line_id: line.id })).await;
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn set_rent_days(&self, user_id: Uuid, line_id: Uuid, rent_days: Option<u32>) -> Result<CartLine> {
        if rent_days == Some(0) {
            return Err(EcommerceError::Validation("rent days must be positive".to_string()));
        }
        let line = self.deps.store.set_cart_rent_days(user_id, line_id, rent_days).await?;
        self.deps.bus.publish(DomainEvent::Cart(CartEvent::LineUpdated { user_id, line_id })).await;
        Ok(line)
    }

    /// Idempotent: removing an unknown line succeeds.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, line_id: Uuid) -> Result<bool> {
        let removed = self.deps.store.remove_cart_line(user_id, line_id).await?;
        if removed {
            info!("cart line removed");
            self.deps.bus.publish(DomainEvent::Cart(CartEvent::LineRemoved { user_id, line_id })).await;
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn empty(&self, user_id: Uuid) -> Result<usize> {
        let removed = self.deps.store.empty_cart(user_id).await?;
        info!(removed, "cart emptied");
        self.deps.bus.publish(DomainEvent::Cart(CartEvent::Emptied { user_id, removed })).await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_shirt, seed_simple, services, services_with};
    use crate::services::Settings;

    #[tokio::test]
    async fn test_repeated_add_grows_one_line() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let user = Uuid::new_v4();
        let small = shirt.variants()[0].id;

        let first = s.cart.add(user, LineRequest::buy(shirt.id(), Some(small), 1)).await.unwrap();
        let second = s.cart.add(user, LineRequest::buy(shirt.id(), Some(small), 1)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity.value(), 2);

        let view = s.cart.view(user).await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.item_count, 2);
        assert_eq!(view.subtotal.amount(), rust_decimal::Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn test_add_rejections_write_nothing() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let user = Uuid::new_v4();
        let medium = shirt.variants()[1].id;

        assert!(matches!(s.cart.add(user, LineRequest::buy(shirt.id(), Some(medium), 1)).await, Err(EcommerceError::OutOfStock)));
        assert!(matches!(s.cart.add(user, LineRequest::buy(shirt.id(), None, 1)).await, Err(EcommerceError::InvalidCombination)));
        assert!(matches!(s.cart.add(user, LineRequest::buy(shirt.id(), Some(Uuid::new_v4()), 1)).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(s.cart.add(user, LineRequest::buy(Uuid::new_v4(), None, 1)).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(s.cart.add(user, LineRequest::buy(shirt.id(), Some(shirt.variants()[0].id), 0)).await, Err(EcommerceError::InvalidQuantity)));
        assert!(s.cart.view(user).await.unwrap().lines.is_empty());
    }

    #[tokio::test]
    async fn test_rentals_follow_settings() {
        let mug_rent = |id| LineRequest { product_id: id, variant_id: None, quantity: 1, product_type: ProductType::Rent, rent_days: Some(3) };

        let s = services();
        let mug = seed_simple(&s, "mug", 50, 2).await;
        assert!(matches!(s.cart.add(Uuid::new_v4(), mug_rent(mug.id())).await, Err(EcommerceError::Validation(_))));

        let s = services_with(Settings { rentals_enabled: true, ..Settings::default() });
        let mug = seed_simple(&s, "mug", 50, 2).await;
        let user = Uuid::new_v4();
        let rented = s.cart.add(user, mug_rent(mug.id())).await.unwrap();
        let bought = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();
        assert_ne!(rented.id, bought.id);
        assert_eq!(s.cart.set_rent_days(user, rented.id, Some(5)).await.unwrap().rent_days, Some(5));
        assert!(matches!(s.cart.set_rent_days(user, bought.id, Some(5)).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_quantity_changes() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 10).await;
        let user = Uuid::new_v4();
        let line = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();

        let out = s.cart.change_quantity(user, line.id, QuantityChange::Decrement).await.unwrap();
        assert!(matches!(out, QuantityOutcome::Updated(ref l) if l.quantity.value() == 1));
        let out = s.cart.change_quantity(user, line.id, QuantityChange::Set(4)).await.unwrap();
        assert!(matches!(out, QuantityOutcome::Updated(ref l) if l.quantity.value() == 4));
        assert!(matches!(
            s.cart.change_quantity(user, line.id, QuantityChange::Set(1000)).await,
            Err(EcommerceError::InvalidQuantity)
        ));
        let grown = s.cart.add(user, LineRequest::buy(mug.id(), None, 999)).await.unwrap();
        assert_eq!(grown.quantity.value(), 999);
        let out = s.cart.change_quantity(user, line.id, QuantityChange::Set(4)).await.unwrap();
        assert!(matches!(out, QuantityOutcome::Updated(ref l) if l.quantity.value() == 4));
        let out = s.cart.change_quantity(user, line.id, QuantityChange::Set(0)).await.unwrap();
        assert!(matches!(out, QuantityOutcome::Removed(_)));
        assert!(matches!(
            s.cart.change_quantity(user, line.id, QuantityChange::Increment).await,
            Err(EcommerceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_variant_merges_and_checks_stock() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let (small, medium) = (shirt.variants()[0].id, shirt.variants()[1].id);
        s.catalog.restock(shirt.id(), Some(medium), 5).await.unwrap();
        let user = Uuid::new_v4();
        let a = s.cart.add(user, LineRequest::buy(shirt.id(), Some(small), 1)).await.unwrap();
        let b = s.cart.add(user, LineRequest::buy(shirt.id(), Some(medium), 2)).await.unwrap();

        let merged = s.cart.change_variant(user, b.id, Some(small)).await.unwrap();
        assert_eq!(merged.id, a.id);
        assert_eq!(merged.quantity.value(), 3);
        assert_eq!(s.cart.view(user).await.unwrap().lines.len(), 1);

        s.catalog.restock(shirt.id(), Some(medium), 0).await.unwrap();
        assert!(matches!(s.cart.change_variant(user, a.id, Some(medium)).await, Err(EcommerceError::OutOfStock)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 10).await;
        let user = Uuid::new_v4();
        let line = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();
        assert!(s.cart.remove(user, line.id).await.unwrap());
        assert!(!s.cart.remove(user, line.id).await.unwrap());
        assert!(!s.cart.remove(Uuid::new_v4(), Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_view_tracks_reprice_and_empty() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 10).await;
        let user = Uuid::new_v4();
        s.cart.add(user, LineRequest::buy(mug.id(), None, 2)).await.unwrap();
        assert_eq!(s.cart.view(user).await.unwrap().subtotal.amount(), rust_decimal::Decimal::new(100, 0));

        s.catalog.reprice(mug.id(), None, crate::domain::aggregates::product::tests::pricing(60)).await.unwrap();
        assert_eq!(s.cart.view(user).await.unwrap().subtotal.amount(), rust_decimal::Decimal::new(120, 0));

        assert_eq!(s.cart.empty(user).await.unwrap(), 1);
        assert!(s.cart.view(user).await.unwrap().lines.is_empty());
    }
}
