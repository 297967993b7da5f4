//! Order groups: checkout of selected cart lines, listing and cancellation.

use std::collections::HashSet;
use tracing::{info, instrument};
use uuid::Uuid;

use super::Deps;
use crate::domain::aggregates::{OrderGroup, OrderStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::ProductType;
use crate::store::{Page, Paginated};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct OrderService { deps: Deps }

impl OrderService {
    pub(crate) fn new(deps: Deps) -> Self { Self { deps } }

    /// Checks out exactly the given cart lines. On any failure the cart and
    /// stock are left as they were.
    #[instrument(skip(self, cart_line_ids), fields(lines = cart_line_ids.len()))]
    pub async fn place(&self, user_id: Uuid, cart_line_ids: &[Uuid]) -> Result<OrderGroup> {
        let mut seen = HashSet::with_capacity(cart_line_ids.len());
        let ids: Vec<Uuid> = cart_line_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Err(EcommerceError::Validation("cartItemIds must not be empty".to_string()));
        }
        let group = self.deps.store.place_order(user_id, &ids).await?;
        info!(order_group_id = %group.id(), total = %group.total(), "order placed");
        self.deps.bus.publish(DomainEvent::Order(OrderEvent::Placed {
            user_id, order_group_id: group.id(), items: group.items().len(), total: group.total().amount(),
        })).await;
        Ok(group)
    }

    pub async fn list(&self, user_id: Uuid, product_type: ProductType, page: Option<u32>, limit: Option<u32>) -> Result<Paginated<OrderGroup>> {
        let page = Page::new(page.unwrap_or(1), limit.unwrap_or(self.deps.settings.default_page_limit));
        self.deps.store.order_groups(user_id, product_type, page).await
    }

    pub async fn view(&self, user_id: Uuid, group_id: Uuid) -> Result<OrderGroup> {
        self.deps.store.order_group(user_id, group_id).await?
            .ok_or_else(|| EcommerceError::NotFound(format!("Order group {group_id}")))
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, group_id: Uuid) -> Result<OrderGroup> {
        let group = self.deps.store.cancel_order(user_id, group_id).await?;
        info!("order group cancelled");
        self.deps.bus.publish(DomainEvent::Order(OrderEvent::Cancelled { user_id, order_group_id: group_id })).await;
        Ok(group)
    }

    #[instrument(skip(self))]
    pub async fn cancel_item(&self, user_id: Uuid, item_id: Uuid) -> Result<OrderGroup> {
        let group = self.deps.store.cancel_order_item(user_id, item_id).await?;
        info!(order_group_id = %group.id(), group_cancelled = group.status() == OrderStatus::Cancelled, "order item cancelled");
        self.deps.bus.publish(DomainEvent::Order(OrderEvent::ItemCancelled {
            user_id, order_group_id: group.id(), order_item_id: item_id,
        })).await;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::pricing;
    use crate::services::testing::{seed_shirt, seed_simple, services, services_with};
    use crate::services::{LineRequest, Settings};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_prices_are_snapshotted() {
        let s = services();
        let hat = seed_simple(&s, "hat", 100, 5).await;
        let cap = seed_simple(&s, "cap", 50, 5).await;
        let user = Uuid::new_v4();
        let a = s.cart.add(user, LineRequest::buy(hat.id(), None, 2)).await.unwrap();
        let b = s.cart.add(user, LineRequest::buy(cap.id(), None, 1)).await.unwrap();

        let group = s.orders.place(user, &[a.id, b.id]).await.unwrap();
        s.catalog.reprice(hat.id(), None, pricing(120)).await.unwrap();
        s.catalog.reprice(cap.id(), None, pricing(60)).await.unwrap();

        let stored = s.orders.view(user, group.id()).await.unwrap();
        let prices: Vec<Decimal> = stored.items().iter().map(|i| i.unit_price.amount()).collect();
        assert_eq!(prices, vec![Decimal::new(100, 0), Decimal::new(50, 0)]);
        assert_eq!(stored.total().amount(), Decimal::new(250, 0));
    }

    #[tokio::test]
    async fn test_place_consumes_only_selected_lines_and_stock() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let mug = seed_simple(&s, "mug", 50, 5).await;
        let user = Uuid::new_v4();
        let small = shirt.variants()[0].id;
        let a = s.cart.add(user, LineRequest::buy(shirt.id(), Some(small), 2)).await.unwrap();
        let b = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();

        let group = s.orders.place(user, &[a.id, a.id]).await.unwrap();
        assert_eq!(group.items().len(), 1);
        assert_eq!(group.items()[0].size.as_deref(), Some("S"));
        let cart = s.cart.view(user).await.unwrap();
        assert_eq!(cart.lines.iter().map(|l| l.line.id).collect::<Vec<_>>(), vec![b.id]);
        assert_eq!(s.catalog.view("shirt").await.unwrap().product.variants()[0].stock, 1);
    }

    #[tokio::test]
    async fn test_failed_place_leaves_cart_and_stock() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 5).await;
        let bowl = seed_simple(&s, "bowl", 30, 1).await;
        let user = Uuid::new_v4();
        let a = s.cart.add(user, LineRequest::buy(mug.id(), None, 2)).await.unwrap();
        let b = s.cart.add(user, LineRequest::buy(bowl.id(), None, 3)).await.unwrap();

        assert!(matches!(s.orders.place(user, &[a.id, b.id]).await, Err(EcommerceError::OutOfStock)));
        assert!(matches!(s.orders.place(user, &[a.id, Uuid::new_v4()]).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(s.orders.place(user, &[]).await, Err(EcommerceError::Validation(_))));
        assert_eq!(s.cart.view(user).await.unwrap().lines.len(), 2);
        assert_eq!(s.catalog.view("mug").await.unwrap().product.stock(), 5);
    }

    #[tokio::test]
    async fn test_mixed_product_types_rejected() {
        let s = services_with(Settings { rentals_enabled: true, ..Settings::default() });
        let mug = seed_simple(&s, "mug", 50, 5).await;
        let user = Uuid::new_v4();
        let bought = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();
        let rented = s.cart.add(user, LineRequest {
            product_id: mug.id(), variant_id: None, quantity: 1, product_type: ProductType::Rent, rent_days: Some(2),
        }).await.unwrap();
        assert!(matches!(s.orders.place(user, &[bought.id, rented.id]).await, Err(EcommerceError::Validation(_))));
        assert_eq!(s.cart.view(user).await.unwrap().lines.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_item_rollup_and_restock() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 5).await;
        let bowl = seed_simple(&s, "bowl", 30, 5).await;
        let user = Uuid::new_v4();
        let a = s.cart.add(user, LineRequest::buy(mug.id(), None, 2)).await.unwrap();
        let b = s.cart.add(user, LineRequest::buy(bowl.id(), None, 1)).await.unwrap();
        let group = s.orders.place(user, &[a.id, b.id]).await.unwrap();
        let (first, second) = (group.items()[0].id, group.items()[1].id);

        let after = s.orders.cancel_item(user, first).await.unwrap();
        assert_eq!(after.item(first).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(after.item(second).unwrap().status, OrderStatus::Placed);
        assert_eq!(after.status(), OrderStatus::Placed);
        assert_eq!(s.catalog.view("mug").await.unwrap().product.stock(), 5);
        assert!(matches!(s.orders.cancel_item(user, first).await, Err(EcommerceError::Conflict(_))));

        let after = s.orders.cancel_item(user, second).await.unwrap();
        assert_eq!(after.status(), OrderStatus::Cancelled);
        assert!(matches!(s.orders.cancel(user, group.id()).await, Err(EcommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_group_and_list() {
        let s = services();
        let mug = seed_simple(&s, "mug", 50, 10).await;
        let user = Uuid::new_v4();
        let mut groups = Vec::new();
        for _ in 0..3 {
            let line = s.cart.add(user, LineRequest::buy(mug.id(), None, 1)).await.unwrap();
            groups.push(s.orders.place(user, &[line.id]).await.unwrap());
        }
        assert_eq!(s.catalog.view("mug").await.unwrap().product.stock(), 7);

        let cancelled = s.orders.cancel(user, groups[0].id()).await.unwrap();
        assert!(cancelled.items().iter().all(|i| i.status == OrderStatus::Cancelled));
        assert_eq!(s.catalog.view("mug").await.unwrap().product.stock(), 8);

        let page = s.orders.list(user, ProductType::Buy, Some(1), Some(2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert!(s.orders.list(user, ProductType::Rent, None, None).await.unwrap().data.is_empty());
        assert!(matches!(s.orders.view(Uuid::new_v4(), groups[0].id()).await, Err(EcommerceError::NotFound(_))));
    }
}
