//! In-process store, used for development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{Page, Paginated, Store};
use crate::domain::aggregates::{
    Cart, CartLine, NewCartLine, OrderGroup, Product, QuantityChange, QuantityOutcome, Restock, Wishlist, WishlistItem,
};
use crate::domain::value_objects::{Pricing, ProductType};
use crate::{EcommerceError, Result};

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    wishlists: HashMap<Uuid, Wishlist>,
    orders: Vec<OrderGroup>,
}

/// All state sits behind one lock; each call takes it once.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn apply_restock(products: &mut HashMap<Uuid, Product>, restock: &[Restock]) {
    for r in restock {
        let applied = products.get_mut(&r.product_id).map(|p| p.add_stock(r.variant_id, r.quantity));
        if !matches!(applied, Some(Ok(()))) {
            warn!(product_id = %r.product_id, variant_id = ?r.variant_id, "restock skipped, product or variant gone");
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut s = self.state.write().await;
        if s.products.values().any(|p| p.slug() == product.slug()) {
            return Err(EcommerceError::Conflict(format!("slug '{}' already in use", product.slug())));
        }
        s.products.insert(product.id(), product.clone());
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn find_product(&self, id_or_slug: &str) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.values().find(|p| p.matches(id_or_slug)).cloned())
    }

    async fn update_pricing(&self, product_id: Uuid, variant_id: Option<Uuid>, pricing: Pricing) -> Result<Product> {
        let mut s = self.state.write().await;
        let product = s.products.get_mut(&product_id).ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        product.update_pricing(variant_id, pricing)?;
        Ok(product.clone())
    }

    async fn set_stock(&self, product_id: Uuid, variant_id: Option<Uuid>, stock: u32) -> Result<Product> {
        let mut s = self.state.write().await;
        let product = s.products.get_mut(&product_id).ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        product.set_stock(variant_id, stock)?;
        Ok(product.clone())
    }

    async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        Ok(self.state.read().await.carts.get(&user_id).cloned().unwrap_or_else(|| Cart::new(user_id)))
    }

    async fn add_cart_line(&self, user_id: Uuid, line: NewCartLine) -> Result<CartLine> {
        let mut s = self.state.write().await;
        Ok(s.carts.entry(user_id).or_insert_with(|| Cart::new(user_id)).add(line).clone())
    }

    async fn change_cart_quantity(&self, user_id: Uuid, line_id: Uuid, change: QuantityChange) -> Result<QuantityOutcome> {
        let mut s = self.state.write().await;
        let cart = s.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        Ok(cart.change_quantity(line_id, change)?)
    }

    async fn change_cart_variant(&self, user_id: Uuid, line_id: Uuid, variant_id: Option<Uuid>) -> Result<CartLine> {
        let mut s = self.state.write().await;
        let cart = s.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        Ok(cart.change_variant(line_id, variant_id)?)
    }

    async fn set_cart_rent_days(&self, user_id: Uuid, line_id: Uuid, rent_days: Option<u32>) -> Result<CartLine> {
        let mut s = self.state.write().await;
        let cart = s.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        Ok(cart.set_rent_days(line_id, rent_days)?)
    }

    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        Ok(s.carts.get_mut(&user_id).and_then(|c| c.remove(line_id)).is_some())
    }

    async fn empty_cart(&self, user_id: Uuid) -> Result<usize> {
        let mut s = self.state.write().await;
        Ok(s.carts.get_mut(&user_id).map(Cart::clear).unwrap_or(0))
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist> {
        Ok(self.state.read().await.wishlists.get(&user_id).cloned().unwrap_or_else(|| Wishlist::new(user_id)))
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        let mut s = self.state.write().await;
        Ok(s.wishlists.entry(user_id).or_insert_with(|| Wishlist::new(user_id)).add(product_id, variant_id).clone())
    }

    async fn change_wishlist_variant(&self, user_id: Uuid, item_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        let mut s = self.state.write().await;
        let list = s.wishlists.entry(user_id).or_insert_with(|| Wishlist::new(user_id));
        Ok(list.change_variant(item_id, variant_id)?)
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        Ok(s.wishlists.get_mut(&user_id).and_then(|w| w.remove(item_id)).is_some())
    }

    async fn move_to_cart(&self, user_id: Uuid, item_id: Uuid, line: NewCartLine) -> Result<CartLine> {
        let mut s = self.state.write().await;
        let State { carts, wishlists, .. } = &mut *s;
        let list = wishlists.get_mut(&user_id)
            .filter(|w| w.item(item_id).is_some())
            .ok_or_else(|| EcommerceError::NotFound(format!("Wishlist item {item_id}")))?;
        let added = carts.entry(user_id).or_insert_with(|| Cart::new(user_id)).add(line).clone();
        list.remove(item_id);
        Ok(added)
    }

    async fn place_order(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<OrderGroup> {
        let mut s = self.state.write().await;
        let State { products, carts, orders, .. } = &mut *s;
        let cart = carts.get_mut(&user_id).ok_or_else(|| EcommerceError::NotFound("Cart items".to_string()))?;
        let lines = line_ids.iter()
            .map(|id| cart.line(*id).cloned().ok_or_else(|| EcommerceError::NotFound(format!("Cart item {id}"))))
            .collect::<Result<Vec<CartLine>>>()?;

        // stage stock changes on copies so a failure leaves nothing touched
        let mut staged: HashMap<Uuid, Product> = HashMap::new();
        for line in &lines {
            if !staged.contains_key(&line.product_id) {
                let product = products.get(&line.product_id).ok_or_else(|| EcommerceError::product_not_found(line.product_id))?;
                staged.insert(line.product_id, product.clone());
            }
            if let Some(product) = staged.get_mut(&line.product_id) {
                product.remove_stock(line.variant_id, line.quantity.value())?;
            }
        }
        let pairs = lines.iter()
            .map(|l| staged.get(&l.product_id).map(|p| (l.clone(), p)).ok_or_else(|| EcommerceError::product_not_found(l.product_id)))
            .collect::<Result<Vec<_>>>()?;
        let group = OrderGroup::assemble(user_id, &pairs)?;
        drop(pairs);

        cart.take(line_ids)?;
        products.extend(staged);
        orders.push(group.clone());
        Ok(group)
    }

    async fn order_groups(&self, user_id: Uuid, product_type: ProductType, page: Page) -> Result<Paginated<OrderGroup>> {
        let s = self.state.read().await;
        let mut groups: Vec<&OrderGroup> = s.orders.iter()
            .filter(|g| g.user_id() == user_id && g.product_type() == product_type)
            .collect();
        groups.sort_by_key(|g| std::cmp::Reverse(g.created_at()));
        let total = groups.len() as u64;
        let data = groups.into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(Paginated { data, total, page: page.page, limit: page.limit })
    }

    async fn order_group(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<OrderGroup>> {
        let s = self.state.read().await;
        Ok(s.orders.iter().find(|g| g.id() == group_id && g.user_id() == user_id).cloned())
    }

    async fn cancel_order(&self, user_id: Uuid, group_id: Uuid) -> Result<OrderGroup> {
        let mut s = self.state.write().await;
        let State { products, orders, .. } = &mut *s;
        let group = orders.iter_mut()
            .find(|g| g.id() == group_id && g.user_id() == user_id)
            .ok_or_else(|| EcommerceError::NotFound(format!("Order group {group_id}")))?;
        let restock = group.cancel()?;
        apply_restock(products, &restock);
        Ok(group.clone())
    }

    async fn cancel_order_item(&self, user_id: Uuid, item_id: Uuid) -> Result<OrderGroup> {
        let mut s = self.state.write().await;
        let State { products, orders, .. } = &mut *s;
        let group = orders.iter_mut()
            .find(|g| g.user_id() == user_id && g.item(item_id).is_some())
            .ok_or_else(|| EcommerceError::NotFound(format!("Order item {item_id}")))?;
        let restock = group.cancel_item(item_id)?;
        apply_restock(products, &[restock]);
        Ok(group.clone())
    }
}
