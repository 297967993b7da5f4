//! Order Aggregate
//!
//! An order group is the set of cart lines checked out together. Prices,
//! titles and variant choices are copied at placement and never refreshed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, ProductType, Quantity};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderGroup {
    id: Uuid,
    user_id: Uuid,
    product_type: ProductType,
    status: OrderStatus,
    items: Vec<OrderItem>,
    subtotal: Money,
    shipping_total: Money,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub title: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_price: Money,
    pub shipping: Money,
    pub quantity: Quantity,
    pub line_total: Money,
    pub rent_days: Option<u32>,
    pub status: OrderStatus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Placed, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Placed => "placed", Self::Cancelled => "cancelled" }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(Self::Placed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Stock to hand back after a cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Restock { pub product_id: Uuid, pub variant_id: Option<Uuid>, pub quantity: u32 }

impl OrderItem {
    fn restock(&self) -> Restock {
        Restock { product_id: self.product_id, variant_id: self.variant_id, quantity: self.quantity.value() }
    }
}

impl OrderGroup {
    /// Snapshots each cart line against the product it was bought from.
    pub fn assemble(user_id: Uuid, lines: &[(CartLine, &Product)]) -> Result<Self, OrderError> {
        let (first, _) = lines.first().ok_or(OrderError::NoItems)?;
        let product_type = first.product_type;
        let mut items = Vec::with_capacity(lines.len());
        for (line, product) in lines {
            if line.product_type != product_type { return Err(OrderError::MixedProductTypes); }
            let variant = match line.variant_id {
                Some(id) => Some(product.variant(id).ok_or(OrderError::VariantNotFound(id))?),
                None => None,
            };
            let pricing = product.pricing_for(line.variant_id);
            let unit_price = pricing.unit_price().clone();
            items.push(OrderItem {
                id: Uuid::new_v4(),
                product_id: product.id(),
                variant_id: line.variant_id,
                title: product.title().to_string(),
                size: variant.map(|v| v.size.clone()),
                color: variant.map(|v| v.color.clone()),
                line_total: unit_price.multiply(line.quantity.value()),
                unit_price,
                shipping: pricing.shipping.clone(),
                quantity: line.quantity,
                rent_days: line.rent_days,
                status: OrderStatus::Placed,
            });
        }
        let now = Utc::now();
        Self::restore(Uuid::new_v4(), user_id, product_type, OrderStatus::Placed, items, now, now)
    }

    /// Rebuilds a stored group, recomputing its totals from the item snapshots.
    pub fn restore(
        id: Uuid, user_id: Uuid, product_type: ProductType, status: OrderStatus, items: Vec<OrderItem>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let first = items.first().ok_or(OrderError::NoItems)?;
        let currency = first.unit_price.currency().to_string();
        let mut subtotal = Money::zero(&currency);
        let mut shipping_total = Money::zero(&currency);
        for item in &items {
            subtotal = subtotal.add(&item.line_total).map_err(|_| OrderError::CurrencyMismatch)?;
            shipping_total = shipping_total.add(&item.shipping).map_err(|_| OrderError::CurrencyMismatch)?;
        }
        let total = subtotal.add(&shipping_total).map_err(|_| OrderError::CurrencyMismatch)?;
        Ok(Self { id, user_id, product_type, status, items, subtotal, shipping_total, total, created_at, updated_at })
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn product_type(&self) -> ProductType { self.product_type }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn item(&self, id: Uuid) -> Option<&OrderItem> { self.items.iter().find(|i| i.id == id) }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping_total(&self) -> &Money { &self.shipping_total }
    pub fn total(&self) -> &Money { &self.total }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Cancels the group and every item still placed.
    pub fn cancel(&mut self) -> Result<Vec<Restock>, OrderError> {
        if self.status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        let mut restock = Vec::new();
        for item in self.items.iter_mut().filter(|i| i.status == OrderStatus::Placed) {
            item.status = OrderStatus::Cancelled;
            restock.push(item.restock());
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(restock)
    }

    /// Cancels one item. The group follows once no item is left placed.
    pub fn cancel_item(&mut self, item_id: Uuid) -> Result<Restock, OrderError> {
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(OrderError::ItemNotFound(item_id))?;
        if item.status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        item.status = OrderStatus::Cancelled;
        let restock = item.restock();
        if self.items.iter().all(|i| i.status == OrderStatus::Cancelled) { self.status = OrderStatus::Cancelled; }
        self.touch();
        Ok(restock)
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, MixedProductTypes, CurrencyMismatch, VariantNotFound(Uuid), ItemNotFound(Uuid), AlreadyCancelled, UnknownStatus(String) }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::MixedProductTypes => write!(f, "Bought and rented items must be ordered separately"),
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::VariantNotFound(id) => write!(f, "Variant {id} no longer exists"),
            Self::ItemNotFound(id) => write!(f, "Order item {id} not found"),
            Self::AlreadyCancelled => write!(f, "Already cancelled"),
            Self::UnknownStatus(s) => write!(f, "Unknown order status '{s}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::{NewProduct, tests::pricing};
    use rust_decimal::Decimal;

    fn simple(title: &str, price: i64) -> Product {
        Product::create(NewProduct {
            slug: title.to_lowercase(), title: title.into(), category_id: None, is_variant_available: false,
            pricing: pricing(price), stock: 10, variants: vec![],
        }).unwrap()
    }

    fn line(product: &Product, qty: u32) -> CartLine {
        let now = Utc::now();
        CartLine {
            id: Uuid::new_v4(), product_id: product.id(), variant_id: None, product_type: ProductType::Buy,
            quantity: Quantity::new(qty).unwrap(), rent_days: None, added_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_snapshot_survives_repricing() {
        let mut a = simple("Lamp", 100);
        let mut b = simple("Rug", 50);
        let group = OrderGroup::assemble(Uuid::new_v4(), &[(line(&a, 2), &a), (line(&b, 1), &b)]).unwrap();
        a.update_pricing(None, pricing(120)).unwrap();
        b.update_pricing(None, pricing(60)).unwrap();
        assert_eq!(group.items()[0].unit_price.amount(), Decimal::new(100, 0));
        assert_eq!(group.items()[1].unit_price.amount(), Decimal::new(50, 0));
        assert_eq!(group.subtotal().amount(), Decimal::new(250, 0));
    }

    #[test]
    fn test_cancel_item_rollup() {
        let a = simple("Lamp", 100);
        let b = simple("Rug", 50);
        let mut group = OrderGroup::assemble(Uuid::new_v4(), &[(line(&a, 2), &a), (line(&b, 1), &b)]).unwrap();
        let (first, second) = (group.items()[0].id, group.items()[1].id);
        let restock = group.cancel_item(first).unwrap();
        assert_eq!(restock.quantity, 2);
        assert_eq!(group.item(first).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(group.item(second).unwrap().status, OrderStatus::Placed);
        assert_eq!(group.status(), OrderStatus::Placed);
        assert_eq!(group.cancel_item(first), Err(OrderError::AlreadyCancelled));
        group.cancel_item(second).unwrap();
        assert_eq!(group.status(), OrderStatus::Cancelled);
        assert_eq!(group.cancel(), Err(OrderError::AlreadyCancelled));
    }

    #[test]
    fn test_cancel_group_restocks_only_placed_items() {
        let a = simple("Lamp", 100);
        let b = simple("Rug", 50);
        let mut group = OrderGroup::assemble(Uuid::new_v4(), &[(line(&a, 2), &a), (line(&b, 1), &b)]).unwrap();
        let first = group.items()[0].id;
        group.cancel_item(first).unwrap();
        let restock = group.cancel().unwrap();
        assert_eq!(restock, vec![Restock { product_id: b.id(), variant_id: None, quantity: 1 }]);
        assert!(group.items().iter().all(|i| i.status == OrderStatus::Cancelled));
    }

    #[test]
    fn test_assemble_rejects_empty_and_mixed() {
        assert_eq!(OrderGroup::assemble(Uuid::new_v4(), &[]).unwrap_err(), OrderError::NoItems);
        let a = simple("Lamp", 100);
        let rented = CartLine { product_type: ProductType::Rent, ..line(&a, 1) };
        assert_eq!(OrderGroup::assemble(Uuid::new_v4(), &[(line(&a, 1), &a), (rented, &a)]).unwrap_err(), OrderError::MixedProductTypes);
    }
}
