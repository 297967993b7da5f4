//! Cart Aggregate
//!
//! Lines are keyed by (product, variant, product type), so a user's cart can
//! never hold two lines for the same purchase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::{ProductType, Quantity, QuantityError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_type: ProductType,
}

impl LineKey {
    pub fn new(product_id: Uuid, variant_id: Option<Uuid>, product_type: ProductType) -> Self {
        Self { product_id, variant_id, product_type }
    }
}

/// Stable text form, used as the unique column in storage.
impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "{}:{}:{}", self.product_id, v, self.product_type),
            None => write!(f, "{}:-:{}", self.product_id, self.product_type),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_type: ProductType,
    pub quantity: Quantity,
    pub rent_days: Option<u32>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn key(&self) -> LineKey { LineKey::new(self.product_id, self.variant_id, self.product_type) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_type: ProductType,
    pub quantity: Quantity,
    pub rent_days: Option<u32>,
}

impl NewCartLine {
    pub fn key(&self) -> LineKey { LineKey::new(self.product_id, self.variant_id, self.product_type) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantityChange {
    /// Zero removes the line.
    Set(u32),
    Increment,
    /// Never goes below one.
    Decrement,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "line", rename_all = "lowercase")]
pub enum QuantityOutcome {
    Updated(CartLine),
    Removed(CartLine),
}

#[derive(Clone, Debug, Default)]
pub struct Cart {
    user_id: Uuid,
    lines: BTreeMap<LineKey, CartLine>,
    index: HashMap<Uuid, LineKey>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, lines: BTreeMap::new(), index: HashMap::new() }
    }

    /// Rebuilds a cart from stored lines. Lines sharing a key are folded into the first.
    pub fn from_lines(user_id: Uuid, lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new(user_id);
        for line in lines {
            match cart.lines.get_mut(&line.key()) {
                Some(existing) => existing.quantity = existing.quantity.add(line.quantity),
                None => { cart.index.insert(line.id, line.key()); cart.lines.insert(line.key(), line); }
            }
        }
        cart
    }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> { self.lines.values() }
    pub fn len(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, id: Uuid) -> Option<&CartLine> { self.index.get(&id).and_then(|k| self.lines.get(k)) }
    pub fn line_by_key(&self, key: &LineKey) -> Option<&CartLine> { self.lines.get(key) }

    /// Adds to the line for this purchase, creating it on first add.
    pub fn add(&mut self, new: NewCartLine) -> &CartLine {
        let now = Utc::now();
        let key = new.key();
        match self.lines.entry(key) {
            Entry::Occupied(slot) => {
                let line = slot.into_mut();
                line.quantity = line.quantity.add(new.quantity);
                if new.rent_days.is_some() { line.rent_days = new.rent_days; }
                line.updated_at = now;
                line
            }
            Entry::Vacant(slot) => {
                let line = CartLine {
                    id: Uuid::new_v4(), product_id: new.product_id, variant_id: new.variant_id,
                    product_type: new.product_type, quantity: new.quantity, rent_days: new.rent_days,
                    added_at: now, updated_at: now,
                };
                self.index.insert(line.id, key);
                slot.insert(line)
            }
        }
    }

    pub fn change_quantity(&mut self, id: Uuid, change: QuantityChange) -> Result<QuantityOutcome, CartError> {
        if change == QuantityChange::Set(0) {
            return self.remove(id).map(QuantityOutcome::Removed).ok_or(CartError::LineNotFound(id));
        }
        let key = *self.index.get(&id).ok_or(CartError::LineNotFound(id))?;
        let line = self.lines.get_mut(&key).ok_or(CartError::LineNotFound(id))?;
        line.quantity = match change {
            QuantityChange::Set(n) => Quantity::new(n).map_err(CartError::Quantity)?,
            QuantityChange::Increment => line.quantity.increment(),
            QuantityChange::Decrement => line.quantity.decrement(),
        };
        line.updated_at = Utc::now();
        Ok(QuantityOutcome::Updated(line.clone()))
    }

    /// Moves a line to another variant. If the cart already holds that
    /// variant the two lines merge and the other line's id survives.
    pub fn change_variant(&mut self, id: Uuid, variant_id: Option<Uuid>) -> Result<CartLine, CartError> {
        let old_key = *self.index.get(&id).ok_or(CartError::LineNotFound(id))?;
        let new_key = LineKey { variant_id, ..old_key };
        if new_key == old_key {
            return self.lines.get(&old_key).cloned().ok_or(CartError::LineNotFound(id));
        }
        let mut line = self.lines.remove(&old_key).ok_or(CartError::LineNotFound(id))?;
        self.index.remove(&id);
        let now = Utc::now();
        let merged = match self.lines.get_mut(&new_key) {
            Some(target) => {
                target.quantity = target.quantity.add(line.quantity);
                target.updated_at = now;
                target.clone()
            }
            None => {
                line.variant_id = variant_id;
                line.updated_at = now;
                self.index.insert(line.id, new_key);
                self.lines.insert(new_key, line.clone());
                line
            }
        };
        Ok(merged)
    }

    pub fn set_rent_days(&mut self, id: Uuid, rent_days: Option<u32>) -> Result<CartLine, CartError> {
        let key = *self.index.get(&id).ok_or(CartError::LineNotFound(id))?;
        let line = self.lines.get_mut(&key).ok_or(CartError::LineNotFound(id))?;
        if line.product_type == ProductType::Buy && rent_days.is_some() { return Err(CartError::RentDaysOnPurchase); }
        line.rent_days = rent_days;
        line.updated_at = Utc::now();
        Ok(line.clone())
    }

    /// Removing an unknown id is not an error.
    pub fn remove(&mut self, id: Uuid) -> Option<CartLine> {
        let key = self.index.remove(&id)?;
        self.lines.remove(&key)
    }

    /// Removes exactly the given lines, or none of them if any is missing.
    pub fn take(&mut self, ids: &[Uuid]) -> Result<Vec<CartLine>, CartError> {
        if let Some(missing) = ids.iter().find(|id| !self.index.contains_key(id)) {
            return Err(CartError::LineNotFound(*missing));
        }
        Ok(ids.iter().filter_map(|id| self.remove(*id)).collect())
    }

    pub fn clear(&mut self) -> usize {
        let n = self.lines.len();
        self.lines.clear();
        self.index.clear();
        n
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { LineNotFound(Uuid), RentDaysOnPurchase, Quantity(QuantityError) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineNotFound(id) => write!(f, "Cart item {id} not found"),
            Self::RentDaysOnPurchase => write!(f, "Rent days only apply to rental items"),
            Self::Quantity(e) => write!(f, "{e}"),
        }
    }
}
