//! Wishlist Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub added_at: DateTime<Utc>,
}

/// A user's saved products; at most one entry per (product, variant).
#[derive(Clone, Debug, Default)]
pub struct Wishlist {
    user_id: Uuid,
    items: Vec<WishlistItem>,
}

impl Wishlist {
    pub fn new(user_id: Uuid) -> Self { Self { user_id, items: vec![] } }

    pub fn from_items(user_id: Uuid, items: impl IntoIterator<Item = WishlistItem>) -> Self {
        let mut list = Self::new(user_id);
        for item in items {
            if list.find(item.product_id, item.variant_id).is_none() { list.items.push(item); }
        }
        list
    }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[WishlistItem] { &self.items }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item(&self, id: Uuid) -> Option<&WishlistItem> { self.items.iter().find(|i| i.id == id) }

    fn find(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<&WishlistItem> {
        self.items.iter().find(|i| i.product_id == product_id && i.variant_id == variant_id)
    }

    /// Returns the existing entry when the product is already saved.
    pub fn add(&mut self, product_id: Uuid, variant_id: Option<Uuid>) -> &WishlistItem {
        match self.items.iter().position(|i| i.product_id == product_id && i.variant_id == variant_id) {
            Some(pos) => &self.items[pos],
            None => {
                self.items.push(WishlistItem { id: Uuid::new_v4(), product_id, variant_id, added_at: Utc::now() });
                &self.items[self.items.len() - 1]
            }
        }
    }

    /// Changes the saved variant. Collapses into an existing entry for that variant.
    pub fn change_variant(&mut self, id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem, WishlistError> {
        let pos = self.items.iter().position(|i| i.id == id).ok_or(WishlistError::ItemNotFound(id))?;
        let product_id = self.items[pos].product_id;
        if let Some(existing) = self.items.iter().find(|i| i.id != id && i.product_id == product_id && i.variant_id == variant_id).cloned() {
            self.items.remove(pos);
            return Ok(existing);
        }
        self.items[pos].variant_id = variant_id;
        Ok(self.items[pos].clone())
    }

    /// Removing an unknown id is not an error.
    pub fn remove(&mut self, id: Uuid) -> Option<WishlistItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum WishlistError { ItemNotFound(Uuid) }
impl std::error::Error for WishlistError {}
impl std::fmt::Display for WishlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ItemNotFound(id) => write!(f, "Wishlist item {id} not found") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wishlist_dedup_and_remove() {
        let mut list = Wishlist::new(Uuid::new_v4());
        let p = Uuid::new_v4();
        let a = list.add(p, None).id;
        assert_eq!(list.add(p, None).id, a);
        list.add(p, Some(Uuid::new_v4()));
        assert_eq!(list.len(), 2);
        assert!(list.remove(a).is_some());
        assert!(list.remove(a).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_change_variant_collapses() {
        let mut list = Wishlist::new(Uuid::new_v4());
        let (p, v) = (Uuid::new_v4(), Uuid::new_v4());
        let plain = list.add(p, None).id;
        let with_variant = list.add(p, Some(v)).id;
        let kept = list.change_variant(plain, Some(v)).unwrap();
        assert_eq!(kept.id, with_variant);
        assert_eq!(list.len(), 1);
        assert_eq!(list.change_variant(plain, None), Err(WishlistError::ItemNotFound(plain)));
    }
}
