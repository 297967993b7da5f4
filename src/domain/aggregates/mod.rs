//! Aggregates module
pub mod product;
pub mod cart;
pub mod wishlist;
pub mod order;

pub use product::{NewProduct, NewVariant, Product, ProductError, Resolution, Variant, VariantMatrix};
pub use cart::{Cart, CartError, CartLine, LineKey, NewCartLine, QuantityChange, QuantityOutcome};
pub use wishlist::{Wishlist, WishlistError, WishlistItem};
pub use order::{OrderError, OrderGroup, OrderItem, OrderStatus, Restock};
