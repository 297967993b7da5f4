//! Application services
//!
//! Services validate requests against the catalog, call one atomic store
//! operation, then publish the resulting event.

pub mod cache;
pub mod cart;
pub mod catalog;
pub mod events;
pub mod orders;
pub mod wishlist;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::Store;

pub use cache::{Caches, ViewCache};
pub use cart::{CartService, CartView, CartViewLine, LineRequest};
pub use catalog::{CatalogService, ProductView, StockStatus};
pub use events::EventBus;
pub use orders::OrderService;
pub use wishlist::{WishlistService, WishlistView, WishlistViewItem};

/// Business settings the services need from the runtime config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rentals_enabled: bool,
    pub currency: String,
    pub default_page_limit: u32,
}

impl From<&AppConfig> for Settings {
    fn from(cfg: &AppConfig) -> Self {
        Self { rentals_enabled: cfg.rentals_enabled, currency: cfg.currency.clone(), default_page_limit: cfg.default_page_limit }
    }
}

impl Default for Settings {
    fn default() -> Self { Self { rentals_enabled: false, currency: "NGN".to_string(), default_page_limit: 10 } }
}

/// Shared handles every service holds.
#[derive(Clone)]
pub(crate) struct Deps {
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub caches: Arc<Caches>,
    pub settings: Settings,
}

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub wishlist: WishlistService,
    pub orders: OrderService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, nats: Option<async_nats::Client>, settings: Settings) -> Self {
        let caches = Arc::new(Caches::default());
        let bus = Arc::new(EventBus::new(caches.clone(), nats));
        let deps = Deps { store, bus, caches, settings };
        Self {
            catalog: CatalogService::new(deps.clone()),
            cart: CartService::new(deps.clone()),
            wishlist: WishlistService::new(deps.clone()),
            orders: OrderService::new(deps),
        }
    }
}
