//! Event bus: invalidates cached views, then forwards the event to NATS when
//! a client is configured.

use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::Caches;
use crate::domain::events::{CacheTag, DomainEvent};

pub struct EventBus {
    caches: Arc<Caches>,
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(caches: Arc<Caches>, nats: Option<async_nats::Client>) -> Self { Self { caches, nats } }

    pub async fn publish(&self, event: DomainEvent) {
        for tag in event.tags() {
            match (tag, event.user_id()) {
                (CacheTag::Catalog, _) => {
                    self.caches.products.invalidate_all();
                    self.caches.carts.invalidate_all();
                    self.caches.wishlists.invalidate_all();
                }
                (CacheTag::Cart, Some(user_id)) => self.caches.carts.invalidate(&user_id),
                (CacheTag::Wishlist, Some(user_id)) => self.caches.wishlists.invalidate(&user_id),
                (CacheTag::Cart, None) => self.caches.carts.invalidate_all(),
                (CacheTag::Wishlist, None) => self.caches.wishlists.invalidate_all(),
            }
        }

        let Some(client) = &self.nats else { return };
        let subject = event.subject();
        match serde_json::to_vec(&event) {
            Ok(payload) => match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => debug!(%subject, "event published"),
                Err(e) => warn!(%subject, error = %e, "event publish failed"),
            },
            Err(e) => warn!(%subject, error = %e, "event serialization failed"),
        }
    }
}
