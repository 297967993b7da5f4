//! Catalog: product views, variant resolution and stock checks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::Deps;
use crate::domain::aggregates::{NewProduct, Product, Resolution};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::Pricing;
use crate::{EcommerceError, Result};

/// A product plus its size and color axes, so a picker can grey out missing pairs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<String>,
    pub colors_by_size: BTreeMap<String, Vec<String>>,
}

impl ProductView {
    pub fn new(product: Product) -> Self {
        let matrix = product.matrix();
        let sizes: Vec<String> = matrix.sizes().iter().map(|s| s.to_string()).collect();
        let colors_by_size = sizes.iter()
            .map(|s| (s.clone(), matrix.colors_for(s).into_iter().map(str::to_string).collect()))
            .collect();
        Self { product, sizes, colors_by_size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockStatus { pub in_stock: bool }

#[derive(Clone)]
pub struct CatalogService { deps: Deps }

impl CatalogService {
    pub(crate) fn new(deps: Deps) -> Self { Self { deps } }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create(&self, input: NewProduct) -> Result<Product> {
        let product = Product::create(input)?;
        let currency = &self.deps.settings.currency;
        if product.pricing().currency() != currency {
            return Err(EcommerceError::Validation(format!("prices must be in {currency}")));
        }
        self.deps.store.insert_product(&product).await?;
        info!(product_id = %product.id(), variants = product.variants().len(), "product created");
        self.deps.bus.publish(DomainEvent::Product(ProductEvent::Created { product_id: product.id() })).await;
        Ok(product)
    }

    pub async fn view(&self, id_or_slug: &str) -> Result<Arc<ProductView>> {
        let key = id_or_slug.to_string();
        if let Some(view) = self.deps.caches.products.get(&key) {
            return Ok(view);
        }
        let ticket = self.deps.caches.products.ticket(&key);
        let product = self.deps.store.find_product(id_or_slug).await?
            .ok_or_else(|| EcommerceError::product_not_found(id_or_slug))?;
        let view = Arc::new(ProductView::new(product));
        self.deps.caches.products.insert(key, ticket, view.clone());
        Ok(view)
    }

    /// Maps a (size, color) pick to a variant. Products without variants
    /// answer "not available" rather than failing.
    pub async fn resolve(&self, id_or_slug: &str, size: &str, color: &str) -> Result<Resolution> {
        Ok(self.view(id_or_slug).await?.product.resolve(size, color))
    }

    /// Strict stock lookup: a missing product or variant is an error.
    pub async fn stock(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Result<bool> {
        let product = self.deps.store.product(product_id).await?
            .ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        Ok(product.in_stock(variant_id)?)
    }

    /// Stock check for buyers: anything that cannot be found is simply not in stock.
    pub async fn check_stock(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Result<StockStatus> {
        match self.stock(product_id, variant_id).await {
            Ok(in_stock) => Ok(StockStatus { in_stock }),
            Err(EcommerceError::NotFound(what)) => {
                debug!(%product_id, ?variant_id, %what, "stock check on missing item");
                Ok(StockStatus { in_stock: false })
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, pricing))]
    pub async fn reprice(&self, product_id: Uuid, variant_id: Option<Uuid>, pricing: Pricing) -> Result<Product> {
        let product = self.deps.store.update_pricing(product_id, variant_id, pricing).await?;
        info!(unit_price = %product.pricing_for(variant_id).unit_price(), "product repriced");
        self.deps.bus.publish(DomainEvent::Product(ProductEvent::Repriced { product_id, variant_id })).await;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, product_id: Uuid, variant_id: Option<Uuid>, stock: u32) -> Result<Product> {
        let product = self.deps.store.set_stock(product_id, variant_id, stock).await?;
        info!("stock set");
        self.deps.bus.publish(DomainEvent::Product(ProductEvent::Restocked { product_id, variant_id, stock })).await;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::pricing;
    use crate::services::testing::{seed_shirt, seed_simple, services};

    #[tokio::test]
    async fn test_resolve_scenario() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let id = shirt.id().to_string();

        let miss = s.catalog.resolve(&id, "S", "Blue").await.unwrap();
        assert!(miss.variant.is_none());
        assert!(!miss.combination_exists);

        let hit = s.catalog.resolve("shirt", "S", "Red").await.unwrap();
        assert!(hit.combination_exists);
        assert_eq!(hit.variant.map(|v| (v.size, v.color)), Some(("S".into(), "Red".into())));
    }

    #[tokio::test]
    async fn test_resolve_without_variants_and_missing_product() {
        let s = services();
        seed_simple(&s, "mug", 50, 4).await;
        let r = s.catalog.resolve("mug", "S", "Red").await.unwrap();
        assert_eq!(r, Resolution::unavailable());
        assert!(matches!(s.catalog.resolve("nope", "S", "Red").await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_view_lists_axes() {
        let s = services();
        seed_shirt(&s).await;
        let view = s.catalog.view("shirt").await.unwrap();
        assert_eq!(view.sizes, vec!["S", "M"]);
        assert_eq!(view.colors_by_size["M"], vec!["Red"]);
        let json = serde_json::to_value(&*view).unwrap();
        assert_eq!(json["slug"], "shirt");
        assert!(json["colorsBySize"]["S"].is_array());
    }

    #[tokio::test]
    async fn test_check_stock_is_idempotent_and_forgiving() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let (small, medium) = (shirt.variants()[0].id, shirt.variants()[1].id);
        for _ in 0..5 {
            assert_eq!(s.catalog.check_stock(shirt.id(), Some(small)).await.unwrap(), StockStatus { in_stock: true });
        }
        assert!(!s.catalog.check_stock(shirt.id(), Some(medium)).await.unwrap().in_stock);
        assert!(!s.catalog.check_stock(shirt.id(), Some(Uuid::new_v4())).await.unwrap().in_stock);
        assert!(!s.catalog.check_stock(Uuid::new_v4(), None).await.unwrap().in_stock);
        assert!(matches!(s.catalog.stock(Uuid::new_v4(), None).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restock_refreshes_cached_view() {
        let s = services();
        let shirt = seed_shirt(&s).await;
        let medium = shirt.variants()[1].id;
        assert_eq!(s.catalog.view("shirt").await.unwrap().product.variants()[1].stock, 0);
        s.catalog.restock(shirt.id(), Some(medium), 7).await.unwrap();
        assert_eq!(s.catalog.view("shirt").await.unwrap().product.variants()[1].stock, 7);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_currency_and_duplicate_slug() {
        let s = services();
        seed_simple(&s, "mug", 50, 1).await;
        let dup = NewProduct {
            slug: "mug".into(), title: "Mug".into(), category_id: None, is_variant_available: false,
            pricing: pricing(10), stock: 1, variants: vec![],
        };
        assert!(matches!(s.catalog.create(dup.clone()).await, Err(EcommerceError::Conflict(_))));

        let mut usd = dup;
        usd.slug = "usd-mug".into();
        usd.pricing = Pricing::new(
            crate::domain::value_objects::Money::new(rust_decimal::Decimal::ONE, "USD"), None,
            crate::domain::value_objects::Money::zero("USD"),
        ).unwrap();
        assert!(matches!(s.catalog.create(usd).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reprice_rejects_sub_minor_amounts() {
        use crate::domain::value_objects::Money;
        use rust_decimal::Decimal;

        let s = services();
        let mug = seed_simple(&s, "mug", 50, 1).await;
        let fractional = Pricing { original: Money::new(Decimal::new(49_995, 3), "NGN"), discounted: None, shipping: Money::zero("NGN") };
        assert!(matches!(s.catalog.reprice(mug.id(), None, fractional).await, Err(EcommerceError::Validation(_))));
        assert_eq!(s.catalog.view("mug").await.unwrap().product.pricing().original.amount(), Decimal::new(50, 0));
    }
}
