//! Product Aggregate
//!
//! A product owns its variants. Each variant is one (size, color) cell of a
//! sparse matrix: not every size has every color, but a pair never appears
//! twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use crate::domain::value_objects::{MoneyError, Pricing};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: Uuid,
    slug: String,
    title: String,
    category_id: Option<Uuid>,
    is_variant_available: bool,
    pricing: Pricing,
    stock: u32,
    variants: Vec<Variant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Uuid,
    pub size: String,
    pub color: String,
    pub pricing: Option<Pricing>,
    pub preview_images: Vec<String>,
    pub slide_images: Vec<String>,
    pub stock: u32,
    pub available: bool,
}

impl Variant {
    pub fn in_stock(&self) -> bool { self.available && self.stock > 0 }
}

/// Input for creating a product together with its variants.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub slug: String,
    pub title: String,
    #[serde(default)] pub category_id: Option<Uuid>,
    #[serde(default)] pub is_variant_available: bool,
    pub pricing: Pricing,
    #[serde(default)] pub stock: u32,
    #[serde(default)] pub variants: Vec<NewVariant>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVariant {
    pub size: String,
    pub color: String,
    #[serde(default)] pub pricing: Option<Pricing>,
    #[serde(default)] pub preview_images: Vec<String>,
    #[serde(default)] pub slide_images: Vec<String>,
    #[serde(default)] pub stock: u32,
    #[serde(default = "available_by_default")] pub available: bool,
}

fn available_by_default() -> bool { true }

impl NewVariant {
    fn into_variant(self) -> Variant {
        Variant {
            id: Uuid::new_v4(), size: self.size, color: self.color, pricing: self.pricing,
            preview_images: self.preview_images, slide_images: self.slide_images,
            stock: self.stock, available: self.available,
        }
    }
}

/// Outcome of resolving a (size, color) pair against a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub variant: Option<Variant>,
    pub combination_exists: bool,
}

impl Resolution {
    pub fn unavailable() -> Self { Self { variant: None, combination_exists: false } }
}

/// Lookup table of the (size, color) pairs a product actually offers.
#[derive(Debug)]
pub struct VariantMatrix<'a> {
    variants: &'a [Variant],
    cells: HashMap<(&'a str, &'a str), &'a Variant>,
    sizes: Vec<&'a str>,
}

impl<'a> VariantMatrix<'a> {
    pub fn new(variants: &'a [Variant]) -> Self {
        let mut cells = HashMap::with_capacity(variants.len());
        let mut sizes = Vec::new();
        for v in variants {
            // first in list wins if a duplicate ever slips through
            cells.entry((v.size.as_str(), v.color.as_str())).or_insert(v);
            if !sizes.contains(&v.size.as_str()) { sizes.push(v.size.as_str()); }
        }
        Self { variants, cells, sizes }
    }

    pub fn contains(&self, size: &str, color: &str) -> bool { self.cells.contains_key(&(size, color)) }

    pub fn get(&self, size: &str, color: &str) -> Option<&'a Variant> { self.cells.get(&(size, color)).copied() }

    pub fn resolve(&self, size: &str, color: &str) -> Resolution {
        match self.get(size, color) {
            Some(v) => Resolution { variant: Some(v.clone()), combination_exists: true },
            None => Resolution::unavailable(),
        }
    }

    pub fn sizes(&self) -> &[&'a str] { &self.sizes }

    /// Colors offered in `size`, in variant-list order.
    pub fn colors_for(&self, size: &str) -> Vec<&'a str> {
        let mut colors: Vec<&'a str> = Vec::new();
        for v in self.variants.iter().filter(|v| v.size == size) {
            if !colors.contains(&v.color.as_str()) { colors.push(v.color.as_str()); }
        }
        colors
    }
}

impl Product {
    pub fn create(input: NewProduct) -> Result<Self, ProductError> {
        let now = Utc::now();
        let variants = input.variants.into_iter().map(NewVariant::into_variant).collect();
        Self::restore(Uuid::new_v4(), input.slug, input.title, input.category_id, input.is_variant_available,
            input.pricing, input.stock, variants, now, now)
    }

    /// Rebuilds a stored product, re-checking its invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, slug: String, title: String, category_id: Option<Uuid>, is_variant_available: bool,
        pricing: Pricing, stock: u32, variants: Vec<Variant>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Result<Self, ProductError> {
        let product = Self {
            id, slug: slug.trim().to_string(), title: title.trim().to_string(), category_id,
            is_variant_available, pricing, stock, variants, created_at, updated_at,
        };
        product.validate()?;
        Ok(product)
    }

    fn validate(&self) -> Result<(), ProductError> {
        if self.title.is_empty() { return Err(ProductError::MissingTitle); }
        if self.slug.is_empty() { return Err(ProductError::MissingSlug); }
        if self.is_variant_available && self.variants.is_empty() { return Err(ProductError::NoVariants); }
        self.pricing.validate()?;
        let currency = self.pricing.currency();
        let mut seen = HashSet::with_capacity(self.variants.len());
        for v in &self.variants {
            if v.size.trim().is_empty() || v.color.trim().is_empty() { return Err(ProductError::BlankAttribute); }
            if !seen.insert((v.size.as_str(), v.color.as_str())) {
                return Err(ProductError::DuplicateCombination { size: v.size.clone(), color: v.color.clone() });
            }
            if let Some(p) = &v.pricing {
                p.validate()?;
                if p.currency() != currency { return Err(ProductError::CurrencyMismatch); }
            }
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn slug(&self) -> &str { &self.slug }
    pub fn title(&self) -> &str { &self.title }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn is_variant_available(&self) -> bool { self.is_variant_available }
    pub fn pricing(&self) -> &Pricing { &self.pricing }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn variants(&self) -> &[Variant] { &self.variants }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn matches(&self, id_or_slug: &str) -> bool {
        self.slug == id_or_slug || Uuid::parse_str(id_or_slug).is_ok_and(|id| id == self.id)
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> { self.variants.iter().find(|v| v.id == variant_id) }

    pub fn matrix(&self) -> VariantMatrix<'_> { VariantMatrix::new(&self.variants) }

    /// Resolves a (size, color) selection. Products without variants never resolve.
    pub fn resolve(&self, size: &str, color: &str) -> Resolution {
        if !self.is_variant_available { return Resolution::unavailable(); }
        self.matrix().resolve(size, color)
    }

    /// Whether the product, or the given variant of it, can be bought right now.
    pub fn in_stock(&self, variant_id: Option<Uuid>) -> Result<bool, ProductError> {
        match variant_id {
            Some(id) => self.variant(id).map(Variant::in_stock).ok_or(ProductError::VariantNotFound(id)),
            None => Ok(self.stock > 0),
        }
    }

    /// Checks that `variant_id` is a valid selection for this product.
    pub fn check_selection(&self, variant_id: Option<Uuid>) -> Result<Option<&Variant>, ProductError> {
        match (self.is_variant_available, variant_id) {
            (true, Some(id)) => self.variant(id).map(Some).ok_or(ProductError::VariantNotFound(id)),
            (true, None) => Err(ProductError::VariantRequired),
            (false, Some(_)) => Err(ProductError::VariantNotOffered),
            (false, None) => Ok(None),
        }
    }

    /// Pricing that applies to a purchase of the given variant.
    pub fn pricing_for(&self, variant_id: Option<Uuid>) -> &Pricing {
        variant_id.and_then(|id| self.variant(id)).and_then(|v| v.pricing.as_ref()).unwrap_or(&self.pricing)
    }

    pub fn update_pricing(&mut self, variant_id: Option<Uuid>, pricing: Pricing) -> Result<(), ProductError> {
        pricing.validate()?;
        if pricing.currency() != self.pricing.currency() { return Err(ProductError::CurrencyMismatch); }
        match variant_id {
            Some(id) => self.variant_mut(id)?.pricing = Some(pricing),
            None => self.pricing = pricing,
        }
        self.touch();
        Ok(())
    }

    pub fn set_stock(&mut self, variant_id: Option<Uuid>, stock: u32) -> Result<(), ProductError> {
        match variant_id {
            Some(id) => self.variant_mut(id)?.stock = stock,
            None => self.stock = stock,
        }
        self.touch();
        Ok(())
    }

    /// Takes `qty` units out of stock, all or nothing.
    pub fn remove_stock(&mut self, variant_id: Option<Uuid>, qty: u32) -> Result<(), ProductError> {
        let slot = match variant_id {
            Some(id) => {
                let v = self.variant_mut(id)?;
                if !v.available { return Err(ProductError::InsufficientStock); }
                &mut v.stock
            }
            None => &mut self.stock,
        };
        *slot = slot.checked_sub(qty).ok_or(ProductError::InsufficientStock)?;
        self.touch();
        Ok(())
    }

    pub fn add_stock(&mut self, variant_id: Option<Uuid>, qty: u32) -> Result<(), ProductError> {
        match variant_id {
            Some(id) => { let v = self.variant_mut(id)?; v.stock = v.stock.saturating_add(qty); }
            None => self.stock = self.stock.saturating_add(qty),
        }
        self.touch();
        Ok(())
    }

    fn variant_mut(&mut self, variant_id: Uuid) -> Result<&mut Variant, ProductError> {
        self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound(variant_id))
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    MissingTitle,
    MissingSlug,
    NoVariants,
    BlankAttribute,
    DuplicateCombination { size: String, color: String },
    CurrencyMismatch,
    InvalidPrice,
    PricePrecision,
    VariantNotFound(Uuid),
    VariantRequired,
    VariantNotOffered,
    InsufficientStock,
}

impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTitle => write!(f, "Missing title"),
            Self::MissingSlug => write!(f, "Missing slug"),
            Self::NoVariants => write!(f, "Variant product has no variants"),
            Self::BlankAttribute => write!(f, "Variant size and color are required"),
            Self::DuplicateCombination { size, color } => write!(f, "Duplicate variant {size}/{color}"),
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::InvalidPrice => write!(f, "Prices cannot be negative"),
            Self::PricePrecision => write!(f, "Prices carry at most two decimal places"),
            Self::VariantNotFound(id) => write!(f, "Variant {id} not found"),
            Self::VariantRequired => write!(f, "A variant must be selected"),
            Self::VariantNotOffered => write!(f, "Product has no variants"),
            Self::InsufficientStock => write!(f, "Insufficient stock"),
        }
    }
}

impl From<MoneyError> for ProductError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::CurrencyMismatch => Self::CurrencyMismatch,
            MoneyError::Negative => Self::InvalidPrice,
            MoneyError::TooPrecise => Self::PricePrecision,
        }
    }
}
