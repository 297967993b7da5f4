//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub const MINOR_DIGITS: u32 = 2;

    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_negative(&self) -> bool { self.amount.is_sign_negative() && !self.amount.is_zero() }
    /// Whether the amount fits in minor units.
    pub fn has_minor_precision(&self) -> bool { self.amount.normalize().scale() <= Self::MINOR_DIGITS }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Negative, TooPrecise }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::Negative => write!(f, "Negative amount"),
            Self::TooPrecise => write!(f, "Amounts carry at most {} decimal places", Money::MINOR_DIGITS),
        }
    }
}

/// Product and variant pricing.
///
/// The unit price charged is the discounted price when one is set, the
/// original price otherwise. Shipping is charged once per order line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub original: Money,
    #[serde(default)]
    pub discounted: Option<Money>,
    pub shipping: Money,
}

impl Pricing {
    pub fn new(original: Money, discounted: Option<Money>, shipping: Money) -> Result<Self, MoneyError> {
        let pricing = Self { original, discounted, shipping };
        pricing.validate()?;
        Ok(pricing)
    }

    /// All amounts share one currency, none is negative and none has
    /// sub-minor-unit digits.
    pub fn validate(&self) -> Result<(), MoneyError> {
        let currency = self.original.currency();
        let amounts = std::iter::once(&self.original).chain(self.discounted.as_ref()).chain(std::iter::once(&self.shipping));
        for m in amounts {
            if m.currency() != currency { return Err(MoneyError::CurrencyMismatch); }
            if m.is_negative() { return Err(MoneyError::Negative); }
            if !m.has_minor_precision() { return Err(MoneyError::TooPrecise); }
        }
        Ok(())
    }

    pub fn unit_price(&self) -> &Money { self.discounted.as_ref().unwrap_or(&self.original) }
    pub fn currency(&self) -> &str { self.original.currency() }
}

/// Quantity of a cart or order line, between 1 and [`Quantity::MAX`].
/// Merges and increments saturate at the cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);
    pub const MAX: Quantity = Quantity(999);

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > Self::MAX.0 { return Err(QuantityError::TooLarge); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0).min(Self::MAX.0)) }
    /// One less, but never below one.
    pub fn decrement(&self) -> Self { Self(self.0.saturating_sub(1).max(1)) }
    pub fn increment(&self) -> Self { self.add(Self::ONE) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "quantity must be at least 1"),
            Self::TooLarge => write!(f, "quantity must be at most {}", Quantity::MAX.0),
        }
    }
}

/// How a line is purchased. Renting is modelled but switched off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Buy,
    Rent,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Buy => "buy", Self::Rent => "rent" }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProductType {
    type Err = UnknownProductType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "rent" => Ok(Self::Rent),
            other => Err(UnknownProductType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownProductType(pub String);
impl std::error::Error for UnknownProductType {}
impl fmt::Display for UnknownProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown product type '{}'", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ngn(amount: i64) -> Money { Money::new(Decimal::new(amount, 0), "NGN") }

    #[test]
    fn test_money_add() {
        let a = ngn(100);
        let b = ngn(50);
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
        assert_eq!(a.add(&Money::zero("USD")), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_pricing_prefers_discount() {
        let p = Pricing::new(ngn(120), Some(ngn(100)), ngn(5)).unwrap();
        assert_eq!(p.unit_price(), &ngn(100));
        let p = Pricing::new(ngn(120), None, ngn(5)).unwrap();
        assert_eq!(p.unit_price(), &ngn(120));
        assert_eq!(Pricing::new(ngn(120), None, Money::zero("USD")), Err(MoneyError::CurrencyMismatch));
        assert_eq!(Pricing::new(ngn(-1), None, ngn(0)), Err(MoneyError::Negative));
    }

    #[test]
    fn test_pricing_rejects_sub_minor_amounts() {
        let kobo = Money::new(Decimal::new(10_005, 3), "NGN");
        assert_eq!(Pricing::new(kobo, None, ngn(0)), Err(MoneyError::TooPrecise));
        let trailing_zeros = Money::new(Decimal::new(10_500, 3), "NGN");
        assert!(Pricing::new(trailing_zeros, None, ngn(0)).is_ok());
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        let q = Quantity::new(2).unwrap();
        assert_eq!(q.decrement().value(), 1);
        assert_eq!(q.decrement().decrement().value(), 1);
        assert_eq!(q.add(Quantity::ONE).value(), 3);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_quantity_is_capped() {
        assert_eq!(Quantity::new(1000), Err(QuantityError::TooLarge));
        assert_eq!(Quantity::MAX.increment(), Quantity::MAX);
        assert_eq!(Quantity::new(998).unwrap().add(Quantity::new(5).unwrap()), Quantity::MAX);
        assert!(serde_json::from_str::<Quantity>("1000").is_err());
    }

    #[test]
    fn test_product_type_parse() {
        assert_eq!("rent".parse::<ProductType>().unwrap(), ProductType::Rent);
        assert!("lease".parse::<ProductType>().is_err());
        assert_eq!(serde_json::to_string(&ProductType::Buy).unwrap(), "\"buy\"");
    }
}
