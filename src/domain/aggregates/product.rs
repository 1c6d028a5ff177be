//! Product Aggregate
//!
//! A product is shared across shops; each shop offering it carries its own
//! [`ProductInfo`] with price, stock and free-form parameters.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::{aggregates::shop::Category, value_objects::Price};

#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub category: Category,
    pub product_infos: Vec<ProductInfo>,
}

impl Product {
    pub fn offer_from(&self, shop_id: i64) -> Option<&ProductInfo> {
        self.product_infos.iter().find(|info| info.shop_id == shop_id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProductInfo {
    pub id: i64,
    pub product_id: i64,
    pub shop_id: i64,
    pub external_id: Option<String>,
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub price_rrc: Decimal,
    pub parameters: BTreeMap<String, String>,
}

/// Data for creating a product together with its shop offers.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub model: String,
    pub category: String,
    pub product_infos: Vec<ProductInfoDraft>,
}

/// Partial product update. `product_infos`, when present, is merged into the
/// existing offers: entries with an `id` update that offer, the rest are
/// matched by shop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub product_infos: Option<Vec<ProductInfoDraft>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProductInfoDraft {
    pub id: Option<i64>,
    pub shop_id: i64,
    pub external_id: Option<String>,
    pub description: String,
    pub quantity: i32,
    pub price: Price,
    pub price_rrc: Price,
    pub parameters: BTreeMap<String, String>,
}

/// Product listing filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub shop: Option<i64>,
    pub category: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ProductQuery {
    /// `ILIKE` pattern for the search term, if any.
    pub fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        Some(format!("%{escaped}%"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_wildcards() {
        let query = ProductQuery { search: Some(" 100%_fit ".into()), ..Default::default() };
        assert_eq!(query.search_pattern().as_deref(), Some("%100\\%\\_fit%"));
        assert_eq!(ProductQuery { search: Some("  ".into()), ..Default::default() }.search_pattern(), None);
    }

    #[test]
    fn offer_lookup_by_shop() {
        let info = ProductInfo {
            id: 7,
            product_id: 1,
            shop_id: 3,
            external_id: None,
            description: String::new(),
            quantity: 4,
            price: Decimal::new(1000, 2),
            price_rrc: Decimal::new(1200, 2),
            parameters: BTreeMap::new(),
        };
        let product = Product {
            id: 1,
            name: "Phone".into(),
            model: "X".into(),
            category: Category { id: 1, name: "Phones".into() },
            product_infos: vec![info],
        };
        assert_eq!(product.offer_from(3).map(|info| info.id), Some(7));
        assert!(product.offer_from(4).is_none());
    }
}
