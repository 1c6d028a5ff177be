//! Partner price lists
//!
//! Suppliers upload a JSON array of sections: `{"shop": ..}`, `{"categories": [..]}`
//! and `{"goods": [..]}`, in any order. Individual goods that cannot be used are
//! reported in [`PriceList::skipped`] instead of failing the whole file.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::domain::value_objects::Price;

const MAX_PRODUCT_NAME: usize = 80;

#[derive(Clone, Debug, PartialEq)]
pub struct PriceList {
    pub shop: String,
    pub categories: Vec<CategoryEntry>,
    pub goods: Vec<Good>,
    pub skipped: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CategoryEntry {
    pub id: i64,
    pub name: String,
}

/// A usable line of the price list, with its category resolved to a name.
#[derive(Clone, Debug, PartialEq)]
pub struct Good {
    pub external_id: Option<String>,
    pub category: String,
    pub name: String,
    pub model: String,
    pub description: String,
    pub quantity: i32,
    pub price: Price,
    pub price_rrc: Price,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawGood {
    #[serde(default)]
    id: Value,
    category: i64,
    name: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    quantity: i32,
    price: Decimal,
    price_rrc: Decimal,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
}

impl PriceList {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CatalogFileError> {
        let sections: Vec<Value> =
            serde_json::from_slice(bytes).map_err(|e| CatalogFileError::InvalidJson(e.to_string()))?;

        let (mut shop, mut categories, mut goods) = (None, None, None);
        for section in sections {
            let Value::Object(section) = section else {
                return Err(CatalogFileError::InvalidStructure);
            };
            for (key, value) in section {
                match key.as_str() {
                    "shop" => shop = value.as_str().map(str::trim).map(str::to_string),
                    "categories" => categories = value.as_array().cloned(),
                    "goods" => goods = value.as_array().cloned(),
                    _ => {}
                }
            }
        }

        let (Some(shop), Some(categories), Some(goods)) = (shop, categories, goods) else {
            return Err(CatalogFileError::MissingSections);
        };
        if shop.is_empty() || categories.is_empty() || goods.is_empty() {
            return Err(CatalogFileError::MissingSections);
        }

        let mut skipped = Vec::new();
        let categories: Vec<CategoryEntry> = categories
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<CategoryEntry>(raw.clone()) {
                Ok(category) => Some(category),
                Err(e) => {
                    skipped.push(format!("Некорректная категория {raw}: {e}"));
                    None
                }
            })
            .collect();
        let names: HashMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();

        let mut parsed = Vec::with_capacity(goods.len());
        for raw in goods {
            match parse_good(&raw, &names) {
                Ok(good) => parsed.push(good),
                Err(reason) => skipped.push(reason),
            }
        }

        Ok(Self { shop, categories, goods: parsed, skipped })
    }
}

fn parse_good(raw: &Value, categories: &HashMap<i64, &str>) -> Result<Good, String> {
    let good: RawGood =
        serde_json::from_value(raw.clone()).map_err(|e| format!("Некорректные данные товара {raw}: {e}"))?;
    let category = categories
        .get(&good.category)
        .ok_or_else(|| format!("Категория с ID {} не найдена для товара '{}'.", good.category, good.name))?;
    if good.name.trim().is_empty() || good.name.chars().count() > MAX_PRODUCT_NAME {
        return Err(format!("Некорректное название товара '{}'.", good.name));
    }
    if good.quantity < 0 {
        return Err(format!("Отрицательный остаток у товара '{}'.", good.name));
    }
    let price = Price::new(good.price).map_err(|e| format!("Товар '{}': {e}", good.name))?;
    let price_rrc = Price::new(good.price_rrc).map_err(|e| format!("Товар '{}': {e}", good.name))?;

    Ok(Good {
        external_id: scalar_to_string(good.id),
        category: category.to_string(),
        name: good.name,
        model: good.model,
        description: good.description,
        quantity: good.quantity,
        price,
        price_rrc,
        parameters: good
            .parameters
            .into_iter()
            .filter_map(|(name, value)| scalar_to_string(value).map(|value| (name, value)))
            .collect(),
    })
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogFileError {
    #[error("Файл содержит некорректный JSON: {0}")]
    InvalidJson(String),
    #[error("Некорректная структура JSON файла.")]
    InvalidStructure,
    #[error("Отсутствуют необходимые данные в JSON.")]
    MissingSections,
}

/// One section of an exported catalog, serialised as `{"<name>": [..]}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSection {
    Shops(Vec<ExportShop>),
    Categories(Vec<ExportCategory>),
    Products(Vec<ExportProduct>),
    ProductInfos(Vec<ExportProductInfo>),
    Parameters(Vec<ExportParameter>),
    ProductParameters(Vec<ExportProductParameter>),
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportShop {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportProduct {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportProductInfo {
    pub product: String,
    pub shop: String,
    pub external_id: Option<String>,
    pub description: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_rrc: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportParameter {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExportProductParameter {
    pub product_info: String,
    pub parameter: String,
    pub value: String,
}

/// Everything an export writes, in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogExport {
    pub shops: Vec<ExportShop>,
    pub categories: Vec<ExportCategory>,
    pub products: Vec<ExportProduct>,
    pub product_infos: Vec<ExportProductInfo>,
    pub parameters: Vec<ExportParameter>,
    pub product_parameters: Vec<ExportProductParameter>,
}

impl CatalogExport {
    pub fn into_document(self) -> Vec<ExportSection> {
        vec![
            ExportSection::Shops(self.shops),
            ExportSection::Categories(self.categories),
            ExportSection::Products(self.products),
            ExportSection::ProductInfos(self.product_infos),
            ExportSection::Parameters(self.parameters),
            ExportSection::ProductParameters(self.product_parameters),
        ]
    }

    pub fn to_json(self) -> serde_json::Result<Vec<u8>> { serde_json::to_vec_pretty(&self.into_document()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {"goods": [
                {"id": 4216292, "category": 224, "model": "apple/iphone/xs-max", "name": "Смартфон Apple iPhone XS Max 512GB (золотистый)",
                 "price": 110000, "price_rrc": 116990, "quantity": 14,
                 "parameters": {"Диагональ (дюйм)": 6.5, "Разрешение (пикс)": "2688x1242", "Встроенная память (Гб)": 512}},
                {"id": "A-1", "category": 999, "name": "Orphan", "price": 10, "price_rrc": 12},
                {"id": 3, "category": 224, "name": "No price"}
            ]},
            {"shop": "Связной"},
            {"categories": [{"id": 224, "name": "Смартфоны"}, {"id": 15, "name": "Аксессуары"}]}
        ])
    }

    #[test]
    fn sections_parse_in_any_order() {
        let list = PriceList::from_slice(sample().to_string().as_bytes()).unwrap();

        assert_eq!(list.shop, "Связной");
        assert_eq!(list.categories.len(), 2);
        assert_eq!(list.goods.len(), 1);
        let good = &list.goods[0];
        assert_eq!(good.external_id.as_deref(), Some("4216292"));
        assert_eq!(good.category, "Смартфоны");
        assert_eq!(good.quantity, 14);
        assert_eq!(good.price.amount(), Decimal::new(11_000_000, 2));
        assert_eq!(good.parameters.get("Диагональ (дюйм)").map(String::as_str), Some("6.5"));
        assert_eq!(good.parameters.get("Встроенная память (Гб)").map(String::as_str), Some("512"));
    }

    #[test]
    fn unusable_goods_are_skipped() {
        let list = PriceList::from_slice(sample().to_string().as_bytes()).unwrap();

        assert_eq!(list.skipped.len(), 2);
        assert!(list.skipped[0].contains("Категория с ID 999"));
    }

    #[test]
    fn missing_section_is_rejected() {
        let doc = json!([{"shop": "Связной"}, {"categories": [{"id": 1, "name": "A"}]}]);
        assert_eq!(
            PriceList::from_slice(doc.to_string().as_bytes()),
            Err(CatalogFileError::MissingSections)
        );
        assert_eq!(CatalogFileError::MissingSections.to_string(), "Отсутствуют необходимые данные в JSON.");
    }

    #[test]
    fn broken_json_is_rejected() {
        let err = PriceList::from_slice(b"[{\"shop\": ").unwrap_err();
        assert!(matches!(err, CatalogFileError::InvalidJson(_)));
        assert!(err.to_string().contains("некорректный JSON"));
        assert_eq!(PriceList::from_slice(b"[1, 2]"), Err(CatalogFileError::InvalidStructure));
    }

    #[test]
    fn export_document_uses_single_key_sections() {
        let export = CatalogExport {
            shops: vec![ExportShop { name: "Связной".into(), url: None }],
            product_infos: vec![ExportProductInfo {
                product: "Phone".into(),
                shop: "Связной".into(),
                external_id: Some("1".into()),
                description: String::new(),
                quantity: 2,
                price: Decimal::new(1999, 2),
                price_rrc: Decimal::new(2500, 2),
            }],
            ..Default::default()
        };

        let value: Value = serde_json::from_slice(&export.to_json().unwrap()).unwrap();

        assert_eq!(value[0], json!({"shops": [{"name": "Связной", "url": null}]}));
        assert_eq!(value[3]["product_infos"][0]["price"], json!(19.99));
        assert_eq!(value[5], json!({"product_parameters": []}));
    }
}
