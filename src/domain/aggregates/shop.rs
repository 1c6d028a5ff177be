//! Shops and categories

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    #[serde(rename = "user")]
    pub user_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewShop {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Parameter {
    pub id: i64,
    pub name: String,
}
