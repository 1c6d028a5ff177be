//! Partner price lists: upload, import into the catalog, export, and task status.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

use super::ServiceError;
use crate::{
    database::Db,
    domain::{
        aggregates::{Actor, ProductInfoDraft},
        catalog_file::PriceList,
    },
    repositories::{
        PgCategoriesRepository, PgParametersRepository, PgProductsRepository, PgShopsRepository,
        PgTaskResultsRepository,
    },
    tasks::{Task, TaskQueue, TaskReport, TaskState},
};

pub const EXPORT_FILE_NAME: &str = "exported_data.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub shop: String,
    pub shop_id: i64,
    pub categories: usize,
    pub products: usize,
    pub skipped: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub file: String,
    pub shops: usize,
    pub categories: usize,
    pub products: usize,
    pub product_infos: usize,
}

/// Moves whole catalogs between price-list files and the database. Shared by
/// the task worker and the command line.
#[derive(Debug, Clone)]
pub struct CatalogTransfer {
    db: Db,
    shops: PgShopsRepository,
    categories: PgCategoriesRepository,
    products: PgProductsRepository,
    parameters: PgParametersRepository,
}

impl CatalogTransfer {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            shops: PgShopsRepository::new(),
            categories: PgCategoriesRepository::new(),
            products: PgProductsRepository::new(),
            parameters: PgParametersRepository::new(),
        }
    }

    pub async fn load_file(&self, path: &Path, uploader: Option<i64>) -> Result<LoadSummary, ServiceError> {
        let bytes = tokio::fs::read(path).await?;
        self.load(&bytes, uploader).await
    }

    /// Imports a price list in one transaction. The shop is matched by name
    /// and only gets `uploader` as owner when it is created here.
    pub async fn load(&self, bytes: &[u8], uploader: Option<i64>) -> Result<LoadSummary, ServiceError> {
        let list = PriceList::from_slice(bytes)?;

        let mut tx = self.db.begin().await?;
        let shop = self.shops.get_or_create(&mut tx, &list.shop, uploader).await?;

        let mut categories = HashMap::with_capacity(list.categories.len());
        for entry in &list.categories {
            let category = self.categories.get_or_create(&mut tx, entry.name.trim()).await?;
            self.categories.link_shop(&mut tx, category.id, shop.id).await?;
            categories.insert(entry.name.clone(), category.id);
        }

        let mut skipped = list.skipped;
        let mut products = 0;
        for good in list.goods {
            let Some(&category_id) = categories.get(&good.category) else {
                skipped.push(format!("Категория '{}' не найдена для товара '{}'.", good.category, good.name));
                continue;
            };
            let product_id = self.products.upsert_by_name(&mut tx, good.name.trim(), &good.model, category_id).await?;
            let draft = ProductInfoDraft {
                id: None,
                shop_id: shop.id,
                external_id: good.external_id,
                description: good.description,
                quantity: good.quantity,
                price: good.price,
                price_rrc: good.price_rrc,
                parameters: good.parameters,
            };
            let info_id = self.products.upsert_info(&mut tx, product_id, &draft).await?;
            for (name, value) in &draft.parameters {
                let parameter = self.parameters.get_or_create(&mut tx, name).await?;
                self.products.set_parameter(&mut tx, info_id, parameter.id, value).await?;
            }
            products += 1;
        }
        tx.commit().await?;

        for reason in &skipped {
            tracing::warn!(shop = %shop.name, %reason, "price list entry skipped");
        }
        tracing::info!(shop_id = shop.id, products, skipped = skipped.len(), "price list imported");

        Ok(LoadSummary { shop: shop.name, shop_id: shop.id, categories: categories.len(), products, skipped })
    }

    /// Writes the whole catalog to `path` as an export document.
    pub async fn export_to(&self, path: &Path) -> Result<ExportSummary, ServiceError> {
        let mut tx = self.db.begin().await?;
        let export = self.products.export(&mut tx).await?;
        tx.commit().await?;

        let summary = ExportSummary {
            file: path.display().to_string(),
            shops: export.shops.len(),
            categories: export.categories.len(),
            products: export.products.len(),
            product_infos: export.product_infos.len(),
        };
        let json = export.to_json().map_err(std::io::Error::from)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;

        tracing::info!(file = %summary.file, products = summary.products, "catalog exported");
        Ok(summary)
    }
}

#[derive(Clone)]
pub struct PgPartnersService {
    queue: Arc<dyn TaskQueue>,
    results: PgTaskResultsRepository,
    data_dir: PathBuf,
}

impl PgPartnersService {
    #[must_use]
    pub fn new(db: Db, queue: Arc<dyn TaskQueue>, data_dir: impl Into<PathBuf>) -> Self {
        Self { queue, results: PgTaskResultsRepository::new(db.pool().clone()), data_dir: data_dir.into() }
    }
}

#[async_trait]
impl PartnersService for PgPartnersService {
    async fn upload_catalog(&self, actor: Actor, filename: String, contents: Vec<u8>) -> Result<Uuid, ServiceError> {
        let name = upload_file_name(&filename)?;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.data_dir.join(name);
        tokio::fs::write(&path, contents).await?;

        let path = path.display().to_string();
        tracing::info!(uploader = actor.id, %path, "price list uploaded");
        Ok(self.queue.enqueue(Task::LoadPartnerCatalog { path, uploader_id: actor.id }).await?)
    }

    async fn request_export(&self) -> Result<Uuid, ServiceError> {
        let path = self.data_dir.join(EXPORT_FILE_NAME).display().to_string();
        Ok(self.queue.enqueue(Task::ExportCatalog { path }).await?)
    }

    async fn task_status(&self, id: Uuid) -> Result<TaskReport, ServiceError> {
        let Some(record) = self.results.find(id).await? else {
            return Ok(TaskReport::default());
        };
        let status = record.status.parse::<TaskState>()?;
        Ok(TaskReport {
            status,
            data: record.result.filter(|_| status == TaskState::Success),
            error: record.error.filter(|_| status == TaskState::Failure),
        })
    }
}

/// The bare file name of an upload, which must be a `.json` file.
fn upload_file_name(filename: &str) -> Result<&str, ServiceError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ServiceError::Upload("Файл не загружен".to_string()))?;
    if !name.to_ascii_lowercase().ends_with(".json") {
        return Err(ServiceError::Upload("Неверный формат файла. Ожидается JSON.".to_string()));
    }
    Ok(name)
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PartnersService: Send + Sync {
    /// Stores an uploaded price list and queues its import.
    async fn upload_catalog(&self, actor: Actor, filename: String, contents: Vec<u8>) -> Result<Uuid, ServiceError>;

    /// Queues an export of the whole catalog.
    async fn request_export(&self) -> Result<Uuid, ServiceError>;

    /// Progress of a queued task. Unknown ids are reported as pending.
    async fn task_status(&self, id: Uuid) -> Result<TaskReport, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_keeps_only_the_file_name() {
        assert_eq!(upload_file_name("shop1.json").unwrap(), "shop1.json");
        assert_eq!(upload_file_name("../../etc/shop1.JSON").unwrap(), "shop1.JSON");
    }

    #[test]
    fn upload_requires_json() {
        let Err(ServiceError::Upload(message)) = upload_file_name("shop1.yaml") else {
            panic!("expected an upload error");
        };
        assert_eq!(message, "Неверный формат файла. Ожидается JSON.");
        assert!(matches!(upload_file_name(""), Err(ServiceError::Upload(_))));
    }
}
