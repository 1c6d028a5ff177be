//! Partner price-list handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, AuthUser};
use crate::{
    context::AppContext,
    domain::aggregates::UserRole,
    services::ServiceError,
    tasks::TaskReport,
};

const STAFF: &[UserRole] = &[UserRole::Supplier, UserRole::Admin];
const NO_FILE: &str = "Файл не загружен";

/// Accepts a price list in the multipart field `file` and queues its import.
pub(crate) async fn upload_catalog(
    State(app): State<AppContext>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let actor = user.require(STAFF)?;
    let upload = |message: &str| ApiError::from(ServiceError::Upload(message.to_string()));

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| upload(NO_FILE))? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let contents = field.bytes().await.map_err(|_| upload(NO_FILE))?;
        file = Some((filename, contents.to_vec()));
        break;
    }
    let (filename, contents) = file.filter(|(_, contents)| !contents.is_empty()).ok_or_else(|| upload(NO_FILE))?;

    let task_id = app.partners.upload_catalog(actor, filename, contents).await?;

    Ok(Json(json!({ "message": "Задача на загрузку данных поставлена в очередь", "task_id": task_id })))
}

/// Queues an export of the catalog.
pub(crate) async fn request_export(
    State(app): State<AppContext>,
    user: AuthUser,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require(STAFF)?;

    let task_id = app.partners.request_export().await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))))
}

pub(crate) async fn task_status(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskReport>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.partners.task_status(task_id).await?))
}
