//! API request handlers

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Extension, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use super::RouteSettings;
use crate::{
    cache::TtlCache,
    error::{ApiError, StorageError},
    middleware::{
        CsrfGuard, Identity, InputValidator, RequestCookies, RouteProtector, UploadError,
        UploadValidator, UploadedFile,
    },
    observability::GuardMetrics,
    storage::{Collection, CollectionStore},
};

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CollectionStore>,
    pub cache: Arc<TtlCache<Vec<Value>>>,
    pub protector: Arc<RouteProtector>,
    pub csrf: Arc<CsrfGuard>,
    pub uploads: Arc<UploadValidator>,
    pub metrics: Arc<GuardMetrics>,
    pub settings: RouteSettings,
    pub(super) write_lock: Arc<Mutex<()>>,
}

/// Response carrying the caller's CSRF token
#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
}

/// Response from a stored upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

impl AppState {
    fn storage_failure(&self, err: StorageError) -> ApiError {
        error!("Storage operation failed: {}", err);
        self.metrics.record_storage_failure();
        ApiError::StorageFailure
    }

    /// Collection records, served from the read cache when fresh
    async fn cached_records(&self, collection: Collection) -> Result<Vec<Value>, ApiError> {
        self.cache
            .get_cached_data(
                &collection.cache_key(),
                || self.store.read_collection(collection.name()),
                self.settings.cache_ttl,
            )
            .await
            .map_err(|e| self.storage_failure(e))
    }

    /// Read-modify-write a collection and drop its cached copy.
    ///
    /// Writers are serialized; nothing is written if `apply` fails.
    async fn mutate<T, F>(&self, collection: Collection, apply: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut Vec<Value>) -> Result<T, ApiError>,
    {
        let _write = self.write_lock.lock().await;

        let mut records = self
            .store
            .read_collection(collection.name())
            .await
            .map_err(|e| self.storage_failure(e))?;

        let out = apply(&mut records)?;

        self.store
            .write_collection(collection.name(), &records)
            .await
            .map_err(|e| self.storage_failure(e))?;
        self.cache.delete(&collection.cache_key());

        Ok(out)
    }
}

fn parse_collection(name: &str) -> Result<Collection, ApiError> {
    name.parse::<Collection>().map_err(ApiError::NotFound)
}

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn not_found(collection: Collection, id: &str) -> ApiError {
    ApiError::NotFound(format!("No {} record with id {}", collection, id))
}

/// Issue (or return the existing) CSRF token
pub async fn csrf_token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut cookies = RequestCookies::from_headers(&headers);
    let token = state.csrf.token_or_issue(&mut cookies);

    let mut response = Json(CsrfTokenResponse { token }).into_response();
    cookies.write_to(response.headers_mut());
    response
}

/// List a collection
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let collection = parse_collection(&collection)?;
    Ok(Json(state.cached_records(collection).await?))
}

/// Fetch one record
pub async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let collection = parse_collection(&collection)?;

    state
        .cached_records(collection)
        .await?
        .into_iter()
        .find(|record| record_id(record) == Some(id.as_str()))
        .map(Json)
        .ok_or_else(|| not_found(collection, &id))
}

/// Create a record
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let collection = parse_collection(&collection)?;
    let mut fields = InputValidator::validate_record(&parse_json(&body)?, collection.required_field())?;

    let now = now_timestamp();
    let id = Uuid::new_v4().to_string();
    fields.insert("id".to_string(), Value::String(id.clone()));
    fields.insert("createdAt".to_string(), Value::String(now.clone()));
    fields.insert("updatedAt".to_string(), Value::String(now));
    let record = Value::Object(fields);

    let stored = record.clone();
    state
        .mutate(collection, move |records| {
            records.push(stored);
            Ok(())
        })
        .await?;

    info!(collection = %collection, id = %id, subject = %identity.subject, "Record created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// Update fields of a record
pub async fn update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let collection = parse_collection(&collection)?;
    let patch = InputValidator::validate_patch(&parse_json(&body)?, collection.required_field())?;

    let updated = state
        .mutate(collection, |records| {
            let record = records
                .iter_mut()
                .find(|record| record_id(record) == Some(id.as_str()))
                .and_then(Value::as_object_mut)
                .ok_or_else(|| not_found(collection, &id))?;

            merge_fields(record, patch);
            record.insert("updatedAt".to_string(), Value::String(now_timestamp()));
            Ok(Value::Object(record.clone()))
        })
        .await?;

    info!(collection = %collection, id = %id, subject = %identity.subject, "Record updated");
    Ok(Json(updated))
}

fn merge_fields(record: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        record.insert(key, value);
    }
}

/// Delete a record
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;

    state
        .mutate(collection, |records| {
            let before = records.len();
            records.retain(|record| record_id(record) != Some(id.as_str()));
            if records.len() == before {
                return Err(not_found(collection, &id));
            }
            Ok(())
        })
        .await?;

    info!(collection = %collection, id = %id, subject = %identity.subject, "Record deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Accept an image upload.
///
/// Content is validated before anything is stored.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let file = match read_file_field(&mut multipart).await? {
        Some(file) => file,
        None => {
            state.metrics.record_invalid_upload();
            return Err(UploadError::Missing.into());
        }
    };

    let detected = state.uploads.check(&file).map_err(|e| {
        state.metrics.record_invalid_upload();
        ApiError::from(e)
    })?;

    let extension = detected
        .map(|d| d.extension())
        .unwrap_or_else(|| extension_for(&file.content_type));
    let key = format!("{}.{}", Uuid::new_v4().simple(), extension);
    let url = state
        .store
        .put_asset(&key, &file.bytes)
        .await
        .map_err(|e| state.storage_failure(e))?;

    info!(url = %url, size = file.bytes.len(), subject = %identity.subject, "Upload stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url,
            content_type: detected
                .map(|d| d.mime().to_string())
                .unwrap_or(file.content_type),
            size: file.bytes.len(),
        }),
    ))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        return Ok(Some(UploadedFile::new(content_type, bytes)));
    }

    Ok(None)
}

/// File extension for a declared image type whose bytes were not recognised
fn extension_for(content_type: &str) -> &'static str {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_fields_overwrites_and_adds() {
        let mut record = json!({"id": "1", "title": "Old", "tags": ["a"]})
            .as_object()
            .cloned()
            .unwrap();
        let patch = json!({"title": "New", "summary": "s"}).as_object().cloned().unwrap();

        merge_fields(&mut record, patch);

        assert_eq!(record["title"], "New");
        assert_eq!(record["summary"], "s");
        assert_eq!(record["id"], "1");
    }

    #[test]
    fn test_unknown_collection_is_not_found() {
        assert!(matches!(parse_collection("users"), Err(ApiError::NotFound(_))));
        assert_eq!(parse_collection("blog"), Ok(Collection::Blog));
    }

    #[test]
    fn test_extension_for_declared_type() {
        assert_eq!(extension_for("image/PNG"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
    }
}
