//! Media metadata routes.

use axum::{Json, Router, extract::Query, extract::State, routing::get};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{MetadataResponse, validate_media_id};
use crate::api::server::AppState;

/// Create the media router.
pub fn router() -> Router<AppState> {
    Router::new().route("/metadata", get(get_metadata))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataQuery {
    media_id: String,
}

/// Resolve a media id into its metadata and selectable encodings.
async fn get_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> ApiResult<Json<MetadataResponse>> {
    validate_media_id(&query.media_id)?;

    let catalog = state
        .catalog
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Catalog provider not available"))?;

    let media = catalog.fetch_media(&query.media_id).await?;
    Ok(Json(MetadataResponse::from(&media)))
}
