//! Download routes.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, header},
    response::Response,
    routing::post,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{DownloadRequestBody, validate_media_id};
use crate::api::server::AppState;
use crate::transfer::DownloadRequest;

/// Create the download router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(start_download))
}

/// Start a transfer and stream its payload back as an attachment.
///
/// Headers go out once the transfer has launched; failures before that point
/// surface as JSON errors, later ones terminate the stream.
async fn start_download(
    State(state): State<AppState>,
    Json(body): Json<DownloadRequestBody>,
) -> ApiResult<Response> {
    validate_media_id(&body.media_id)?;

    let service = state
        .transfer_service
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Transfer service not available"))?;

    let transfer = service.start(DownloadRequest::from(body)).await?;

    let disposition = format!("attachment; filename=\"{}\"", transfer.file_name);
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, transfer.content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(transfer.body))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}
