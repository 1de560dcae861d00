//! Progress feed routes.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::validate_media_id;
use crate::api::server::AppState;

/// Create the progress router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{key}", get(progress_feed))
}

/// Subscribe to a transfer's progress as server-sent events.
///
/// One `data:` frame per event; the stream ends right after the terminal
/// event, or when the channel is retired without one. Closing the feed never
/// affects the transfer itself.
async fn progress_feed(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    validate_media_id(&key)?;

    let bus = state
        .progress_bus
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Progress bus not available"))?;

    let subscription = bus.subscribe(&key);
    let stream = futures::stream::unfold(Some(subscription), |sub| async move {
        let mut sub = sub?;
        let event = sub.recv().await?;
        let frame = Event::default().json_data(&event).ok()?;
        let next = if event.is_terminal() { None } else { Some(sub) };
        Some((Ok(frame), next))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
