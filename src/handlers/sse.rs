use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::info;

use crate::error::AppError;
use crate::AppState;

/// Live notifications as server-sent events, starting from the moment of
/// connection. Closing the connection drops the subscription and its tail.
pub async fn live_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state
        .gateway
        .subscribe()
        .await
        .map_err(|e| AppError::ServiceUnavailable(format!("broadcast log: {}", e)))?;
    info!("Live client connected");

    let stream = subscription
        .into_stream()
        .map(|notification| Ok(Event::default().data(notification.frame())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
