use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::{Stream, StreamExt as _, stream};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::{
    config::{Config, SECRET_HEADER},
    event::{Event, Timestamp},
    server::{AppState, app_error::AppError},
};

/// How many historical events a freshly opened stream receives as catch-up.
const CATCH_UP_EVENTS: usize = 10;

/// Accepts a webhook notification, commits it to the log and fans it out.
///
/// With a secret configured, the `x-webhook-secret` header must match
/// exactly; nothing is committed otherwise. Ingestion is all-or-nothing per
/// request: a body that fails to parse leaves the log untouched.
#[axum::debug_handler]
#[instrument(skip_all)]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    authorize(&state.config, &headers)?;

    let Json(body) = body.map_err(|rejection| AppError::MalformedBody(rejection.body_text()))?;
    let event = Event::from_webhook(body, current_millis())?;

    state.store.append(event.clone()).await;
    let delivered = state.hub.publish(&event);
    info!(donor = ?event.donor(), delivered, "webhook event committed");

    Ok(Json(json!({ "ok": true, "delivered": delivered })))
}

/// Returns the retained history, newest first, for polling clients.
#[axum::debug_handler]
#[instrument(skip_all)]
pub async fn get_events(State(state): State<Arc<AppState>>) -> Json<Value> {
    let events = state.store.snapshot().await;
    Json(json!({ "ok": true, "events": events }))
}

/// Opens a live event stream over SSE.
///
/// The connection stays up until the client disconnects; dropping the
/// response stream drops the hub subscription, which deregisters it.
#[axum::debug_handler]
#[instrument(skip_all)]
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    let events = subscriber_stream(state).await;
    Sse::new(events.map(|event| SseEvent::default().json_data(&event)))
        .keep_alive(KeepAlive::default())
}

/// Replay-then-live event stream for one new subscriber.
///
/// The subscriber is registered first, then the most recent history is
/// replayed oldest-of-the-batch first so the client's display order matches
/// later live pushes. An event published between registration and the
/// snapshot can arrive through both paths; clients key on id/timestamp to
/// drop the occasional duplicate.
pub(super) async fn subscriber_stream(state: Arc<AppState>) -> impl Stream<Item = Event> {
    let subscription = Arc::clone(&state.hub).subscribe();
    let backlog = state.store.snapshot_recent(CATCH_UP_EVENTS).await;
    debug!(
        subscriber = subscription.id(),
        backlog = backlog.len(),
        "stream opened"
    );

    stream::iter(backlog.into_iter().rev()).chain(subscription)
}

/// Diagnostic echo for webhook wiring: logs and returns whatever arrived,
/// along with the chain configuration. No secret gate, no log mutation.
#[axum::debug_handler]
#[instrument(skip_all)]
pub async fn debug_event(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Json<Value> {
    let received = body.map(|Json(value)| value).unwrap_or(Value::Null);
    info!(body = %received, "debug webhook hit");
    Json(json!({
        "ok": true,
        "chain": state.config.chain,
        "subscribers": state.hub.subscriber_count(),
        "received": received,
    }))
}

/// Exact-equality check of the shared-secret header, skipped in open mode.
fn authorize(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(secret) = config.webhook_secret.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented != secret {
        return Err(AppError::InvalidSecret);
    }
    Ok(())
}

fn current_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Timestamp)
        .unwrap_or_default()
}
