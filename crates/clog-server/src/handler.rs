use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::debug;

use clog_stream::SharedChangeStream;
use clog_types::{ConsumerId, CursorId, Offset};

use crate::api::{
    AppendRequest, AppendResponse, ConsumersResponse, CursorView, EventView, EventsResponse,
    HealthResponse, InfoResponse, ProgressResponse, ReadResponse, SubscribeResponse,
};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub stream: Arc<SharedChangeStream>,
    /// Woken after every successful append, for long-polling readers.
    pub appended: Arc<Notify>,
    pub long_poll_max: Duration,
}

impl AppState {
    pub fn new(stream: Arc<SharedChangeStream>, long_poll_max: Duration) -> Self {
        Self {
            stream,
            appended: Arc::new(Notify::new()),
            long_poll_max,
        }
    }
}

/// Offsets are accepted as signed so that a negative value is reported as
/// out of range rather than as a malformed query.
fn offset(raw: i64) -> ServerResult<Offset> {
    Offset::try_from(raw).map_err(|_| ServerError::NegativeOffset(raw))
}

fn cursor_id(raw: &str) -> ServerResult<CursorId> {
    raw.parse()
        .map_err(|_| ServerError::UnknownCursor(raw.to_string()))
}

fn consumer_id(raw: String) -> ServerResult<ConsumerId> {
    ConsumerId::new(raw).map_err(|e| ServerError::Stream(e.into()))
}

fn progress_view(state: &AppState, consumer: ConsumerId) -> ServerResult<ProgressResponse> {
    let acknowledged_offset = state.stream.progress(&consumer)?;
    Ok(ProgressResponse {
        resume_offset: acknowledged_offset.map_or(0, |o| o + 1),
        acknowledged_offset,
        consumer: consumer.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub async fn append_handler(
    State(state): State<AppState>,
    Json(request): Json<AppendRequest>,
) -> ServerResult<(StatusCode, Json<AppendResponse>)> {
    let event = request.into_new_event()?;
    let stream = Arc::clone(&state.stream);
    let stored = tokio::task::spawn_blocking(move || stream.append(event))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    state.appended.notify_waiters();
    Ok((
        StatusCode::CREATED,
        Json(AppendResponse {
            offset: stored.offset,
            event_id: stored.event_id.to_hex(),
        }),
    ))
}

pub async fn get_event_handler(
    State(state): State<AppState>,
    Path(raw): Path<i64>,
) -> ServerResult<Json<EventView>> {
    let event = state.stream.get(offset(raw)?)?;
    Ok(Json(EventView::from(&event)))
}

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    pub from: i64,
    pub to: Option<i64>,
}

pub async fn replay_handler(
    State(state): State<AppState>,
    Query(query): Query<ReplayQuery>,
) -> ServerResult<Json<EventsResponse>> {
    let from = offset(query.from)?;
    let events = match query.to {
        Some(to) => state.stream.replay(from, offset(to)?)?,
        None => state.stream.replay_from(from)?,
    };
    Ok(Json(EventsResponse::new(&events)))
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    #[serde(default)]
    pub from: i64,
    pub owner: Option<String>,
}

pub async fn subscribe_handler(
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> ServerResult<(StatusCode, Json<SubscribeResponse>)> {
    let from = offset(query.from)?;
    let id = state.stream.subscribe_as(from, query.owner)?;
    Ok((
        StatusCode::CREATED,
        Json(SubscribeResponse {
            cursor_id: id.to_string(),
            position: from,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub max: Option<usize>,
    #[serde(default)]
    pub wait_ms: u64,
}

pub async fn read_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ReadQuery>,
) -> ServerResult<Json<ReadResponse>> {
    let id = cursor_id(&raw)?;
    let max = query
        .max
        .unwrap_or(state.stream.config().max_read_batch);

    let mut batch = state.stream.read_batch(&id, max)?;
    if batch.events.is_empty() && query.wait_ms > 0 && max > 0 {
        let wait = Duration::from_millis(query.wait_ms).min(state.long_poll_max);
        // Register before re-reading so an append in between still wakes us.
        let appended = state.appended.notified();
        batch = state.stream.read_batch(&id, max)?;
        if batch.events.is_empty() {
            debug!(cursor = %id.short_id(), wait_ms = wait.as_millis() as u64, "long-poll waiting");
            if tokio::time::timeout(wait, appended).await.is_ok() {
                batch = state.stream.read_batch(&id, max)?;
            }
        }
    }

    Ok(Json(ReadResponse {
        events: batch.events.iter().map(EventView::from).collect(),
        position: batch.position,
    }))
}

pub async fn cursor_info_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ServerResult<Json<CursorView>> {
    let id = cursor_id(&raw)?;
    Ok(Json(CursorView::from(state.stream.cursor_info(&id)?)))
}

pub async fn unsubscribe_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ServerResult<StatusCode> {
    let id = cursor_id(&raw)?;
    state.stream.unsubscribe(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Consumers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AckQuery {
    pub offset: i64,
}

pub async fn ack_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<AckQuery>,
) -> ServerResult<Json<ProgressResponse>> {
    let consumer = consumer_id(raw)?;
    let offset = offset(query.offset)?;

    let stream = Arc::clone(&state.stream);
    let acked = consumer.clone();
    tokio::task::spawn_blocking(move || stream.acknowledge(&acked, offset))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(progress_view(&state, consumer)?))
}

pub async fn progress_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ServerResult<Json<ProgressResponse>> {
    let consumer = consumer_id(raw)?;
    Ok(Json(progress_view(&state, consumer)?))
}

pub async fn consumers_handler(
    State(state): State<AppState>,
) -> ServerResult<Json<ConsumersResponse>> {
    let consumers = state
        .stream
        .consumers()?
        .into_iter()
        .map(|(consumer, acked)| ProgressResponse {
            consumer: consumer.to_string(),
            acknowledged_offset: Some(acked),
            resume_offset: acked + 1,
        })
        .collect();
    Ok(Json(ConsumersResponse { consumers }))
}

// ---------------------------------------------------------------------------
// Operational
// ---------------------------------------------------------------------------

/// Health check handler.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let closed = state.stream.is_closed();
    let status = if closed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(HealthResponse {
            status: if closed { "closed" } else { "ok" }.into(),
            closed,
        }),
    )
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    let stats = state.stream.stats();
    Json(InfoResponse::new(
        &stats,
        state.stream.config().max_read_batch,
    ))
}
