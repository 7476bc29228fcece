//! HTTP server for the change log.
//!
//! Exposes a [`clog_stream::ChangeStream`] over JSON/HTTP: producers append,
//! consumers subscribe and read (optionally long-polling for new events),
//! acknowledge progress, and replay bounded ranges. Stream errors map onto
//! HTTP status codes in [`ServerError`].

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::ClogServer;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::{AppendResponse, EventsResponse, ProgressResponse, ReadResponse};

    fn app() -> (Router, AppState) {
        let stream = ServerConfig::default().open_stream().unwrap();
        let state = AppState::new(stream, Duration::from_millis(500));
        (router::build_router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn append(app: &Router, event_type: &str) -> AppendResponse {
        let (status, body) = send(
            app,
            Method::POST,
            "/events",
            Some(json!({ "event_type": event_type, "after": "7b7d", "source": "test" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_value(body).unwrap()
    }

    async fn subscribe(app: &Router, from: u64) -> String {
        let (status, body) = send(app, Method::POST, &format!("/subscriptions?from={from}"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["cursor_id"].as_str().unwrap().to_string()
    }

    async fn read(app: &Router, cursor: &str, max: usize) -> ReadResponse {
        let (status, body) =
            send(app, Method::GET, &format!("/subscriptions/{cursor}?max={max}"), None).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    fn offsets(read: &ReadResponse) -> Vec<u64> {
        read.events.iter().map(|e| e.offset).collect()
    }

    // -----------------------------------------------------------------------
    // Operational
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn info_endpoint() {
        let (app, _) = app();
        append(&app, "create").await;
        let (status, body) = send(&app, Method::GET, "/v1/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "clog-server");
        assert_eq!(body["next_offset"], 1);
    }

    // -----------------------------------------------------------------------
    // Full consumer flow
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_read_ack_replay() {
        let (app, _) = app();
        for (i, kind) in ["create", "update", "delete"].into_iter().enumerate() {
            assert_eq!(append(&app, kind).await.offset, i as u64);
        }

        let cursor = subscribe(&app, 0).await;
        let first = read(&app, &cursor, 2).await;
        assert_eq!(offsets(&first), vec![0, 1]);
        assert_eq!(first.position, 2);
        assert_eq!(first.events[0].after, "7b7d");
        assert_eq!(offsets(&read(&app, &cursor, 10).await), vec![2]);
        assert!(read(&app, &cursor, 10).await.events.is_empty());

        let (status, _) = send(&app, Method::POST, "/consumers/consumerX/ack?offset=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/consumers/consumerX/progress", None).await;
        let progress: ProgressResponse = serde_json::from_value(body).unwrap();
        assert_eq!(progress.acknowledged_offset, Some(1));
        assert_eq!(progress.resume_offset, 2);

        let (status, body) = send(&app, Method::GET, "/events?from=0&to=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let replayed: EventsResponse = serde_json::from_value(body).unwrap();
        let kinds: Vec<_> = replayed.events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["create", "update", "delete"]);

        let (status, body) = send(&app, Method::GET, "/events?from=1&to=5", None).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(body["error"], "out_of_range");
    }

    // -----------------------------------------------------------------------
    // Error mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn inverted_replay_is_bad_request() {
        let (app, _) = app();
        for _ in 0..10 {
            append(&app, "tick").await;
        }
        let (status, body) = send(&app, Method::GET, "/events?from=5&to=2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_range");
    }

    #[tokio::test]
    async fn negative_offsets_are_out_of_range() {
        let (app, _) = app();
        append(&app, "create").await;
        let (status, _) = send(&app, Method::POST, "/subscriptions?from=-1", None).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        let (status, _) = send(&app, Method::GET, "/events/-3", None).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        let (status, _) = send(&app, Method::POST, "/consumers/c/ack?offset=-1", None).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn missing_event_and_cursor_are_not_found() {
        let (app, _) = app();
        let (status, _) = send(&app, Method::GET, "/events/0", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::GET, "/subscriptions/not-a-cursor", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let cursor = subscribe(&app, 0).await;
        let (status, _) = send(&app, Method::DELETE, &format!("/subscriptions/{cursor}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, Method::GET, &format!("/subscriptions/{cursor}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn empty_event_type_is_unprocessable() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::POST, "/events", Some(json!({ "event_type": "" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn unknown_consumer_has_no_progress() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/consumers/nobody/progress", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["acknowledged_offset"].is_null());
        assert_eq!(body["resume_offset"], 0);
    }

    #[tokio::test]
    async fn closed_stream_is_unavailable() {
        let (app, state) = app();
        state.stream.close().unwrap();
        let (status, body) = send(&app, Method::POST, "/events", Some(json!({ "event_type": "x" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "closed");
        let (status, _) = send(&app, Method::GET, "/v1/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    // -----------------------------------------------------------------------
    // Long-poll
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn long_poll_wakes_on_append() {
        let (app, _) = app();
        let cursor = subscribe(&app, 0).await;

        let reader = {
            let app = app.clone();
            let uri = format!("/subscriptions/{cursor}?max=10&wait_ms=5000");
            tokio::spawn(async move { send(&app, Method::GET, &uri, None).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&app, "create").await;

        let (status, body) = reader.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let read: ReadResponse = serde_json::from_value(body).unwrap();
        assert_eq!(offsets(&read), vec![0]);
    }

    #[tokio::test]
    async fn long_poll_times_out_empty() {
        let (app, _) = app();
        let cursor = subscribe(&app, 0).await;
        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/subscriptions/{cursor}?wait_ms=20"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"], json!([]));
        assert_eq!(body["position"], 0);
    }

    #[tokio::test]
    async fn consumers_are_listed() {
        let (app, _) = app();
        append(&app, "create").await;
        send(&app, Method::POST, "/consumers/b/ack?offset=0", None).await;
        send(&app, Method::POST, "/consumers/a/ack?offset=0", None).await;
        let (_, body) = send(&app, Method::GET, "/consumers", None).await;
        let names: Vec<_> = body["consumers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["consumer"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn stream_is_shared_with_state() {
        let stream = ServerConfig::default().open_stream().unwrap();
        let state = AppState::new(Arc::clone(&stream), Duration::from_secs(1));
        assert!(Arc::ptr_eq(&stream, &state.stream));
    }
}
