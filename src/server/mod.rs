mod app_error;
mod handlers;

use anyhow::{Context, Result};
use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;

use crate::{
    broadcast::BroadcastHub,
    config::Config,
    server::handlers::{debug_event, get_events, ingest_event, stream_events},
    storage::{BoundedLog, EventStore},
};

/// How many events the log retains before evicting the oldest.
const LOG_CAPACITY: usize = 100;

/// Shared application state.
struct AppState {
    store: Arc<dyn EventStore + Send + Sync + 'static>,
    hub: Arc<BroadcastHub>,
    config: Config,
}

/// Dummy handler to show the server is running.
async fn welcome() -> impl IntoResponse {
    "Donor event relay is up. The dashboard talks to /events."
}

/// Creates a new server with a fresh log and hub. Used for testing, too.
pub fn make_server(config: Config) -> Router {
    let shared_state = Arc::new(AppState {
        store: Arc::new(BoundedLog::new(LOG_CAPACITY)),
        hub: Arc::new(BroadcastHub::new()),
        config,
    });
    Router::new()
        .route("/events", get(get_events))
        .route("/events/webhook", post(ingest_event))
        .route("/events/webhook/debug", post(debug_event))
        .route("/events/stream", get(stream_events))
        .route("/", get(welcome))
        .with_state(shared_state)
}

/// Starts the server on the configured address.
pub async fn serve() -> Result<()> {
    let config = Config::from_env();
    let bind_address = config.bind_address.clone();
    let app = make_server(config);

    println!("Listening on http://{bind_address}");
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {bind_address}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "Failed to start server")
}

/// Resolves on ctrl-c. In-flight requests finish; open streams close, which
/// deregisters their subscribers.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use futures::{FutureExt as _, StreamExt as _};
    use serde_json::{Map, Value, json};
    use std::sync::Arc;

    use crate::{
        broadcast::BroadcastHub,
        config::{Config, SECRET_HEADER},
        event::Event,
        server::{AppState, LOG_CAPACITY, handlers, make_server},
        storage::{BoundedLog, EventStore as _},
    };

    fn make_test_server() -> TestServer {
        TestServer::new(make_server(Config::default_for_test())).unwrap()
    }

    fn make_secured_server(secret: &str) -> TestServer {
        let mut config = Config::default_for_test();
        config.webhook_secret = Some(secret.to_string());
        TestServer::new(make_server(config)).unwrap()
    }

    fn event(timestamp: u64) -> Event {
        Event {
            timestamp,
            fields: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_ingest_then_poll() {
        let server = make_test_server();

        let response = server
            .post("/events/webhook")
            .json(&json!({ "event": "DonationApproved", "donor": "0xabc", "unitsApproved": 2 }))
            .await;
        assert_eq!(response.status_code(), 200);
        let ack = response.json::<Value>();
        assert_eq!(ack["ok"], json!(true));
        // no live subscribers yet
        assert_eq!(ack["delivered"], json!(0));

        let history = server.get("/events").await.json::<Value>();
        assert_eq!(history["ok"], json!(true));
        let events = history["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["donor"], json!("0xabc"));
        assert_eq!(events[0]["unitsApproved"], json!(2));
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let server = make_test_server();
        for timestamp in [10, 20, 30] {
            server
                .post("/events/webhook")
                .json(&json!({ "timestamp": timestamp }))
                .await
                .assert_status_ok();
        }

        let history = server.get("/events").await.json::<Value>();
        let timestamps: Vec<u64> = history["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(timestamps, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn test_wrong_or_missing_secret_rejected() {
        let server = make_secured_server("hunter2");

        let response = server
            .post("/events/webhook")
            .add_header(
                HeaderName::from_static(SECRET_HEADER),
                HeaderValue::from_static("wrong"),
            )
            .json(&json!({ "donor": "0xabc" }))
            .await;
        assert_eq!(response.status_code(), 401);
        assert_eq!(response.json::<Value>()["ok"], json!(false));

        let response = server
            .post("/events/webhook")
            .json(&json!({ "donor": "0xabc" }))
            .await;
        assert_eq!(response.status_code(), 401);

        // nothing was committed
        let history = server.get("/events").await.json::<Value>();
        assert!(history["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_correct_secret_accepted() {
        let server = make_secured_server("hunter2");

        let response = server
            .post("/events/webhook")
            .add_header(
                HeaderName::from_static(SECRET_HEADER),
                HeaderValue::from_static("hunter2"),
            )
            .json(&json!({ "donor": "0xabc" }))
            .await;
        assert_eq!(response.status_code(), 200);

        let history = server.get("/events").await.json::<Value>();
        assert_eq!(history["events"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let server = make_test_server();

        let response = server
            .post("/events/webhook")
            .text("{ not json")
            .content_type("application/json")
            .await;
        assert_eq!(response.status_code(), 400);
        assert_eq!(response.json::<Value>()["ok"], json!(false));

        // a parseable body that is not an object is rejected too
        let response = server.post("/events/webhook").json(&json!([1, 2, 3])).await;
        assert_eq!(response.status_code(), 400);

        let history = server.get("/events").await.json::<Value>();
        assert!(history["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_donor_normalization_end_to_end() {
        let server = make_test_server();
        server
            .post("/events/webhook")
            .json(&json!({ "donor": { "0xabc": "" }, "newLevel": "3" }))
            .await
            .assert_status_ok();

        let history = server.get("/events").await.json::<Value>();
        let events = history["events"].as_array().unwrap();
        assert_eq!(events[0]["donor"], json!("0xabc"));
        assert_eq!(events[0]["newLevel"], json!(3));
    }

    #[tokio::test]
    async fn test_debug_echo() {
        let server = make_test_server();

        let response = server
            .post("/events/webhook/debug")
            .json(&json!({ "probe": true }))
            .await;
        assert_eq!(response.status_code(), 200);
        let body = response.json::<Value>();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["received"], json!({ "probe": true }));
        assert_eq!(body["chain"]["rpc_url"], json!("http://localhost:8545"));
        assert_eq!(body["subscribers"], json!(0));

        // the debug route never commits anything
        let history = server.get("/events").await.json::<Value>();
        assert!(history["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_welcome() {
        let server = make_test_server();
        server.get("/").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_catch_up_then_live_without_duplicates() {
        let state = Arc::new(AppState {
            store: Arc::new(BoundedLog::new(LOG_CAPACITY)),
            hub: Arc::new(BroadcastHub::new()),
            config: Config::default_for_test(),
        });
        for i in 1..=5 {
            state.store.append(event(i)).await;
        }

        let mut stream = handlers::subscriber_stream(Arc::clone(&state)).await;

        let live = event(6);
        state.store.append(live.clone()).await;
        assert_eq!(state.hub.publish(&live), 1);

        // replay arrives oldest-first, then the live event exactly once
        for expected in 1..=6 {
            assert_eq!(stream.next().await.unwrap().timestamp, expected);
        }
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_catch_up_is_bounded() {
        let state = Arc::new(AppState {
            store: Arc::new(BoundedLog::new(LOG_CAPACITY)),
            hub: Arc::new(BroadcastHub::new()),
            config: Config::default_for_test(),
        });
        for i in 1..=25 {
            state.store.append(event(i)).await;
        }

        let mut stream = handlers::subscriber_stream(Arc::clone(&state)).await;

        // only the 10 newest replay, oldest of the batch first
        for expected in 16..=25 {
            assert_eq!(stream.next().await.unwrap().timestamp, expected);
        }
        assert!(stream.next().now_or_never().is_none());
    }
}
