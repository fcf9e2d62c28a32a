mod log_file;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::log_file::{ClearOutcome, LogFile};

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_LOG_FILE: &str = "log/sensor_log.txt";
const MISSING_MESSAGE: &str = "No event message provided.";
const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone)]
struct AppState {
    log: Arc<LogFile>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::var("ROOMCTL_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let port = std::env::var("LOG_RECEIVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let state = AppState {
        log: Arc::new(LogFile::new(path)),
    };
    info!("writing events to {}", state.log.path().display());

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("log receiver listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/log", post(handle_log))
        .route("/logs_data", get(handle_logs_data))
        .route("/clear_logs", get(handle_clear_logs))
        .with_state(state)
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_log(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "Request must be JSON");
    };

    let line = format_entry(event_message(&payload), Local::now().naive_local());
    match state.log.append(&line).await {
        Ok(()) => (StatusCode::OK, "Log received"),
        Err(err) => {
            warn!("failed to append to {}: {err}", state.log.path().display());
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to write log entry")
        }
    }
}

async fn handle_logs_data(State(state): State<AppState>) -> (StatusCode, String) {
    match state.log.read().await {
        Ok(Some(contents)) => (StatusCode::OK, contents),
        Ok(None) => (StatusCode::NOT_FOUND, "Log file not found.".to_string()),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error reading log file: {err}"),
        ),
    }
}

async fn handle_clear_logs(State(state): State<AppState>) -> (StatusCode, String) {
    match state.log.clear().await {
        Ok(ClearOutcome::Cleared) => {
            info!("log file cleared");
            (StatusCode::OK, "Log file cleared successfully".to_string())
        }
        Ok(ClearOutcome::Missing) => (StatusCode::NOT_FOUND, "Log file not found".to_string()),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error clearing log file: {err}"),
        ),
    }
}

fn event_message(payload: &Value) -> &str {
    payload
        .get("event_message")
        .and_then(Value::as_str)
        .unwrap_or(MISSING_MESSAGE)
}

fn format_entry(message: &str, received_at: NaiveDateTime) -> String {
    format!("{} - {message}", received_at.format("%d/%m %H:%M:%S"))
}
