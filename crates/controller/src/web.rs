use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::mqtt::parse_command;
use crate::orchestrator::Command;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CommandRequest {
    /// "mode", "pump" or "reset".
    action: String,
    /// Payload for the action; e.g. "auto" / "manual" / "toggle" for mode,
    /// "ON" / "OFF" for pump. Ignored for reset.
    #[serde(default)]
    value: String,
}

#[derive(Serialize)]
struct CommandResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    shared: SharedState,
    commands: UnboundedSender<Command>,
}

pub fn router(shared: SharedState, commands: UnboundedSender<Command>) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/command", post(api_command))
        .with_state(AppState { shared, commands })
}

async fn api_status(State(app): State<AppState>) -> impl IntoResponse {
    let st = app.shared.read().await;
    Json(st.to_status())
}

async fn api_command(
    State(app): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    match parse_command(&req.action, req.value.as_bytes()) {
        Ok(cmd) => {
            {
                let mut st = app.shared.write().await;
                st.record_command(format!("{} {}", req.action, req.value));
            }
            // The receiver only drops on shutdown; a closed channel means the
            // control loop is gone.
            if app.commands.send(cmd).is_err() {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(CommandResponse {
                        accepted: false,
                        error: Some("controller not running".to_string()),
                    }),
                );
            }
            (
                StatusCode::OK,
                Json(CommandResponse {
                    accepted: true,
                    error: None,
                }),
            )
        }
        Err(msg) => (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse {
                accepted: false,
                error: Some(msg),
            }),
        ),
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(
    port: u16,
    shared: SharedState,
    commands: UnboundedSender<Command>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "web api listening");

    axum::serve(listener, router(shared, commands)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn test_app() -> (Router, mpsc::UnboundedReceiver<Command>) {
        let shared: SharedState = Arc::new(RwLock::new(SystemState::new(false)));
        let (tx, rx) = mpsc::unbounded_channel();
        (router(shared, tx), rx)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -- /api/status ----------------------------------------------------------

    #[tokio::test]
    async fn status_returns_quiescent_state() {
        let (app, _rx) = test_app();
        let resp = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["pump_state"], "idle");
        assert_eq!(json["pump_on"], false);
    }

    // -- /api/command -----------------------------------------------------------

    #[tokio::test]
    async fn valid_pump_command_is_queued() {
        let (app, mut rx) = test_app();
        let resp = app
            .oneshot(
                Request::post("/api/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"pump","value":"ON"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap(), Command::ManualPump(true));
    }

    #[tokio::test]
    async fn mode_toggle_command_is_queued() {
        let (app, mut rx) = test_app();
        let resp = app
            .oneshot(
                Request::post("/api/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"mode","value":"toggle"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap(), Command::ToggleMode);
    }

    #[tokio::test]
    async fn reset_needs_no_value() {
        let (app, mut rx) = test_app();
        let resp = app
            .oneshot(
                Request::post("/api/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"reset"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap(), Command::Reset);
    }

    #[tokio::test]
    async fn bad_command_rejected_with_400() {
        let (app, mut rx) = test_app();
        let resp = app
            .oneshot(
                Request::post("/api/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"valve","value":"ON"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["accepted"], false);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_pump_value_rejected() {
        let (app, _rx) = test_app();
        let resp = app
            .oneshot(
                Request::post("/api/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"pump","value":"MAYBE"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn command_is_recorded_as_event() {
        let shared: SharedState = Arc::new(RwLock::new(SystemState::new(false)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let app = router(Arc::clone(&shared), tx);

        app.oneshot(
            Request::post("/api/command")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"action":"mode","value":"manual"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

        let st = shared.read().await;
        assert!(st.events.iter().any(|e| e.detail.contains("mode manual")));
    }
}
