//! HTTP server implementation using Axum.

use crate::error::{Error, Result};
use crate::forecast::format_forecasts;
use crate::holiday;
use crate::monitor::{Monitor, MonitorRequest, StartOutcome};
use crate::session::Status;
use crate::state::AppState;
use crate::webhook::{parse_events, verify_signature, InboundMessage};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-line-signature";

// Request/Response types
#[derive(Deserialize)]
struct PushForm {
    #[serde(default)]
    token: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    timeout: String,
    #[serde(default)]
    alert_room_id: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct PushResponse {
    pushed: bool,
    monitoring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    holiday: bool,
}

#[derive(Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: String,
}

#[derive(Serialize)]
struct SessionInfo {
    session_id: Uuid,
    room_id: String,
    monitored_user_id: String,
    alert_room_id: Option<String>,
    status: Status,
    repeat_count: u32,
    interval_secs: u64,
    age_secs: u64,
}

pub fn router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);
    Router::new()
        .route("/", get(index))
        // Webhook from the LINE platform
        .route("/message", post(on_message))
        // Wake-up requests
        .route("/push", post(push))
        .route("/sessions", get(list_sessions))
        // Uptime checks; GET routes answer HEAD too
        .route("/ping", get(ping))
        .nest_service("/static", static_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) -> std::io::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../templates/index.html"))
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

fn check_token(state: &AppState, token: &str) -> Result<()> {
    let expected = &state.config.push_token;
    if expected.is_empty() || token != expected {
        warn!("invalid token presented");
        return Err(Error::Unauthorized);
    }
    Ok(())
}

async fn push(State(state): State<AppState>, Form(form): Form<PushForm>) -> Result<Json<PushResponse>> {
    check_token(&state, &form.token)?;

    let room_id = if form.room_id.is_empty() {
        form.user_id.clone()
    } else {
        form.room_id
    };
    info!(user_id = %form.user_id, room_id = %room_id, "POST /push");

    let req = MonitorRequest {
        room_id: room_id.clone(),
        monitored_user_id: form.user_id,
        message: form.message,
        interval_secs: form.timeout.trim().parse().unwrap_or(0),
        alert_room_id: Some(form.alert_room_id).filter(|id| !id.is_empty()),
    };
    req.validate()?;

    if holiday::is_holiday((state.config.today)()) {
        info!("today is a holiday");
        if state.config.skip_holidays {
            return Ok(Json(PushResponse {
                pushed: false,
                monitoring: false,
                session_id: None,
                holiday: true,
            }));
        }
    }

    let (monitoring, session_id) = match state.monitor.start(req).await? {
        StartOutcome::AlreadyMonitoring => {
            return Ok(Json(PushResponse {
                pushed: false,
                monitoring: false,
                session_id: None,
                holiday: false,
            }));
        }
        StartOutcome::Sent => (false, None),
        StartOutcome::Monitoring { session_id } => (true, Some(session_id)),
    };

    spawn_forecast(&state, room_id);

    Ok(Json(PushResponse {
        pushed: true,
        monitoring,
        session_id,
        holiday: false,
    }))
}

fn spawn_forecast(state: &AppState, room_id: String) {
    let (Some(client), Some(city)) = (state.forecast.clone(), state.config.forecast_city) else {
        return;
    };
    let monitor = state.monitor.clone();
    tokio::spawn(async move {
        match client.request(city).await {
            Ok(forecasts) if !forecasts.is_empty() => {
                let msg = format_forecasts(&forecasts);
                if let Err(e) = monitor.messenger().send_message(&room_id, msg.trim_end()).await {
                    warn!(room_id = %room_id, "failed to send forecast: {}", e);
                }
            }
            Ok(_) => debug!(city, "forecast was empty"),
            Err(e) => warn!(city, "forecast request failed: {}", e),
        }
    });
}

async fn on_message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::InvalidSignature)?;
    verify_signature(&state.config.channel_secret, &body, signature)?;

    // Handled off the request: an acknowledgment may wait on a timer that is
    // mid-send, and LINE expects the webhook to answer promptly.
    for msg in parse_events(&body)? {
        info!(user_id = %msg.sender_id, room_id = %msg.room_id, text = %msg.text, "message received");
        let monitor = state.monitor.clone();
        tokio::spawn(async move { handle_message(monitor, msg).await });
    }

    Ok(StatusCode::OK)
}

async fn handle_message(monitor: Monitor, msg: InboundMessage) {
    if msg.text == "/id" {
        let reply = format!(
            "UserId: {}, GroupId: {}",
            msg.sender_id,
            msg.group_id.as_deref().unwrap_or("")
        );
        if let Err(e) = monitor.messenger().send_message(&msg.room_id, &reply).await {
            warn!(room_id = %msg.room_id, "failed to answer /id: {}", e);
        }
        return;
    }

    let outcome = monitor
        .acknowledge(&msg.sender_id, &msg.room_id, &msg.text)
        .await;
    debug!(room_id = %msg.room_id, ?outcome, "acknowledgment evaluated");
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<SessionInfo>>> {
    check_token(&state, &query.token)?;

    let mut list = Vec::new();
    for s in state.monitor.sessions().await {
        list.push(SessionInfo {
            session_id: s.id,
            room_id: s.room_id.clone(),
            monitored_user_id: s.monitored_user_id.clone(),
            alert_room_id: s.alert_room_id.clone(),
            status: s.status(),
            repeat_count: s.repeat_count().await,
            interval_secs: s.interval.as_secs(),
            age_secs: s.created_at.elapsed().as_secs(),
        });
    }
    Ok(Json(list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::forecast::ForecastClient;
    use crate::messaging::testing::RecordingMessenger;
    use crate::policy::EscalationPolicy;
    use crate::webhook::sign;
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use tower::ServiceExt;

    const SECRET: &str = "channel-secret";

    /// A Wednesday that is not a holiday.
    fn workday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 16).unwrap()
    }

    fn test_config() -> Config {
        Config {
            channel_secret: SECRET.into(),
            push_token: "push-token".into(),
            skip_holidays: false,
            forecast_city: None,
            static_dir: PathBuf::from("static"),
            today: workday,
        }
    }

    fn app_with(
        messenger: RecordingMessenger,
        forecast: Option<ForecastClient>,
        config: Config,
    ) -> (Router, AppState, Arc<RecordingMessenger>) {
        let messenger = Arc::new(messenger);
        let monitor = Monitor::new(messenger.clone(), EscalationPolicy::default());
        let state = AppState::new(monitor, forecast, config);
        (router(state.clone()), state, messenger)
    }

    fn test_app() -> (Router, AppState, Arc<RecordingMessenger>) {
        app_with(RecordingMessenger::default(), None, test_config())
    }

    /// Lets tasks spawned by a handler run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn form(body: &str) -> Request<Body> {
        Request::builder()
            .uri("/push")
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn webhook(body: &str, signature: &str) -> Request<Body> {
        Request::builder()
            .uri("/message")
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn text_event(user: &str, group: &str, text: &str) -> String {
        json!({
            "destination": "Ubot",
            "events": [{
                "type": "message",
                "replyToken": "r",
                "source": { "type": "group", "groupId": group, "userId": user },
                "message": { "type": "text", "id": "1", "text": text }
            }]
        })
        .to_string()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn ping_answers_get_and_head() {
        let (app, _, _) = test_app();
        for method in [Method::GET, Method::HEAD] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/ping").method(method).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn index_page() {
        let (app, _, _) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("awake-bot"));
    }

    #[tokio::test]
    async fn push_requires_token() {
        let (app, _, messenger) = test_app();
        let response = app
            .oneshot(form("token=wrong&user_id=U1&message=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn push_validates_fields() {
        let (app, _, _) = test_app();
        let response = app
            .clone()
            .oneshot(form("token=push-token&message=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(form("token=push-token&user_id=U1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn push_without_timeout_sends_once() {
        let (app, state, messenger) = test_app();
        let response = app
            .oneshot(form("token=push-token&user_id=U1&message=wake+up"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "pushed": true, "monitoring": false }));
        // room_id defaults to the user
        assert_eq!(messenger.texts_to("U1"), vec!["wake up"]);
        assert!(state.monitor.sessions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn push_with_timeout_starts_monitoring_once() {
        let (app, state, messenger) = test_app();
        let body = "token=push-token&user_id=U1&room_id=G1&message=wake+up&timeout=60&alert_room_id=G2";

        let response = app.clone().oneshot(form(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["pushed"], true);
        assert_eq!(json["monitoring"], true);
        assert!(json["session_id"].is_string());

        let response = app.clone().oneshot(form(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "pushed": false, "monitoring": false }));
        assert_eq!(messenger.texts_to("G1"), vec!["wake up"]);

        let sessions = state.monitor.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].alert_room_id.as_deref(), Some("G2"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sessions?token=push-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json[0]["room_id"], "G1");
        assert_eq!(json[0]["status"], "active");
        assert_eq!(json[0]["repeat_count"], 0);
        assert_eq!(json[0]["interval_secs"], 60);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature() {
        let (app, _, _) = test_app();
        let body = text_event("U1", "G1", "hello");

        let response = app
            .clone()
            .oneshot(webhook(&body, &sign("other-secret", body.as_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/message")
                    .method(Method::POST)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_id_command() {
        let (app, _, messenger) = test_app();
        let body = text_event("U1", "G1", "/id");
        let response = app
            .oneshot(webhook(&body, &sign(SECRET, body.as_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        settle().await;
        assert_eq!(messenger.texts_to("G1"), vec!["UserId: U1, GroupId: G1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_acknowledgment_stops_monitoring() {
        let (app, state, messenger) = test_app();
        app.clone()
            .oneshot(form("token=push-token&user_id=U1&room_id=G1&message=wake&timeout=60"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        // Someone else greeting does not count.
        let body = text_event("U2", "G1", "おはよう!");
        app.clone()
            .oneshot(webhook(&body, &sign(SECRET, body.as_bytes())))
            .await
            .unwrap();
        settle().await;
        assert_eq!(state.monitor.sessions().await.len(), 1);

        let body = text_event("U1", "G1", "おはよう!");
        let response = app
            .oneshot(webhook(&body, &sign(SECRET, body.as_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        settle().await;
        assert!(state.monitor.sessions().await.is_empty());

        let texts = messenger.texts_to("G1");
        assert!(texts.last().unwrap().starts_with("おはよー"));
        let total = messenger.sent().len();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(messenger.sent().len(), total);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_answers_while_a_reminder_is_being_sent() {
        // Each send takes 5s, so the first reminder holds the session from 60s to 70s.
        let (app, state, messenger) =
            app_with(RecordingMessenger::slow(Duration::from_secs(5)), None, test_config());
        let start = Instant::now();
        app.clone()
            .oneshot(form("token=push-token&user_id=U1&room_id=G1&message=wake&timeout=60"))
            .await
            .unwrap();
        tokio::time::sleep_until(start + Duration::from_secs(62)).await;

        let body = text_event("U1", "G1", "おはよう!");
        let before = Instant::now();
        let response = app
            .oneshot(webhook(&body, &sign(SECRET, body.as_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(before.elapsed() < Duration::from_secs(1));

        // The acknowledgment lands once the reminder is out.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(state.monitor.sessions().await.is_empty());
        let texts = messenger.texts_to("G1");
        assert_eq!(texts.len(), 3, "{texts:?}");
        assert!(texts[1].starts_with("おーい"));
        assert!(texts[2].starts_with("おはよー"));

        let total = messenger.sent().len();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(messenger.sent().len(), total);
    }

    #[tokio::test]
    async fn push_is_skipped_on_holidays() {
        let config = Config {
            skip_holidays: true,
            today: sunday,
            ..test_config()
        };
        let (app, state, messenger) = app_with(RecordingMessenger::default(), None, config);
        let response = app
            .oneshot(form("token=push-token&user_id=U1&message=wake+up&timeout=60"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "pushed": false, "monitoring": false, "holiday": true })
        );
        assert!(messenger.sent().is_empty());
        assert!(state.monitor.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn push_on_holiday_without_skip_still_sends() {
        let config = Config {
            today: sunday,
            ..test_config()
        };
        let (app, _, messenger) = app_with(RecordingMessenger::default(), None, config);
        let response = app
            .oneshot(form("token=push-token&user_id=U1&message=wake+up"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "pushed": true, "monitoring": false }));
        assert_eq!(messenger.texts_to("U1"), vec!["wake up"]);
    }

    #[tokio::test]
    async fn push_validates_before_the_holiday_check() {
        let config = Config {
            skip_holidays: true,
            today: sunday,
            ..test_config()
        };
        let (app, _, _) = app_with(RecordingMessenger::default(), None, config);
        let response = app
            .oneshot(form("token=push-token&user_id=U1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Serves a fixed forecast for city 130010 at `/forecast`.
    async fn forecast_server() -> SocketAddr {
        let app = Router::new().route(
            "/forecast",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                if query.get("city").map(String::as_str) != Some("130010") {
                    return Err(StatusCode::NOT_FOUND);
                }
                Ok(Json(json!({
                    "forecasts": [
                        {"dateLabel": "今日", "telop": "晴れ",
                         "temperature": {"max": {"celsius": "20"}, "min": {"celsius": "12"}}},
                        {"dateLabel": "明日", "telop": "曇時々雨",
                         "temperature": {"max": null, "min": null}}
                    ]
                })))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    #[tokio::test]
    async fn push_follows_up_with_the_forecast() {
        let addr = forecast_server().await;
        let forecast =
            ForecastClient::new(format!("http://{addr}/forecast"), Duration::from_secs(5)).unwrap();
        let config = Config {
            forecast_city: Some(130010),
            ..test_config()
        };
        let (app, _, messenger) = app_with(RecordingMessenger::default(), Some(forecast), config);

        let response = app
            .oneshot(form("token=push-token&user_id=U1&room_id=G1&message=wake+up"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..250 {
            if messenger.texts_to("G1").len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            messenger.texts_to("G1"),
            vec!["wake up", "今日は 晴れ (20°C / 12°C)\n明日は 曇時々雨"]
        );
    }

    #[tokio::test]
    async fn sessions_requires_token() {
        let (app, _, _) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
