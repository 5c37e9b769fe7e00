use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use calls_proto::{
    routes as paths, CreateSessionRequest, NewTrackRequest, RenegotiateRequest, SdpType,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::broker::{BrokerError, BrokerReply};
use crate::metrics;
use crate::state::AppState;

const CREATE_SESSION: &str = "create_session";
const GET_SESSION: &str = "get_session";
const NEW_TRACK: &str = "new_track";
const RENEGOTIATE: &str = "renegotiate";

type Relayed = (StatusCode, Json<Value>);

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
    })
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

fn bad_request(route: &str, description: impl Into<String>) -> Relayed {
    let description = description.into();
    debug!(route, %description, "rejecting malformed request");
    metrics::record(route, "rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "errorCode": "bad_request", "errorDescription": description })),
    )
}

fn relay(route: &str, result: Result<BrokerReply, BrokerError>) -> Relayed {
    match result {
        Ok(reply) => {
            if reply.is_success() {
                metrics::record(route, "ok");
            } else {
                metrics::record(route, "broker_error");
                warn!(route, status = reply.status.as_u16(), body = %reply.body, "broker refused request");
            }
            (reply.status, Json(reply.body))
        }
        Err(err) => {
            metrics::record(route, "unreachable");
            error!(route, error = %err, "broker request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "errorCode": "broker_unreachable",
                    "errorDescription": err.to_string(),
                })),
            )
        }
    }
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Relayed {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(CREATE_SESSION, rejection.body_text()),
    };
    debug!(route = CREATE_SESSION, request = ?request, "relaying");
    if let Err(err) = request.session_description.expect_type(SdpType::Offer) {
        return bad_request(CREATE_SESSION, err.to_string());
    }
    relay(
        CREATE_SESSION,
        state
            .broker()
            .create_session(request.session_description)
            .await,
    )
}

async fn get_session(State(state): State<AppState>, Path(session_id): Path<String>) -> Relayed {
    debug!(route = GET_SESSION, session_id = %session_id, "relaying");
    relay(GET_SESSION, state.broker().get_session(&session_id).await)
}

async fn new_track(
    State(state): State<AppState>,
    body: Result<Json<NewTrackRequest>, JsonRejection>,
) -> Relayed {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(NEW_TRACK, rejection.body_text()),
    };
    debug!(route = NEW_TRACK, request = ?request, "relaying");
    let Some(session_id) = request.session_id else {
        return bad_request(NEW_TRACK, "sessionId is required");
    };
    if let Some(description) = &request.session_description {
        if let Err(err) = description.expect_type(SdpType::Offer) {
            return bad_request(NEW_TRACK, err.to_string());
        }
    }
    relay(
        NEW_TRACK,
        state
            .broker()
            .new_tracks(&session_id, request.session_description, request.tracks)
            .await,
    )
}

async fn renegotiate(
    State(state): State<AppState>,
    body: Result<Json<RenegotiateRequest>, JsonRejection>,
) -> Relayed {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(RENEGOTIATE, rejection.body_text()),
    };
    debug!(route = RENEGOTIATE, request = ?request, "relaying");
    let Some(session_id) = request.session_id else {
        return bad_request(RENEGOTIATE, "sessionId is required");
    };
    if let Err(err) = request.session_description.expect_type(SdpType::Answer) {
        return bad_request(RENEGOTIATE, err.to_string());
    }
    relay(
        RENEGOTIATE,
        state
            .broker()
            .renegotiate(&session_id, request.session_description)
            .await,
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route(&format!("/{}", paths::CREATE_SESSION), post(create_session))
        .route(&format!("/{}/:session_id", paths::GET_SESSION), get(get_session))
        .route(&format!("/{}", paths::NEW_TRACK), post(new_track))
        .route(&format!("/{}", paths::RENEGOTIATE), put(renegotiate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
