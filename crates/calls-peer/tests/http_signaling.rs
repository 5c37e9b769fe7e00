use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use calls_peer::{HttpSignalingClient, SignalingApi, SignalingError};
use calls_proto::{
    CreateSessionRequest, NewTrackRequest, RenegotiateRequest, SessionDescription, TrackObject,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn create_session(Json(body): Json<CreateSessionRequest>) -> Json<Value> {
    Json(json!({
        "sessionId": "sess-1",
        "sessionDescription": { "type": "answer", "sdp": format!("answer-to:{}", body.session_description.sdp) }
    }))
}

async fn get_session(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "errorCode": "not_found", "errorDescription": "no such session" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "tracks": [{ "location": "local", "mid": "0", "trackName": "mic", "status": "active" }]
        })),
    )
}

async fn new_track(Json(body): Json<NewTrackRequest>) -> Json<Value> {
    let session = body.session_id.unwrap_or_default();
    Json(json!({
        "tracks": body.tracks.iter().enumerate().map(|(i, t)| json!({
            "mid": (i + 1).to_string(),
            "trackName": t.track_name,
            "sessionId": session,
        })).collect::<Vec<_>>(),
        "requiresImmediateRenegotiation": true,
        "sessionDescription": { "type": "offer", "sdp": "pull-offer" }
    }))
}

async fn renegotiate(Json(body): Json<RenegotiateRequest>) -> Json<Value> {
    if body.session_description.sdp == "bad" {
        return Json(json!({ "errorCode": "invalid_sdp", "errorDescription": "cannot parse answer" }));
    }
    Json(json!({}))
}

async fn spawn_relay() -> Result<SocketAddr, std::io::Error> {
    let app = Router::new()
        .route("/api/create-session", post(create_session))
        .route("/api/get-session/:id", get(get_session))
        .route("/api/new-track", post(new_track))
        .route("/api/renegotiate", put(renegotiate))
        .route(
            "/broken/api/create-session",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

#[tokio::test]
async fn create_session_round_trip() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}"))?;

    let reply = client
        .create_session(&SessionDescription::offer("local-offer"))
        .await?;

    assert_eq!(reply.session_id.as_deref(), Some("sess-1"));
    assert_eq!(
        reply.session_description,
        Some(SessionDescription::answer("answer-to:local-offer"))
    );
    Ok(())
}

#[tokio::test]
async fn get_session_lists_tracks() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}/"))?;

    let reply = client.get_session("sess-1").await?;

    assert_eq!(reply.tracks.len(), 1);
    assert_eq!(reply.tracks[0].track_name.as_deref(), Some("mic"));
    Ok(())
}

#[tokio::test]
async fn relayed_broker_fault_becomes_rejection() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}"))?;

    let err = client.get_session("missing").await.unwrap_err();

    match err {
        SignalingError::Rejected(rejection) => {
            assert_eq!(rejection.code, "not_found");
            assert_eq!(rejection.to_string(), "no such session");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn pull_reply_is_parsed() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}"))?;

    let reply = client
        .new_tracks(&NewTrackRequest {
            session_id: Some("sess-1".into()),
            session_description: None,
            tracks: vec![TrackObject::remote("peer", "mic")],
        })
        .await?;

    assert!(reply.requires_immediate_renegotiation);
    assert_eq!(reply.tracks[0].mid.as_deref(), Some("1"));
    assert_eq!(
        reply.session_description,
        Some(SessionDescription::offer("pull-offer"))
    );
    Ok(())
}

#[tokio::test]
async fn renegotiate_error_code_in_success_body_fails() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}"))?;

    client
        .renegotiate(&RenegotiateRequest {
            session_id: Some("sess-1".into()),
            session_description: SessionDescription::answer("good"),
        })
        .await?;

    let err = client
        .renegotiate(&RenegotiateRequest {
            session_id: Some("sess-1".into()),
            session_description: SessionDescription::answer("bad"),
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot parse answer");
    Ok(())
}

#[tokio::test]
async fn non_json_failure_keeps_status_and_body() -> TestResult {
    let addr = spawn_relay().await?;
    let client = HttpSignalingClient::new(&format!("http://{addr}/broken"))?;

    let err = client
        .create_session(&SessionDescription::offer("x"))
        .await
        .unwrap_err();

    match err {
        SignalingError::Status { status, message } => {
            assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}
