//! Request validation and endpoint handlers for the HTTP pipeline
//! (spec §4.H).

use crate::error::Error;
use crate::model::TopologyRequest;
use crate::router::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TopologyQuery {
    pub uid: String,
}

#[derive(Debug, Serialize)]
struct GenerateAccepted {
    id: String,
}

/// Falls back blank provider/engine names to the service defaults and
/// rejects unknown names or incomplete AWS credentials (spec §4.H
/// Request validation).
pub fn validate_request(req: &mut TopologyRequest, state: &AppState) -> Result<(), Error> {
    if req.provider.name.trim().is_empty() {
        req.provider.name = state.config.provider.name.clone();
    }
    if req.engine.name.trim().is_empty() {
        req.engine.name = state.config.engine.name.clone();
    }
    if !state.providers.names().contains(&req.provider.name.as_str()) {
        return Err(Error::user(format!("unknown provider: {}", req.provider.name)));
    }
    if !state.engines.names().contains(&req.engine.name.as_str()) {
        return Err(Error::user(format!("unknown engine: {}", req.engine.name)));
    }
    crate::model::validate_instance_set(&req.nodes)?;

    if req.provider.name == "aws" {
        let has_key = req.provider.creds.get("access_key_id").and_then(|v| v.as_str()).is_some();
        let has_secret = req.provider.creds.get("secret_access_key").and_then(|v| v.as_str()).is_some();
        if !has_key || !has_secret {
            return Err(Error::user(
                "aws provider requires creds.access_key_id and creds.secret_access_key",
            ));
        }
    }
    Ok(())
}

/// A `test` provider's params can force `/v1/generate` to short-circuit
/// with a canned response before anything is queued (spec §4.H
/// Test-provider short-circuit).
fn test_provider_short_circuit(req: &TopologyRequest) -> Option<Response> {
    if req.provider.name != "test" {
        return None;
    }
    let params = &req.provider.params;
    let message = params
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("test provider short-circuit")
        .to_string();
    let generate_code = params.get("generateResponseCode").and_then(|v| v.as_u64());
    let topology_code = params
        .get("topologyResponseCode")
        .and_then(|v| v.as_u64())
        .unwrap_or(200);

    if let Some(code) = generate_code {
        let code = code as u16;
        if (400..600).contains(&code) {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Some((status, Json(serde_json::json!({ "message": message }))).into_response());
        }
        if code != 202 {
            return Some(Error::user(format!("invalid generateResponseCode: {code}")).into_response());
        }
    }
    if topology_code != 200 {
        return Some(
            Error::user(format!("invalid topologyResponseCode: {topology_code}")).into_response(),
        );
    }
    None
}

pub async fn generate(State(state): State<AppState>, Json(mut req): Json<TopologyRequest>) -> Response {
    if let Err(err) = validate_request(&mut req, &state) {
        return err.into_response();
    }
    if let Some(response) = test_provider_short_circuit(&req) {
        return response;
    }
    let id = state.queue.submit(req);
    (StatusCode::ACCEPTED, Json(GenerateAccepted { id })).into_response()
}

pub async fn topology(State(state): State<AppState>, Query(query): Query<TopologyQuery>) -> Response {
    let record = state.queue.get(&query.uid);
    let status = StatusCode::from_u16(record.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match record.body {
        Some(body) => (status, body).into_response(),
        None => (status, Json(serde_json::json!({ "message": record.message }))).into_response(),
    }
}

pub async fn lookup(State(state): State<AppState>, Json(mut req): Json<TopologyRequest>) -> Response {
    if let Err(err) = validate_request(&mut req, &state) {
        return err.into_response();
    }
    let id = req.content_hash();
    let record = state.queue.get(&id);
    let status = StatusCode::from_u16(record.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match record.body {
        Some(body) => (status, body).into_response(),
        None => (status, Json(serde_json::json!({ "message": record.message }))).into_response(),
    }
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "200 OK\n")
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}
