//! HTTP surface.
//!
//! Every endpoint takes a POST. JSON bodies are read as raw bytes and parsed
//! here so a malformed body is reported as a 400 with the gateway's error
//! body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::connection::{Connection, CopyRequest};
use crate::error::{ErrorKind, Result};
use crate::gateway::Gateway;
use crate::response::DialResult;
use crate::upload::read_upload_form;

/// Build the gateway router.
pub fn router(gateway: Arc<Gateway>) -> Router {
    let max_upload_bytes = gateway.config().max_upload_bytes;

    Router::new()
        .route("/containers", post(list_containers))
        .route("/items", post(list_items))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/copy", post(copy))
        .route("/getjsonstring", post(json_string))
        .route("/dial", post(dial))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Serialize `value` as a JSON response.
///
/// A value that fails to serialize produces a serialization error response.
pub fn respond<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => ErrorKind::Serialization
            .caused_by("Failed to encode response", e.into())
            .into_response(),
    }
}

async fn list_containers(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Result<Response> {
    let conn = Connection::from_json(&body)?;
    let result = gateway.list_containers(&conn).await?;
    Ok(respond(StatusCode::OK, &result))
}

async fn list_items(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Result<Response> {
    let conn = Connection::from_json(&body)?;
    let result = gateway.list_items(&conn).await?;
    Ok(respond(StatusCode::OK, &result))
}

async fn upload(
    State(gateway): State<Arc<Gateway>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let multipart = multipart.map_err(|e| {
        ErrorKind::MalformedRequest.with_message(format!("Multipart form required: {}", e))
    })?;
    let form = read_upload_form(multipart).await?;
    let source = form.file.into_source(gateway.config().chunk_size)?;

    let created = gateway.upload(&form.to, source).await?;
    Ok(respond(StatusCode::CREATED, &created))
}

async fn copy(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Result<Response> {
    let request = CopyRequest::from_json(&body)?;
    let copied = gateway.copy(&request.from, &request.to).await?;
    Ok(respond(StatusCode::CREATED, &copied))
}

async fn json_string(body: Bytes) -> Result<Response> {
    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        ErrorKind::MalformedRequest.with_message(format!("Valid JSON body required: {}", e))
    })?;
    let encoded = serde_json::to_string(&canonicalize(value))
        .map_err(|e| ErrorKind::Serialization.caused_by("Failed to encode JSON", e.into()))?;
    Ok(respond(StatusCode::OK, &encoded))
}

async fn dial(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Result<Response> {
    let conn = Connection::from_json(&body)?;
    let success = gateway.dial(&conn).await;
    Ok(respond(StatusCode::OK, &DialResult { success }))
}

/// Rebuild a JSON value with object keys in sorted order at every depth.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
