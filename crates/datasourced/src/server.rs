//! Callback HTTP server
//!
//! Every route in the registry's route table is mounted on an axum router.
//! Each route carries the id of the data source that owns it; the handler
//! merges the query string with the body (parsed by content type) and hands
//! the result to [`CallbackHandler`].
//!
//! When an [`Outbox`] is configured, `POST /messages` queues outgoing
//! messages for the dispatcher. Requests must carry
//! `Authorization: Bearer <token>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter, get, on, post},
};
use datasource_core::inbound::verify_shared_secret;
use datasource_core::model::{Message, MessageType};
use datasource_core::traits::MessageStore;
use datasource_core::{CallbackHandler, CallbackPayload, CallbackResponse, Error, HttpMethod};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Queue for outgoing messages submitted over HTTP
#[derive(Clone)]
pub struct Outbox {
    /// Store drained by the outbound loop
    pub store: Arc<dyn MessageStore>,
    /// Bearer token required on `POST /messages`
    pub token: String,
}

/// Body of `POST /messages`
#[derive(Debug, Deserialize)]
struct OutgoingRequest {
    #[serde(rename = "type")]
    message_type: MessageType,
    to: String,
    message: String,
    #[serde(default)]
    title: Option<String>,
}

/// Build the router serving every registered callback route plus `/healthz`
pub fn build_router(handler: CallbackHandler, outbox: Option<Outbox>) -> Router {
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for binding in handler.registry().callback_routes() {
        let filter = match binding.route.method {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
        };

        let handler = handler.clone();
        let data_source = binding.data_source.clone();
        let endpoint = move |RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes| {
            let handler = handler.clone();
            let data_source = data_source.clone();
            async move { handle_callback(&handler, &data_source, query, &headers, &body).await }
        };

        let method_router = match by_path.remove(&binding.route.path) {
            Some(existing) => existing.on(filter, endpoint),
            None => on(filter, endpoint),
        };
        by_path.insert(binding.route.path.clone(), method_router);

        debug!(route = %binding.route, data_source = %binding.data_source, "Mounted callback route");
    }

    let mut router = Router::new().route("/healthz", get(healthz));
    if let Some(outbox) = outbox {
        router = router.merge(
            Router::new()
                .route("/messages", post(queue_message))
                .with_state(outbox),
        );
    }

    by_path
        .into_iter()
        .fold(router, |router, (path, method_router)| router.route(&path, method_router))
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_callback(
    handler: &CallbackHandler,
    data_source: &str,
    query: Option<String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());

    let from_query = query
        .as_deref()
        .map(CallbackPayload::from_query)
        .transpose();
    let from_body = CallbackPayload::from_body(content_type, body);

    let response = match (from_query, from_body) {
        // Query parameters merged with the body; body fields win
        (Ok(query), Ok(body)) => {
            let payload = query.unwrap_or_default().merge(body);
            handler.handle(data_source, &payload).await
        }
        (Ok(query), Err(e)) => reject_unparsed(handler, data_source, &query.unwrap_or_default(), e),
        (Err(e), _) => reject_unparsed(handler, data_source, &CallbackPayload::new(), e),
    };
    into_http(response)
}

/// The secret is checked against whatever did parse before the parse error
/// is reported, so an unauthenticated caller always gets 401
fn reject_unparsed(
    handler: &CallbackHandler,
    data_source: &str,
    parsed: &CallbackPayload,
    error: Error,
) -> CallbackResponse {
    match handler.verify(data_source, parsed) {
        Ok(()) => CallbackResponse::rejected(&error),
        Err(auth) => CallbackResponse::rejected(&auth),
    }
}

async fn queue_message(State(outbox): State<Outbox>, headers: HeaderMap, body: Bytes) -> Response {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if !verify_shared_secret(Some(outbox.token.as_str()), token) {
        warn!("Rejected outgoing message: incorrect or missing token");
        return into_http(CallbackResponse::rejected(&Error::auth(
            "Incorrect or missing token",
        )));
    }

    match enqueue(outbox.store.as_ref(), &body).await {
        Ok(message) => {
            info!(message_id = message.id, "Queued outgoing {} message", message.message_type);
            let body = json!({
                "payload": {
                    "success": true,
                    "error": null,
                    "message_id": message.id,
                }
            });
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(e) => into_http(CallbackResponse::rejected(&e)),
    }
}

async fn enqueue(store: &dyn MessageStore, body: &[u8]) -> datasource_core::Result<Message> {
    let request: OutgoingRequest = serde_json::from_slice(body)?;
    if request.message.trim().is_empty() {
        return Err(Error::validation("Missing required field 'message'"));
    }

    let contact = store
        .upsert_contact(request.message_type.contact_type(), &request.to)
        .await?;
    store
        .queue_outgoing(
            request.message_type,
            contact.id,
            &request.message,
            request.title.as_deref(),
        )
        .await
}

fn into_http(response: CallbackResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}
