//! Inbound callback handling
//!
//! The HTTP layer hands every request arriving on a registered callback
//! route to [`CallbackHandler::handle`] together with the id of the data
//! source that owns the route. The handler:
//!
//! 1. Resolves the data source and its callback capability
//! 2. Verifies the shared secret carried in the payload
//! 3. Normalizes the payload into an [`InboundMessage`](crate::model::InboundMessage)
//! 4. Hands it to the ingestion pipeline ([`MessageStore::receive`])
//!
//! Nothing is ingested unless verification succeeded first. A request
//! aborted before step 2 completes therefore never creates a message.

pub mod payload;
pub mod secret;

pub use payload::{CallbackPayload, CallbackRoute, HttpMethod};
pub use secret::verify_shared_secret;

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::Message;
use crate::registry::ProviderRegistry;
use crate::traits::MessageStore;

/// Response to send back to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body
    pub body: serde_json::Value,
}

impl CallbackResponse {
    /// Accepted
    pub fn accepted(message: &Message) -> Self {
        Self {
            status: 200,
            body: json!({
                "payload": {
                    "success": true,
                    "error": null,
                    "message_id": message.id,
                }
            }),
        }
    }

    /// Rejected with the status matching the error
    pub fn rejected(error: &Error) -> Self {
        Self {
            status: error.callback_status(),
            body: json!({
                "payload": {
                    "success": false,
                    "error": error.to_string(),
                }
            }),
        }
    }

    /// Whether the callback was accepted
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Verifies, normalizes and ingests provider callbacks
#[derive(Clone)]
pub struct CallbackHandler {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn MessageStore>,
}

impl CallbackHandler {
    /// Create a handler over a registry and an ingestion pipeline
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { registry, store }
    }

    /// The registry callbacks are resolved against
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Handle a callback and build the HTTP response
    pub async fn handle(&self, data_source: &str, payload: &CallbackPayload) -> CallbackResponse {
        match self.process(data_source, payload).await {
            Ok(message) => CallbackResponse::accepted(&message),
            Err(e) => CallbackResponse::rejected(&e),
        }
    }

    /// Handle a callback
    ///
    /// # Returns
    ///
    /// - `Ok(Message)`: The ingested message
    /// - `Err(Error::NotFound)`: Unknown data source, or one without callbacks
    /// - `Err(Error::Authentication)`: Secret missing or mismatched
    /// - `Err(Error::Validation)`: Required payload fields missing
    /// - `Err(_)`: Ingestion failed
    pub async fn process(&self, data_source: &str, payload: &CallbackPayload) -> Result<Message> {
        self.verify(data_source, payload)?;

        let source = self.registry.by_id(data_source)?;
        let callback = source.callback().ok_or_else(|| no_callbacks(data_source))?;

        let inbound = callback.parse_callback(payload).inspect_err(|e| {
            warn!(data_source = data_source, "Rejected callback: {}", e);
        })?;

        let message = self.store.receive(inbound).await?;
        info!(
            data_source = data_source,
            message_id = message.id,
            "Ingested inbound {} message",
            message.message_type
        );

        Ok(message)
    }

    /// Check the secret carried in a payload without ingesting anything
    ///
    /// Used on its own when the request body could not be parsed, so a
    /// caller without the secret learns nothing about the payload shape.
    pub fn verify(&self, data_source: &str, payload: &CallbackPayload) -> Result<()> {
        let source = self.registry.by_id(data_source)?;
        let callback = source.callback().ok_or_else(|| no_callbacks(data_source))?;

        let candidate = payload.get(callback.secret_field()).unwrap_or_default();
        if !callback.verify_secret(candidate) {
            warn!(data_source = data_source, "Rejected callback: incorrect or missing secret");
            return Err(Error::auth("Incorrect or missing secret key"));
        }

        Ok(())
    }
}

fn no_callbacks(data_source: &str) -> Error {
    Error::not_found(format!("Data source '{}' does not accept callbacks", data_source))
}
