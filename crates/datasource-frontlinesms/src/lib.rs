// # FrontlineSMS Data Source
//
// This crate provides the FrontlineSMS (FrontlineCloud) adapter for the
// DataSource messaging layer.
//
// ## Capabilities
//
// - Outgoing: one POST to the FrontlineCloud webhook API per message
// - Callback: FrontlineCloud activities POST received SMS to
//   `/sms/frontlinesms` (or `/frontlinesms`), signed with a shared secret
//
// ## Restrictions
//
// The adapter is stateless and single-shot:
// - No retries, no background tasks, no store access
// - Provider failures are returned as a `Failed` outcome with one warning
//   through the injected logger
//
// ## Security Requirements
//
// - The API key and callback secret NEVER appear in logs or `Debug` output
// - The callback secret is compared in constant time
//
// ## API Reference
//
// - Send: POST `https://cloud.frontlinesms.com/api/1/webhook`
//   `{"apiKey": "...", "payload": {"message": "...", "recipients": [{"type": "mobile", "value": "..."}]}}`

use async_trait::async_trait;
use datasource_core::config::ProviderConfig;
use datasource_core::inbound::{verify_shared_secret, CallbackPayload, CallbackRoute};
use datasource_core::logging::Logger;
use datasource_core::model::{ContactType, InboundMessage, MessageType, SendOutcome};
use datasource_core::options::{OptionSchema, OptionSpec};
use datasource_core::registry::RegistryBuilder;
use datasource_core::traits::{CallbackSource, DataSource, DataSourceFactory, OutgoingApi};
use datasource_core::{Error, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Adapter id
pub const ID: &str = "frontlinesms";

/// FrontlineCloud webhook endpoint
const FRONTLINE_API_URL: &str = "https://cloud.frontlinesms.com/api/1/webhook";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// FrontlineSMS data source
///
/// The Debug implementation does NOT expose the API key or the secret.
pub struct FrontlineSmsSource {
    /// FrontlineCloud API key
    /// ⚠️ NEVER log this value
    key: String,

    /// Shared callback secret
    /// ⚠️ NEVER log this value
    secret: String,

    /// Webhook endpoint
    api_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Sink for provider failure reports
    logger: Arc<dyn Logger>,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for FrontlineSmsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontlineSmsSource")
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl FrontlineSmsSource {
    /// Create a new FrontlineSMS data source
    ///
    /// # Parameters
    ///
    /// - `key`: FrontlineCloud API key
    /// - `secret`: Secret configured on the FrontlineCloud activity
    /// - `timeout`: HTTP timeout for a single send
    /// - `logger`: Sink for provider failure reports
    ///
    /// # Errors
    ///
    /// A configuration error when either credential is blank or the HTTP
    /// client cannot be built.
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let key = key.into();
        let secret = secret.into();

        if key.trim().is_empty() {
            return Err(Error::config("FrontlineSMS API key cannot be empty"));
        }
        if secret.trim().is_empty() {
            return Err(Error::config("FrontlineSMS secret cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            key,
            secret,
            api_url: FRONTLINE_API_URL.to_string(),
            client,
            logger,
        })
    }

    /// Override the webhook endpoint (for testing with wiremock)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// POST one message to the webhook API
    ///
    /// # Returns
    ///
    /// - `Ok(Value)`: The response body, `Null` when empty or not JSON
    /// - `Err(Error::Transport)`: Transport failure or any status but 200
    async fn post_webhook(&self, to: &str, message: &str) -> Result<Value> {
        let payload = json!({
            "apiKey": self.key,
            "payload": {
                "message": message,
                "recipients": [
                    { "type": "mobile", "value": to }
                ]
            }
        });

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::transport(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            )));
        }

        // The webhook body is optional; an unreadable one is not a failure
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

/// Tracking id used when FrontlineCloud does not return one
fn tracking_id(message_type: MessageType) -> String {
    format!("{}-{}", message_type, uuid::Uuid::new_v4())
}

/// Provider id from a webhook response body, if any
fn response_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl DataSource for FrontlineSmsSource {
    fn name(&self) -> &'static str {
        "FrontlineSMS"
    }

    fn services(&self) -> Vec<MessageType> {
        vec![MessageType::Sms]
    }

    fn contact_type(&self) -> ContactType {
        ContactType::Phone
    }

    fn options(&self) -> OptionSchema {
        option_schema()
    }

    fn outgoing(&self) -> Option<&dyn OutgoingApi> {
        Some(self)
    }

    fn callback(&self) -> Option<&dyn CallbackSource> {
        Some(self)
    }
}

#[async_trait]
impl OutgoingApi for FrontlineSmsSource {
    /// Send an SMS through FrontlineCloud
    ///
    /// # Returns
    ///
    /// - `Sent` with the id FrontlineCloud returned, or a generated tracking
    ///   id, when the webhook answers 200
    /// - `Failed` (one warning logged) for any other status or a transport
    ///   error
    async fn send(&self, to: &str, message: &str, _title: &str) -> Result<SendOutcome> {
        tracing::debug!(data_source = ID, "Sending SMS through FrontlineCloud");

        match self.post_webhook(to, message).await {
            Ok(body) => {
                let id = response_id(&body).unwrap_or_else(|| tracking_id(MessageType::Sms));
                tracing::debug!(data_source = ID, provider_message_id = %id, "SMS accepted");
                Ok(SendOutcome::sent(id))
            }
            Err(Error::Transport(reason)) => {
                self.logger.warn(
                    ID,
                    "Could not make a successful POST request",
                    &[("message", reason)],
                );
                Ok(SendOutcome::failed())
            }
            Err(e) => Err(e),
        }
    }
}

impl CallbackSource for FrontlineSmsSource {
    fn verify_secret(&self, candidate: &str) -> bool {
        verify_shared_secret(Some(self.secret.as_str()), candidate)
    }

    fn callback_routes(&self) -> Vec<CallbackRoute> {
        vec![
            CallbackRoute::post("sms/frontlinesms"),
            CallbackRoute::post("frontlinesms"),
        ]
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> Result<InboundMessage> {
        let from = payload.require("from")?;
        let message = payload.require("message")?;

        Ok(InboundMessage {
            data_source: ID.to_string(),
            message_type: MessageType::Sms,
            contact_type: ContactType::Phone,
            from: from.to_string(),
            message: message.to_string(),
            to: None,
            title: None,
            data_source_message_id: payload.non_empty("id").map(str::to_string),
        })
    }
}

fn option_schema() -> OptionSchema {
    let mut schema = OptionSchema::new();
    schema.insert(
        "key".to_string(),
        OptionSpec::text("Key", "The API key").required(),
    );
    schema.insert(
        "secret".to_string(),
        OptionSpec::text(
            "Secret",
            "Set a secret so that only authorized FrontlineCloud accounts can send/receive messages. \
             You need to configure the same secret in the FrontlineCloud Activity.",
        )
        .required(),
    );
    schema
}

/// Factory for creating FrontlineSMS data sources
pub struct FrontlineSmsFactory;

impl DataSourceFactory for FrontlineSmsFactory {
    fn options(&self) -> OptionSchema {
        option_schema()
    }

    fn create(&self, config: &ProviderConfig, logger: Arc<dyn Logger>) -> Result<Arc<dyn DataSource>> {
        let source = FrontlineSmsSource::new(
            config.require("key")?,
            config.require("secret")?,
            config.timeout(DEFAULT_HTTP_TIMEOUT)?,
            logger,
        )?;
        Ok(Arc::new(source))
    }
}

/// Register the FrontlineSMS data source with a registry builder
///
/// # Example
///
/// ```rust
/// use datasource_core::RegistryBuilder;
///
/// let mut builder = RegistryBuilder::new();
/// datasource_frontlinesms::register(&mut builder);
/// assert!(builder.has_factory("frontlinesms"));
/// ```
pub fn register(builder: &mut RegistryBuilder) {
    builder.register_factory(ID, Box::new(FrontlineSmsFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasource_core::logging::MemoryLogger;
    use datasource_core::model::MessageStatus;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, logger: Arc<MemoryLogger>) -> FrontlineSmsSource {
        FrontlineSmsSource::new("api-key-123", "abc", Duration::from_secs(5), logger)
            .unwrap()
            .with_base_url(format!("{}/api/1/webhook", server.uri()))
    }

    #[tokio::test]
    async fn test_send_posts_webhook_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1/webhook"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({
                "apiKey": "api-key-123",
                "payload": {
                    "message": "Water is rising",
                    "recipients": [{ "type": "mobile", "value": "+15551234567" }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m-42" })))
            .expect(1)
            .mount(&server)
            .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(&server, logger.clone())
            .send("+15551234567", "Water is rising", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::sent("m-42"));
        assert_eq!(logger.warning_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_response_id_generates_tracking_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = source(&server, Arc::new(MemoryLogger::new()))
            .send("+15551234567", "hello", "")
            .await
            .unwrap();

        assert_eq!(outcome.status, MessageStatus::Sent);
        assert!(outcome.provider_message_id.unwrap().starts_with("sms-"));
    }

    #[tokio::test]
    async fn test_send_failure_logs_one_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(&server, logger.clone())
            .send("+15551234567", "hello", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::failed());
        assert_eq!(logger.warning_count(), 1);

        let record = &logger.records()[0];
        assert_eq!(record.source, "frontlinesms");
        assert!(record.fields.iter().any(|(k, v)| k == "message" && v.contains("503")));
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails() {
        let logger = Arc::new(MemoryLogger::new());
        let source = FrontlineSmsSource::new("k", "s", Duration::from_secs(2), logger.clone())
            .unwrap()
            .with_base_url("http://127.0.0.1:1/api/1/webhook");

        let outcome = source.send("+15551234567", "hello", "").await.unwrap();
        assert_eq!(outcome.status, MessageStatus::Failed);
        assert_eq!(logger.warning_count(), 1);
    }

    #[test]
    fn test_verify_secret() {
        let source = FrontlineSmsSource::new("k", "abc", DEFAULT_HTTP_TIMEOUT, Arc::new(MemoryLogger::new())).unwrap();

        assert!(source.verify_secret("abc"));
        assert!(!source.verify_secret("xyz"));
        assert!(!source.verify_secret(""));
        assert!(!source.verify_secret("abcd"));
    }

    #[test]
    fn test_parse_callback() {
        let source = FrontlineSmsSource::new("k", "abc", DEFAULT_HTTP_TIMEOUT, Arc::new(MemoryLogger::new())).unwrap();

        let payload = CallbackPayload::new()
            .with("secret", "abc")
            .with("from", "+15551234567")
            .with("message", "Bridge is out")
            .with("id", "fl-9");

        let inbound = source.parse_callback(&payload).unwrap();
        assert_eq!(inbound.data_source, "frontlinesms");
        assert_eq!(inbound.message_type, MessageType::Sms);
        assert_eq!(inbound.contact_type, ContactType::Phone);
        assert_eq!(inbound.from, "+15551234567");
        assert_eq!(inbound.message, "Bridge is out");
        assert_eq!(inbound.data_source_message_id.as_deref(), Some("fl-9"));

        let missing = CallbackPayload::new().with("from", "+15551234567");
        assert!(matches!(source.parse_callback(&missing), Err(Error::Validation(_))));
    }

    #[test]
    fn test_descriptor() {
        let source = FrontlineSmsSource::new("k", "s", DEFAULT_HTTP_TIMEOUT, Arc::new(MemoryLogger::new())).unwrap();

        assert_eq!(source.id(), "frontlinesms");
        assert!(source.supports(MessageType::Sms));
        assert!(!source.supports(MessageType::Twitter));
        assert!(source.capabilities().can_send);
        assert!(source.capabilities().can_receive_callback);
        assert_eq!(source.callback_routes().len(), 2);
    }

    #[test]
    fn test_credentials_not_exposed_in_debug() {
        let source = FrontlineSmsSource::new(
            "key_12345",
            "secret_67890",
            DEFAULT_HTTP_TIMEOUT,
            Arc::new(MemoryLogger::new()),
        )
        .unwrap();

        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("key_12345"));
        assert!(!debug_str.contains("secret_67890"));
        assert!(debug_str.contains("FrontlineSmsSource"));
    }

    #[test]
    fn test_factory_requires_options() {
        let factory = FrontlineSmsFactory;
        let logger: Arc<dyn Logger> = Arc::new(MemoryLogger::new());

        let config = ProviderConfig::new(ID).with_option("key", "k").with_option("secret", "s");
        assert!(factory.create(&config, logger.clone()).is_ok());

        let config = ProviderConfig::new(ID).with_option("key", "k");
        assert!(factory.create(&config, logger).is_err());
    }
}
