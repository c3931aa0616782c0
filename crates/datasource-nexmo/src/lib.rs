// # Nexmo Data Source
//
// This crate provides the Nexmo SMS adapter for the DataSource messaging
// layer.
//
// ## Capabilities
//
// - Outgoing: one request to the Nexmo SMS API per message
// - Callback: Nexmo inbound-message webhooks (GET or POST) on `/sms/nexmo`,
//   `/sms/nexmo/`, `/sms/nexmo/reply` and `/nexmo`, signed with a shared
//   `secret` parameter configured on the webhook URL
//
// ## Restrictions
//
// Stateless and single-shot: no retries, no background tasks, no store
// access. A rejected message is a `Failed` outcome with the provider's
// error text logged once.
//
// ## Security Requirements
//
// - API credentials and the callback secret NEVER appear in logs or `Debug`
// - The callback secret is compared in constant time
//
// ## API Reference
//
// - Send: POST `https://rest.nexmo.com/sms/json`
//   form fields `api_key`, `api_secret`, `from`, `to`, `text`
// - Response: `{"message-count": "1", "messages": [{"status": "0", "message-id": "..."}]}`

use async_trait::async_trait;
use datasource_core::config::ProviderConfig;
use datasource_core::inbound::{verify_shared_secret, CallbackPayload, CallbackRoute};
use datasource_core::logging::Logger;
use datasource_core::model::{ContactType, InboundMessage, MessageType, SendOutcome};
use datasource_core::options::{OptionSchema, OptionSpec};
use datasource_core::registry::RegistryBuilder;
use datasource_core::traits::{CallbackSource, DataSource, DataSourceFactory, OutgoingApi};
use datasource_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Adapter id
pub const ID: &str = "nexmo";

/// Nexmo SMS API endpoint
const NEXMO_API_URL: &str = "https://rest.nexmo.com/sms/json";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Nexmo SMS API response
#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

/// Per-message entry of a send response
#[derive(Debug, Deserialize)]
struct SentMessage {
    /// `"0"` on success; some API versions send a number
    status: Value,

    #[serde(rename = "message-id")]
    message_id: Option<String>,

    #[serde(rename = "error-text")]
    error_text: Option<String>,
}

impl SentMessage {
    fn accepted(&self) -> bool {
        match &self.status {
            Value::String(status) => status.trim() == "0",
            Value::Number(status) => status.as_u64() == Some(0),
            _ => false,
        }
    }
}

/// Keep only ASCII digits of a phone number
pub fn digits_only(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

/// Nexmo data source
pub struct NexmoSource {
    /// Sender number, digits only
    from: String,

    /// Shared callback secret
    /// ⚠️ NEVER log this value
    secret: String,

    /// API key
    api_key: String,

    /// API secret
    /// ⚠️ NEVER log this value
    api_secret: String,

    api_url: String,
    client: reqwest::Client,
    logger: Arc<dyn Logger>,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for NexmoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NexmoSource")
            .field("from", &self.from)
            .field("secret", &"<REDACTED>")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl NexmoSource {
    /// Create a new Nexmo data source
    ///
    /// # Parameters
    ///
    /// - `from`: Sender number; anything but digits is stripped
    /// - `secret`: Callback secret
    /// - `api_key`, `api_secret`: Nexmo API credentials
    /// - `timeout`: HTTP timeout for a single send
    /// - `logger`: Sink for provider failure reports
    pub fn new(
        from: &str,
        secret: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        timeout: Duration,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let from = digits_only(from);
        if from.is_empty() {
            return Err(Error::config("Nexmo 'from' must contain a phone number"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            from,
            secret: secret.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_url: NEXMO_API_URL.to_string(),
            client,
            logger,
        })
    }

    /// Override the API endpoint (for testing with wiremock)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sender number, digits only
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Submit one SMS and return the Nexmo message id
    ///
    /// Every provider-side failure (transport, HTTP status, rejected
    /// message) is an `Error::Transport` carrying the reason.
    async fn submit(&self, to: &str, message: &str) -> Result<String> {
        let to = digits_only(to);
        let params = [
            ("api_key", self.api_key.as_str()),
            ("api_secret", self.api_secret.as_str()),
            ("from", self.from.as_str()),
            ("to", to.as_str()),
            ("text", message),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::transport(format!("HTTP {}", status.as_u16())));
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("Unreadable response: {}", e)))?;

        // A long SMS is split into several entries; the first one decides
        let sent = body
            .messages
            .first()
            .ok_or_else(|| Error::transport("Empty response"))?;

        if !sent.accepted() {
            return Err(Error::transport(
                sent.error_text
                    .clone()
                    .unwrap_or_else(|| format!("status {}", sent.status)),
            ));
        }

        sent.message_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::transport("Accepted without a message id"))
    }
}

impl DataSource for NexmoSource {
    fn name(&self) -> &'static str {
        "Nexmo"
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
impl OutgoingApi for NexmoSource {
    async fn send(&self, to: &str, message: &str, _title: &str) -> Result<SendOutcome> {
        tracing::debug!(data_source = ID, "Sending SMS through Nexmo");

        match self.submit(to, message).await {
            Ok(message_id) => Ok(SendOutcome::sent(message_id)),
            Err(Error::Transport(reason)) => {
                self.logger.warn(ID, &format!("Nexmo: {}", reason), &[]);
                Ok(SendOutcome::failed())
            }
            Err(e) => Err(e),
        }
    }
}

impl CallbackSource for NexmoSource {
    fn verify_secret(&self, candidate: &str) -> bool {
        verify_shared_secret(Some(self.secret.as_str()), candidate)
    }

    fn callback_routes(&self) -> Vec<CallbackRoute> {
        vec![
            CallbackRoute::post("sms/nexmo"),
            CallbackRoute::get("sms/nexmo"),
            CallbackRoute::post("sms/nexmo/"),
            CallbackRoute::get("sms/nexmo/"),
            CallbackRoute::post("sms/nexmo/reply"),
            CallbackRoute::post("nexmo"),
        ]
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> Result<InboundMessage> {
        let from = payload.require("msisdn")?;
        let message = payload.require("text")?;

        Ok(InboundMessage {
            data_source: ID.to_string(),
            message_type: MessageType::Sms,
            contact_type: ContactType::Phone,
            from: from.to_string(),
            message: message.to_string(),
            to: payload.non_empty("to").map(str::to_string),
            title: None,
            data_source_message_id: payload.non_empty("messageId").map(str::to_string),
        })
    }
}

fn option_schema() -> OptionSchema {
    let mut schema = OptionSchema::new();
    schema.insert("from".to_string(), OptionSpec::text("From", "The from number").required());
    schema.insert("secret".to_string(), OptionSpec::text("Secret", "The secret value").required());
    schema.insert("api_key".to_string(), OptionSpec::text("API Key", "The API key").required());
    schema.insert(
        "api_secret".to_string(),
        OptionSpec::password("API secret", "The API secret").required(),
    );
    schema
}

/// Factory for creating Nexmo data sources
pub struct NexmoFactory;

impl DataSourceFactory for NexmoFactory {
    fn options(&self) -> OptionSchema {
        option_schema()
    }

    fn create(&self, config: &ProviderConfig, logger: Arc<dyn Logger>) -> Result<Arc<dyn DataSource>> {
        let source = NexmoSource::new(
            config.require("from")?,
            config.require("secret")?,
            config.require("api_key")?,
            config.require("api_secret")?,
            config.timeout(DEFAULT_HTTP_TIMEOUT)?,
            logger,
        )?;
        Ok(Arc::new(source))
    }
}

/// Register the Nexmo data source with a registry builder
pub fn register(builder: &mut RegistryBuilder) {
    builder.register_factory(ID, Box::new(NexmoFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasource_core::logging::MemoryLogger;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(logger: Arc<MemoryLogger>) -> NexmoSource {
        NexmoSource::new("+1 (555) 000-1111", "abc", "key", "api-secret", Duration::from_secs(5), logger)
            .unwrap()
    }

    async fn mock_response(server: &MockServer, body: Value) {
        Mock::given(method("POST"))
            .and(path("/sms/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_from_strips_non_digits() {
        let source = source(Arc::new(MemoryLogger::new()));
        assert_eq!(source.from(), "15550001111");
        assert_eq!(digits_only("+44 7700-900 123"), "447700900123");
    }

    #[test]
    fn test_from_without_digits_rejected() {
        let result = NexmoSource::new("Ushahidi", "s", "k", "k", DEFAULT_HTTP_TIMEOUT, Arc::new(MemoryLogger::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_send_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/json"))
            .and(body_string_contains("api_key=key"))
            .and(body_string_contains("from=15550001111"))
            .and(body_string_contains("to=15551234567"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message-count": "1",
                "messages": [{ "status": "0", "message-id": "0A0000000123ABCD1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(logger.clone())
            .with_base_url(format!("{}/sms/json", server.uri()))
            .send("+1 555 123 4567", "Shelter open", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::sent("0A0000000123ABCD1"));
        assert_eq!(logger.warning_count(), 0);
    }

    #[tokio::test]
    async fn test_send_rejected_logs_error_text() {
        let server = MockServer::start().await;
        mock_response(
            &server,
            json!({
                "message-count": "1",
                "messages": [{ "status": "4", "error-text": "Bad Credentials" }]
            }),
        )
        .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(logger.clone())
            .with_base_url(format!("{}/sms/json", server.uri()))
            .send("15551234567", "hello", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::failed());
        assert_eq!(logger.warning_count(), 1);
        assert_eq!(logger.records()[0].message, "Nexmo: Bad Credentials");
    }

    #[tokio::test]
    async fn test_numeric_status_accepted() {
        let server = MockServer::start().await;
        mock_response(
            &server,
            json!({ "messages": [{ "status": 0, "message-id": "abc123" }] }),
        )
        .await;

        let outcome = source(Arc::new(MemoryLogger::new()))
            .with_base_url(format!("{}/sms/json", server.uri()))
            .send("15551234567", "hello", "")
            .await
            .unwrap();

        assert!(outcome.is_sent());
    }

    #[tokio::test]
    async fn test_http_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(logger.clone())
            .with_base_url(format!("{}/sms/json", server.uri()))
            .send("15551234567", "hello", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::failed());
        assert_eq!(logger.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_non_200_success_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(
                json!({ "messages": [{ "status": "0", "message-id": "abc123" }] }),
            ))
            .mount(&server)
            .await;

        let logger = Arc::new(MemoryLogger::new());
        let outcome = source(logger.clone())
            .with_base_url(format!("{}/sms/json", server.uri()))
            .send("15551234567", "hello", "")
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::failed());
        assert_eq!(logger.warning_count(), 1);
        assert_eq!(logger.records()[0].message, "Nexmo: HTTP 202");
    }

    #[test]
    fn test_parse_callback() {
        let source = source(Arc::new(MemoryLogger::new()));

        let payload = CallbackPayload::new()
            .with("secret", "abc")
            .with("msisdn", "447700900123")
            .with("to", "15550001111")
            .with("text", "Need water")
            .with("messageId", "02000000E68951D8");

        let inbound = source.parse_callback(&payload).unwrap();
        assert_eq!(inbound.data_source, "nexmo");
        assert_eq!(inbound.from, "447700900123");
        assert_eq!(inbound.to.as_deref(), Some("15550001111"));
        assert_eq!(inbound.message, "Need water");
        assert_eq!(inbound.data_source_message_id.as_deref(), Some("02000000E68951D8"));

        let missing_text = CallbackPayload::new().with("msisdn", "447700900123");
        assert!(matches!(source.parse_callback(&missing_text), Err(Error::Validation(_))));
    }

    #[test]
    fn test_routes_and_secret() {
        let source = source(Arc::new(MemoryLogger::new()));

        let routes = source.callback_routes();
        assert!(routes.contains(&CallbackRoute::get("/sms/nexmo")));
        assert!(routes.contains(&CallbackRoute::post("/nexmo")));
        assert_eq!(routes.len(), 6);

        assert!(source.verify_secret("abc"));
        assert!(!source.verify_secret("ab"));
    }

    #[test]
    fn test_credentials_not_exposed_in_debug() {
        let source = NexmoSource::new(
            "15550001111",
            "callback_secret_1",
            "api_key_2",
            "api_secret_3",
            DEFAULT_HTTP_TIMEOUT,
            Arc::new(MemoryLogger::new()),
        )
        .unwrap();

        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("callback_secret_1"));
        assert!(!debug_str.contains("api_key_2"));
        assert!(!debug_str.contains("api_secret_3"));
    }

    #[test]
    fn test_register() {
        let mut builder = RegistryBuilder::new();
        register(&mut builder);

        let registry = builder
            .build(&[ProviderConfig::new(ID)
                .with_option("from", "+15550001111")
                .with_option("secret", "abc")
                .with_option("api_key", "key")
                .with_option("api_secret", "secret")])
            .unwrap();

        let nexmo = registry.by_id("nexmo").unwrap();
        assert_eq!(nexmo.name(), "Nexmo");
        assert_eq!(registry.callback_routes().len(), 6);
    }
}
