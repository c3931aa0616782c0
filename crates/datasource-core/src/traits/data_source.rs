// # Data Source Traits
//
// Defines the contract every messaging provider adapter implements.
//
// ## Capabilities
//
// A provider implements the base [`DataSource`] trait plus any subset of the
// capability traits:
//
// - [`OutgoingApi`]: one-shot outbound delivery through the provider's API
// - [`CallbackSource`]: inbound webhooks posted by the provider
//
// Capabilities are exposed through explicit accessors (`outgoing()`,
// `callback()`) and summarized as [`Capabilities`] flags; the registry and the
// dispatcher query those flags and never inspect concrete types.
//
// ## Implementations
//
// - FrontlineSMS: `datasource-frontlinesms` crate
// - Nexmo: `datasource-nexmo` crate
//
// ## Usage
//
// ```rust,ignore
// use datasource_core::DataSource;
//
// async fn notify(source: &dyn DataSource) -> datasource_core::Result<()> {
//     if let Some(outgoing) = source.outgoing() {
//         let outcome = outgoing.send("+15551234567", "hello", "").await?;
//         println!("{:?}", outcome.status);
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::inbound::{CallbackPayload, CallbackRoute};
use crate::logging::Logger;
use crate::model::{ContactType, InboundMessage, MessageType, SendOutcome};
use crate::options::OptionSchema;

/// Capability flags of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Implements [`OutgoingApi`]
    pub can_send: bool,
    /// Implements [`CallbackSource`]
    pub can_receive_callback: bool,
}

/// Base trait for provider adapters
///
/// # Thread Safety
///
/// Implementations must be thread-safe. Sends and callbacks for the same
/// adapter run concurrently; adapters hold no per-call mutable state.
///
/// # Restrictions
///
/// Adapters must not spawn tasks, retry, or touch the message store. A send
/// is a single provider round trip; a callback is parsed and handed back to
/// the caller, which owns ingestion.
pub trait DataSource: Send + Sync {
    /// Stable human-readable name (e.g. "FrontlineSMS")
    fn name(&self) -> &'static str;

    /// Machine id, the lowercase name
    fn id(&self) -> String {
        self.name().to_lowercase()
    }

    /// Channel types this adapter carries
    fn services(&self) -> Vec<MessageType>;

    /// Kind of contact this adapter addresses
    fn contact_type(&self) -> ContactType;

    /// Configuration fields this adapter declares
    fn options(&self) -> OptionSchema;

    /// Outbound capability, if supported
    fn outgoing(&self) -> Option<&dyn OutgoingApi> {
        None
    }

    /// Callback capability, if supported
    fn callback(&self) -> Option<&dyn CallbackSource> {
        None
    }

    /// Capability flags derived from the accessors above
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_send: self.outgoing().is_some(),
            can_receive_callback: self.callback().is_some(),
        }
    }

    /// Whether this adapter carries the given channel type
    fn supports(&self, message_type: MessageType) -> bool {
        self.services().contains(&message_type)
    }
}

/// Outbound delivery capability
#[async_trait]
pub trait OutgoingApi: Send + Sync {
    /// Send a message
    ///
    /// # Parameters
    ///
    /// - `to`: Recipient address (phone number, handle, ...)
    /// - `message`: Body text
    /// - `title`: Optional title, empty when unused
    ///
    /// # Returns
    ///
    /// - `Ok(SendOutcome)`: `Sent` with the provider's id, or `Failed` with
    ///   no id. Provider errors (HTTP status, transport failure, rejected
    ///   message) are reported here, with one warning logged.
    /// - `Err(Error)`: Only for local faults such as misconfiguration.
    async fn send(&self, to: &str, message: &str, title: &str) -> crate::Result<SendOutcome>;
}

/// Inbound webhook capability
pub trait CallbackSource: Send + Sync {
    /// Payload field carrying the shared secret
    fn secret_field(&self) -> &'static str {
        "secret"
    }

    /// Check a candidate secret against the configured one
    ///
    /// Returns `false` (never an error) when no secret is configured or on
    /// mismatch.
    fn verify_secret(&self, candidate: &str) -> bool;

    /// Inbound routes owned by this adapter
    fn callback_routes(&self) -> Vec<CallbackRoute>;

    /// Translate a verified payload into a canonical inbound message
    ///
    /// Returns a validation error when required fields are missing.
    fn parse_callback(&self, payload: &CallbackPayload) -> crate::Result<InboundMessage>;
}

/// Helper trait for constructing data sources from configuration
pub trait DataSourceFactory: Send + Sync {
    /// Option schema of the adapter this factory builds
    ///
    /// Used to validate a configuration before `create` is called.
    fn options(&self) -> OptionSchema;

    /// Create a data source instance
    ///
    /// # Parameters
    ///
    /// - `config`: Option bundle for this instance
    /// - `logger`: Sink for provider failure reports
    fn create(
        &self,
        config: &ProviderConfig,
        logger: Arc<dyn Logger>,
    ) -> crate::Result<Arc<dyn DataSource>>;
}
