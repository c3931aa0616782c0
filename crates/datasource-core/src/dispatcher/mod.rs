//! Outbound dispatcher
//!
//! The Dispatcher is responsible for:
//! - Selecting the active data source for a message's channel type
//! - Invoking `send` with a bounded timeout
//! - Mapping the returned outcome onto the message
//! - Processing batches of pending messages from a store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ MessageStore │─── pending ───┐
//! └──────────────┘               │
//!        ▲                       ▼
//!        │              ┌──────────────┐
//!        │              │  Dispatcher  │
//!        │              └──────────────┘
//!        │                       │
//!        │        ┌──────────────┼──────────────┐
//!        │        ▼              ▼              ▼
//!        │  ┌──────────┐  ┌─────────────┐  ┌──────────┐
//!        └──│ outcome  │  │ OutgoingApi │  │  Events  │
//!           │ (record) │  │   (send)    │  │ (notify) │
//!           └──────────┘  └─────────────┘  └──────────┘
//! ```
//!
//! ## Policy
//!
//! Exactly one data source is authoritative per channel type; the choice is
//! configuration, not dynamic failover. No retries happen here: a failed
//! send is terminal and a scheduler above this layer decides whether to
//! queue a new message.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::model::{Contact, Direction, Message, MessageId, MessageType, SendOutcome};
use crate::registry::ProviderRegistry;
use crate::traits::{DataSource, MessageStore};

/// Events emitted by the Dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Send handed to a data source
    SendStarted {
        message_id: MessageId,
        data_source: String,
    },

    /// Provider accepted the message
    SendSucceeded {
        message_id: MessageId,
        data_source: String,
        provider_message_id: Option<String>,
    },

    /// Provider rejected the message, was unreachable, or timed out
    SendFailed {
        message_id: MessageId,
        data_source: String,
    },

    /// Message was not dispatched
    Skipped {
        message_id: MessageId,
        reason: String,
    },
}

/// Counts for one batch of pending messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages accepted by a provider
    pub sent: usize,
    /// Messages whose send failed
    pub failed: usize,
    /// Messages left untouched (no contact, no active source, local fault)
    pub skipped: usize,
}

impl DispatchSummary {
    /// Total messages looked at
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.skipped
    }
}

/// Outbound dispatcher
///
/// Holds the read-only registry and the per-channel active data source.
/// Each call to [`Dispatcher::dispatch`] is an independent unit of work, so
/// a single dispatcher can be shared across tasks.
pub struct Dispatcher {
    /// Configured data sources
    registry: Arc<ProviderRegistry>,

    /// Authoritative data source id per channel
    active: BTreeMap<MessageType, String>,

    /// Upper bound for a single send
    send_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<DispatchEvent>,
}

impl Dispatcher {
    /// Create a new dispatcher
    ///
    /// # Parameters
    ///
    /// - `registry`: Configured data sources
    /// - `config`: Active data source per channel and send timeout
    ///
    /// # Returns
    ///
    /// A tuple of (dispatcher, event_receiver) where event_receiver yields dispatch events
    ///
    /// # Errors
    ///
    /// A configuration error when an active id is unknown, does not carry the
    /// channel it is active for, or cannot send.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: DispatchConfig,
    ) -> Result<(Self, mpsc::Receiver<DispatchEvent>)> {
        config.validate()?;

        for (message_type, id) in &config.active {
            let source = registry.by_id(id).map_err(|_| {
                Error::config(format!(
                    "Active {} data source '{}' is not configured",
                    message_type, id
                ))
            })?;

            if !source.supports(*message_type) {
                return Err(Error::config(format!(
                    "Data source '{}' does not carry {} messages",
                    id, message_type
                )));
            }

            if !source.capabilities().can_send {
                return Err(Error::config(format!(
                    "Data source '{}' cannot send messages",
                    id
                )));
            }
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let dispatcher = Self {
            registry,
            send_timeout: config.send_timeout(),
            active: config.active,
            event_tx: tx,
        };

        Ok((dispatcher, rx))
    }

    /// Active data source for a channel type
    pub fn active_source(&self, message_type: MessageType) -> Result<Arc<dyn DataSource>> {
        let id = self.active.get(&message_type).ok_or_else(|| {
            Error::not_found(format!("No active data source for {} messages", message_type))
        })?;
        self.registry.by_id(id)
    }

    /// Send one outgoing message and apply the outcome to it
    ///
    /// # Parameters
    ///
    /// - `message`: Pending outgoing message; updated in place
    /// - `contact`: The message's contact
    ///
    /// # Returns
    ///
    /// - `Ok(SendOutcome)`: Terminal outcome, already applied to `message`
    /// - `Err(Error)`: The message was not sent and is left pending
    ///   (invalid message, no active data source, local adapter fault)
    pub async fn dispatch(&self, message: &mut Message, contact: &Contact) -> Result<SendOutcome> {
        if message.direction != Direction::Outgoing {
            return Err(Error::validation(format!(
                "Message {} is not outgoing",
                message.id
            )));
        }

        if message.status.is_terminal() {
            return Err(Error::validation(format!(
                "Message {} already has terminal status {:?}",
                message.id, message.status
            )));
        }

        if message.contact_id != contact.id {
            return Err(Error::validation(format!(
                "Contact {} does not own message {}",
                contact.id, message.id
            )));
        }

        let source = self.active_source(message.message_type)?;
        let data_source = source.id();

        if source.contact_type() != contact.contact_type {
            return Err(Error::validation(format!(
                "Data source '{}' cannot address {} contacts",
                data_source, contact.contact_type
            )));
        }

        let outgoing = source
            .outgoing()
            .ok_or_else(|| Error::config(format!("Data source '{}' cannot send", data_source)))?;

        self.emit_event(DispatchEvent::SendStarted {
            message_id: message.id,
            data_source: data_source.clone(),
        });

        let title = message.title.as_deref().unwrap_or_default();
        let outcome = match tokio::time::timeout(
            self.send_timeout,
            outgoing.send(&contact.contact, &message.message, title),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(
                    message_id = message.id,
                    data_source = %data_source,
                    "Local fault while sending: {}",
                    e
                );
                return Err(e);
            }
            Err(_) => {
                warn!(
                    message_id = message.id,
                    data_source = %data_source,
                    "Send timed out after {:?}",
                    self.send_timeout
                );
                SendOutcome::failed()
            }
        };

        message.apply_outcome(&data_source, &outcome);

        if outcome.is_sent() {
            debug!(message_id = message.id, data_source = %data_source, "Message sent");
            self.emit_event(DispatchEvent::SendSucceeded {
                message_id: message.id,
                data_source,
                provider_message_id: outcome.provider_message_id.clone(),
            });
        } else {
            self.emit_event(DispatchEvent::SendFailed {
                message_id: message.id,
                data_source,
            });
        }

        Ok(outcome)
    }

    /// Dispatch up to `limit` pending outgoing messages from a store
    ///
    /// Each message is handled independently: a message that cannot be
    /// dispatched is skipped and stays pending, and a failure to record one
    /// outcome does not stop the batch. Skipped messages do not count
    /// against `limit`; the queue is paged past them until `limit` messages
    /// reached a provider or the queue is exhausted.
    ///
    /// # Errors
    ///
    /// Only when the pending messages cannot be listed.
    pub async fn process_pending(
        &self,
        store: &dyn MessageStore,
        limit: usize,
    ) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();
        let mut cursor: MessageId = 0;

        'pages: while summary.sent + summary.failed < limit {
            let page = store.pending_outgoing(cursor, limit).await?;
            let exhausted = page.len() < limit;

            for message in page {
                cursor = message.id;
                self.process_one(store, message, &mut summary).await;

                if summary.sent + summary.failed >= limit {
                    break 'pages;
                }
            }

            if exhausted {
                break;
            }
        }

        if summary.total() > 0 {
            info!(
                sent = summary.sent,
                failed = summary.failed,
                skipped = summary.skipped,
                "Processed pending messages"
            );
        }

        Ok(summary)
    }

    async fn process_one(
        &self,
        store: &dyn MessageStore,
        mut message: Message,
        summary: &mut DispatchSummary,
    ) {
        let contact = match store.get_contact(message.contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                warn!(message_id = message.id, "Contact {} not found", message.contact_id);
                self.skip(summary, message.id, "contact not found");
                return;
            }
            Err(e) => {
                error!(message_id = message.id, "Failed to load contact: {}", e);
                self.skip(summary, message.id, "contact lookup failed");
                return;
            }
        };

        let outcome = match self.dispatch(&mut message, &contact).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(message_id = message.id, "Message not dispatched: {}", e);
                self.skip(summary, message.id, &e.to_string());
                return;
            }
        };

        let data_source = message.data_source.clone().unwrap_or_default();
        if let Err(e) = store.record_outcome(message.id, &data_source, &outcome).await {
            error!(message_id = message.id, "Failed to record outcome: {}", e);
        }

        if outcome.is_sent() {
            summary.sent += 1;
        } else {
            summary.failed += 1;
        }
    }

    fn skip(&self, summary: &mut DispatchSummary, message_id: MessageId, reason: &str) {
        summary.skipped += 1;
        self.emit_event(DispatchEvent::Skipped {
            message_id,
            reason: reason.to_string(),
        });
    }

    /// Emit a dispatch event
    fn emit_event(&self, event: DispatchEvent) {
        // Never block a send on a slow event consumer
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_total() {
        let summary = DispatchSummary {
            sent: 2,
            failed: 1,
            skipped: 3,
        };
        assert_eq!(summary.total(), 6);
    }

    #[test]
    fn test_unknown_active_source_rejected() {
        let registry = Arc::new(ProviderRegistry::empty());
        let config = DispatchConfig::default().with_active(MessageType::Sms, "nexmo");

        let err = Dispatcher::new(registry, config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_no_active_source_leaves_message_pending() {
        let registry = Arc::new(ProviderRegistry::empty());
        let (dispatcher, _rx) = Dispatcher::new(registry, DispatchConfig::default()).unwrap();

        let contact = Contact {
            id: 1,
            contact_type: crate::model::ContactType::Phone,
            contact: "+15551234567".to_string(),
        };
        let mut message = Message::outgoing(1, MessageType::Sms, 1, "hello");

        let err = dispatcher.dispatch(&mut message, &contact).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(message.status, crate::model::MessageStatus::Pending);
    }
}
