// # Memory Message Store
//
// In-memory implementation of MessageStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Used by tests, by the daemon when no platform store is attached, and as
// the reference for the store contract.
//
// ## Crash Behavior
//
// - All messages and contacts are lost on restart/crash
// - Pending outgoing messages queued before a crash are never sent

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{
    Contact, ContactId, ContactType, Direction, InboundMessage, Message, MessageId, MessageStatus,
    MessageType, SendOutcome,
};
use crate::traits::MessageStore;
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    contacts: BTreeMap<ContactId, Contact>,
    messages: BTreeMap<MessageId, Message>,
    next_contact_id: ContactId,
    next_message_id: MessageId,
}

impl Inner {
    fn upsert_contact(&mut self, contact_type: ContactType, address: &str) -> Contact {
        if let Some(existing) = self
            .contacts
            .values()
            .find(|contact| contact.contact_type == contact_type && contact.contact == address)
        {
            return existing.clone();
        }

        self.next_contact_id += 1;
        let contact = Contact {
            id: self.next_contact_id,
            contact_type,
            contact: address.to_string(),
        };
        self.contacts.insert(contact.id, contact.clone());
        contact
    }

    fn insert_message(&mut self, mut message: Message) -> Message {
        self.next_message_id += 1;
        message.id = self.next_message_id;
        self.messages.insert(message.id, message.clone());
        message
    }
}

/// In-memory message store implementation
///
/// Messages and contacts live in ordered maps behind a single RwLock, so ids
/// are assigned in insertion order and pending messages are returned oldest
/// first.
///
/// # Example
///
/// ```rust,no_run
/// use datasource_core::model::{ContactType, MessageType};
/// use datasource_core::store::MemoryMessageStore;
/// use datasource_core::traits::MessageStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryMessageStore::new();
///
///     let contact = store.upsert_contact(ContactType::Phone, "+15551234567").await?;
///     store.queue_outgoing(MessageType::Sms, contact.id, "hello", None).await?;
///
///     assert_eq!(store.pending_outgoing(0, 10).await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryMessageStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Number of stored contacts
    pub async fn contact_count(&self) -> usize {
        self.inner.read().await.contacts.len()
    }

    /// Snapshot of every stored message
    pub async fn all_messages(&self) -> Vec<Message> {
        self.inner.read().await.messages.values().cloned().collect()
    }

    /// Store a message as-is (ids are reassigned)
    ///
    /// Bypasses the send/receive flows; used to seed historical data.
    pub async fn insert_message(&self, message: Message) -> Result<Message> {
        let mut guard = self.inner.write().await;
        if !guard.contacts.contains_key(&message.contact_id) {
            return Err(Error::not_found(format!(
                "Contact {} does not exist",
                message.contact_id
            )));
        }
        Ok(guard.insert_message(message))
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn receive(&self, inbound: InboundMessage) -> Result<Message> {
        let mut guard = self.inner.write().await;
        let contact = guard.upsert_contact(inbound.contact_type, &inbound.from);

        let message = Message {
            id: 0,
            message_type: inbound.message_type,
            direction: Direction::Incoming,
            contact_id: contact.id,
            data_source: Some(inbound.data_source),
            data_source_message_id: inbound.data_source_message_id,
            status: MessageStatus::Sent,
            message: inbound.message,
            title: inbound.title,
            created: Utc::now(),
        };

        Ok(guard.insert_message(message))
    }

    async fn upsert_contact(&self, contact_type: ContactType, address: &str) -> Result<Contact> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::validation("Contact address cannot be empty"));
        }
        let mut guard = self.inner.write().await;
        Ok(guard.upsert_contact(contact_type, address))
    }

    async fn queue_outgoing(
        &self,
        message_type: MessageType,
        contact_id: ContactId,
        body: &str,
        title: Option<&str>,
    ) -> Result<Message> {
        let mut guard = self.inner.write().await;
        let contact = guard
            .contacts
            .get(&contact_id)
            .ok_or_else(|| Error::not_found(format!("Contact {} does not exist", contact_id)))?;

        if contact.contact_type != message_type.contact_type() {
            return Err(Error::validation(format!(
                "A {} contact cannot receive {} messages",
                contact.contact_type, message_type
            )));
        }

        let mut message = Message::outgoing(0, message_type, contact_id, body);
        message.title = title.map(str::to_string);
        Ok(guard.insert_message(message))
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        let guard = self.inner.read().await;
        Ok(guard.messages.get(&id).cloned())
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        let guard = self.inner.read().await;
        Ok(guard.contacts.get(&id).cloned())
    }

    async fn pending_outgoing(&self, after: MessageId, limit: usize) -> Result<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .range(after.saturating_add(1)..)
            .map(|(_, message)| message)
            .filter(|message| {
                message.direction == Direction::Outgoing && message.status == MessageStatus::Pending
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_outcome(
        &self,
        id: MessageId,
        data_source: &str,
        outcome: &SendOutcome,
    ) -> Result<Message> {
        if !outcome.status.is_terminal() {
            return Err(Error::validation("Only terminal outcomes can be recorded"));
        }

        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Message {} does not exist", id)))?;

        if !message.apply_outcome(data_source, outcome) {
            return Err(Error::store(format!(
                "Message {} already has terminal status {:?}",
                id, message.status
            )));
        }

        Ok(message.clone())
    }

    async fn messages_by_type(&self, message_type: MessageType) -> Result<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .values()
            .filter(|message| message.message_type == message_type)
            .cloned()
            .collect())
    }

    async fn update_body(&self, id: MessageId, body: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Message {} does not exist", id)))?;
        message.message = body.to_string();
        Ok(())
    }
}
