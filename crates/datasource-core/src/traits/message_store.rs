// # Message Store Trait
//
// Boundary to the platform's persistence layer.
//
// ## Purpose
//
// The store is where inbound messages are ingested and where outbound
// outcomes are recorded. This layer never deletes messages and never
// rewrites contact addresses; both are platform policies.
//
// ## Implementations
//
// - In-memory: [`crate::store::MemoryMessageStore`]
// - The platform's database-backed store lives outside this workspace

use async_trait::async_trait;

use crate::model::{
    Contact, ContactId, ContactType, InboundMessage, Message, MessageId, MessageType, SendOutcome,
};

/// Trait for message store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// Consistency across concurrent callers is the store's responsibility.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Ingest an inbound message
    ///
    /// Resolves the sender to an existing contact of the same type and
    /// address, or creates one, then stores the message as incoming. Receipt
    /// is terminal: inbound messages are stored with status `Sent`.
    async fn receive(&self, inbound: InboundMessage) -> crate::Result<Message>;

    /// Find or create a contact
    async fn upsert_contact(
        &self,
        contact_type: ContactType,
        address: &str,
    ) -> crate::Result<Contact>;

    /// Queue a new pending outgoing message for a contact
    async fn queue_outgoing(
        &self,
        message_type: MessageType,
        contact_id: ContactId,
        body: &str,
        title: Option<&str>,
    ) -> crate::Result<Message>;

    /// Look up a message
    async fn get_message(&self, id: MessageId) -> crate::Result<Option<Message>>;

    /// Look up a contact
    async fn get_contact(&self, id: ContactId) -> crate::Result<Option<Contact>>;

    /// Oldest pending outgoing messages with an id greater than `after`, at
    /// most `limit`
    ///
    /// Ids start at 1, so `after = 0` reads from the head of the queue.
    async fn pending_outgoing(
        &self,
        after: MessageId,
        limit: usize,
    ) -> crate::Result<Vec<Message>>;

    /// Record the terminal outcome of a send
    ///
    /// Fails when the message already has a terminal status; a status is
    /// written exactly once.
    async fn record_outcome(
        &self,
        id: MessageId,
        data_source: &str,
        outcome: &SendOutcome,
    ) -> crate::Result<Message>;

    /// All messages of a channel type
    async fn messages_by_type(&self, message_type: MessageType) -> crate::Result<Vec<Message>>;

    /// Replace a message body (used by data migrations only)
    async fn update_body(&self, id: MessageId, body: &str) -> crate::Result<()>;
}
