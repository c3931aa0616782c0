// # Message permalinks
//
// Links to a message on the provider's site are derived at read time from
// the message and its contact. They are never stored as the source of
// truth.
//
// Twitter bodies stored before the handle-based form was introduced embed
// `https://twitter.com/statuses/{id}`. `rewrite_twitter_permalinks` is the
// one-time corrective migration replacing those with
// `https://twitter.com/{handle}/status/{id}`.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{Contact, Message, MessageType};
use crate::traits::MessageStore;

/// Base URL of twitter permalinks
pub const TWITTER_BASE_URL: &str = "https://twitter.com";

/// Status permalink for a tweet by `handle`
pub fn twitter_status_url(handle: &str, status_id: &str) -> String {
    format!("{}/{}/status/{}", TWITTER_BASE_URL, handle, status_id)
}

/// Legacy id-only permalink
pub fn legacy_twitter_status_url(status_id: &str) -> String {
    format!("{}/statuses/{}", TWITTER_BASE_URL, status_id)
}

/// Permalink of a message, when its channel has one
///
/// Only twitter messages with a provider id have a permalink.
pub fn permalink(message: &Message, contact: &Contact) -> Option<String> {
    if message.message_type != MessageType::Twitter || message.contact_id != contact.id {
        return None;
    }
    let status_id = message.data_source_message_id.as_deref()?;
    Some(twitter_status_url(&contact.contact, status_id))
}

/// Replace legacy permalinks in a body
///
/// Returns `None` when the body contains no legacy permalink for `status_id`.
pub fn rewrite_legacy_permalink(body: &str, handle: &str, status_id: &str) -> Option<String> {
    let legacy = legacy_twitter_status_url(status_id);
    if !body.contains(&legacy) {
        return None;
    }
    Some(body.replace(&legacy, &twitter_status_url(handle, status_id)))
}

/// Rewrite legacy permalinks in every stored twitter message
///
/// Idempotent: a second run finds nothing to rewrite. Messages without a
/// provider id or whose contact is missing are left alone.
///
/// # Returns
///
/// The number of rewritten messages.
pub async fn rewrite_twitter_permalinks(store: &dyn MessageStore) -> Result<usize> {
    let mut rewritten = 0;

    for message in store.messages_by_type(MessageType::Twitter).await? {
        let Some(status_id) = message.data_source_message_id.as_deref() else {
            continue;
        };

        let Some(contact) = store.get_contact(message.contact_id).await? else {
            warn!(message_id = message.id, "Twitter message has no contact, skipping");
            continue;
        };

        if let Some(body) = rewrite_legacy_permalink(&message.message, &contact.contact, status_id) {
            store.update_body(message.id, &body).await?;
            debug!(message_id = message.id, "Rewrote twitter permalink");
            rewritten += 1;
        }
    }

    info!("Rewrote {} twitter permalink(s)", rewritten);
    Ok(rewritten)
}
