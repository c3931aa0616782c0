// # Message & Contact Model
//
// Canonical, provider-independent representation of messages and the
// contacts they are addressed to or received from. Nothing in here knows
// about a particular gateway's wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Storage id of a message
pub type MessageId = u64;

/// Storage id of a contact
pub type ContactId = u64;

/// Channel family a message travels over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// SMS via a gateway
    Sms,
    /// Interactive voice response
    Ivr,
    /// Email
    Email,
    /// Twitter post or direct message
    Twitter,
}

impl MessageType {
    /// All channel types, in declaration order
    pub const ALL: [MessageType; 4] = [
        MessageType::Sms,
        MessageType::Ivr,
        MessageType::Email,
        MessageType::Twitter,
    ];

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sms => "sms",
            MessageType::Ivr => "ivr",
            MessageType::Email => "email",
            MessageType::Twitter => "twitter",
        }
    }

    /// Contact type that can be addressed over this channel
    pub fn contact_type(&self) -> ContactType {
        match self {
            MessageType::Sms | MessageType::Ivr => ContactType::Phone,
            MessageType::Email => ContactType::Email,
            MessageType::Twitter => ContactType::Twitter,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sms" => Ok(MessageType::Sms),
            "ivr" => Ok(MessageType::Ivr),
            "email" => Ok(MessageType::Email),
            "twitter" => Ok(MessageType::Twitter),
            other => Err(Error::config(format!("Unknown message type: {}", other))),
        }
    }
}

/// Kind of address a contact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    /// Phone number
    Phone,
    /// Email address
    Email,
    /// Twitter handle
    Twitter,
}

impl ContactType {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Phone => "phone",
            ContactType::Email => "email",
            ContactType::Twitter => "twitter",
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message was received or is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from a provider
    Incoming,
    /// Sent through a provider
    Outgoing,
}

/// Outcome state of a send or receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// No terminal result yet
    #[default]
    Pending,
    /// Accepted by the provider
    Sent,
    /// Rejected or unreachable
    Failed,
}

impl MessageStatus {
    /// `Sent` and `Failed` are terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

/// A communication endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Storage id
    pub id: ContactId,
    /// Address kind
    #[serde(rename = "type")]
    pub contact_type: ContactType,
    /// Raw address value (phone number, email, handle)
    pub contact: String,
}

/// A single unit of communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Storage id
    pub id: MessageId,
    /// Channel family
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Received or sent
    pub direction: Direction,
    /// Owning contact
    pub contact_id: ContactId,
    /// Adapter that carried the message, once known
    pub data_source: Option<String>,
    /// Provider-scoped id, not globally unique
    pub data_source_message_id: Option<String>,
    /// Current status
    pub status: MessageStatus,
    /// Body text
    pub message: String,
    /// Optional title (email subject and similar)
    pub title: Option<String>,
    /// Creation time
    pub created: DateTime<Utc>,
}

impl Message {
    /// Build a new pending outgoing message
    pub fn outgoing(
        id: MessageId,
        message_type: MessageType,
        contact_id: ContactId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            message_type,
            direction: Direction::Outgoing,
            contact_id,
            data_source: None,
            data_source_message_id: None,
            status: MessageStatus::Pending,
            message: message.into(),
            title: None,
            created: Utc::now(),
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Apply a terminal send outcome
    ///
    /// Returns `false` (and leaves the message untouched) when the message
    /// already has a terminal status.
    pub fn apply_outcome(&mut self, data_source: &str, outcome: &SendOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.data_source = Some(data_source.to_string());
        self.status = outcome.status;
        self.data_source_message_id = outcome.provider_message_id.clone();
        true
    }
}

/// Canonical form of a message received through a provider callback
///
/// The contact is carried by address; the ingestion pipeline resolves it to
/// an existing [`Contact`] or creates one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Adapter id that received it
    pub data_source: String,
    /// Channel family
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Sender address kind
    pub contact_type: ContactType,
    /// Sender address
    pub from: String,
    /// Body text
    pub message: String,
    /// Recipient address on our side, when the provider reports it
    pub to: Option<String>,
    /// Optional title
    pub title: Option<String>,
    /// Provider-scoped id
    pub data_source_message_id: Option<String>,
}

/// Result of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    /// `Sent` or `Failed`
    pub status: MessageStatus,
    /// Provider tracking id; `None` whenever the send failed
    pub provider_message_id: Option<String>,
}

impl SendOutcome {
    /// Provider accepted the message
    pub fn sent(provider_message_id: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Sent,
            provider_message_id: Some(provider_message_id.into()),
        }
    }

    /// Provider rejected the message or could not be reached
    pub fn failed() -> Self {
        Self {
            status: MessageStatus::Failed,
            provider_message_id: None,
        }
    }

    /// True when the status is `Sent`
    pub fn is_sent(&self) -> bool {
        self.status == MessageStatus::Sent
    }
}
