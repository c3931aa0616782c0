//! Core traits for the DataSource layer
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DataSource`]: Provider adapter with optional capabilities
//! - [`OutgoingApi`]: Outbound delivery capability
//! - [`CallbackSource`]: Inbound webhook capability
//! - [`MessageStore`]: Persistence boundary for messages and contacts

pub mod data_source;
pub mod message_store;

pub use data_source::{Capabilities, CallbackSource, DataSource, DataSourceFactory, OutgoingApi};
pub use message_store::MessageStore;
