// # datasource-core
//
// Core library for the DataSource messaging integration layer.
//
// ## Architecture Overview
//
// This library is the boundary between the platform's message model and
// third-party messaging providers:
// - **DataSource**: Provider adapter trait, with optional capabilities
//   (**OutgoingApi** for sending, **CallbackSource** for webhooks)
// - **ProviderRegistry**: Configured adapters, looked up by id or channel
// - **Dispatcher**: Sends outgoing messages through the active adapter
// - **CallbackHandler**: Verifies and ingests provider callbacks
// - **MessageStore**: Persistence boundary (ingestion + outcomes)
//
// ## Design Principles
//
// 1. **Provider-agnostic**: The platform never special-cases a provider
// 2. **Capability-based**: Adapters declare what they can do; callers query flags
// 3. **Plugin-based**: Adapters are registered through factories, no if-else chains
// 4. **Contained failures**: Provider errors become `Failed` outcomes, never panics
// 5. **Verify before ingest**: No callback reaches the store unauthenticated

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inbound;
pub mod logging;
pub mod model;
pub mod options;
pub mod permalink;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{DataSourceConfig, DispatchConfig, ProviderConfig};
pub use dispatcher::{DispatchEvent, DispatchSummary, Dispatcher};
pub use error::{Error, Result};
pub use inbound::{CallbackHandler, CallbackPayload, CallbackResponse, CallbackRoute, HttpMethod};
pub use logging::{LogLevel, Logger, MemoryLogger, TracingLogger};
pub use model::{
    Contact, ContactType, Direction, InboundMessage, Message, MessageStatus, MessageType,
    SendOutcome,
};
pub use options::{OptionSchema, OptionSpec};
pub use registry::{ProviderRegistry, RegistryBuilder, RouteBinding};
pub use store::MemoryMessageStore;
pub use traits::{Capabilities, CallbackSource, DataSource, DataSourceFactory, MessageStore, OutgoingApi};
