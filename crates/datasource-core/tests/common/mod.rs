//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal data sources that exercise the registry,
//! dispatcher and callback handler without talking to a real provider.

#![allow(dead_code)]

use datasource_core::config::ProviderConfig;
use datasource_core::error::{Error, Result};
use datasource_core::inbound::{CallbackPayload, CallbackRoute, verify_shared_secret};
use datasource_core::logging::Logger;
use datasource_core::model::{ContactType, InboundMessage, MessageType, SendOutcome};
use datasource_core::options::{OptionSchema, OptionSpec};
use datasource_core::registry::{ProviderRegistry, RegistryBuilder};
use datasource_core::traits::{CallbackSource, DataSource, DataSourceFactory, OutgoingApi};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a mock data source answers `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    /// Accept and return a tracking id
    Accept,
    /// Provider rejects the message
    Reject,
    /// Never answers
    Hang,
    /// Local fault, returned as an error
    Fault,
    /// No outbound capability
    Unsupported,
}

/// A configurable data source with call counters
#[derive(Clone)]
pub struct MockSource {
    name: &'static str,
    services: Vec<MessageType>,
    contact_type: ContactType,
    behavior: SendBehavior,
    routes: Vec<CallbackRoute>,
    secret: Option<String>,
    send_call_count: Arc<AtomicUsize>,
    recipients: Arc<Mutex<Vec<String>>>,
}

impl MockSource {
    /// SMS gateway that sends and accepts callbacks with secret "abc"
    pub fn sms_gateway() -> Self {
        Self {
            name: "smsgate",
            services: vec![MessageType::Sms],
            contact_type: ContactType::Phone,
            behavior: SendBehavior::Accept,
            routes: vec![CallbackRoute::post("sms/smsgate"), CallbackRoute::get("sms/smsgate")],
            secret: Some("abc".to_string()),
            send_call_count: Arc::new(AtomicUsize::new(0)),
            recipients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Twitter-only source with no capabilities
    pub fn twitter() -> Self {
        Self {
            name: "tweeter",
            services: vec![MessageType::Twitter],
            contact_type: ContactType::Twitter,
            behavior: SendBehavior::Unsupported,
            routes: Vec::new(),
            secret: None,
            send_call_count: Arc::new(AtomicUsize::new(0)),
            recipients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rename the source (ids are the lowercase name)
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Change how `send` answers
    pub fn with_behavior(mut self, behavior: SendBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Replace the callback routes
    pub fn with_routes(mut self, routes: Vec<CallbackRoute>) -> Self {
        self.routes = routes;
        self
    }

    /// Configured id
    pub fn source_id(&self) -> &'static str {
        self.name
    }

    /// Number of times send() was called
    pub fn send_call_count(&self) -> usize {
        self.send_call_count.load(Ordering::SeqCst)
    }

    /// Recipients passed to send(), in order
    pub fn recipients(&self) -> Vec<String> {
        self.recipients.lock().unwrap().clone()
    }

    /// Provider configuration for this source
    pub fn config(&self) -> ProviderConfig {
        let config = ProviderConfig::new(self.name);
        match &self.secret {
            Some(secret) => config.with_option("secret", secret.clone()),
            None => config,
        }
    }
}

impl DataSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn services(&self) -> Vec<MessageType> {
        self.services.clone()
    }

    fn contact_type(&self) -> ContactType {
        self.contact_type
    }

    fn options(&self) -> OptionSchema {
        let mut schema = OptionSchema::new();
        if self.secret.is_some() {
            schema.insert(
                "secret".to_string(),
                OptionSpec::password("Secret", "Shared callback secret").required(),
            );
        }
        schema
    }

    fn outgoing(&self) -> Option<&dyn OutgoingApi> {
        match self.behavior {
            SendBehavior::Unsupported => None,
            _ => Some(self),
        }
    }

    fn callback(&self) -> Option<&dyn CallbackSource> {
        if self.routes.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[async_trait::async_trait]
impl OutgoingApi for MockSource {
    async fn send(&self, to: &str, _message: &str, _title: &str) -> Result<SendOutcome> {
        let call = self.send_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.recipients.lock().unwrap().push(to.to_string());

        match self.behavior {
            SendBehavior::Accept => Ok(SendOutcome::sent(format!("{}-{}", self.name, call))),
            SendBehavior::Reject => Ok(SendOutcome::failed()),
            SendBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(SendOutcome::failed())
            }
            SendBehavior::Fault | SendBehavior::Unsupported => {
                Err(Error::config("mock data source is misconfigured"))
            }
        }
    }
}

impl CallbackSource for MockSource {
    fn verify_secret(&self, candidate: &str) -> bool {
        verify_shared_secret(self.secret.as_deref(), candidate)
    }

    fn callback_routes(&self) -> Vec<CallbackRoute> {
        self.routes.clone()
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> Result<InboundMessage> {
        Ok(InboundMessage {
            data_source: self.id(),
            message_type: MessageType::Sms,
            contact_type: ContactType::Phone,
            from: payload.require("from")?.to_string(),
            message: payload.require("message")?.to_string(),
            to: payload.non_empty("to").map(str::to_string),
            title: None,
            data_source_message_id: payload.non_empty("id").map(str::to_string),
        })
    }
}

/// Factory handing out clones that share the template's counters
pub struct MockFactory {
    template: MockSource,
}

impl MockFactory {
    pub fn new(template: &MockSource) -> Self {
        Self {
            template: template.clone(),
        }
    }
}

impl DataSourceFactory for MockFactory {
    fn options(&self) -> OptionSchema {
        self.template.options()
    }

    fn create(&self, _config: &ProviderConfig, _logger: Arc<dyn Logger>) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(self.template.clone()))
    }
}

/// Builder with a factory registered for every source
pub fn builder_for(sources: &[&MockSource]) -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    for source in sources {
        builder.register_factory(source.source_id(), Box::new(MockFactory::new(source)));
    }
    builder
}

/// Registry with every source registered and configured
pub fn registry_with(sources: &[&MockSource]) -> Arc<ProviderRegistry> {
    let configs: Vec<ProviderConfig> = sources.iter().map(|source| source.config()).collect();
    let registry = builder_for(sources)
        .build(&configs)
        .expect("mock registry should build");
    Arc::new(registry)
}
