//! Plugin-based provider registry
//!
//! Data source factories are registered by name on a [`RegistryBuilder`],
//! which then instantiates every configured provider once at startup and
//! freezes them into a [`ProviderRegistry`]. The registry is read-only for
//! the rest of the process lifetime; reconfiguration means restarting.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use datasource_core::registry::RegistryBuilder;
//! use datasource_core::config::ProviderConfig;
//!
//! let mut builder = RegistryBuilder::new();
//! datasource_nexmo::register(&mut builder);
//!
//! let registry = builder.build(&[
//!     ProviderConfig::new("nexmo")
//!         .with_option("from", "+15550001111")
//!         .with_option("secret", "abc")
//!         .with_option("api_key", "key")
//!         .with_option("api_secret", "secret"),
//! ])?;
//!
//! let sms = registry.by_service(MessageType::Sms);
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(builder: &mut RegistryBuilder) {
//!     builder.register_factory("nexmo", Box::new(NexmoFactory));
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::inbound::CallbackRoute;
use crate::logging::{Logger, TracingLogger};
use crate::model::MessageType;
use crate::options::validate_options;
use crate::traits::{DataSource, DataSourceFactory};

/// A callback route bound to the data source that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    /// Method and path
    pub route: CallbackRoute,
    /// Owning data source id
    pub data_source: String,
}

/// Collects factories and builds a [`ProviderRegistry`]
pub struct RegistryBuilder {
    /// Registered data source factories
    factories: HashMap<String, Box<dyn DataSourceFactory>>,

    /// Logger handed to every created data source
    logger: Arc<dyn Logger>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a builder with no factories and a tracing logger
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            logger: TracingLogger::shared(),
        }
    }

    /// Replace the logger handed to data sources
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Register a data source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider id (e.g., "frontlinesms", "nexmo")
    /// - `factory`: Factory object for creating instances
    pub fn register_factory(&mut self, name: impl Into<String>, factory: Box<dyn DataSourceFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Check if a factory is registered
    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all registered factory names
    pub fn list_factories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate every enabled provider and freeze the registry
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a provider id has no factory, is
    /// configured twice, misses a required option, reports a different id
    /// than configured, or claims a callback route another provider owns.
    pub fn build(&self, configs: &[ProviderConfig]) -> Result<ProviderRegistry> {
        let mut entries: Vec<RegistryEntry> = Vec::new();
        let mut index = HashMap::new();
        let mut routes = Vec::new();
        let mut claimed: HashSet<CallbackRoute> = HashSet::new();

        for config in configs {
            config.validate()?;

            if !config.enabled {
                tracing::debug!("Provider {} is disabled, skipping", config.id);
                continue;
            }

            if index.contains_key(&config.id) {
                return Err(Error::config(format!(
                    "Provider configured twice: {}",
                    config.id
                )));
            }

            let factory = self
                .factories
                .get(&config.id)
                .ok_or_else(|| Error::config(format!("Unknown provider type: {}", config.id)))?;

            validate_options(&config.id, &factory.options(), &config.options)?;

            let source = factory.create(config, Arc::clone(&self.logger))?;

            if source.id() != config.id {
                return Err(Error::config(format!(
                    "Factory for '{}' created data source '{}'",
                    config.id,
                    source.id()
                )));
            }

            if let Some(callback) = source.callback() {
                for route in callback.callback_routes() {
                    if !claimed.insert(route.clone()) {
                        return Err(Error::config(format!(
                            "Callback route {} claimed twice (by {})",
                            route, config.id
                        )));
                    }
                    routes.push(RouteBinding {
                        route,
                        data_source: config.id.clone(),
                    });
                }
            }

            tracing::info!(
                provider = %config.id,
                services = ?source.services(),
                capabilities = ?source.capabilities(),
                "Registered data source"
            );

            index.insert(config.id.clone(), entries.len());
            entries.push(RegistryEntry {
                source,
                config: config.clone(),
            });
        }

        Ok(ProviderRegistry {
            entries,
            index,
            routes,
        })
    }
}

/// A configured data source and its option bundle
#[derive(Clone)]
pub struct RegistryEntry {
    source: Arc<dyn DataSource>,
    config: ProviderConfig,
}

impl RegistryEntry {
    /// The data source instance
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// The configuration it was built from
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Process-wide lookup table of configured data sources
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    /// Entries in configuration order
    entries: Vec<RegistryEntry>,

    /// id → position in `entries`
    index: HashMap<String, usize>,

    /// Every callback route, in configuration order
    routes: Vec<RouteBinding>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve a data source by id
    pub fn by_id(&self, id: &str) -> Result<Arc<dyn DataSource>> {
        self.entry(id)
            .map(|entry| Arc::clone(&entry.source))
            .ok_or_else(|| Error::not_found(format!("Data source not configured: {}", id)))
    }

    /// Registry entry (data source + config) by id
    pub fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Every data source whose services include the given channel type
    pub fn by_service(&self, message_type: MessageType) -> Vec<Arc<dyn DataSource>> {
        self.entries
            .iter()
            .filter(|entry| entry.source.supports(message_type))
            .map(|entry| Arc::clone(&entry.source))
            .collect()
    }

    /// Every data source that can send the given channel type
    pub fn senders_for(&self, message_type: MessageType) -> Vec<Arc<dyn DataSource>> {
        self.by_service(message_type)
            .into_iter()
            .filter(|source| source.capabilities().can_send)
            .collect()
    }

    /// All data sources, in configuration order
    pub fn all(&self) -> Vec<Arc<dyn DataSource>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.source))
            .collect()
    }

    /// Configured ids, in configuration order
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.config.id.clone()).collect()
    }

    /// Every declared callback route
    pub fn callback_routes(&self) -> &[RouteBinding] {
        &self.routes
    }

    /// Channel types carried by at least one data source
    pub fn available_services(&self) -> Vec<MessageType> {
        MessageType::ALL
            .into_iter()
            .filter(|message_type| !self.by_service(*message_type).is_empty())
            .collect()
    }

    /// Number of configured data sources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no data source is configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
