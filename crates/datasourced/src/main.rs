// # datasourced - DataSource Daemon
//
// This daemon is a THIN integration layer:
// - All provider, dispatch and callback logic lives in datasource-core and
//   the provider crates
// - Configuration is via environment variables ONLY
//
// The datasourced daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Registering the compiled-in data sources
// 3. Serving provider callbacks over HTTP
// 4. Accepting outgoing messages over HTTP (when a token is configured)
// 5. Dispatching pending outgoing messages on an interval
//
// ## Configuration
//
// ### Data sources
// - `DATASOURCE_PROVIDERS`: Comma-separated list of data source ids
// - `DATASOURCE_<ID>_<OPTION>`: Option for a data source
//   (e.g. `DATASOURCE_NEXMO_API_KEY` sets `api_key` on `nexmo`);
//   `DATASOURCE_<ID>_ENABLED=false` disables it
//
// ### Dispatch
// - `DATASOURCE_<TYPE>_PROVIDER`: Active data source per channel
//   (`SMS`, `IVR`, `EMAIL`, `TWITTER`)
// - `DATASOURCE_SEND_TIMEOUT_SECS`: Upper bound for one send (default 30)
// - `DATASOURCE_BATCH_SIZE`: Pending messages per batch (default 50)
// - `DATASOURCE_POLL_INTERVAL_SECS`: Interval between batches (default 60)
//
// ### Server
// - `DATASOURCE_LISTEN_ADDR`: Callback server address (default 0.0.0.0:8080)
// - `DATASOURCE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DATASOURCE_OUTBOX_TOKEN`: Bearer token for `POST /messages`; the route
//   is not mounted when unset
//
// ## Example
//
// ```bash
// export DATASOURCE_PROVIDERS=nexmo
// export DATASOURCE_NEXMO_FROM=+15550001111
// export DATASOURCE_NEXMO_SECRET=callback_secret
// export DATASOURCE_NEXMO_API_KEY=key
// export DATASOURCE_NEXMO_API_SECRET=api_secret
// export DATASOURCE_SMS_PROVIDER=nexmo
//
// datasourced
// ```

mod server;

use anyhow::{Context, Result};
use datasource_core::config::{DataSourceConfig, DispatchConfig, ProviderConfig};
use datasource_core::model::MessageType;
use datasource_core::traits::MessageStore;
use datasource_core::{CallbackHandler, DispatchEvent, Dispatcher, MemoryMessageStore, RegistryBuilder};
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const ENV_PREFIX: &str = "DATASOURCE_";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Upper bound for draining the server and the outbound loop on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    datasource: DataSourceConfig,
    listen_addr: String,
    log_level: String,
    outbox_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Load configuration from `DATASOURCE_*` variables
    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        let var = |name: &str| vars.get(&format!("{}{}", ENV_PREFIX, name)).map(|v| v.trim());

        let ids: Vec<String> = var("PROVIDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut providers = Vec::with_capacity(ids.len());
        for id in &ids {
            let prefix = format!("{}{}_", ENV_PREFIX, id.to_uppercase());
            let mut provider = ProviderConfig::new(id.clone());

            for (key, value) in vars.iter().filter(|(key, _)| key.starts_with(&prefix)) {
                let option = key[prefix.len()..].to_lowercase();
                if option == "enabled" {
                    let enabled = parse_bool(value)
                        .with_context(|| format!("{} must be true or false", key))?;
                    provider = provider.with_enabled(enabled);
                } else {
                    provider = provider.with_option(option, value.clone());
                }
            }

            providers.push(provider);
        }

        let mut dispatch = DispatchConfig::default();
        for message_type in MessageType::ALL {
            let name = format!("{}_PROVIDER", message_type.as_str().to_uppercase());
            if let Some(id) = var(&name).filter(|id| !id.is_empty()) {
                dispatch = dispatch.with_active(message_type, id.to_lowercase());
            }
        }

        if let Some(value) = var("SEND_TIMEOUT_SECS") {
            dispatch.send_timeout_secs = value
                .parse()
                .with_context(|| format!("DATASOURCE_SEND_TIMEOUT_SECS is not a number: {}", value))?;
        }
        if let Some(value) = var("BATCH_SIZE") {
            dispatch.batch_size = value
                .parse()
                .with_context(|| format!("DATASOURCE_BATCH_SIZE is not a number: {}", value))?;
        }
        if let Some(value) = var("POLL_INTERVAL_SECS") {
            dispatch.poll_interval_secs = value
                .parse()
                .with_context(|| format!("DATASOURCE_POLL_INTERVAL_SECS is not a number: {}", value))?;
        }

        Ok(Self {
            datasource: DataSourceConfig { providers, dispatch },
            listen_addr: var("LISTEN_ADDR")
                .unwrap_or(DEFAULT_LISTEN_ADDR)
                .to_string(),
            log_level: var("LOG_LEVEL").unwrap_or("info").to_string(),
            outbox_token: var("OUTBOX_TOKEN")
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        })
    }

    /// Validate the configuration
    ///
    /// Checks required fields, numeric ranges and the log level, then the
    /// data source configuration itself (unique ids, active data sources
    /// configured and enabled).
    fn validate(&self) -> Result<()> {
        if self.datasource.providers.is_empty() {
            anyhow::bail!(
                "DATASOURCE_PROVIDERS must list at least one data source. \
                Set it via: export DATASOURCE_PROVIDERS=frontlinesms,nexmo"
            );
        }

        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!(
                "DATASOURCE_LISTEN_ADDR must be an address like 0.0.0.0:8080. Got: {}",
                self.listen_addr
            );
        }

        let dispatch = &self.datasource.dispatch;
        if !(1..=300).contains(&dispatch.send_timeout_secs) {
            anyhow::bail!(
                "DATASOURCE_SEND_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                dispatch.send_timeout_secs
            );
        }

        if !(1..=1000).contains(&dispatch.batch_size) {
            anyhow::bail!(
                "DATASOURCE_BATCH_SIZE must be between 1 and 1000. Got: {}",
                dispatch.batch_size
            );
        }

        if !(1..=3600).contains(&dispatch.poll_interval_secs) {
            anyhow::bail!(
                "DATASOURCE_POLL_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                dispatch.poll_interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DATASOURCE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if let Some(token) = &self.outbox_token {
            if token.len() < 16 {
                anyhow::bail!("DATASOURCE_OUTBOX_TOKEN must be at least 16 characters long");
            }
        }

        self.datasource.validate()?;

        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DaemonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting datasourced daemon");
    info!(
        "Configuration loaded: {} data source(s)",
        config.datasource.providers.len()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let components = match build_components(&config) {
            Ok(components) => components,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return DaemonExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(&config, components).await {
            error!("Daemon error: {:#}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Everything built from configuration before serving
struct Components {
    dispatcher: Dispatcher,
    events: mpsc::Receiver<DispatchEvent>,
    handler: CallbackHandler,
    store: Arc<dyn MessageStore>,
}

/// Register data sources and build the registry, dispatcher and handler
fn build_components(config: &Config) -> Result<Components> {
    #[allow(unused_mut)]
    let mut builder = RegistryBuilder::new();

    // Register built-in data sources
    #[cfg(feature = "frontlinesms")]
    {
        debug!("Registering FrontlineSMS data source");
        datasource_frontlinesms::register(&mut builder);
    }

    #[cfg(feature = "nexmo")]
    {
        debug!("Registering Nexmo data source");
        datasource_nexmo::register(&mut builder);
    }

    let registry = Arc::new(
        builder
            .build(&config.datasource.providers)
            .context("Failed to configure data sources")?,
    );

    for message_type in registry.available_services() {
        if !config.datasource.dispatch.active.contains_key(&message_type) {
            warn!(
                "No active data source for {} messages; outgoing {} messages stay pending",
                message_type, message_type
            );
        }
    }

    let (dispatcher, events) = Dispatcher::new(Arc::clone(&registry), config.datasource.dispatch.clone())
        .context("Failed to configure dispatcher")?;

    let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
    let handler = CallbackHandler::new(registry, Arc::clone(&store));

    Ok(Components {
        dispatcher,
        events,
        handler,
        store,
    })
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: &Config, components: Components) -> Result<()> {
    let Components {
        dispatcher,
        events,
        handler,
        store,
    } = components;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let event_task = tokio::spawn(log_events(events));

    let dispatch = &config.datasource.dispatch;
    let outbound_task = tokio::spawn(run_outbound(
        dispatcher,
        Arc::clone(&store),
        dispatch.batch_size,
        Duration::from_secs(dispatch.poll_interval_secs),
        shutdown_rx.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening for callbacks on {}", config.listen_addr);

    let outbox = match &config.outbox_token {
        Some(token) => {
            info!("Accepting outgoing messages on POST /messages");
            Some(server::Outbox {
                store: Arc::clone(&store),
                token: token.clone(),
            })
        }
        None => {
            info!("DATASOURCE_OUTBOX_TOKEN not set; POST /messages is disabled");
            None
        }
    };
    let app = server::build_router(handler, outbox);
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_requested(shutdown_rx))
            .await
    });

    info!("Daemon initialized successfully");

    tokio::select! {
        signal = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", signal?);
        }
        result = &mut server_task => {
            let _ = shutdown_tx.send(true);
            match result {
                Ok(Ok(())) => anyhow::bail!("Callback server stopped unexpectedly"),
                Ok(Err(e)) => anyhow::bail!("Callback server failed: {}", e),
                Err(e) => anyhow::bail!("Callback server task panicked: {}", e),
            }
        }
    }

    info!("Shutting down daemon");
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let served = server_task.await;
        let _ = outbound_task.await;
        // The dispatcher owned the only event sender
        let _ = event_task.await;
        served
    })
    .await;

    match drained {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(anyhow::anyhow!("Callback server failed: {}", e)),
        Ok(Err(e)) => Err(anyhow::anyhow!("Callback server task panicked: {}", e)),
        Err(_) => Err(anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT)),
    }
}

/// Dispatch pending outgoing messages until shutdown
async fn run_outbound(
    dispatcher: Dispatcher,
    store: Arc<dyn MessageStore>,
    batch_size: usize,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = dispatcher.process_pending(store.as_ref(), batch_size).await {
                    error!("Outbound batch failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Outbound loop stopped");
}

/// Log dispatch events until the dispatcher is dropped
async fn log_events(mut events: mpsc::Receiver<DispatchEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            DispatchEvent::SendFailed {
                message_id,
                data_source,
            } => debug!(message_id, data_source = %data_source, "Send failed"),
            other => debug!("Dispatch event: {:?}", other),
        }
    }
}

/// Resolve once shutdown has been requested
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn nexmo_vars() -> Vec<(String, String)> {
        vars(&[
            ("DATASOURCE_PROVIDERS", "nexmo, FrontlineSMS"),
            ("DATASOURCE_NEXMO_FROM", "+15550001111"),
            ("DATASOURCE_NEXMO_SECRET", "abc"),
            ("DATASOURCE_NEXMO_API_KEY", "key"),
            ("DATASOURCE_NEXMO_API_SECRET", "secret"),
            ("DATASOURCE_FRONTLINESMS_ENABLED", "false"),
            ("DATASOURCE_SMS_PROVIDER", "nexmo"),
            ("DATASOURCE_BATCH_SIZE", "10"),
            ("PATH", "/usr/bin"),
        ])
    }

    #[test]
    fn test_from_vars() {
        let config = Config::from_vars(nexmo_vars()).unwrap();

        let providers = &config.datasource.providers;
        assert_eq!(providers.len(), 2);

        let nexmo = &providers[0];
        assert_eq!(nexmo.id, "nexmo");
        assert_eq!(nexmo.option("api_key"), Some("key"));
        assert_eq!(nexmo.option("api_secret"), Some("secret"));
        assert_eq!(nexmo.option("from"), Some("+15550001111"));

        let frontline = &providers[1];
        assert_eq!(frontline.id, "frontlinesms");
        assert!(!frontline.enabled);

        let dispatch = &config.datasource.dispatch;
        assert_eq!(dispatch.active.get(&MessageType::Sms).map(String::as_str), Some("nexmo"));
        assert_eq!(dispatch.batch_size, 10);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.log_level, "info");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_providers_rejected() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_SEND_TIMEOUT_SECS".to_string(), "soon".to_string()));
        assert!(Config::from_vars(pairs).is_err());

        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_POLL_INTERVAL_SECS".to_string(), "0".to_string()));
        let config = Config::from_vars(pairs).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_and_addr_rejected() {
        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_LOG_LEVEL".to_string(), "verbose".to_string()));
        assert!(Config::from_vars(pairs).unwrap().validate().is_err());

        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_LISTEN_ADDR".to_string(), "localhost".to_string()));
        assert!(Config::from_vars(pairs).unwrap().validate().is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn logged_at(level: Level, event: DispatchEvent) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (tx, rx) = mpsc::channel(4);
        tx.send(event).await.unwrap();
        drop(tx);
        log_events(rx).await;

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_failed_event_is_not_a_second_warning() {
        let failed = DispatchEvent::SendFailed {
            message_id: 7,
            data_source: "nexmo".to_string(),
        };

        // The data source already reported the failure through its logger
        assert_eq!(logged_at(Level::WARN, failed.clone()).await, "");
        assert!(logged_at(Level::DEBUG, failed).await.contains("Send failed"));
    }

    #[test]
    fn test_outbox_token() {
        let config = Config::from_vars(nexmo_vars()).unwrap();
        assert_eq!(config.outbox_token, None);

        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_OUTBOX_TOKEN".to_string(), "s3cret-outbox-token".to_string()));
        let config = Config::from_vars(pairs).unwrap();
        assert_eq!(config.outbox_token.as_deref(), Some("s3cret-outbox-token"));
        assert!(config.validate().is_ok());

        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_OUTBOX_TOKEN".to_string(), "short".to_string()));
        assert!(Config::from_vars(pairs).unwrap().validate().is_err());
    }

    #[test]
    fn test_active_provider_must_be_enabled() {
        let mut pairs = nexmo_vars();
        pairs.push(("DATASOURCE_NEXMO_ENABLED".to_string(), "no".to_string()));
        assert!(Config::from_vars(pairs).unwrap().validate().is_err());
    }

    #[cfg(all(feature = "nexmo", feature = "frontlinesms"))]
    #[test]
    fn test_build_components() {
        let config = Config::from_vars(nexmo_vars()).unwrap();
        let components = build_components(&config).unwrap();

        let registry = components.handler.registry();
        assert_eq!(registry.ids(), vec!["nexmo".to_string()]);
        assert!(
            components
                .dispatcher
                .active_source(MessageType::Sms)
                .is_ok()
        );
    }
}
