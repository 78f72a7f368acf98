//! Runtime orchestration: configuration, logging, route table and listener.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! // Loads switchboard.toml from the current directory if present
//! let mut runtime = SwitchboardRuntime::new();
//! runtime.provide(Database::connect()?);
//! runtime.run().await?;
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ConfigLoader, ConfigResult, SwitchboardConfig};
use crate::error::RuntimeResult;
use crate::logging;
use switchboard_core::{BoxedSender, ControllerDescriptor, InstanceRegistry, SocketController};
use switchboard_framework::{Dispatcher, RouteTable};
use switchboard_transport::SessionHub;

/// Owns everything needed to serve a set of socket controllers.
///
/// Instances are provided up front; the route table is built once when the
/// dispatcher is created. Controllers annotated with `#[socket_controller]`
/// are picked up automatically unless `dispatch.discover` is off.
pub struct SwitchboardRuntime {
    config: SwitchboardConfig,
    registry: Arc<InstanceRegistry>,
    descriptors: Vec<ControllerDescriptor>,
    hub: Arc<SessionHub>,
}

impl SwitchboardRuntime {
    /// Creates a runtime, loading configuration from the default locations.
    ///
    /// Falls back to defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .with_user_config_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SwitchboardConfig::default()
            });

        Self::from_config(config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            route_field = %config.dispatch.route_field,
            "Runtime initialized from configuration"
        );

        Self {
            config,
            registry: Arc::new(InstanceRegistry::new()),
            descriptors: Vec::new(),
            hub: Arc::new(SessionHub::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Returns the instance registry handlers and filters resolve from.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Returns the hub holding the open sessions.
    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Makes `value` resolvable as a controller or filter instance.
    pub fn provide<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.registry.insert(Arc::new(value));
        self
    }

    /// Registers a controller instance explicitly.
    ///
    /// Needed for controllers declared with `#[socket_controller(manual)]` or
    /// implemented by hand.
    pub fn controller<C: SocketController>(&mut self, instance: C) -> &mut Self {
        self.registry.insert(Arc::new(instance));
        self.descriptors.push(C::descriptor());
        self
    }

    /// Builds the route table and a dispatcher answering through the hub.
    pub fn build_dispatcher(&self) -> RuntimeResult<Dispatcher> {
        let mut builder = RouteTable::builder(Arc::clone(&self.registry));
        for descriptor in &self.descriptors {
            builder = builder.descriptor(descriptor.clone());
        }
        if self.config.dispatch.discover {
            builder = builder.discovered();
        }
        debug!(controllers = builder.controller_count(), "Building route table");

        let table = builder.build()?;
        let sender: BoxedSender = self.hub.clone();
        Ok(Dispatcher::new(table, sender).with_options(self.config.dispatch.to_options()))
    }
}

impl Default for SwitchboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Serving
// =============================================================================

#[cfg(feature = "ws-server")]
mod serve {
    use std::future::Future;

    use tokio::signal;
    use tracing::{error, info};

    use super::SwitchboardRuntime;
    use crate::config::validate_config;
    use crate::error::RuntimeResult;
    use switchboard_transport::{ListenerHandle, ServerOptions, ws_listen};

    impl SwitchboardRuntime {
        /// Validates the configuration, builds the route table and starts
        /// the WebSocket listener.
        pub async fn start(&self) -> RuntimeResult<ListenerHandle> {
            validate_config(&self.config)?;
            let dispatcher = self.build_dispatcher()?;

            let options = ServerOptions {
                addr: self.config.server.addr(),
                path: self.config.server.path.clone(),
                outbound_buffer: self.config.server.outbound_buffer,
            };
            let handle = ws_listen(options, dispatcher, self.hub.clone()).await?;

            info!(
                addr = %handle.local_addr(),
                path = %self.config.server.path,
                "Switchboard runtime started"
            );
            Ok(handle)
        }

        /// Serves until Ctrl+C or SIGTERM.
        pub async fn run(&self) -> RuntimeResult<()> {
            self.run_until(wait_for_shutdown()).await
        }

        /// Serves until `shutdown` completes.
        pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
        where
            F: Future<Output = ()>,
        {
            let handle = self.start().await?;
            info!("Switchboard runtime is now running");

            shutdown.await;

            info!(sessions = self.hub.len(), "Shutting down");
            handle.shutdown();
            handle.stopped().await;
            Ok(())
        }
    }

    /// Waits for Ctrl+C, or SIGTERM on Unix.
    async fn wait_for_shutdown() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received Ctrl+C"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await;
            info!("Received Ctrl+C");
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SwitchboardRuntime`] with custom configuration sources.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_file: Option<String>,
    profile: Option<String>,
    config: Option<SwitchboardConfig>,
    load_env: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder. Environment variables are loaded.
    pub fn new() -> Self {
        Self {
            load_env: true,
            ..Default::default()
        }
    }

    /// Loads configuration from this file only.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Uses this configuration as-is, skipping every other source.
    pub fn config(mut self, config: SwitchboardConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Disables `SWITCHBOARD_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<SwitchboardRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let mut loader = ConfigLoader::new();
                if let Some(profile) = &self.profile {
                    loader = loader.profile(profile);
                }
                if let Some(path) = &self.config_file {
                    loader = loader.file(path);
                } else {
                    loader = loader.with_current_dir().with_user_config_dir();
                }
                if !self.load_env {
                    loader = loader.without_env();
                }
                loader.load()?
            }
        };

        Ok(SwitchboardRuntime::from_config(config))
    }
}

// =============================================================================
// Tests
// =============================================================================
