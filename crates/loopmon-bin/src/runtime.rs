// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitor runtime orchestration.
//!
//! Wires a loaded [`LoopmonConfig`] into a [`ConnectionRegistry`]:
//!
//! - build the data sink
//! - connect every selected server and register its tags
//! - wait for shutdown
//! - disconnect everything and report dispatcher totals

use std::path::{Path, PathBuf};
use std::sync::Arc;

use loopmon_config::{ConfigLoader, LoopmonConfig, ServerConfig, SinkKind, TransportConfig};
use loopmon_opcua::{
    ChannelSink, ConnectionRegistry, DataSample, DataSink, TracingSink, TransportFactory,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BinError, BinResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};

// =============================================================================
// Transport selection
// =============================================================================

/// The transport used to reach real servers.
#[cfg(feature = "real-transport")]
pub fn default_transport_factory(
    transport: &TransportConfig,
) -> BinResult<Arc<dyn TransportFactory>> {
    let mut factory = loopmon_opcua::RealTransportFactory::new()
        .trust_server_certs(transport.trust_server_certs);
    if let Some(dir) = &transport.pki_dir {
        factory = factory.with_pki_dir(dir);
    }
    Ok(Arc::new(factory))
}

/// The transport used to reach real servers.
///
/// Without the `real-transport` feature there is none.
#[cfg(not(feature = "real-transport"))]
pub fn default_transport_factory(
    _transport: &TransportConfig,
) -> BinResult<Arc<dyn TransportFactory>> {
    Err(BinError::init(
        "loopmon was built without the real-transport feature; rebuild with `--features real-transport`",
    ))
}

// =============================================================================
// MonitorRuntime
// =============================================================================

/// Connects the configured servers and streams their tags until shutdown.
pub struct MonitorRuntime {
    config: Arc<LoopmonConfig>,
    factory: Arc<dyn TransportFactory>,
    shutdown: ShutdownCoordinator,
    servers: Vec<String>,
}

impl MonitorRuntime {
    /// Creates a runtime over `config` that reaches servers through `factory`.
    pub fn new(config: LoopmonConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            shutdown: ShutdownCoordinator::new(),
            servers: Vec::new(),
        }
    }

    /// Restricts the run to the named servers. Empty means all.
    pub fn with_servers(mut self, names: Vec<String>) -> Self {
        self.servers = names;
        self
    }

    /// Handle for initiating shutdown from outside the runtime.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        let selected = self.selected_servers()?;
        info!(
            version = loopmon_opcua::VERSION,
            servers = selected.len(),
            sink = ?self.config.sink.kind,
            "Starting loopmon"
        );

        let (sink, forwarder) = self.build_sink();
        let registry = ConnectionRegistry::new(
            Arc::clone(&self.factory),
            self.config.opcua.clone(),
            sink,
        );

        let mut connected = 0usize;
        for server in &selected {
            if connect_server(&registry, server).await {
                connected += 1;
            }
        }
        if connected < selected.len() {
            warn!(
                connected,
                configured = selected.len(),
                "Some servers could not be connected"
            );
        }

        info!(connected, "loopmon is ready");
        self.shutdown.wait_for_shutdown().await;

        info!("Shutdown initiated, disconnecting");
        registry.disconnect_all().await;

        let stats = registry.dispatcher_stats();
        info!(
            received = stats.received,
            published = stats.published,
            ignored = stats.ignored,
            "Dispatcher totals"
        );
        drop(registry);

        if let Some(handle) = forwarder {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sample forwarder ended abnormally");
            }
        }

        info!("loopmon shutdown complete");
        Ok(())
    }

    fn selected_servers(&self) -> BinResult<Vec<ServerConfig>> {
        if self.servers.is_empty() {
            return Ok(self.config.servers.clone());
        }

        self.servers
            .iter()
            .map(|name| {
                self.config
                    .server(name)
                    .cloned()
                    .ok_or_else(|| BinError::config(format!("unknown server '{}'", name)))
            })
            .collect()
    }

    fn build_sink(&self) -> (Arc<dyn DataSink>, Option<JoinHandle<()>>) {
        match self.config.sink.kind {
            SinkKind::Tracing => (Arc::new(TracingSink), None),
            SinkKind::Stdout => {
                let (sink, receiver) = ChannelSink::with_channel(self.config.sink.capacity);
                let handle = tokio::spawn(forward_to_stdout(
                    receiver,
                    self.shutdown.shutdown_signal(),
                ));
                (Arc::new(sink), Some(handle))
            }
        }
    }
}

/// Connects one server and registers its tags. Returns `true` on connect.
async fn connect_server(registry: &ConnectionRegistry, server: &ServerConfig) -> bool {
    let view = match registry
        .create_connection(&server.endpoint_url, server.connection_options())
        .await
    {
        Ok(view) => view,
        Err(e) => {
            error!(
                server = %server.name,
                endpoint = %server.endpoint_url,
                error = %e,
                "Failed to connect server"
            );
            return false;
        }
    };

    info!(
        server = %server.name,
        connection_id = %view.id,
        tags = server.tags.len(),
        "Server connected"
    );

    for tag in &server.tags {
        let node_id = match tag.parse_node_id() {
            Ok(node_id) => node_id,
            Err(e) => {
                e.log("parse tag");
                continue;
            }
        };
        match registry
            .add_monitored_item(&view.id, &node_id, tag.monitoring_options())
            .await
        {
            Ok(item_id) => debug!(item_id = %item_id, "Tag monitored"),
            Err(e) => warn!(
                server = %server.name,
                node_id = %node_id,
                error = %e,
                "Failed to monitor tag"
            ),
        }
    }

    true
}

/// Writes each sample as one JSON line until the channel closes or shutdown.
async fn forward_to_stdout(mut receiver: mpsc::Receiver<DataSample>, shutdown: ShutdownSignal) {
    let stop = shutdown.wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            sample = receiver.recv() => match sample {
                Some(sample) => print_sample(&sample),
                None => break,
            },
            _ = &mut stop => {
                while let Ok(sample) = receiver.try_recv() {
                    print_sample(&sample);
                }
                break;
            }
        }
    }
}

fn print_sample(sample: &DataSample) {
    match serde_json::to_string(sample) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(node_id = %sample.node_id, error = %e, "Failed to encode sample"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the monitor runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<LoopmonConfig>,
    factory: Option<Arc<dyn TransportFactory>>,
    servers: Vec<String>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: LoopmonConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the transport factory instead of the default one.
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Restricts the run to the named servers.
    pub fn servers(mut self, names: Vec<String>) -> Self {
        self.servers = names;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<MonitorRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                ConfigLoader::new().load(&path)?
            }
        };

        let factory = match self.factory {
            Some(factory) => factory,
            None => default_transport_factory(&config.transport)?,
        };

        Ok(MonitorRuntime::new(config, factory).with_servers(self.servers))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use loopmon_config::TagConfig;
    use loopmon_opcua::client::{OpcUaTransport, TransportEventSender};
    use loopmon_opcua::{
        ConnectionError, ConnectionOptions, ManagerConfig, OpcUaError, OpcUaResult,
    };

    /// Every server refuses the connection.
    #[derive(Default)]
    struct RefusingFactory {
        attempts: AtomicUsize,
    }

    impl TransportFactory for RefusingFactory {
        fn create(
            &self,
            endpoint_url: &str,
            _options: &ConnectionOptions,
            _config: &ManagerConfig,
            _events: TransportEventSender,
        ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(OpcUaError::connection(ConnectionError::refused(endpoint_url)))
        }
    }

    fn server(name: &str, endpoint: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            endpoint_url: endpoint.to_string(),
            security_mode: Default::default(),
            security_policy: Default::default(),
            username: None,
            password: None,
            session_timeout: None,
            tags: vec![TagConfig {
                node_id: "ns=2;s=Line1.Temperature".to_string(),
                sampling_interval: None,
                queue_size: None,
            }],
        }
    }

    fn config() -> LoopmonConfig {
        LoopmonConfig {
            servers: vec![
                server("plc-1", "opc.tcp://plc-1:4840"),
                server("plc-2", "opc.tcp://plc-2:4840"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        let result = RuntimeBuilder::new()
            .transport_factory(Arc::new(RefusingFactory::default()))
            .build();
        assert!(matches!(result, Err(BinError::Configuration(_))));
    }

    #[cfg(not(feature = "real-transport"))]
    #[test]
    fn test_runtime_builder_without_transport() {
        let result = RuntimeBuilder::new().config(config()).build();
        assert!(matches!(result, Err(BinError::Initialization(_))));
    }

    #[tokio::test]
    async fn test_run_survives_unreachable_servers() {
        let factory = Arc::new(RefusingFactory::default());
        let runtime = RuntimeBuilder::new()
            .config(config())
            .transport_factory(Arc::clone(&factory) as Arc<dyn TransportFactory>)
            .build()
            .unwrap();
        let shutdown = runtime.shutdown_coordinator();

        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("runtime should stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_only_selected_servers() {
        let factory = Arc::new(RefusingFactory::default());
        let runtime = RuntimeBuilder::new()
            .config(config())
            .transport_factory(Arc::clone(&factory) as Arc<dyn TransportFactory>)
            .servers(vec!["plc-2".to_string()])
            .build()
            .unwrap();
        let shutdown = runtime.shutdown_coordinator();
        shutdown.initiate_shutdown();

        runtime.run().await.unwrap();
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_server_rejected() {
        let runtime = RuntimeBuilder::new()
            .config(config())
            .transport_factory(Arc::new(RefusingFactory::default()))
            .servers(vec!["plc-9".to_string()])
            .build()
            .unwrap();
        assert!(matches!(
            runtime.run().await,
            Err(BinError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_stdout_forwarder_stops_on_shutdown() {
        let (sender, receiver) = mpsc::channel(4);
        let coordinator = ShutdownCoordinator::new();
        let handle = tokio::spawn(forward_to_stdout(receiver, coordinator.shutdown_signal()));

        coordinator.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("forwarder should stop")
            .unwrap();
        drop(sender);
    }
}
