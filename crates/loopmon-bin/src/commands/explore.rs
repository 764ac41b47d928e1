// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the one-shot `browse`, `search` and `read` commands.
//!
//! Each opens a single connection, runs one query, prints the result and
//! disconnects.

use std::future::Future;
use std::sync::Arc;

use loopmon_config::LoopmonConfig;
use loopmon_opcua::{
    BrowseNode, ConnectionId, ConnectionOptions, ConnectionRegistry, NodeId, ReadValueResult,
    SecurityMode, SecurityPolicy, TracingSink,
};
use tracing::debug;

use crate::cli::{BrowseArgs, Cli, EndpointArgs, OutputFormat, ReadArgs, SearchArgs};
use crate::error::BinResult;
use crate::runtime::default_transport_factory;

/// Executes the `browse` command.
pub async fn browse(_cli: &Cli, config: Option<LoopmonConfig>, args: BrowseArgs) -> BinResult<()> {
    let start = args.node.as_deref().map(str::parse::<NodeId>).transpose()?;
    let format = args.endpoint.format;

    let nodes = with_session(config.as_ref(), &args.endpoint, |registry, id| async move {
        registry.browse(&id, start.as_ref(), args.max_results).await
    })
    .await?;

    print_nodes(&nodes, format)
}

/// Executes the `search` command.
pub async fn search(_cli: &Cli, config: Option<LoopmonConfig>, args: SearchArgs) -> BinResult<()> {
    let format = args.endpoint.format;
    let term = args.term.clone();

    let nodes = with_session(config.as_ref(), &args.endpoint, |registry, id| async move {
        registry.search(&id, &term, args.max_results).await
    })
    .await?;

    print_nodes(&nodes, format)
}

/// Executes the `read` command.
pub async fn read(_cli: &Cli, config: Option<LoopmonConfig>, args: ReadArgs) -> BinResult<()> {
    let node_id: NodeId = args.node.parse()?;
    let format = args.endpoint.format;

    let result = {
        let node_id = node_id.clone();
        with_session(config.as_ref(), &args.endpoint, |registry, id| async move {
            registry.read_value(&id, &node_id).await
        })
        .await?
    };

    match format {
        OutputFormat::Text => print!("{}", render_read(&node_id, &result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

/// Opens a connection, runs `query` and disconnects whatever the outcome.
async fn with_session<T, F, Fut>(
    config: Option<&LoopmonConfig>,
    endpoint: &EndpointArgs,
    query: F,
) -> BinResult<T>
where
    F: FnOnce(Arc<ConnectionRegistry>, ConnectionId) -> Fut,
    Fut: Future<Output = loopmon_opcua::OpcUaResult<T>>,
{
    let factory = default_transport_factory(
        &config.map(|c| c.transport.clone()).unwrap_or_default(),
    )?;
    let options = connection_options(config, endpoint)?;
    let manager = config.map(|c| c.opcua.clone()).unwrap_or_default();

    let registry = Arc::new(ConnectionRegistry::new(
        factory,
        manager,
        Arc::new(TracingSink),
    ));

    let result = match registry
        .create_connection(&endpoint.endpoint, options)
        .await
    {
        Ok(view) => query(Arc::clone(&registry), view.id).await,
        Err(e) => Err(e),
    };

    registry.disconnect_all().await;
    Ok(result?)
}

/// Options for `endpoint`: the matching configured server, then CLI flags.
fn connection_options(
    config: Option<&LoopmonConfig>,
    args: &EndpointArgs,
) -> BinResult<ConnectionOptions> {
    let configured = config.and_then(|c| {
        c.servers
            .iter()
            .find(|s| s.endpoint_url.trim() == args.endpoint.trim())
    });

    let mut options = match configured {
        Some(server) if !args.has_overrides() => {
            debug!(server = %server.name, "Using configured server settings");
            return Ok(server.connection_options());
        }
        Some(server) => server.connection_options(),
        None => ConnectionOptions::default(),
    };

    if let Some(mode) = &args.security_mode {
        options.security_mode = mode.parse::<SecurityMode>()?;
    }
    if let Some(policy) = &args.security_policy {
        options.security_policy = policy.parse::<SecurityPolicy>()?;
    }
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        options = options.with_credentials(username, password);
    }

    Ok(options)
}

fn print_nodes(nodes: &[BrowseNode], format: OutputFormat) -> BinResult<()> {
    match format {
        OutputFormat::Text => print!("{}", render_nodes(nodes)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(nodes)?),
    }
    Ok(())
}

/// One line per node; `+` marks nodes with children.
fn render_nodes(nodes: &[BrowseNode]) -> String {
    if nodes.is_empty() {
        return "(no nodes)\n".to_string();
    }

    let width = nodes
        .iter()
        .map(|n| n.node_id.to_string().len())
        .max()
        .unwrap_or(0)
        .max("NODE ID".len());

    let mut out = format!("{:<width$}  {:<13}  NAME\n", "NODE ID", "CLASS", width = width);
    for node in nodes {
        out.push_str(&format!(
            "{:<width$}  {:<13}  {}{}\n",
            node.node_id.to_string(),
            format!("{:?}", node.node_class),
            node.display_name,
            if node.has_children { " +" } else { "" },
            width = width
        ));
    }
    out
}

fn render_read(node_id: &NodeId, result: &ReadValueResult) -> String {
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());

    format!(
        "node:        {}\nvalue:       {}\ndata type:   {}\nstatus:      0x{:08X} ({})\nsource time: {}\nserver time: {}\n",
        node_id,
        or_dash(result.value.as_ref().map(|v| v.to_string())),
        or_dash(result.data_type.as_ref().map(|t| t.to_string())),
        result.status_code,
        result.quality,
        or_dash(result.source_timestamp.map(|t| t.to_rfc3339())),
        or_dash(result.server_timestamp.map(|t| t.to_rfc3339())),
    )
}
