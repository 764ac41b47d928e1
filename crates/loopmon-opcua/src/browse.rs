// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address space browsing and search.
//!
//! [`AddressSpaceBrowser::browse`] lists the Object, Variable and Method
//! children of one node. [`AddressSpaceBrowser::search`] walks the hierarchy
//! depth-first from a start node and collects nodes whose display name or
//! browse name contains a term.
//!
//! Both are bounded by `max_results`, and both tolerate per-node failures:
//! a node whose display name cannot be read is left out, and a branch whose
//! browse call fails is abandoned.
//!
//! # Examples
//!
//! ```rust,ignore
//! let browser = AddressSpaceBrowser::new();
//!
//! let children = browser.browse(transport, &NodeId::OBJECTS_FOLDER, 100).await?;
//! let hits = browser.search(transport, &NodeId::ROOT_FOLDER, "temperature", 20).await?;
//! ```

use std::collections::HashSet;
use std::vec::IntoIter;

use serde::{Deserialize, Serialize};

use crate::client::{BrowseResult, OpcUaTransport, OpcUaValue};
use crate::error::OpcUaResult;
use crate::types::{AttributeId, NodeClass, NodeId, BROWSE_NODE_CLASS_MASK};

// =============================================================================
// BrowseNode
// =============================================================================

/// A node returned by browse or search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseNode {
    /// Node id.
    pub node_id: NodeId,

    /// Browse name.
    pub browse_name: String,

    /// Display name, as read from the node's DisplayName attribute.
    pub display_name: String,

    /// Node class.
    pub node_class: NodeClass,

    /// Whether the node had children when it was browsed.
    pub has_children: bool,
}

impl BrowseNode {
    fn from_reference(reference: BrowseResult, display_name: String) -> Self {
        Self {
            node_id: reference.node_id,
            browse_name: reference.browse_name,
            display_name,
            node_class: reference.node_class,
            has_children: reference.has_children,
        }
    }

    /// Returns `true` if the display name or browse name contains `needle`.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.display_name.to_lowercase().contains(needle)
            || self.browse_name.to_lowercase().contains(needle)
    }
}

// =============================================================================
// AddressSpaceBrowser
// =============================================================================

/// Bounded browse and search over a server's address space.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressSpaceBrowser;

impl AddressSpaceBrowser {
    /// Creates a browser.
    pub fn new() -> Self {
        Self
    }

    /// Lists up to `max_results` children of `node_id`.
    ///
    /// A failure of the browse call itself is returned; a failure to read a
    /// child's display name only drops that child.
    pub async fn browse(
        &self,
        transport: &dyn OpcUaTransport,
        node_id: &NodeId,
        max_results: usize,
    ) -> OpcUaResult<Vec<BrowseNode>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        tracing::trace!(node_id = %node_id, max_results, "Browsing node");
        let references = transport.browse(node_id, BROWSE_NODE_CLASS_MASK).await?;

        let mut nodes = Vec::with_capacity(references.len().min(max_results));
        for reference in references {
            if nodes.len() >= max_results {
                break;
            }
            if let Some(display_name) = self.display_name(transport, &reference.node_id).await {
                nodes.push(BrowseNode::from_reference(reference, display_name));
            }
        }

        tracing::debug!(node_id = %node_id, count = nodes.len(), "Browse complete");
        Ok(nodes)
    }

    /// Depth-first, case-insensitive substring search starting at `start`.
    ///
    /// Results come in the order a recursive pre-order walk would visit them.
    /// The `max_results` budget is shared by the whole walk, which stops as
    /// soon as it is spent. Only nodes reported with children are expanded.
    pub async fn search(
        &self,
        transport: &dyn OpcUaTransport,
        start: &NodeId,
        term: &str,
        max_results: usize,
    ) -> OpcUaResult<Vec<BrowseNode>> {
        let mut results = Vec::new();
        if max_results == 0 {
            return Ok(results);
        }
        let needle = term.to_lowercase();

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(start.clone());

        let root_children = match transport.browse(start, BROWSE_NODE_CLASS_MASK).await {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!(node_id = %start, error = %e, "Search root could not be browsed");
                return Ok(results);
            }
        };

        // Each frame holds the siblings still to visit at one depth.
        let mut stack: Vec<IntoIter<BrowseResult>> = vec![root_children.into_iter()];

        while results.len() < max_results {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let Some(reference) = frame.next() else {
                stack.pop();
                continue;
            };

            if !visited.insert(reference.node_id.clone()) {
                continue;
            }

            let Some(display_name) = self.display_name(transport, &reference.node_id).await else {
                continue;
            };
            let node = BrowseNode::from_reference(reference, display_name);

            if node.matches(&needle) {
                results.push(node.clone());
                if results.len() >= max_results {
                    break;
                }
            }

            if node.has_children {
                match transport.browse(&node.node_id, BROWSE_NODE_CLASS_MASK).await {
                    Ok(children) => stack.push(children.into_iter()),
                    Err(e) => {
                        tracing::warn!(
                            node_id = %node.node_id,
                            error = %e,
                            "Search branch abandoned"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            term,
            start = %start,
            count = results.len(),
            visited = visited.len(),
            "Search complete"
        );
        Ok(results)
    }

    /// Reads the display name of `node_id`, or `None` if the read fails or
    /// yields no text.
    async fn display_name(&self, transport: &dyn OpcUaTransport, node_id: &NodeId) -> Option<String> {
        match transport.read_attribute(node_id, AttributeId::DisplayName).await {
            Ok(result) if result.is_good() => match result.value {
                Some(value) if !value.is_null() => Some(match value {
                    OpcUaValue::String(text) => text,
                    other => other.to_string(),
                }),
                _ => {
                    tracing::warn!(node_id = %node_id, "Node has no display name; skipped");
                    None
                }
            },
            Ok(result) => {
                tracing::warn!(
                    node_id = %node_id,
                    status_code = result.status_code,
                    "Display name read returned bad status; node skipped"
                );
                None
            }
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Display name read failed; node skipped");
                None
            }
        }
    }
}
