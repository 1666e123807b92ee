//! Availability probe run before every operation.
//!
//! A node counts as live when it accepts a TCP connection within the connect
//! timeout. Nothing is sent; the connection is closed immediately.

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

use ringfs_common::{NodeInfo, NodeList};

use crate::node_client::NodeClient;

/// Liveness of every configured node at probe time
#[derive(Debug, Clone)]
pub struct ClusterView {
    nodes: Vec<NodeInfo>,
    live: Vec<bool>,
}

impl ClusterView {
    /// Build a view from liveness flags in list order; nodes without a flag
    /// count as dead and extra flags are dropped
    pub(crate) fn from_liveness(nodes: &NodeList, mut live: Vec<bool>) -> Self {
        live.resize(nodes.len(), false);
        Self {
            nodes: nodes.nodes().to_vec(),
            live,
        }
    }

    /// Live nodes with their placement index
    pub fn live(&self) -> impl Iterator<Item = (usize, &NodeInfo)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.live[*index])
    }

    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|live| **live).count()
    }

    pub fn is_live(&self, index: usize) -> bool {
        self.live.get(index).copied().unwrap_or(false)
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &NodeInfo> + '_ {
        self.nodes
            .iter()
            .zip(&self.live)
            .filter(|(_, live)| !**live)
            .map(|(node, _)| node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Clone)]
pub struct Prober {
    connect_timeout: Duration,
}

impl Prober {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Probe every node concurrently
    pub async fn probe(&self, nodes: &NodeList) -> ClusterView {
        let checks = nodes.iter().map(|node| {
            let client = NodeClient::new(node.clone(), self.connect_timeout, self.connect_timeout);
            async move {
                match client.connect_stream().await {
                    Ok(_stream) => {
                        debug!("{} is live", node);
                        true
                    }
                    Err(e) => {
                        warn!("{}", e);
                        false
                    }
                }
            }
        });
        let live = join_all(checks).await;

        let view = ClusterView::from_liveness(nodes, live);
        info!("{} of {} nodes live", view.live_count(), view.node_count());
        view
    }
}
