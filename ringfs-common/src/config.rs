use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, RingError};
use crate::types::NodeInfo;

/// Ordered, non-empty list of storage nodes.
///
/// The position of a node in the list is its placement index, so the order
/// must be identical for every client of the same cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeList {
    nodes: Vec<NodeInfo>,
}

impl NodeList {
    pub fn new(nodes: Vec<NodeInfo>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(RingError::Configuration("node list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            if node.port == 0 {
                return Err(RingError::Configuration(format!(
                    "node {} has port 0",
                    node.name
                )));
            }
            if !seen.insert(node.name.clone()) {
                return Err(RingError::Configuration(format!(
                    "node {} is listed twice",
                    node.name
                )));
            }
        }

        Ok(Self { nodes })
    }

    /// Parse `server <name> <host>:<port>` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped; anything else is
    /// an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut nodes = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            nodes.push(parse_server_line(line).map_err(|reason| {
                RingError::Configuration(format!("line {}: {}", number + 1, reason))
            })?);
        }

        Self::new(nodes)
    }

    /// Load the node list from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RingError::Configuration(format!("cannot read node list {}: {}", path.display(), e))
        })?;
        let list = Self::parse(&text)?;
        debug!("Loaded {} nodes from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeInfo> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeInfo> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a NodeInfo;
    type IntoIter = std::slice::Iter<'a, NodeInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

fn parse_server_line(line: &str) -> std::result::Result<NodeInfo, String> {
    let mut fields = line.split_whitespace();

    match fields.next() {
        Some("server") => {}
        Some(other) => return Err(format!("unknown directive {:?}", other)),
        None => return Err("empty line".to_string()),
    }

    let name = fields.next().ok_or("missing node name")?;
    let address = fields.next().ok_or("missing node address")?;
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected field {:?}", extra));
    }

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("address {:?} is not host:port", address))?;
    if host.is_empty() {
        return Err(format!("address {:?} has no host", address));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| format!("invalid port in {:?}", address))?;

    Ok(NodeInfo::new(name, host, port))
}
