use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

use crate::core::models::{AgentType, Role};

/// Terminal edge target.
pub const END: &str = "__end__";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainStep {
    pub instruction: String,
    #[serde(default)]
    pub output_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChainConfig {
    #[serde(default)]
    steps: Vec<ChainStep>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphConfig {
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    edges: Vec<GraphEdge>,
    #[serde(default)]
    entry: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid {mode} config: {reason}")]
    Malformed { mode: &'static str, reason: String },
    #[error("duplicate graph node '{0}'")]
    DuplicateNode(String),
    #[error("graph entry '{0}' is not a node")]
    UnknownEntry(String),
    #[error("graph edge references unknown node '{0}'")]
    UnknownNode(String),
    #[error("graph node '{0}' has more than one outgoing edge")]
    Branching(String),
    #[error("graph contains a cycle through '{0}'")]
    Cycle(String),
}

/// A validated linear walk: at most one outgoing edge per node, no cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPlan {
    pub entry: String,
    nodes: HashMap<String, GraphNode>,
    next: HashMap<String, String>,
}

impl GraphPlan {
    fn build(config: GraphConfig, entry: String) -> Result<Self, PlanError> {
        let mut nodes = HashMap::new();
        for node in config.nodes {
            if nodes.contains_key(&node.id) {
                return Err(PlanError::DuplicateNode(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }
        if !nodes.contains_key(&entry) {
            return Err(PlanError::UnknownEntry(entry));
        }

        let mut next = HashMap::new();
        for edge in config.edges {
            if !nodes.contains_key(&edge.from) {
                return Err(PlanError::UnknownNode(edge.from));
            }
            if edge.to != END && !nodes.contains_key(&edge.to) {
                return Err(PlanError::UnknownNode(edge.to));
            }
            if next.insert(edge.from.clone(), edge.to).is_some() {
                return Err(PlanError::Branching(edge.from));
            }
        }

        let plan = Self { entry, nodes, next };
        plan.check_acyclic()?;
        Ok(plan)
    }

    fn check_acyclic(&self) -> Result<(), PlanError> {
        for start in self.nodes.keys() {
            let mut seen = HashSet::new();
            let mut current = start.as_str();
            while let Some(to) = self.next.get(current) {
                if to == END {
                    break;
                }
                if !seen.insert(current) {
                    return Err(PlanError::Cycle(current.to_string()));
                }
                current = to;
            }
        }
        Ok(())
    }

    /// Nodes in visiting order from `entry`. A node with no outgoing edge
    /// ends the walk like `__end__` does.
    pub fn path(&self) -> Vec<&GraphNode> {
        let mut path = Vec::new();
        let mut current = Some(self.entry.as_str());
        while let Some(id) = current {
            let Some(node) = self.nodes.get(id) else {
                break;
            };
            path.push(node);
            current = match self.next.get(id).map(String::as_str) {
                Some(END) => None,
                Some(to) => Some(to),
                None => {
                    warn!("Graph node '{}' has no outgoing edge, ending walk", id);
                    None
                }
            };
        }
        path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    Simple,
    Chain(Vec<ChainStep>),
    Graph(GraphPlan),
}

impl ExecutionPlan {
    pub fn agent_type(&self) -> AgentType {
        match self {
            ExecutionPlan::Simple => AgentType::Simple,
            ExecutionPlan::Chain(_) => AgentType::Chain,
            ExecutionPlan::Graph(_) => AgentType::Graph,
        }
    }
}

/// Missing or empty advanced configuration degrades to `Simple`; a config
/// that is present but structurally wrong is an error.
pub fn resolve(role: &Role) -> Result<ExecutionPlan, PlanError> {
    match role.agent_type {
        AgentType::Simple => Ok(ExecutionPlan::Simple),
        AgentType::Chain => {
            let config: ChainConfig = parse_section(&role.agent_config, None, "chain")?;
            if config.steps.is_empty() {
                warn!("Role {} is a chain with no steps, running as simple", role.code);
                return Ok(ExecutionPlan::Simple);
            }
            Ok(ExecutionPlan::Chain(config.steps))
        }
        AgentType::Graph => {
            let config: GraphConfig = parse_section(&role.agent_config, Some("graph"), "graph")?;
            let entry = config.entry.clone().filter(|e| !e.trim().is_empty());
            match entry {
                Some(entry) if !config.nodes.is_empty() => {
                    Ok(ExecutionPlan::Graph(GraphPlan::build(config, entry)?))
                }
                _ => {
                    warn!(
                        "Role {} is a graph without nodes or entry, running as simple",
                        role.code
                    );
                    Ok(ExecutionPlan::Simple)
                }
            }
        }
    }
}

// Graph config may be nested under a "graph" key or given at the top level.
fn parse_section<T: Default + for<'de> Deserialize<'de>>(
    config: &serde_json::Value,
    key: Option<&str>,
    mode: &'static str,
) -> Result<T, PlanError> {
    let section = key.and_then(|k| config.get(k)).unwrap_or(config);
    if section.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(section.clone()).map_err(|e| PlanError::Malformed {
        mode,
        reason: e.to_string(),
    })
}
