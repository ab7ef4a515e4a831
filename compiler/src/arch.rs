// arch.rs — Host architecture configuration
//
// Base cost per node kind plus the overall cost ceiling. Loaded from camelCase
// JSON; every field is optional and falls back to the defaults.
//
// Preconditions: none.
// Postconditions: `node_cost` is defined for every `CostKind`.
// Failure modes: unreadable file or malformed JSON → `ArchError`.
// Side effects: `from_file` reads from the filesystem.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node kinds that carry a base cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CostKind {
    Literal,
    Reference,
    Val,
    Assign,
    Block,
    Call,
    DotCall,
    DotAccess,
    Binary,
    Unary,
    If,
    For,
    Match,
    Lambda,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Architecture {
    pub cost_upper_limit: u64,
    pub default_node_cost: u64,
    pub node_costs: BTreeMap<CostKind, u64>,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            cost_upper_limit: 5000,
            default_node_cost: 1,
            node_costs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid architecture: {0}")]
    Json(#[from] serde_json::Error),
}

impl Architecture {
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.cost_upper_limit = ceiling;
        self
    }

    pub fn node_cost(&self, kind: CostKind) -> u64 {
        self.node_costs
            .get(&kind)
            .copied()
            .unwrap_or(self.default_node_cost)
    }

    pub fn from_json(text: &str) -> Result<Self, ArchError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ArchError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let arch = Architecture::from_json(r#"{"nodeCosts": {"for": 4, "dotCall": 2}}"#)
            .expect("parse");
        assert_eq!(arch.cost_upper_limit, 5000);
        assert_eq!(arch.node_cost(CostKind::For), 4);
        assert_eq!(arch.node_cost(CostKind::DotCall), 2);
        assert_eq!(arch.node_cost(CostKind::Literal), 1);
    }

    #[test]
    fn unknown_kind_rejected() {
        let err = Architecture::from_json(r#"{"nodeCosts": {"loop": 4}}"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid architecture"));
    }

    #[test]
    fn serializes_camel_case() {
        let arch = Architecture::default().with_ceiling(10);
        let json = serde_json::to_string(&arch).expect("json");
        insta::assert_snapshot!(json, @r#"{"costUpperLimit":10,"defaultNodeCost":1,"nodeCosts":{}}"#);
    }
}
