use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrEdgeType {
    Import,
    Call,
    Inherit,
    Implement,
    Compose,
    Depend,
    Reference,
}

impl IrEdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IrEdgeType::Import => "import",
            IrEdgeType::Call => "call",
            IrEdgeType::Inherit => "inherit",
            IrEdgeType::Implement => "implement",
            IrEdgeType::Compose => "compose",
            IrEdgeType::Depend => "depend",
            IrEdgeType::Reference => "reference",
        }
    }
}

impl fmt::Display for IrEdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub edge_type: IrEdgeType,
    pub weight: f64,
    /// Set for edges that only hold on some paths, e.g. dynamic imports.
    pub conditional: bool,
    pub metadata: BTreeMap<String, String>,
}

impl IrEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, edge_type: IrEdgeType) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("{}:{}->{}", edge_type, from, to),
            from,
            to,
            edge_type,
            weight: 1.0,
            conditional: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
