//! Graph model and fetchable units
//!
//! The graph is resolved once, at the traversal boundary, into closed tagged
//! variants: [`SlotKind`] for parameter slots and [`FetchableUnit`] for the
//! two kinds of planning unit. Nothing downstream re-interprets raw graph
//! payloads.

use crate::latency::LatencyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference from a graph slot to its backing parameter file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRef {
    /// Parameter file id
    pub id: String,
    /// Data-source connection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Maturity model, if the slot has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyConfig>,
}

impl ParamRef {
    /// Create a reference with no connection or latency
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection: None,
            latency: None,
        }
    }

    /// With connection
    #[must_use]
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// With latency config
    #[must_use]
    pub fn with_latency(mut self, latency: LatencyConfig) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Conditional probability variant of an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalParam {
    /// Condition expression (opaque here)
    #[serde(default)]
    pub condition: String,
    /// Backing parameter
    pub p: ParamRef,
}

/// Externally-scheduled case on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRef {
    /// Case file id
    pub id: String,
    /// Data-source connection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// Graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node uuid
    pub uuid: String,
    /// Human-readable id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// External event identifier used to query the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Case scheduled on this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseRef>,
}

impl Node {
    /// Node with only a uuid
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            id: None,
            event_id: None,
            case: None,
        }
    }

    /// With event id
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// With case
    #[must_use]
    pub fn with_case(mut self, case: CaseRef) -> Self {
        self.case = Some(case);
        self
    }

    /// Whether the node has a usable event id
    #[inline]
    #[must_use]
    pub fn has_event_id(&self) -> bool {
        self.event_id
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

/// Graph edge with its parameter slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Stable edge uuid
    pub uuid: String,
    /// Human-readable id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Source node (uuid or id)
    pub from: String,
    /// Target node (uuid or id)
    pub to: String,
    /// Base probability parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<ParamRef>,
    /// Monetary cost parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_gbp: Option<ParamRef>,
    /// Labour cost parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labour_cost: Option<ParamRef>,
    /// Conditional probability variants
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_p: Vec<ConditionalParam>,
}

impl Edge {
    /// Edge with no slots
    #[must_use]
    pub fn new(uuid: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            id: None,
            from: from.into(),
            to: to.into(),
            p: None,
            cost_gbp: None,
            labour_cost: None,
            conditional_p: Vec::new(),
        }
    }

    /// With base probability parameter
    #[must_use]
    pub fn with_p(mut self, param: ParamRef) -> Self {
        self.p = Some(param);
        self
    }

    /// With cost parameter
    #[must_use]
    pub fn with_cost(mut self, param: ParamRef) -> Self {
        self.cost_gbp = Some(param);
        self
    }

    /// With labour parameter
    #[must_use]
    pub fn with_labour(mut self, param: ParamRef) -> Self {
        self.labour_cost = Some(param);
        self
    }

    /// With a conditional variant
    #[must_use]
    pub fn with_conditional(mut self, condition: impl Into<String>, param: ParamRef) -> Self {
        self.conditional_p.push(ConditionalParam {
            condition: condition.into(),
            p: param,
        });
        self
    }

    /// Every populated parameter slot, in slot order
    #[must_use]
    pub fn slots(&self) -> Vec<ParameterSlot<'_>> {
        let mut slots = Vec::new();
        let fixed = [
            (SlotKind::Base, self.p.as_ref()),
            (SlotKind::Cost, self.cost_gbp.as_ref()),
            (SlotKind::Labour, self.labour_cost.as_ref()),
        ];
        for (kind, param) in fixed {
            if let Some(param) = param {
                slots.push(ParameterSlot {
                    edge: self,
                    kind,
                    param,
                });
            }
        }
        for (index, conditional) in self.conditional_p.iter().enumerate() {
            slots.push(ParameterSlot {
                edge: self,
                kind: SlotKind::Conditional(index),
                param: &conditional.p,
            });
        }
        slots
    }

    /// Slot of the given kind, if populated
    #[must_use]
    pub fn slot(&self, kind: SlotKind) -> Option<&ParamRef> {
        match kind {
            SlotKind::Base => self.p.as_ref(),
            SlotKind::Cost => self.cost_gbp.as_ref(),
            SlotKind::Labour => self.labour_cost.as_ref(),
            SlotKind::Conditional(index) => self.conditional_p.get(index).map(|c| &c.p),
        }
    }
}

/// Kind of parameter slot on an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKind {
    /// Base probability `p`
    Base,
    /// `cost_gbp`
    Cost,
    /// `labour_cost`
    Labour,
    /// `conditional_p[i]`
    Conditional(usize),
}

impl SlotKind {
    /// Slot name as it appears in item keys
    #[inline]
    #[must_use]
    pub fn slot_name(&self) -> &'static str {
        match self {
            Self::Base => "p",
            Self::Cost => "cost_gbp",
            Self::Labour => "labour_cost",
            Self::Conditional(_) => "conditional_p",
        }
    }

    /// Conditional index, for conditional slots
    #[inline]
    #[must_use]
    pub fn conditional_index(&self) -> Option<usize> {
        match self {
            Self::Conditional(index) => Some(*index),
            _ => None,
        }
    }

    /// Rebuild from the flattened `(slot, conditional_index)` pair
    #[must_use]
    pub fn from_parts(slot: &str, conditional_index: Option<usize>) -> Option<Self> {
        match (slot, conditional_index) {
            ("p", None) => Some(Self::Base),
            ("cost_gbp", None) => Some(Self::Cost),
            ("labour_cost", None) => Some(Self::Labour),
            ("conditional_p", Some(index)) => Some(Self::Conditional(index)),
            _ => None,
        }
    }

    /// Whether the slot holds a probability (base or conditional)
    #[inline]
    #[must_use]
    pub fn is_probability(&self) -> bool {
        matches!(self, Self::Base | Self::Conditional(_))
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conditional(index) => write!(f, "conditional_p[{index}]"),
            other => f.write_str(other.slot_name()),
        }
    }
}

/// Type of planning unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Parameter slot on an edge
    Parameter,
    /// Case on a node
    Case,
}

impl ItemType {
    /// Name as it appears in item keys
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::Case => "case",
        }
    }
}

/// A parameter slot resolved against its edge
#[derive(Debug, Clone, Copy)]
pub struct ParameterSlot<'g> {
    /// Owning edge
    pub edge: &'g Edge,
    /// Slot kind
    pub kind: SlotKind,
    /// Backing parameter reference
    pub param: &'g ParamRef,
}

/// One fetchable planning unit
#[derive(Debug, Clone, Copy)]
pub enum FetchableUnit<'g> {
    /// Parameter slot on an edge
    Parameter(ParameterSlot<'g>),
    /// Case scheduled on a node
    Case {
        /// Owning node
        node: &'g Node,
        /// Case reference
        case: &'g CaseRef,
    },
}

/// Graph of nodes and edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Connection used by slots that name none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_connection: Option<String>,
}

impl Graph {
    /// Look up a node by uuid or human-readable id
    #[must_use]
    pub fn node(&self, reference: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.uuid == reference)
            .or_else(|| {
                self.nodes
                    .iter()
                    .find(|n| n.id.as_deref() == Some(reference))
            })
    }

    /// Resolve a unit's connection, falling back to the graph default
    #[must_use]
    pub fn resolve_connection<'a>(&'a self, own: Option<&'a str>) -> Option<&'a str> {
        own.filter(|c| !c.trim().is_empty()).or_else(|| {
            self.default_connection
                .as_deref()
                .filter(|c| !c.trim().is_empty())
        })
    }

    /// Every fetchable unit: parameter slots first (edge order), then cases
    #[must_use]
    pub fn fetchable_units(&self) -> Vec<FetchableUnit<'_>> {
        let mut units: Vec<FetchableUnit<'_>> = self
            .edges
            .iter()
            .flat_map(Edge::slots)
            .map(FetchableUnit::Parameter)
            .collect();
        units.extend(self.nodes.iter().filter_map(|node| {
            node.case
                .as_ref()
                .map(|case| FetchableUnit::Case { node, case })
        }));
        units
    }
}
