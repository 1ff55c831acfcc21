//! Read-only collaborators consulted while planning

use fetchplan_model::{CaseFile, Graph, Node, ParameterFile, ParameterSlot};
use std::collections::{BTreeMap, BTreeSet};

/// Read-only view of the cache
///
/// The planner never writes through this interface.
pub trait FileStateAccessor {
    /// Parameter file by id
    fn parameter_file(&self, object_id: &str) -> Option<&ParameterFile>;

    /// Case file by id
    fn case_file(&self, object_id: &str) -> Option<&CaseFile>;
}

impl FileStateAccessor for BTreeMap<String, ParameterFile> {
    fn parameter_file(&self, object_id: &str) -> Option<&ParameterFile> {
        self.get(object_id)
    }

    fn case_file(&self, _object_id: &str) -> Option<&CaseFile> {
        None
    }
}

/// Data-source connection capability checks
pub trait ConnectionChecker {
    /// Whether the parameter slot can be fetched
    fn has_edge_connection(&self, slot: &ParameterSlot<'_>) -> bool;

    /// Whether the node's case can be fetched
    fn has_case_connection(&self, node: &Node) -> bool;

    /// Whether queries through `connection` need event ids on both edge ends
    fn requires_event_ids(&self, _connection: &str) -> bool {
        true
    }
}

/// Connection checker that reads connections straight off the graph
///
/// A unit is connected when it names a connection or the graph has a default
/// one. Connections listed as event-free (e.g. spreadsheet-backed sources) do
/// not need event ids.
#[derive(Debug, Clone)]
pub struct GraphConnectionChecker<'g> {
    graph: &'g Graph,
    event_free: BTreeSet<String>,
}

impl<'g> GraphConnectionChecker<'g> {
    /// Create a checker over `graph`
    #[inline]
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            event_free: BTreeSet::new(),
        }
    }

    /// Mark a connection as not requiring event ids
    #[must_use]
    pub fn with_event_free_connection(mut self, connection: impl Into<String>) -> Self {
        self.event_free.insert(connection.into());
        self
    }
}

impl ConnectionChecker for GraphConnectionChecker<'_> {
    fn has_edge_connection(&self, slot: &ParameterSlot<'_>) -> bool {
        self.graph
            .resolve_connection(slot.param.connection.as_deref())
            .is_some()
    }

    fn has_case_connection(&self, node: &Node) -> bool {
        let own = node.case.as_ref().and_then(|c| c.connection.as_deref());
        self.graph.resolve_connection(own).is_some()
    }

    fn requires_event_ids(&self, connection: &str) -> bool {
        !self.event_free.contains(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchplan_model::{Edge, ParamRef, SlotKind};

    #[test]
    fn graph_default_connection_applies() {
        let mut graph = Graph {
            edges: vec![Edge::new("e1", "a", "b").with_p(ParamRef::new("p1"))],
            ..Graph::default()
        };
        let edge = graph.edges[0].clone();
        let slot = ParameterSlot {
            edge: &edge,
            kind: SlotKind::Base,
            param: edge.slot(SlotKind::Base).unwrap(),
        };
        assert!(!GraphConnectionChecker::new(&graph).has_edge_connection(&slot));

        graph.default_connection = Some("amplitude-prod".into());
        let checker = GraphConnectionChecker::new(&graph).with_event_free_connection("sheets");
        assert!(checker.has_edge_connection(&slot));
        assert!(checker.requires_event_ids("amplitude-prod"));
        assert!(!checker.requires_event_ids("sheets"));
    }
}
