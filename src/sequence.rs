//! Assembly sequencing: a topological order over install dependencies.
//!
//! Dependency-implying constraints (screw mates, explicit dependencies)
//! form a directed graph over the parts. The order is Kahn's algorithm,
//! seeded and tie-broken by parts-list order so results are deterministic.
//! Parts stuck in a dependency cycle are omitted from the order but kept
//! visible for the operator.

use std::collections::VecDeque;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::part::{Part, PartId};

/// The computed install order. `omitted` lists parts excluded because
/// they sit on a dependency cycle, in parts-list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePlan {
    pub order: Vec<PartId>,
    #[serde(default)]
    pub omitted: Vec<PartId>,
}

/// Compute the install order for `parts` under `constraints`.
///
/// Only constraints whose type implies a dependency contribute edges;
/// an edge runs from `part_a` (installed first) to `part_b`.
pub fn sequence(constraints: &[Constraint], parts: &[Part]) -> SequencePlan {
    let mut graph: DiGraph<PartId, ()> = DiGraph::with_capacity(parts.len(), constraints.len());
    let nodes: Vec<NodeIndex> = parts.iter().map(|p| graph.add_node(p.id)).collect();
    let index_of = |id: PartId| parts.iter().position(|p| p.id == id);

    for c in constraints {
        if !c.kind.implies_dependency() {
            continue;
        }
        if let (Some(a), Some(b)) = (index_of(c.part_a), index_of(c.part_b)) {
            graph.add_edge(nodes[a], nodes[b], ());
        }
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.edges_directed(n, Direction::Incoming).count())
        .collect();

    // Seed with zero-indegree nodes in parts-list order; the queue then
    // preserves that order among simultaneously-released nodes.
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(parts.len());
    let mut placed = vec![false; nodes.len()];

    while let Some(i) = queue.pop_front() {
        placed[i] = true;
        order.push(parts[i].id);
        let mut released = Vec::new();
        for edge in graph.edges_directed(nodes[i], Direction::Outgoing) {
            let j = edge.target().index();
            indegree[j] -= 1;
            if indegree[j] == 0 {
                released.push(j);
            }
        }
        released.sort_unstable();
        queue.extend(released);
    }

    let omitted: Vec<PartId> = parts
        .iter()
        .enumerate()
        .filter(|(i, _)| !placed[*i])
        .map(|(_, p)| p.id)
        .collect();

    if !omitted.is_empty() {
        tracing::warn!(count = omitted.len(), "dependency cycle, omitting parts from sequence");
    }

    SequencePlan { order, omitted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintId, ConstraintOrigin, ConstraintType};
    use std::collections::BTreeMap;

    fn part(id: u32) -> Part {
        Part {
            id: PartId(id),
            display_name: format!("p{id}"),
            part_number: String::new(),
            semantic_type: None,
            thread: None,
            sealing: None,
            material: None,
            enriched: false,
        }
    }

    fn dep(id: u64, kind: ConstraintType, a: u32, b: u32) -> Constraint {
        Constraint {
            id: ConstraintId(id),
            kind,
            part_a: PartId(a),
            part_b: PartId(b),
            parameters: BTreeMap::new(),
            confidence: 1.0,
            reasoning: String::new(),
            source_rule: None,
            origin: ConstraintOrigin::Rule,
        }
    }

    #[test]
    fn no_dependencies_keeps_list_order() {
        let parts: Vec<Part> = (0..4).map(part).collect();
        let constraints = vec![dep(1, ConstraintType::Concentric, 2, 0)];
        let plan = sequence(&constraints, &parts);
        assert_eq!(plan.order, vec![PartId(0), PartId(1), PartId(2), PartId(3)]);
        assert!(plan.omitted.is_empty());
    }

    #[test]
    fn screw_mate_orders_a_before_b() {
        let parts: Vec<Part> = (0..3).map(part).collect();
        let constraints = vec![dep(1, ConstraintType::Screw, 2, 0)];
        let plan = sequence(&constraints, &parts);
        let pos = |id: u32| plan.order.iter().position(|&p| p == PartId(id)).unwrap();
        assert!(pos(2) < pos(0));
        assert_eq!(plan.order.len(), 3);
    }

    #[test]
    fn cycle_members_omitted_but_rest_ordered() {
        let parts: Vec<Part> = (0..4).map(part).collect();
        let constraints = vec![
            dep(1, ConstraintType::Screw, 1, 2),
            dep(2, ConstraintType::Dependency, 2, 1),
            dep(3, ConstraintType::Screw, 0, 3),
        ];
        let plan = sequence(&constraints, &parts);
        assert_eq!(plan.order, vec![PartId(0), PartId(3)]);
        assert_eq!(plan.omitted, vec![PartId(1), PartId(2)]);
    }

    #[test]
    fn chain_is_fully_ordered() {
        let parts: Vec<Part> = (0..3).map(part).collect();
        let constraints = vec![
            dep(1, ConstraintType::Screw, 2, 1),
            dep(2, ConstraintType::Screw, 1, 0),
        ];
        let plan = sequence(&constraints, &parts);
        assert_eq!(plan.order, vec![PartId(2), PartId(1), PartId(0)]);
    }

    #[test]
    fn empty_parts_yield_empty_plan() {
        let plan = sequence(&[], &[]);
        assert!(plan.order.is_empty());
        assert!(plan.omitted.is_empty());
    }
}
