use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

use crate::meter::{Level, MeterNode};

pub const SYSTEM_ROOT_LABEL: &str = "System";
pub const ZONE_BULKS_LABEL: &str = "Zone Bulks";
pub const DIRECT_CONNECTIONS_LABEL: &str = "Direct Connections";

/// Synthetic nodes that group meters but carry no reading of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    System,
    ZoneBulks,
    DirectConnections,
}

impl GroupKind {
    pub fn label(&self) -> &'static str {
        match self {
            GroupKind::System => SYSTEM_ROOT_LABEL,
            GroupKind::ZoneBulks => ZONE_BULKS_LABEL,
            GroupKind::DirectConnections => DIRECT_CONNECTIONS_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Meter(MeterNode),
    Group(GroupKind),
}

/// A node of the metering tree. Each node owns its children outright.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub label: String,
    pub kind: NodeKind,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    fn group(kind: GroupKind, children: Vec<HierarchyNode>) -> Self {
        Self {
            label: kind.label().to_string(),
            kind: NodeKind::Group(kind),
            children,
        }
    }

    pub fn meter(&self) -> Option<&MeterNode> {
        match &self.kind {
            NodeKind::Meter(m) => Some(m),
            NodeKind::Group(_) => None,
        }
    }

    pub fn group_kind(&self) -> Option<GroupKind> {
        match self.kind {
            NodeKind::Group(g) => Some(g),
            NodeKind::Meter(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, synthetic ones included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Number of metered nodes in this subtree.
    pub fn meter_count(&self) -> usize {
        usize::from(self.meter().is_some())
            + self.children.iter().map(|c| c.meter_count()).sum::<usize>()
    }
}

/// Build the metering tree from a flat node list.
///
/// `parent_ref` resolves against ids and labels; where several nodes share a
/// key the earliest one in input order wins. L1 meters always start a tree of
/// their own. Nodes whose parent cannot be resolved, or whose parent link
/// would close a cycle, become roots. All roots hang off a synthetic system
/// root that is returned.
pub fn build(nodes: &[MeterNode]) -> HierarchyNode {
    let parents = resolve_parents(nodes);

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children_of[*p].push(i),
            None => roots.push(i),
        }
    }

    let top: Vec<HierarchyNode> = roots
        .iter()
        .map(|&i| assemble(i, nodes, &children_of, true))
        .collect();

    debug!(
        "Built hierarchy: {} nodes, {} roots",
        nodes.len(),
        roots.len()
    );
    HierarchyNode::group(GroupKind::System, group_and_sort(top))
}

fn resolve_parents(nodes: &[MeterNode]) -> Vec<Option<usize>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len() * 2);
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id.as_str()).or_insert(i);
        index.entry(node.label.as_str()).or_insert(i);
    }

    let mut parents: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            if node.level == Level::L1 {
                return None;
            }
            let parent_ref = node.parent_ref.as_deref()?;
            match index.get(parent_ref) {
                Some(&p) if p != i => Some(p),
                Some(_) => {
                    debug!("Meter '{}' names itself as parent", node.label);
                    None
                }
                None => {
                    debug!(
                        "Meter '{}' has unresolved parent '{}'",
                        node.label, parent_ref
                    );
                    None
                }
            }
        })
        .collect();

    // Break cycles at the earliest member in input order.
    for i in 0..nodes.len() {
        let mut cur = parents[i];
        let mut steps = 0;
        while let Some(p) = cur {
            if p == i {
                warn!(
                    "Parent link of meter '{}' closes a cycle, treating it as a root",
                    nodes[i].label
                );
                parents[i] = None;
                break;
            }
            steps += 1;
            if steps > nodes.len() {
                break;
            }
            cur = parents[p];
        }
    }

    parents
}

fn assemble(
    i: usize,
    nodes: &[MeterNode],
    children_of: &[Vec<usize>],
    is_root: bool,
) -> HierarchyNode {
    let children: Vec<HierarchyNode> = children_of[i]
        .iter()
        .map(|&c| assemble(c, nodes, children_of, false))
        .collect();

    let children = if is_root {
        group_and_sort(children)
    } else {
        sort_by_label(children)
    };

    HierarchyNode {
        label: nodes[i].label.clone(),
        kind: NodeKind::Meter(nodes[i].clone()),
        children,
    }
}

/// Pull L2 and DC meters into their synthetic groups, leave the rest in place.
fn group_and_sort(children: Vec<HierarchyNode>) -> Vec<HierarchyNode> {
    let mut zone_bulks = Vec::new();
    let mut direct = Vec::new();
    let mut other = Vec::new();

    for child in children {
        match child.meter().map(|m| m.level) {
            Some(Level::L2) => zone_bulks.push(child),
            Some(Level::Dc) => direct.push(child),
            _ => other.push(child),
        }
    }

    if !zone_bulks.is_empty() {
        other.push(HierarchyNode::group(
            GroupKind::ZoneBulks,
            sort_by_label(zone_bulks),
        ));
    }
    if !direct.is_empty() {
        other.push(HierarchyNode::group(
            GroupKind::DirectConnections,
            sort_by_label(direct),
        ));
    }
    sort_by_label(other)
}

fn sort_by_label(mut children: Vec<HierarchyNode>) -> Vec<HierarchyNode> {
    children.sort_by(|a, b| {
        a.label
            .to_lowercase()
            .cmp(&b.label.to_lowercase())
            .then_with(|| a.label.cmp(&b.label))
    });
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter(id: &str, level: Level, parent: Option<&str>) -> MeterNode {
        MeterNode {
            parent_ref: parent.map(str::to_string),
            ..MeterNode::placeholder(id, level)
        }
    }

    fn labels(node: &HierarchyNode) -> Vec<&str> {
        node.children.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn groups_zone_bulks_and_direct_connections_under_l1() {
        let nodes = vec![
            meter("Main", Level::L1, None),
            meter("Z2 Bulk", Level::L2, Some("Main")),
            meter("Z1 Bulk", Level::L2, Some("Main")),
            meter("Hotel", Level::Dc, Some("Main")),
            meter("Villa 1", Level::L3, Some("Z1 Bulk")),
        ];
        let root = build(&nodes);
        assert_eq!(root.group_kind(), Some(GroupKind::System));
        assert_eq!(labels(&root), vec!["Main"]);

        let main = &root.children[0];
        assert_eq!(labels(main), vec![DIRECT_CONNECTIONS_LABEL, ZONE_BULKS_LABEL]);
        let bulks = &main.children[1];
        assert_eq!(labels(bulks), vec!["Z1 Bulk", "Z2 Bulk"]);
        assert_eq!(labels(&bulks.children[0]), vec!["Villa 1"]);
        assert_eq!(root.meter_count(), 5);
        assert_eq!(root.node_count(), 8);
    }

    #[test]
    fn unresolved_parent_becomes_root() {
        let nodes = vec![
            meter("Main", Level::L1, None),
            meter("Orphan", Level::L3, Some("Nowhere")),
            meter("Loose bulk", Level::L2, Some("Missing")),
        ];
        let root = build(&nodes);
        assert_eq!(labels(&root), vec!["Main", "Orphan", ZONE_BULKS_LABEL]);
        assert_eq!(labels(&root.children[2]), vec!["Loose bulk"]);
    }

    #[test]
    fn parent_resolves_by_id_or_label_first_match_wins() {
        let mut a = meter("A-id", Level::L2, None);
        a.label = "Shared".into();
        let mut b = meter("B-id", Level::L2, None);
        b.label = "Shared".into();
        let by_label = meter("c", Level::L3, Some("Shared"));
        let by_id = meter("d", Level::L3, Some("B-id"));
        let root = build(&[a, b, by_label, by_id]);

        let bulks = &root.children[0];
        let first = bulks
            .children
            .iter()
            .find(|n| n.meter().unwrap().id == "A-id")
            .unwrap();
        let second = bulks
            .children
            .iter()
            .find(|n| n.meter().unwrap().id == "B-id")
            .unwrap();
        assert_eq!(labels(first), vec!["c"]);
        assert_eq!(labels(second), vec!["d"]);
    }

    #[test]
    fn cycle_is_broken_at_earliest_member() {
        let nodes = vec![
            meter("a", Level::L3, Some("b")),
            meter("b", Level::L3, Some("a")),
            meter("self", Level::L3, Some("self")),
        ];
        let root = build(&nodes);
        assert_eq!(labels(&root), vec!["a", "self"]);
        assert_eq!(labels(&root.children[0]), vec!["b"]);
        assert_eq!(root.meter_count(), 3);
    }

    #[test]
    fn l1_ignores_its_parent_ref() {
        let nodes = vec![
            meter("Main", Level::L1, Some("Z")),
            meter("Z", Level::L2, Some("Main")),
        ];
        let root = build(&nodes);
        assert_eq!(labels(&root), vec!["Main"]);
        assert_eq!(labels(&root.children[0]), vec![ZONE_BULKS_LABEL]);
    }

    #[test]
    fn build_is_idempotent() {
        let nodes = vec![
            meter("Main", Level::L1, None),
            meter("Z", Level::L2, Some("Main")),
            meter("V", Level::L3, Some("Z")),
        ];
        let snapshot = nodes.clone();
        assert_eq!(build(&nodes), build(&nodes));
        assert_eq!(nodes, snapshot);
    }

    #[test]
    fn empty_input_yields_bare_system_root() {
        let root = build(&[]);
        assert!(root.is_leaf());
        assert_eq!(root.label, SYSTEM_ROOT_LABEL);
    }
}
