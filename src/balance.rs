use serde::Serialize;

use crate::hierarchy::{GroupKind, HierarchyNode};
use crate::meter::Level;
use crate::numeric::{percent_of, round1};
use crate::period::{sum_in_range, PeriodRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BalanceStatus {
    Loss,
    Gain,
    #[default]
    Balanced,
}

impl BalanceStatus {
    pub fn from_loss(loss_volume: f64) -> Self {
        if loss_volume > 0.0 {
            BalanceStatus::Loss
        } else if loss_volume < 0.0 {
            BalanceStatus::Gain
        } else {
            BalanceStatus::Balanced
        }
    }
}

/// Consumption and loss of one tree node over a period range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BalanceMetrics {
    pub own_consumption: f64,
    pub total_consumption: f64,
    pub loss_volume: f64,
    /// One decimal place; 0 when total consumption is 0.
    pub loss_percent: f64,
    pub status: BalanceStatus,
    /// Metered nodes in the subtree, this one included.
    pub meter_count: usize,
}

/// A hierarchy node annotated with its metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceNode {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupKind>,
    pub metrics: BalanceMetrics,
    pub children: Vec<BalanceNode>,
}

/// One row of a flattened tree, for tabular display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    pub depth: usize,
    pub label: String,
    pub level: Option<Level>,
    pub metrics: BalanceMetrics,
}

impl BalanceNode {
    pub fn is_metered(&self) -> bool {
        self.id.is_some()
    }

    /// Pre-order walk with the depth of each node (root = 0).
    pub fn walk<F: FnMut(&BalanceNode, usize)>(&self, f: &mut F) {
        self.walk_at(0, f);
    }

    fn walk_at<F: FnMut(&BalanceNode, usize)>(&self, depth: usize, f: &mut F) {
        f(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, f);
        }
    }

    /// First node in pre-order whose id or label equals `key`.
    pub fn find(&self, key: &str) -> Option<&BalanceNode> {
        if self.label == key || self.id.as_deref() == Some(key) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }

    pub fn flatten(&self) -> Vec<FlatRow> {
        let mut rows = Vec::new();
        self.walk(&mut |node, depth| {
            rows.push(FlatRow {
                depth,
                label: node.label.clone(),
                level: node.level,
                metrics: node.metrics,
            })
        });
        rows
    }
}

/// Annotate every node of `root` with its metrics for `range`, children first.
///
/// A metered node's total is its own reading and its loss is that reading
/// minus what its children account for. A synthetic group introduces no loss
/// of its own: its total and loss are the sums of its children's.
pub fn compute_metrics(root: &HierarchyNode, range: &PeriodRange) -> BalanceNode {
    let children: Vec<BalanceNode> = root
        .children
        .iter()
        .map(|c| compute_metrics(c, range))
        .collect();

    let children_total: f64 = children.iter().map(|c| c.metrics.total_consumption).sum();
    let children_meters: usize = children.iter().map(|c| c.metrics.meter_count).sum();
    let meter = root.meter();

    let own_consumption = meter.map_or(0.0, |m| sum_in_range(m, range));
    let (total_consumption, loss_volume) = match meter {
        Some(_) if !children.is_empty() => (own_consumption, own_consumption - children_total),
        Some(_) => (own_consumption, 0.0),
        None => (
            children_total,
            children.iter().map(|c| c.metrics.loss_volume).sum(),
        ),
    };

    let metrics = BalanceMetrics {
        own_consumption,
        total_consumption,
        loss_volume,
        loss_percent: if total_consumption != 0.0 {
            round1(percent_of(loss_volume, total_consumption))
        } else {
            0.0
        },
        status: BalanceStatus::from_loss(loss_volume),
        meter_count: children_meters + usize::from(meter.is_some()),
    };

    BalanceNode {
        label: root.label.clone(),
        id: meter.map(|m| m.id.clone()),
        level: meter.map(|m| m.level),
        zone: meter.and_then(|m| m.zone.clone()),
        group: root.group_kind(),
        metrics,
        children,
    }
}
