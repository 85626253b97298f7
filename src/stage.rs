use serde::Serialize;
use std::fmt;

use crate::meter::{Level, MeterNode};
use crate::numeric::{percent_of, round1};
use crate::options::EngineOptions;
use crate::period::{sum_in_range, PeriodRange};

pub const MAIN_BULK_ZONE: &str = "Main Bulk";
pub const DIRECT_CONNECTION_ZONE: &str = "Direct Connection";
pub const UNASSIGNED_ZONE: &str = "N/A";

/// Aggregates selectable like zones whose bulk and individual sides are the
/// same volume.
pub const PSEUDO_ZONES: [&str; 3] = [MAIN_BULK_ZONE, DIRECT_CONNECTION_ZONE, UNASSIGNED_ZONE];

pub fn is_pseudo_zone(zone: &str) -> bool {
    PSEUDO_ZONES.contains(&zone)
}

/// System-wide three-stage water balance.
///
/// A1 is what enters the network, A2 what the zone bulks and direct
/// connections pass on, A3 what end users are billed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub period: String,
    pub a1: f64,
    pub a2: f64,
    pub a3_individual: f64,
    pub a3_bulk: f64,
    pub stage1_loss: f64,
    pub stage2_loss: f64,
    pub total_loss: f64,
    pub stage1_loss_percent: f64,
    pub stage2_loss_percent: f64,
    pub total_loss_percent: f64,
    pub efficiency_percent: f64,
}

pub fn stage_summary(
    nodes: &[MeterNode],
    range: &PeriodRange,
    options: &EngineOptions,
) -> StageSummary {
    let mut a1 = 0.0;
    let mut a2 = 0.0;
    let mut a3_individual = 0.0;
    let mut a3_bulk = 0.0;

    for node in nodes {
        let own = sum_in_range(node, range);
        match node.level {
            Level::L1 => a1 += own,
            Level::L2 => a2 += own,
            Level::Dc => {
                a2 += own;
                a3_individual += own;
                a3_bulk += own;
            }
            Level::L3 => {
                a3_bulk += own;
                if !node.is_building_bulk() {
                    a3_individual += own;
                }
            }
            Level::L4 => {
                if !options.excludes_l4(node.zone()) {
                    a3_individual += own;
                }
            }
            Level::Unknown => {}
        }
    }

    let stage1_loss = a1 - a2;
    let stage2_loss = a2 - a3_individual;
    // Summed from the stages so the identity holds under floating point.
    let total_loss = stage1_loss + stage2_loss;

    let positive_pct = |part: f64, whole: f64| {
        if whole > 0.0 {
            round1(percent_of(part, whole))
        } else {
            0.0
        }
    };

    StageSummary {
        period: range.label(),
        a1,
        a2,
        a3_individual,
        a3_bulk,
        stage1_loss,
        stage2_loss,
        total_loss,
        stage1_loss_percent: positive_pct(stage1_loss, a1),
        stage2_loss_percent: positive_pct(stage2_loss, a2),
        total_loss_percent: positive_pct(total_loss, a1),
        efficiency_percent: positive_pct(a3_individual, a1),
    }
}

/// One summary per month of `range`, oldest first.
pub fn stage_trend(
    nodes: &[MeterNode],
    range: &PeriodRange,
    options: &EngineOptions,
) -> Vec<StageSummary> {
    range
        .month_keys()
        .into_iter()
        .map(|month| stage_summary(nodes, &PeriodRange::single_month(month), options))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZoneStatus {
    #[serde(rename = "No meters connected")]
    NoMetersConnected,
    Anomaly,
    Excellent,
    Good,
    Moderate,
    High,
    Critical,
}

impl ZoneStatus {
    /// First matching rule wins.
    pub fn classify(zone_bulk: f64, individual_sum: f64, loss: f64, loss_percent: f64) -> Self {
        if zone_bulk > 0.0 && individual_sum == 0.0 {
            ZoneStatus::NoMetersConnected
        } else if loss < 0.0 {
            ZoneStatus::Anomaly
        } else if loss_percent < 10.0 {
            ZoneStatus::Excellent
        } else if loss_percent < 20.0 {
            ZoneStatus::Good
        } else if loss_percent < 30.0 {
            ZoneStatus::Moderate
        } else if loss_percent < 50.0 {
            ZoneStatus::High
        } else {
            ZoneStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::NoMetersConnected => "No meters connected",
            ZoneStatus::Anomaly => "Anomaly",
            ZoneStatus::Excellent => "Excellent",
            ZoneStatus::Good => "Good",
            ZoneStatus::Moderate => "Moderate",
            ZoneStatus::High => "High",
            ZoneStatus::Critical => "Critical",
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bulk-versus-individual balance of a single zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneMetrics {
    pub zone: String,
    pub period: String,
    pub zone_bulk: f64,
    pub individual_sum: f64,
    pub loss: f64,
    /// One decimal place.
    pub loss_percent: f64,
    pub status: ZoneStatus,
    pub bulk_meter_count: usize,
    pub individual_meter_count: usize,
    pub pseudo: bool,
}

impl ZoneMetrics {
    pub fn has_data(&self) -> bool {
        self.zone_bulk != 0.0 || self.individual_sum != 0.0
    }

    /// Loss percentage before rounding, for ranking zones against each other.
    pub fn raw_loss_percent(&self) -> f64 {
        if self.zone_bulk > 0.0 {
            percent_of(self.loss, self.zone_bulk)
        } else {
            0.0
        }
    }
}

/// Balance of `zone` over `range`.
///
/// For a real zone the bulk side is its L2 meters and the individual side its
/// L3 meters; L4 apartments are already counted by their building meter. The
/// pseudo-zones report the same volume on both sides.
pub fn zone_metrics(nodes: &[MeterNode], zone: &str, range: &PeriodRange) -> ZoneMetrics {
    let zone = zone.trim();
    if is_pseudo_zone(zone) {
        return pseudo_zone_metrics(nodes, zone, range);
    }

    let mut zone_bulk = 0.0;
    let mut individual_sum = 0.0;
    let mut bulk_meter_count = 0;
    let mut individual_meter_count = 0;

    for node in nodes.iter().filter(|n| n.zone() == Some(zone)) {
        match node.level {
            Level::L2 => {
                zone_bulk += sum_in_range(node, range);
                bulk_meter_count += 1;
            }
            Level::L3 => {
                individual_sum += sum_in_range(node, range);
                individual_meter_count += 1;
            }
            _ => {}
        }
    }

    let loss = zone_bulk - individual_sum;
    let raw_percent = if zone_bulk > 0.0 {
        percent_of(loss, zone_bulk)
    } else {
        0.0
    };

    ZoneMetrics {
        zone: zone.to_string(),
        period: range.label(),
        zone_bulk,
        individual_sum,
        loss,
        loss_percent: round1(raw_percent),
        status: ZoneStatus::classify(zone_bulk, individual_sum, loss, raw_percent),
        bulk_meter_count,
        individual_meter_count,
        pseudo: false,
    }
}

fn pseudo_zone_metrics(nodes: &[MeterNode], zone: &str, range: &PeriodRange) -> ZoneMetrics {
    let members: Vec<&MeterNode> = nodes
        .iter()
        .filter(|n| match zone {
            MAIN_BULK_ZONE => n.level == Level::L1,
            DIRECT_CONNECTION_ZONE => n.level == Level::Dc,
            _ => n.zone().map_or(true, |z| z == UNASSIGNED_ZONE),
        })
        .collect();
    let volume: f64 = members.iter().map(|n| sum_in_range(n, range)).sum();

    ZoneMetrics {
        zone: zone.to_string(),
        period: range.label(),
        zone_bulk: volume,
        individual_sum: volume,
        loss: 0.0,
        loss_percent: 0.0,
        status: ZoneStatus::classify(volume, volume, 0.0, 0.0),
        bulk_meter_count: members.len(),
        individual_meter_count: members.len(),
        pseudo: true,
    }
}
