use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::meter::{Level, MeterNode};
use crate::period::{MonthKey, PeriodRange};
use crate::stage::{is_pseudo_zone, zone_metrics, ZoneMetrics, MAIN_BULK_ZONE, PSEUDO_ZONES};

/// Per-zone metrics keyed by month; the input to [`pick_default`].
pub type MetricsByZone = BTreeMap<String, BTreeMap<MonthKey, ZoneMetrics>>;

/// Distinct zones of the zone-level meters (L2 to L4), sorted, followed by the
/// pseudo-zones.
pub fn list_zones(nodes: &[MeterNode]) -> Vec<String> {
    let real: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| matches!(n.level, Level::L2 | Level::L3 | Level::L4))
        .filter_map(|n| n.zone())
        .filter(|z| !is_pseudo_zone(z))
        .collect();

    real.into_iter()
        .map(str::to_string)
        .chain(PSEUDO_ZONES.iter().map(|z| z.to_string()))
        .collect()
}

/// Metrics for every zone and month of `range`. A month is only recorded for
/// a zone when the zone had readings in it.
pub fn zone_metrics_by_month(
    nodes: &[MeterNode],
    zones: &[String],
    range: &PeriodRange,
) -> MetricsByZone {
    let months = range.month_keys();
    zones
        .iter()
        .map(|zone| {
            let by_month: BTreeMap<MonthKey, ZoneMetrics> = months
                .iter()
                .map(|&m| (m, zone_metrics(nodes, zone, &PeriodRange::single_month(m))))
                .filter(|(_, metrics)| metrics.has_data())
                .collect();
            (zone.clone(), by_month)
        })
        .collect()
}

/// Choose the zone a view opens on.
///
/// The preferred zone wins when it is one of `zones`. Otherwise the real zone
/// with the highest loss percentage in the most recent month any real zone has
/// data for is chosen, earlier zones winning ties. Pseudo-zones never take
/// part in the ranking; with no real zone data the main bulk pseudo-zone is
/// returned.
pub fn pick_default(
    zones: &[String],
    metrics_by_zone: &MetricsByZone,
    preferred: Option<&str>,
) -> String {
    if let Some(preferred) = preferred.map(str::trim) {
        if zones.iter().any(|z| z == preferred) {
            return preferred.to_string();
        }
        debug!("Preferred zone '{}' is not available", preferred);
    }

    let Some(latest) = metrics_by_zone
        .iter()
        .filter(|(zone, _)| !is_pseudo_zone(zone))
        .flat_map(|(_, by_month)| by_month.keys())
        .max()
        .copied()
    else {
        return MAIN_BULK_ZONE.to_string();
    };

    let mut best: Option<(&String, f64)> = None;
    for zone in zones.iter().filter(|z| !is_pseudo_zone(z)) {
        let Some(metrics) = metrics_by_zone.get(zone).and_then(|m| m.get(&latest)) else {
            continue;
        };
        let pct = metrics.raw_loss_percent();
        if best.map_or(true, |(_, best_pct)| pct > best_pct) {
            best = Some((zone, pct));
        }
    }

    match best {
        Some((zone, pct)) => {
            debug!("Default zone {} ({:.2}% loss in {})", zone, pct, latest);
            zone.clone()
        }
        None => MAIN_BULK_ZONE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter(id: &str, level: Level, zone: &str, readings: &[(&str, f64)]) -> MeterNode {
        let mut m = MeterNode::placeholder(id, level);
        m.zone = Some(zone.to_string());
        for (k, v) in readings {
            m.readings.insert(k.to_string(), *v);
        }
        m
    }

    fn network() -> Vec<MeterNode> {
        vec![
            meter("Main", Level::L1, MAIN_BULK_ZONE, &[("Jan-25", 900.0), ("Feb-25", 900.0)]),
            meter("ZA", Level::L2, "Zone_A", &[("Jan-25", 100.0), ("Feb-25", 100.0)]),
            meter("VA", Level::L3, "Zone_A", &[("Jan-25", 50.0), ("Feb-25", 95.0)]),
            meter("ZB", Level::L2, "Zone_B", &[("Jan-25", 100.0), ("Feb-25", 100.0)]),
            meter("VB", Level::L3, "Zone_B", &[("Jan-25", 90.0), ("Feb-25", 70.0)]),
            meter("ZC", Level::L2, "Zone_C", &[("Jan-25", 100.0)]),
            meter("VC", Level::L3, "Zone_C", &[("Jan-25", 10.0)]),
        ]
    }

    fn range() -> PeriodRange {
        PeriodRange::months(MonthKey::new(2025, 1).unwrap(), MonthKey::new(2025, 2).unwrap())
    }

    #[test]
    fn lists_real_then_pseudo_zones() {
        let zones = list_zones(&network());
        assert_eq!(
            zones,
            vec!["Zone_A", "Zone_B", "Zone_C", "Main Bulk", "Direct Connection", "N/A"]
        );
    }

    #[test]
    fn zones_without_data_skip_the_month() {
        let nodes = network();
        let by_zone = zone_metrics_by_month(&nodes, &list_zones(&nodes), &range());
        assert_eq!(by_zone["Zone_A"].len(), 2);
        assert_eq!(by_zone["Zone_C"].len(), 1);
        assert!(by_zone["N/A"].is_empty());
    }

    #[test]
    fn picks_highest_loss_in_latest_month() {
        let nodes = network();
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        // Zone_C loses 90% but only in January; February is the latest month.
        assert_eq!(pick_default(&zones, &by_zone, None), "Zone_B");
    }

    #[test]
    fn preferred_zone_wins_when_present() {
        let nodes = network();
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        assert_eq!(pick_default(&zones, &by_zone, Some("Zone_A")), "Zone_A");
        assert_eq!(pick_default(&zones, &by_zone, Some("Zone_Z")), "Zone_B");
    }

    #[test]
    fn falls_back_to_main_bulk() {
        assert_eq!(pick_default(&[], &MetricsByZone::new(), None), MAIN_BULK_ZONE);
        let zones = vec!["Zone_A".to_string()];
        assert_eq!(pick_default(&zones, &MetricsByZone::new(), None), MAIN_BULK_ZONE);
    }

    #[test]
    fn pseudo_zones_never_win() {
        let nodes = vec![
            meter("Main", Level::L1, MAIN_BULK_ZONE, &[("Jan-25", 1000.0)]),
            meter("ZA", Level::L2, "Zone_A", &[("Jan-25", 100.0)]),
            meter("VA", Level::L3, "Zone_A", &[("Jan-25", 105.0)]),
        ];
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        assert_eq!(pick_default(&zones, &by_zone, None), "Zone_A");
    }

    #[test]
    fn latest_month_comes_from_real_zones() {
        let nodes = vec![
            meter("Main", Level::L1, MAIN_BULK_ZONE, &[("Jan-25", 900.0), ("Feb-25", 900.0)]),
            meter("ZA", Level::L2, "Zone_A", &[("Jan-25", 100.0)]),
            meter("VA", Level::L3, "Zone_A", &[("Jan-25", 60.0)]),
        ];
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        assert!(by_zone[MAIN_BULK_ZONE].contains_key(&MonthKey::new(2025, 2).unwrap()));
        assert_eq!(pick_default(&zones, &by_zone, None), "Zone_A");
    }

    #[test]
    fn ranks_on_unrounded_loss() {
        // 12.81% and 12.84% both round to 12.8%.
        let nodes = vec![
            meter("ZA", Level::L2, "Zone_A", &[("Jan-25", 10000.0)]),
            meter("VA", Level::L3, "Zone_A", &[("Jan-25", 8719.0)]),
            meter("ZB", Level::L2, "Zone_B", &[("Jan-25", 10000.0)]),
            meter("VB", Level::L3, "Zone_B", &[("Jan-25", 8716.0)]),
        ];
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        assert_eq!(by_zone["Zone_A"][&MonthKey::new(2025, 1).unwrap()].loss_percent, 12.8);
        assert_eq!(by_zone["Zone_B"][&MonthKey::new(2025, 1).unwrap()].loss_percent, 12.8);
        assert_eq!(pick_default(&zones, &by_zone, None), "Zone_B");
    }

    #[test]
    fn deterministic_for_same_input() {
        let nodes = network();
        let zones = list_zones(&nodes);
        let by_zone = zone_metrics_by_month(&nodes, &zones, &range());
        let first = pick_default(&zones, &by_zone, None);
        for _ in 0..5 {
            assert_eq!(pick_default(&zones, &by_zone, None), first);
        }
    }
}
