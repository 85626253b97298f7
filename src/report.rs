use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::anomaly::{detect_with_sigma, AnomalyFinding};
use crate::balance::{compute_metrics, BalanceNode};
use crate::daily::{
    daily_series, latest_month, normalize_daily, summarize, ZoneDailyRecord, ZoneDailySummary,
};
use crate::error::Result;
use crate::hierarchy;
use crate::meter::{normalize, NodeFilter};
use crate::options::EngineOptions;
use crate::period::{MonthKey, PeriodRange};
use crate::stage::{stage_summary, stage_trend, zone_metrics, StageSummary, ZoneMetrics};
use crate::zone::{list_zones, pick_default, zone_metrics_by_month};

/// Raw rows as fetched from the backing store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub meters: Value,
    pub daily: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub start: MonthKey,
    pub end: MonthKey,
    pub preferred_zone: Option<String>,
    /// Restricts the hierarchy only; system and zone figures use every meter.
    pub filter: NodeFilter,
    /// Month of the daily series; the latest month in the daily rows if unset.
    pub daily_month: Option<MonthKey>,
}

impl ReportRequest {
    pub fn for_months(start: MonthKey, end: MonthKey) -> Self {
        Self {
            start,
            end,
            preferred_zone: None,
            filter: NodeFilter::default(),
            daily_month: None,
        }
    }

    pub fn range(&self) -> PeriodRange {
        PeriodRange::months(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub zone: String,
    pub month: Option<MonthKey>,
    pub summary: ZoneDailySummary,
    pub records: Vec<ZoneDailyRecord>,
    pub anomalies: Vec<AnomalyFinding>,
}

/// Everything the presentation layer renders for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub period: String,
    pub meter_count: usize,
    pub hierarchy: BalanceNode,
    pub stages: StageSummary,
    pub stage_trend: Vec<StageSummary>,
    pub zones: Vec<ZoneMetrics>,
    pub selected_zone: String,
    pub selected_zone_metrics: ZoneMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyReport>,
}

/// Run the whole engine over one snapshot. Each call starts from scratch.
pub fn build_report(
    snapshot: &Snapshot,
    request: &ReportRequest,
    options: &EngineOptions,
) -> Result<Report> {
    let nodes = normalize(&snapshot.meters)?;
    let range = request.range();

    let visible = if request.filter.is_empty() {
        nodes.clone()
    } else {
        request.filter.apply(&nodes)
    };
    let hierarchy = compute_metrics(&hierarchy::build(&visible), &range);

    let stages = stage_summary(&nodes, &range, options);
    let trend = stage_trend(&nodes, &range, options);

    let zone_names = list_zones(&nodes);
    let zones: Vec<ZoneMetrics> = zone_names
        .iter()
        .map(|z| zone_metrics(&nodes, z, &range))
        .collect();
    let by_month = zone_metrics_by_month(&nodes, &zone_names, &range);
    let selected_zone = pick_default(&zone_names, &by_month, request.preferred_zone.as_deref());
    let selected_zone_metrics = zone_metrics(&nodes, &selected_zone, &range);

    let daily = match &snapshot.daily {
        Some(raw) => Some(daily_report(raw, &selected_zone, request.daily_month, options)?),
        None => None,
    };

    info!(
        "Report for {}: {} meters, A1 {:.1}, total loss {:.1}, zone {}",
        range.label(),
        nodes.len(),
        stages.a1,
        stages.total_loss,
        selected_zone
    );

    Ok(Report {
        period: range.label(),
        meter_count: nodes.len(),
        hierarchy,
        stages,
        stage_trend: trend,
        zones,
        selected_zone,
        selected_zone_metrics,
        daily,
    })
}

fn daily_report(
    raw: &Value,
    zone: &str,
    month: Option<MonthKey>,
    options: &EngineOptions,
) -> Result<DailyReport> {
    let records = normalize_daily(raw)?;
    let month = month.or_else(|| latest_month(&records));
    let series = daily_series(&records, zone, month);
    let anomalies = detect_with_sigma(&series, options.anomaly_sigma);

    Ok(DailyReport {
        zone: zone.to_string(),
        month,
        summary: summarize(zone, &series),
        records: series,
        anomalies,
    })
}
