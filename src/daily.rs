use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::numeric::{coerce_number, percent_of, round1};
use crate::period::MonthKey;
use crate::stage::UNASSIGNED_ZONE;

/// Reported losses further than this from `l2 - l3` are logged.
const LOSS_MISMATCH_TOLERANCE: f64 = 0.01;

/// One zone's bulk and individual totals for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDailyRecord {
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<MonthKey>,
    /// Day of month, 1-based.
    pub day: u32,
    pub l2_total: f64,
    pub l3_total: f64,
    /// Always `l2_total - l3_total`.
    pub loss: f64,
}

/// Normalize raw daily reading rows (`zone`, `day`, `l2_total_m3`,
/// `l3_total_m3`, `loss_m3`, `date`).
///
/// The day comes from `day`, or failing that from `date`. Rows with neither
/// cannot be placed in a series and are dropped.
pub fn normalize_daily(raw: &Value) -> Result<Vec<ZoneDailyRecord>> {
    let rows = raw.as_array().ok_or_else(|| {
        Error::InvalidInput("expected an array of daily reading rows".to_string())
    })?;

    let records: Vec<ZoneDailyRecord> = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| match row.as_object() {
            Some(obj) => daily_record(index, obj),
            None => {
                warn!("Daily row {} is not an object, skipping", index);
                None
            }
        })
        .collect();

    debug!("Normalized {} of {} daily rows", records.len(), rows.len());
    Ok(records)
}

fn daily_record(index: usize, obj: &Map<String, Value>) -> Option<ZoneDailyRecord> {
    let zone = obj
        .get("zone")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .unwrap_or(UNASSIGNED_ZONE)
        .to_string();

    let date = obj.get("date").and_then(Value::as_str).and_then(parse_date);
    let day = obj
        .get("day")
        .map(coerce_number)
        .filter(|d| d.fract() == 0.0 && (1.0..=31.0).contains(d))
        .map(|d| d as u32)
        .or_else(|| date.map(|d| d.day()));

    let Some(day) = day else {
        warn!("Daily row {} ({}) has no usable day or date, skipping", index, zone);
        return None;
    };

    let l2_total = obj.get("l2_total_m3").map_or(0.0, coerce_number);
    let l3_total = obj.get("l3_total_m3").map_or(0.0, coerce_number);
    let loss = l2_total - l3_total;

    if let Some(reported) = obj.get("loss_m3").filter(|v| !v.is_null()).map(coerce_number) {
        if (reported - loss).abs() > LOSS_MISMATCH_TOLERANCE {
            debug!(
                "Daily row {} ({} day {}): reported loss {} differs from l2 - l3 = {}",
                index, zone, day, reported, loss
            );
        }
    }

    Some(ZoneDailyRecord {
        zone,
        month: date.map(MonthKey::from),
        day,
        l2_total,
        l3_total,
        loss,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Latest month any dated record falls in.
pub fn latest_month(records: &[ZoneDailyRecord]) -> Option<MonthKey> {
    records.iter().filter_map(|r| r.month).max()
}

/// The day series of one zone, optionally restricted to one month, in day order.
pub fn daily_series(
    records: &[ZoneDailyRecord],
    zone: &str,
    month: Option<MonthKey>,
) -> Vec<ZoneDailyRecord> {
    let mut series: Vec<ZoneDailyRecord> = records
        .iter()
        .filter(|r| r.zone == zone.trim())
        .filter(|r| month.map_or(true, |m| r.month == Some(m)))
        .cloned()
        .collect();
    sort_by_day(&mut series);
    series
}

/// Sort by day, breaking ties on the volumes so the order never depends on
/// the input order.
pub fn sort_by_day(series: &mut [ZoneDailyRecord]) {
    series.sort_by(|a, b| {
        a.day
            .cmp(&b.day)
            .then_with(|| a.l2_total.total_cmp(&b.l2_total))
            .then_with(|| a.l3_total.total_cmp(&b.l3_total))
    });
}

/// Month totals of a zone's day series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDailySummary {
    pub zone: String,
    pub days: usize,
    pub total_l2: f64,
    pub total_l3: f64,
    pub total_loss: f64,
    pub loss_percent: f64,
    pub peak_loss_day: Option<u32>,
    pub peak_loss: f64,
}

pub fn summarize(zone: &str, series: &[ZoneDailyRecord]) -> ZoneDailySummary {
    let total_l2: f64 = series.iter().map(|r| r.l2_total).sum();
    let total_l3: f64 = series.iter().map(|r| r.l3_total).sum();
    let total_loss = total_l2 - total_l3;

    let peak = series.iter().fold(None::<&ZoneDailyRecord>, |best, r| match best {
        Some(b) if b.loss >= r.loss => Some(b),
        _ => Some(r),
    });

    ZoneDailySummary {
        zone: zone.to_string(),
        days: series.len(),
        total_l2,
        total_l3,
        total_loss,
        loss_percent: if total_l2 > 0.0 {
            round1(percent_of(total_loss, total_l2))
        } else {
            0.0
        },
        peak_loss_day: peak.map(|r| r.day),
        peak_loss: peak.map_or(0.0, |r| r.loss),
    }
}
