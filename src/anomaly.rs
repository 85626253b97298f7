//! Flags unusual days in a zone's daily series.
//!
//! Loss and individual consumption are screened independently: a day is
//! reported when its value lies more than `sigma` population standard
//! deviations above the month mean. Days below the mean are never reported.

use serde::Serialize;
use std::fmt;

use crate::daily::{sort_by_day, ZoneDailyRecord};
use crate::options::DEFAULT_ANOMALY_SIGMA;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighLoss,
    HighConsumption,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::HighLoss => f.write_str("high_loss"),
            AnomalyKind::HighConsumption => f.write_str("high_consumption"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFinding {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub day: u32,
    pub value: f64,
    pub baseline_mean: f64,
    pub description: String,
}

/// Population mean and standard deviation (divides by N).
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn detect(series: &[ZoneDailyRecord]) -> Vec<AnomalyFinding> {
    detect_with_sigma(series, DEFAULT_ANOMALY_SIGMA)
}

/// Findings ordered by day, loss before consumption on the same day. The
/// result does not depend on the order of `series`.
pub fn detect_with_sigma(series: &[ZoneDailyRecord], sigma: f64) -> Vec<AnomalyFinding> {
    let mut sorted = series.to_vec();
    sort_by_day(&mut sorted);

    let mut findings = screen(&sorted, AnomalyKind::HighLoss, sigma, |r| r.loss);
    findings.extend(screen(&sorted, AnomalyKind::HighConsumption, sigma, |r| r.l3_total));
    findings.sort_by(|a, b| a.day.cmp(&b.day).then(a.kind.cmp(&b.kind)));
    findings
}

fn screen<F>(
    series: &[ZoneDailyRecord],
    kind: AnomalyKind,
    sigma: f64,
    value_of: F,
) -> Vec<AnomalyFinding>
where
    F: Fn(&ZoneDailyRecord) -> f64,
{
    let values: Vec<f64> = series.iter().map(&value_of).collect();
    let (mean, std) = mean_std(&values);
    let threshold = sigma * std;

    series
        .iter()
        .zip(values)
        .filter(|(_, v)| (v - mean).abs() > threshold && *v > mean)
        .map(|(record, value)| AnomalyFinding {
            kind,
            day: record.day,
            value,
            baseline_mean: mean,
            description: describe(kind, record.day, value, mean),
        })
        .collect()
}

fn describe(kind: AnomalyKind, day: u32, value: f64, mean: f64) -> String {
    let what = match kind {
        AnomalyKind::HighLoss => "Loss",
        AnomalyKind::HighConsumption => "Individual consumption",
    };
    format!(
        "{} of {:.1} m³ on day {} is well above the monthly average of {:.1} m³",
        what, value, day, mean
    )
}
