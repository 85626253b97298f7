mod config;
mod mqtt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use serde_json::Value;
use std::fs;

use waterbalance::meter::NodeFilter;
use waterbalance::period::MonthKey;
use waterbalance::report::{build_report, ReportRequest, Snapshot};
use waterbalance::EngineOptions;

fn read_json(path: &str) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON in {}", path))
}

fn main() -> Result<()> {
    env_logger::init();

    let config = config::Config::parse();
    info!("Starting waterbalance");

    let start: MonthKey = config.start.parse().context("Invalid --start")?;
    let end: MonthKey = match &config.end {
        Some(raw) => raw.parse().context("Invalid --end")?,
        None => start,
    };
    let daily_month = config
        .daily_month
        .as_deref()
        .map(str::parse::<MonthKey>)
        .transpose()
        .context("Invalid --daily-month")?;

    let snapshot = Snapshot {
        meters: read_json(&config.meters)?,
        daily: config.daily.as_deref().map(read_json).transpose()?,
    };

    let request = ReportRequest {
        preferred_zone: config.zone.clone(),
        filter: NodeFilter {
            zone: config.filter_zone.clone(),
            meter_type: config.meter_type.clone(),
        },
        daily_month,
        ..ReportRequest::for_months(start, end)
    };

    let mut options =
        EngineOptions::default().with_l4_excluded_zones(config.l4_excluded_zones.clone());
    options.anomaly_sigma = config.anomaly_sigma;

    let report = build_report(&snapshot, &request, &options).context("Failed to build report")?;

    let payload = if config.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", payload);

    if let Some(host) = &config.mqtt_host {
        if let Err(e) = mqtt::publish_report(&config, host, &payload) {
            error!("Failed to publish: {}", e);
        }
    }

    Ok(())
}
