use std::collections::BTreeSet;

/// Zones whose apartment (L4) meters are left out of the system-wide
/// individual consumption figure. Their L4 readings are collected in a way
/// that already overlaps the building meters above them.
pub const DEFAULT_L4_EXCLUDED_ZONES: [&str; 2] = ["Zone_03_(A)", "Zone_03_(B)"];

/// Number of population standard deviations above the mean a day must exceed
/// before it is reported as anomalous.
pub const DEFAULT_ANOMALY_SIGMA: f64 = 2.0;

/// Business rules the engine applies on every pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub l4_excluded_zones: BTreeSet<String>,
    pub anomaly_sigma: f64,
}

impl EngineOptions {
    /// Replace the L4 exclusion set. An empty iterator keeps the defaults.
    pub fn with_l4_excluded_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let zones: BTreeSet<String> = zones
            .into_iter()
            .map(|z| z.into().trim().to_string())
            .filter(|z| !z.is_empty())
            .collect();
        if !zones.is_empty() {
            self.l4_excluded_zones = zones;
        }
        self
    }

    pub fn excludes_l4(&self, zone: Option<&str>) -> bool {
        zone.is_some_and(|z| self.l4_excluded_zones.contains(z))
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            l4_excluded_zones: DEFAULT_L4_EXCLUDED_ZONES
                .iter()
                .map(|z| z.to_string())
                .collect(),
            anomaly_sigma: DEFAULT_ANOMALY_SIGMA,
        }
    }
}
