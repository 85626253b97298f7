use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::numeric::coerce_number;
use crate::period::{canonical_key, MonthKey};

/// Position of a meter in the distribution network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Level {
    /// Main bulk intake
    L1,
    /// Zone bulk meter
    L2,
    /// Building or villa meter
    L3,
    /// Apartment sub-meter
    L4,
    /// Direct connection to the main bulk, outside any zone
    #[serde(rename = "DC")]
    Dc,
    Unknown,
}

impl Level {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "L1" => Level::L1,
            "L2" => Level::L2,
            "L3" => Level::L3,
            "L4" => Level::L4,
            "DC" => Level::Dc,
            _ => Level::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
            Level::L4 => "L4",
            Level::Dc => "DC",
            Level::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterNode {
    pub id: String,
    pub label: String,
    pub level: Level,
    pub zone: Option<String>,
    pub meter_type: String,
    pub parent_ref: Option<String>,
    pub account_number: String,
    /// Volume (m³) per canonical period key, `Mon-YY` or a day number.
    pub readings: BTreeMap<String, f64>,
}

impl MeterNode {
    /// A node with the given identity and every other field empty.
    pub fn placeholder(id: &str, level: Level) -> Self {
        Self {
            id: id.to_string(),
            label: id.to_string(),
            level,
            zone: None,
            meter_type: String::new(),
            parent_ref: None,
            account_number: String::new(),
            readings: BTreeMap::new(),
        }
    }

    pub fn reading(&self, key: &str) -> f64 {
        self.readings.get(key).copied().unwrap_or(0.0)
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// L3 meters that measure a whole building whose apartments carry their
    /// own L4 meters, e.g. `D_Building_Bulk`.
    pub fn is_building_bulk(&self) -> bool {
        if self.level != Level::L3 {
            return false;
        }
        let kind = self.meter_type.to_ascii_lowercase().replace(['_', '-'], " ");
        kind.contains("building") && kind.contains("bulk")
    }
}

const ID_FIELDS: &[&str] = &["id", "meter_id"];
const LABEL_FIELDS: &[&str] = &["label", "meter_label", "name"];
const LEVEL_FIELDS: &[&str] = &["level"];
const ZONE_FIELDS: &[&str] = &["zone"];
const TYPE_FIELDS: &[&str] = &["meter_type", "type"];
const PARENT_FIELDS: &[&str] = &["parent", "parent_ref", "parent_meter"];
const ACCOUNT_FIELDS: &[&str] = &["account_number", "acct", "account"];

/// Normalize raw meter rows into typed nodes.
///
/// Only a non-array top level is rejected. Individual rows that are not
/// objects, or lack a label or level, are coerced to safe defaults so one bad
/// row never aborts the batch.
pub fn normalize(raw: &Value) -> Result<Vec<MeterNode>> {
    let rows = raw.as_array().ok_or_else(|| {
        Error::InvalidInput(format!(
            "expected an array of meter rows, got {}",
            json_kind(raw)
        ))
    })?;

    let nodes: Vec<MeterNode> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| match row.as_object() {
            Some(obj) => normalize_row(index, obj),
            None => {
                warn!("Meter row {} is {}, not an object", index, json_kind(row));
                MeterNode::placeholder(&format!("row-{}", index), Level::Unknown)
            }
        })
        .collect();

    debug!("Normalized {} meter rows", nodes.len());
    Ok(nodes)
}

fn normalize_row(index: usize, obj: &Map<String, Value>) -> MeterNode {
    let fallback = format!("row-{}", index);
    let account_number = text_field(obj, ACCOUNT_FIELDS).unwrap_or_default();
    let label = text_field(obj, LABEL_FIELDS);
    let id = text_field(obj, ID_FIELDS)
        .or_else(|| (!account_number.is_empty()).then(|| account_number.clone()))
        .or_else(|| label.clone())
        .unwrap_or(fallback);
    let label = label.unwrap_or_else(|| {
        debug!("Meter row {} has no label, using '{}'", index, id);
        id.clone()
    });

    let level = match text_field(obj, LEVEL_FIELDS) {
        Some(raw) => Level::parse(&raw),
        None => {
            debug!("Meter row {} ({}) has no level", index, label);
            Level::Unknown
        }
    };

    MeterNode {
        id,
        label,
        level,
        zone: text_field(obj, ZONE_FIELDS),
        meter_type: text_field(obj, TYPE_FIELDS).unwrap_or_default(),
        parent_ref: text_field(obj, PARENT_FIELDS),
        account_number,
        readings: readings(obj),
    }
}

/// Nested `readings` object first, then wide-format month columns on the row
/// itself. The first value seen for a canonical key wins.
fn readings(obj: &Map<String, Value>) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();

    if let Some(nested) = obj.get("readings").and_then(Value::as_object) {
        for (key, value) in nested {
            out.entry(canonical_key(key))
                .or_insert_with(|| coerce_number(value));
        }
    }

    for (key, value) in obj {
        if let Some(month) = MonthKey::parse_label(key).or_else(|| MonthKey::parse_iso(key)) {
            out.entry(month.label())
                .or_insert_with(|| coerce_number(value));
        }
    }

    out
}

/// First non-empty field among `keys`, trimmed. Numbers are rendered as text
/// so numeric account numbers and ids survive.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let text = match obj.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Zone/type restriction applied to normalized nodes before the tree is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub zone: Option<String>,
    pub meter_type: Option<String>,
}

impl NodeFilter {
    pub fn is_empty(&self) -> bool {
        self.zone.is_none() && self.meter_type.is_none()
    }

    pub fn matches(&self, node: &MeterNode) -> bool {
        let zone_ok = self
            .zone
            .as_deref()
            .map_or(true, |z| node.zone() == Some(z.trim()));
        let type_ok = self
            .meter_type
            .as_deref()
            .map_or(true, |t| node.meter_type.eq_ignore_ascii_case(t.trim()));
        zone_ok && type_ok
    }

    pub fn apply(&self, nodes: &[MeterNode]) -> Vec<MeterNode> {
        nodes.iter().filter(|n| self.matches(n)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_well_formed_row() {
        let raw = json!([{
            "id": "4300336",
            "label": "Zone_01_(FM) Bulk",
            "level": "L2",
            "zone": "  Zone_01_(FM) ",
            "type": "Zone Bulk",
            "parent": "Main Bulk (NAMA)",
            "account_number": 4300336,
            "readings": {"Jan-25": 1892, "2025-02": "1750.5"}
        }]);
        let nodes = normalize(&raw).unwrap();
        assert_eq!(nodes.len(), 1);
        let n = &nodes[0];
        assert_eq!(n.id, "4300336");
        assert_eq!(n.level, Level::L2);
        assert_eq!(n.zone(), Some("Zone_01_(FM)"));
        assert_eq!(n.meter_type, "Zone Bulk");
        assert_eq!(n.parent_ref.as_deref(), Some("Main Bulk (NAMA)"));
        assert_eq!(n.account_number, "4300336");
        assert_eq!(n.reading("Jan-25"), 1892.0);
        assert_eq!(n.reading("Feb-25"), 1750.5);
    }

    #[test]
    fn reads_wide_month_columns() {
        let raw = json!([{
            "label": "Villa 12",
            "level": "L3",
            "Jan-25": 30,
            "Feb-25": "x",
            "Notes": "n"
        }]);
        let nodes = normalize(&raw).unwrap();
        assert_eq!(nodes[0].reading("Jan-25"), 30.0);
        assert_eq!(nodes[0].reading("Feb-25"), 0.0);
        assert_eq!(nodes[0].readings.len(), 2);
    }

    #[test]
    fn comma_grouped_reading_is_zero() {
        let raw = json!([{"label": "V", "level": "L3", "Jan-25": "1,250", "Feb-25": "1250"}]);
        let nodes = normalize(&raw).unwrap();
        assert_eq!(nodes[0].reading("Jan-25"), 0.0);
        assert_eq!(nodes[0].reading("Feb-25"), 1250.0);
    }

    #[test]
    fn malformed_rows_get_defaults() {
        let raw = json!([42, {"zone": "Zone_05"}, {"label": "X", "level": "L9"}]);
        let nodes = normalize(&raw).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].id, "row-0");
        assert_eq!(nodes[0].level, Level::Unknown);
        assert_eq!(nodes[1].label, "row-1");
        assert!(nodes[1].readings.is_empty());
        assert_eq!(nodes[2].level, Level::Unknown);
        assert_eq!(nodes[2].id, "X");
    }

    #[test]
    fn blank_zone_and_parent_become_none() {
        let raw = json!([{"label": "A", "level": "l1", "zone": "   ", "parent": ""}]);
        let nodes = normalize(&raw).unwrap();
        assert_eq!(nodes[0].level, Level::L1);
        assert_eq!(nodes[0].zone, None);
        assert_eq!(nodes[0].parent_ref, None);
    }

    #[test]
    fn non_array_is_invalid_input() {
        let err = normalize(&json!({"rows": []})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn detects_building_bulk() {
        let mut node = MeterNode::placeholder("b", Level::L3);
        node.meter_type = "D_Building_Bulk".into();
        assert!(node.is_building_bulk());
        node.meter_type = "Residential (Villa)".into();
        assert!(!node.is_building_bulk());
        node.meter_type = "D_Building_Bulk".into();
        node.level = Level::L2;
        assert!(!node.is_building_bulk());
    }

    #[test]
    fn filter_by_zone_and_type() {
        let mut a = MeterNode::placeholder("a", Level::L3);
        a.zone = Some("Zone_05".into());
        a.meter_type = "Residential (Villa)".into();
        let mut b = a.clone();
        b.id = "b".into();
        b.meter_type = "IRR_Servies".into();

        let filter = NodeFilter {
            zone: Some("Zone_05".into()),
            meter_type: Some("residential (villa)".into()),
        };
        let kept = filter.apply(&[a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
        assert!(NodeFilter::default().is_empty());
    }
}
