// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types describing OVN northbound objects, plus decoding of the JSON table
//! output produced by `ovn-nbctl --format=json`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Default priority assigned to an ACL when the request omits one.
pub const DEFAULT_ACL_PRIORITY: i64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to deserialize table output")]
    Json(#[from] serde_json::Error),
    #[error("table output has no column {0:?}")]
    MissingColumn(String),
    #[error("column {column:?} has unexpected value {value}")]
    UnexpectedValue { column: String, value: serde_json::Value },
    #[error("row has {found} column(s) but table has {expected} heading(s)")]
    RowWidth { expected: usize, found: usize },
}

/// A decoded `ovn-nbctl --format=json` table: a list of headings and a list
/// of rows, where each cell is either a bare JSON scalar or one of the OVSDB
/// composite atoms (`["uuid", …]`, `["set", […]]`, `["map", […]]`).
#[derive(Debug, Deserialize)]
pub struct OvsdbTable {
    data: Vec<Vec<serde_json::Value>>,
    headings: Vec<String>,
}

impl OvsdbTable {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let table: OvsdbTable = serde_json::from_str(text)?;
        for row in &table.data {
            if row.len() != table.headings.len() {
                return Err(ParseError::RowWidth {
                    expected: table.headings.len(),
                    found: row.len(),
                });
            }
        }
        Ok(table)
    }

    pub fn rows(&self) -> impl Iterator<Item = OvsdbRow<'_>> {
        self.data
            .iter()
            .map(|columns| OvsdbRow { headings: &self.headings, columns })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One row of an [`OvsdbTable`], with access to cells by column heading.
pub struct OvsdbRow<'a> {
    headings: &'a [String],
    columns: &'a [serde_json::Value],
}

impl OvsdbRow<'_> {
    fn column(&self, name: &str) -> Result<&serde_json::Value, ParseError> {
        let idx = self
            .headings
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ParseError::MissingColumn(name.to_string()))?;
        Ok(&self.columns[idx])
    }

    /// Decode a string-valued cell.
    pub fn string(&self, name: &str) -> Result<String, ParseError> {
        match self.column(name)? {
            serde_json::Value::String(s) => Ok(s.clone()),
            other => Err(ParseError::UnexpectedValue {
                column: name.to_string(),
                value: other.clone(),
            }),
        }
    }

    /// Decode a map-valued cell (`["map", [[k, v], …]]`). Non-string scalar
    /// values are stringified, matching how `ovn-nbctl` round-trips them.
    pub fn map(&self, name: &str) -> Result<BTreeMap<String, String>, ParseError> {
        let value = self.column(name)?;
        let unexpected = || ParseError::UnexpectedValue {
            column: name.to_string(),
            value: value.clone(),
        };
        let serde_json::Value::Array(atom) = value else {
            return Err(unexpected());
        };
        match atom.as_slice() {
            [serde_json::Value::String(tag), serde_json::Value::Array(pairs)]
                if tag == "map" =>
            {
                let mut map = BTreeMap::new();
                for pair in pairs {
                    let serde_json::Value::Array(kv) = pair else {
                        return Err(unexpected());
                    };
                    let [serde_json::Value::String(k), v] = kv.as_slice()
                    else {
                        return Err(unexpected());
                    };
                    map.insert(k.clone(), scalar_to_string(v));
                }
                Ok(map)
            }
            _ => Err(unexpected()),
        }
    }

    /// Decode a cell holding a set of strings. OVSDB collapses single-element
    /// sets to the bare atom, so both `"x"` and `["set", ["x", "y"]]` are
    /// accepted.
    pub fn string_set(&self, name: &str) -> Result<Vec<String>, ParseError> {
        let value = self.column(name)?;
        let unexpected = || ParseError::UnexpectedValue {
            column: name.to_string(),
            value: value.clone(),
        };
        match value {
            serde_json::Value::String(s) => Ok(vec![s.clone()]),
            serde_json::Value::Array(atom) => match atom.as_slice() {
                [serde_json::Value::String(tag), serde_json::Value::Array(elems)]
                    if tag == "set" =>
                {
                    Ok(elems.iter().map(scalar_to_string).collect())
                }
                _ => Err(unexpected()),
            },
            _ => Err(unexpected()),
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A virtual L2 broadcast domain managed by the external controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LogicalSwitch {
    pub name: String,
    /// Free-form metadata stored on the switch record.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

impl LogicalSwitch {
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ParseError> {
        let table = OvsdbTable::parse(text)?;
        table.rows().map(|row| Self::from_row(&row)).collect()
    }

    fn from_row(row: &OvsdbRow<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            name: row.string("name")?,
            external_ids: row.map("external_ids")?,
        })
    }
}

/// A virtual L3 forwarding element connecting logical switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LogicalRouter {
    pub name: String,
}

impl LogicalRouter {
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ParseError> {
        let table = OvsdbTable::parse(text)?;
        table.rows().map(|row| Ok(Self { name: row.string("name")? })).collect()
    }
}

/// A port attached to a logical switch. Ports are owned by their switch and
/// read-only in this layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SwitchPort {
    pub name: String,
    /// Address records in `ovn-nbctl`'s `"<mac> <ip>"` form.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl SwitchPort {
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ParseError> {
        let table = OvsdbTable::parse(text)?;
        table
            .rows()
            .map(|row| {
                Ok(Self {
                    name: row.string("name")?,
                    addresses: row.string_set("addresses")?,
                })
            })
            .collect()
    }
}

/// A load balancer record: a set of VIP-to-backends mappings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LoadBalancer {
    pub name: String,
    /// VIP (possibly `addr:port`) mapped to its comma-separated backends.
    #[serde(default)]
    pub vips: BTreeMap<String, String>,
}

impl LoadBalancer {
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ParseError> {
        let table = OvsdbTable::parse(text)?;
        table
            .rows()
            .map(|row| {
                Ok(Self { name: row.string("name")?, vips: row.map("vips")? })
            })
            .collect()
    }
}

/// Direction an ACL applies to, as spelled by `ovn-nbctl acl-add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AclDirection {
    #[serde(rename = "to-lport")]
    ToLport,
    #[serde(rename = "from-lport")]
    FromLport,
}

impl Default for AclDirection {
    fn default() -> Self {
        AclDirection::ToLport
    }
}

impl fmt::Display for AclDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclDirection::ToLport => write!(f, "to-lport"),
            AclDirection::FromLport => write!(f, "from-lport"),
        }
    }
}

/// Verdict applied by an ACL when its match expression hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AclAction {
    Allow,
    AllowRelated,
    Drop,
    Reject,
}

impl Default for AclAction {
    fn default() -> Self {
        AclAction::Allow
    }
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclAction::Allow => write!(f, "allow"),
            AclAction::AllowRelated => write!(f, "allow-related"),
            AclAction::Drop => write!(f, "drop"),
            AclAction::Reject => write!(f, "reject"),
        }
    }
}

/// A match/action rule scoped to a logical switch. ACLs are not independently
/// addressable; they are always created relative to their parent switch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AclRule {
    #[serde(default)]
    pub direction: AclDirection,
    #[serde(default = "AclRule::default_priority")]
    pub priority: i64,
    /// Match expression in OVN's match language.
    #[serde(rename = "match")]
    pub match_expr: String,
    #[serde(default)]
    pub action: AclAction,
}

impl AclRule {
    fn default_priority() -> i64 {
        DEFAULT_ACL_PRIORITY
    }
}

/// One host participating in a VXLAN overlay. Transient input to overlay
/// provisioning; never persisted by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VxlanHost {
    pub name: String,
    pub ip: IpAddr,
    pub mac: String,
    pub vtep_ip: IpAddr,
}

impl VxlanHost {
    /// Deterministic name of the host's logical port on the overlay switch.
    pub fn port_name(&self) -> String {
        format!("lp_{}", self.name)
    }

    /// Deterministic name of the host's VXLAN tunnel endpoint.
    pub fn vtep_name(&self) -> String {
        format!("vtep_{}", self.name)
    }

    /// The port's address record, a single `"<mac> <ip>"` pair.
    pub fn address_pair(&self) -> String {
        format!("{} {}", self.mac, self.ip)
    }
}

/// Outcome of a successful overlay provisioning run, one entry per host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OverlayReport {
    /// Name of the shared overlay switch.
    pub switch: String,
    pub hosts: Vec<HostProvisioned>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct HostProvisioned {
    pub name: String,
    pub port: String,
    pub vtep: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_switch_table() {
        let text = r#"{
            "data": [
                [["uuid", "3b8e4a7e-0001-4000-8000-000000000001"],
                 ["map", [["owner", "admin"], ["tier", "dev"]]],
                 "sw0"],
                [["uuid", "3b8e4a7e-0001-4000-8000-000000000002"],
                 ["map", []],
                 "sw1"]
            ],
            "headings": ["_uuid", "external_ids", "name"]
        }"#;
        let switches = LogicalSwitch::parse_list(text).unwrap();
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[0].name, "sw0");
        assert_eq!(switches[0].external_ids["owner"], "admin");
        assert_eq!(switches[0].external_ids["tier"], "dev");
        assert_eq!(switches[1].name, "sw1");
        assert!(switches[1].external_ids.is_empty());
    }

    #[test]
    fn parse_empty_table() {
        let text = r#"{"data": [], "headings": ["_uuid", "external_ids", "name"]}"#;
        let switches = LogicalSwitch::parse_list(text).unwrap();
        assert!(switches.is_empty());
    }

    #[test]
    fn parse_port_addresses_collapsed_set() {
        // A single-element set is collapsed to the bare atom by OVSDB.
        let text = r#"{
            "data": [
                ["lp_host1", "00:00:00:00:00:01 10.0.0.1"],
                ["lp_host2", ["set", ["00:00:00:00:00:02 10.0.0.2", "unknown"]]]
            ],
            "headings": ["name", "addresses"]
        }"#;
        let ports = SwitchPort::parse_list(text).unwrap();
        assert_eq!(ports[0].addresses, vec!["00:00:00:00:00:01 10.0.0.1"]);
        assert_eq!(
            ports[1].addresses,
            vec!["00:00:00:00:00:02 10.0.0.2", "unknown"]
        );
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        let err = LogicalSwitch::parse_list("ovn-nbctl: not json").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let text = r#"{"data": [["sw0"]], "headings": ["name"]}"#;
        let err = LogicalSwitch::parse_list(text).unwrap_err();
        match err {
            ParseError::MissingColumn(col) => assert_eq!(col, "external_ids"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ragged_row_is_rejected() {
        let text = r#"{"data": [["sw0"]], "headings": ["name", "external_ids"]}"#;
        let err = OvsdbTable::parse(text).unwrap_err();
        assert!(matches!(err, ParseError::RowWidth { expected: 2, found: 1 }));
    }

    #[test]
    fn acl_rule_defaults() {
        let rule: AclRule =
            serde_json::from_str(r#"{"match": "ip4.src == 10.0.0.0/24"}"#)
                .unwrap();
        assert_eq!(rule.direction, AclDirection::ToLport);
        assert_eq!(rule.priority, DEFAULT_ACL_PRIORITY);
        assert_eq!(rule.action, AclAction::Allow);
        assert_eq!(rule.match_expr, "ip4.src == 10.0.0.0/24");
    }

    #[test]
    fn acl_enums_spell_like_the_cli() {
        assert_eq!(AclDirection::FromLport.to_string(), "from-lport");
        assert_eq!(AclAction::AllowRelated.to_string(), "allow-related");
        let action: AclAction = serde_json::from_str(r#""allow-related""#).unwrap();
        assert_eq!(action, AclAction::AllowRelated);
    }

    #[test]
    fn vxlan_host_derived_names() {
        let host: VxlanHost = serde_json::from_str(
            r#"{"name": "host1", "ip": "10.0.0.1",
                "mac": "00:00:00:00:00:01", "vtep_ip": "192.168.1.1"}"#,
        )
        .unwrap();
        assert_eq!(host.port_name(), "lp_host1");
        assert_eq!(host.vtep_name(), "vtep_host1");
        assert_eq!(host.address_pair(), "00:00:00:00:00:01 10.0.0.1");
    }
}
