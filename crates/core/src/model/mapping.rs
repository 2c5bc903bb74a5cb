use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyType {
    Text,
    Word,
    Line,
    Date,
    Map,
    /// A select-field pairing whose value table is incomplete. The engine
    /// refuses to start a mapping that still carries one of these (§3, §4.3).
    Unmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Scm,
    Dts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyMap {
    pub value1: String,
    pub value2: String,
}

/// `(scm_field, dts_field, copy_type, ...)`. Only meaningful for
/// `copy_type=Map`; `mirror_conflict` overrides the mapping's own policy for
/// this single rule, `maps` carries the `(value1, value2)` pairs in
/// declaration order (direction-dependent, see §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRule {
    pub scm_field: String,
    pub dts_field: String,
    pub copy_type: CopyType,
    #[serde(default)]
    pub truncate: bool,
    pub mirror_conflict: Option<Side>,
    #[serde(default)]
    pub maps: Vec<CopyMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixAction {
    Append,
    Replace,
}

/// Controls how SCM change metadata is projected into a DTS text field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRule {
    pub dts_field: String,
    pub action: FixAction,
    pub include_files: bool,
    pub include_change: bool,
    pub include_description: bool,
    pub include_fixed_by: bool,
    pub include_fixed_date: bool,
}

/// Mapping-wide fallback for unresolved mirror conflicts (§3). `Newer`
/// compares server-reported mod dates; ties fall back to `Dts` silently
/// (open question (b), §9 — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    Scm,
    Dts,
    Newer,
    Error,
}

/// Per-mapping replication-loop tuning (§4.8). Defaults and ranges are
/// exactly the spec's table; `validate()` is called by the mapping
/// validator, not at deserialization time, so a config file that is merely
/// out of range is diagnosed as a validation error rather than a parse
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingAttrs {
    #[serde(default = "default_log_level")]
    pub log_level: u8,
    #[serde(default = "default_polling_period")]
    pub polling_period: u32,
    #[serde(default = "default_connection_reset")]
    pub connection_reset: u32,
    #[serde(default = "default_wait_duration")]
    pub wait_duration: i32,
    #[serde(default)]
    pub cycle_threshold: u32,
    #[serde(default)]
    pub update_period: u32,
    #[serde(default)]
    pub enable_write_to_readonly: bool,
}

fn default_log_level() -> u8 {
    2
}
fn default_polling_period() -> u32 {
    5
}
fn default_connection_reset() -> u32 {
    1000
}
fn default_wait_duration() -> i32 {
    150
}

impl Default for MappingAttrs {
    fn default() -> Self {
        MappingAttrs {
            log_level: default_log_level(),
            polling_period: default_polling_period(),
            connection_reset: default_connection_reset(),
            wait_duration: default_wait_duration(),
            cycle_threshold: 0,
            update_period: 0,
            enable_write_to_readonly: false,
        }
    }
}

impl MappingAttrs {
    /// Returns human-readable violations; an empty vec means all attributes
    /// are within their documented ranges.
    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.log_level > 3 {
            errs.push(format!("log_level {} out of range 0-3", self.log_level));
        }
        if !(1..=100).contains(&self.polling_period) {
            errs.push(format!(
                "polling_period {} out of range 1-100",
                self.polling_period
            ));
        }
        if !(1..=1_000_000).contains(&self.connection_reset) {
            errs.push(format!(
                "connection_reset {} out of range 1-1000000",
                self.connection_reset
            ));
        }
        if self.wait_duration != -1 && self.wait_duration < 1 {
            errs.push(format!(
                "wait_duration {} must be -1 or >= 1",
                self.wait_duration
            ));
        }
        errs
    }
}

/// Couples one SCM `Source` and one DTS `Source`, each optionally restricted
/// to a named `FilterSet`, plus the rule set that relates their fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMapping {
    pub id: String,
    pub scm_id: String,
    pub dts_id: String,
    pub scm_filter: Option<String>,
    pub dts_filter: Option<String>,
    pub mirror_conflicts: ConflictPolicy,
    #[serde(default)]
    pub mirror_rules: Vec<CopyRule>,
    #[serde(default)]
    pub scm_to_dts_rules: Vec<CopyRule>,
    #[serde(default)]
    pub dts_to_scm_rules: Vec<CopyRule>,
    #[serde(default)]
    pub fix_rules: Vec<FixRule>,
    #[serde(default)]
    pub attrs: MappingAttrs,
    #[serde(default)]
    pub recheck_on_new_scm: bool,
    #[serde(default)]
    pub recheck_on_new_dts: bool,
}

impl DataMapping {
    pub fn all_copy_rules(&self) -> impl Iterator<Item = &CopyRule> {
        self.mirror_rules
            .iter()
            .chain(self.scm_to_dts_rules.iter())
            .chain(self.dts_to_scm_rules.iter())
    }

    pub fn has_unmap_rule(&self) -> bool {
        self.all_copy_rules()
            .any(|r| r.copy_type == CopyType::Unmap)
    }
}
