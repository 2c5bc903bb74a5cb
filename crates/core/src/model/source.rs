use super::field::{FieldDesc, ReadOnly, DTG_DTISSUE, DTG_ERROR, DTG_FIXES};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Scm,
    Dts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectStatus {
    Unknown,
    Fail,
    Pass,
    Ready,
}

/// `-1` = unknown / plugin predates UTF-8 awareness, `0` = rejects UTF-8,
/// `1` = accepts UTF-8. Kept as a three-way enum rather than a raw `i8` so
/// call sites can't accidentally treat it as a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Utf8Capability {
    Unknown,
    No,
    Yes,
}

impl Utf8Capability {
    pub fn from_i8(v: i8) -> Self {
        match v {
            -1 => Utf8Capability::Unknown,
            0 => Utf8Capability::No,
            _ => Utf8Capability::Yes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub pattern: String,
}

/// Named subset of a source: a record passes iff its `field` value matches
/// one of the rules' patterns. All rules in a set share `field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSet {
    pub name: String,
    pub rules: Vec<FilterRule>,
    #[serde(default)]
    pub refcnt: u32,
}

impl FilterSet {
    pub fn field(&self) -> Option<&str> {
        self.rules.first().map(|r| r.field.as_str())
    }

    pub fn matches(&self, value: &str) -> bool {
        self.rules.iter().any(|r| r.pattern == value)
    }

    pub fn select_values(&self) -> Vec<String> {
        let mut vs: Vec<String> = self.rules.iter().map(|r| r.pattern.clone()).collect();
        vs.dedup();
        vs
    }
}

/// One remote endpoint, SCM or DTS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub nickname: String,
    pub plugin: String,
    pub server: String,
    pub user: String,
    /// Plaintext in memory; obfuscated only at rest (see `config::password`).
    pub password: String,
    pub module: String,
    pub moddate_field: String,
    pub moduser_field: String,
    #[serde(default)]
    pub filter_sets: Vec<FilterSet>,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    #[serde(default)]
    pub cached_fields: Vec<FieldDesc>,
    #[serde(default)]
    pub cached_modules: Vec<String>,
    #[serde(default)]
    pub status: ConnectStatus,
    pub warnings: Option<String>,
    pub error: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub accept_utf8: Utf8Capability,
    #[serde(default)]
    pub seg_ok: bool,
    #[serde(default)]
    pub refcnt: u32,
}

impl Default for ConnectStatus {
    fn default() -> Self {
        ConnectStatus::Unknown
    }
}

impl Default for Utf8Capability {
    fn default() -> Self {
        Utf8Capability::Unknown
    }
}

impl Source {
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.cached_fields.iter().find(|f| f.name == name)
    }

    /// §3 invariant: `kind=Scm` can only reach `Ready` if the three
    /// engine-reserved fields exist and are writable; otherwise status
    /// collapses to `Pass`.
    pub fn has_required_fields(&self) -> bool {
        if self.kind != SourceKind::Scm {
            return true;
        }
        [DTG_DTISSUE, DTG_FIXES, DTG_ERROR]
            .iter()
            .all(|name| matches!(self.field(name), Some(f) if f.readonly.is_writable()))
    }

    /// Recomputes `status` from cached capability probes. Called after a
    /// successful `connect` + `list_fields` round trip.
    pub fn recompute_status(&mut self) {
        if self.status == ConnectStatus::Unknown || self.status == ConnectStatus::Fail {
            return;
        }
        self.status = if self.has_required_fields() {
            ConnectStatus::Ready
        } else {
            ConnectStatus::Pass
        };
    }

    pub fn filter_set(&self, name: &str) -> Option<&FilterSet> {
        self.filter_sets.iter().find(|s| s.name == name)
    }
}
