//! The plugin-adapter contract (§4.1).
//!
//! The original interface is a table of C function pointers resolved from a
//! dynamically loaded module. This is modeled here as two capability sets:
//! `Adapter`, the required operation table, and a handful of optional
//! methods on the same trait with documented fallback defaults — the same
//! shape as an `LLMProviderFactory` whose `as_http()`/`supports_custom_models()`
//! hooks are probed once and default to "absent" (§9 design note: "Plugin
//! table as capability interface").
//!
//! Handles are opaque tokens rather than references: the adapter owns
//! whatever memory or connection state a handle denotes, exactly as the
//! original interface requires callers to copy values across the module
//! boundary before invoking the plugin's own `free` (§9 "Manual ownership
//! of remote-allocated memory").

use crate::model::{FieldDesc, Timestamp};
use std::fmt;

/// Opaque identifier for a live `connect()` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u64);

/// Opaque identifier for a `get_project()` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjHandle(pub u64);

/// Opaque identifier for a record obtained via `get_defect`/`new_defect`.
/// Must be released with [`Adapter::free`] on every exit path (§9 "Scoped
/// acquisition"); see [`crate::plugin::RecordGuard`] for the RAII wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle(pub u64);

/// `can_continue = false` tells the engine the connection is unusable and a
/// reconnect is required (§4.1 contract).
#[derive(Debug, Clone)]
pub struct AdapterError {
    pub message: String,
    pub can_continue: bool,
}

impl AdapterError {
    pub fn fatal(message: impl Into<String>) -> Self {
        AdapterError {
            message: message.into(),
            can_continue: false,
        }
    }

    pub fn recoverable(message: impl Into<String>) -> Self {
        AdapterError {
            message: message.into(),
            can_continue: true,
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AdapterError {}

pub type AResult<T> = Result<T, AdapterError>;

/// One fix applied against a change (SCM-only, §4.1, §4.5).
#[derive(Debug, Clone)]
pub struct FixDesc {
    pub change: String,
    pub user: String,
    pub stamp: Timestamp,
    pub desc: String,
    pub files: Vec<String>,
}

/// A plugin-declared configuration attribute (§4.1 `list_attrs`).
#[derive(Debug, Clone)]
pub struct AttrDecl {
    pub name: String,
    pub label: String,
    pub desc: String,
    pub default: String,
    pub required: bool,
}

/// The required operation table plus optional operations with documented
/// fallbacks. Implementations are loaded dynamically (native) or linked in
/// directly (for tests); either way the engine only ever sees `dyn Adapter`.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    fn module_version(&self) -> &str;

    /// Parses a plugin-native date string into a UTC instant. Timeless:
    /// requires no connection.
    fn extract_date(&self, s: &str) -> Option<Timestamp>;
    /// Renders a UTC instant back into this plugin's native date string.
    fn format_date(&self, d: Timestamp) -> String;

    fn connect(
        &self,
        server: &str,
        user: &str,
        password: &str,
        attrs: &[(String, String)],
    ) -> AResult<ConnHandle>;
    fn disconnect(&self, conn: ConnHandle);

    fn server_version(&self, conn: ConnHandle) -> AResult<String>;
    fn server_warnings(&self, conn: ConnHandle) -> AResult<Vec<String>>;
    fn server_date(&self, conn: ConnHandle) -> AResult<Timestamp>;

    fn list_projects(&self, conn: ConnHandle) -> AResult<Vec<String>>;
    fn get_project(&self, conn: ConnHandle, name: &str) -> AResult<ProjHandle>;

    fn list_fields(&self, proj: ProjHandle) -> AResult<Vec<FieldDesc>>;

    /// `max_rows < 1` means unlimited. Plugins that cannot filter
    /// server-side may return a superset; the engine re-filters by stamp.
    #[allow(clippy::too_many_arguments)]
    fn list_changed_defects(
        &self,
        proj: ProjHandle,
        max_rows: i64,
        since: Timestamp,
        mod_date_field: &str,
        mod_by_field: &str,
        exclude_user: Option<&str>,
    ) -> AResult<Vec<String>>;

    fn get_defect(&self, proj: ProjHandle, id: &str) -> AResult<RecordHandle>;
    fn new_defect(&self, proj: ProjHandle) -> AResult<RecordHandle>;
    fn get_field(&self, rec: RecordHandle, name: &str) -> Option<String>;
    fn set_field(&self, rec: RecordHandle, name: &str, value: &str);
    fn save(&self, proj: ProjHandle, rec: RecordHandle) -> AResult<String>;
    fn free(&self, rec: RecordHandle);

    /// `-1` (the default) means the plugin predates UTF-8 awareness.
    fn accept_utf8(&self, _conn: ConnHandle) -> i8 {
        -1
    }

    /// `Some(seconds)` tells the caller how long to sleep before retrying;
    /// `None` means "use the mapping's General Wait Duration" (§4.1).
    fn server_offline(&self, _conn: ConnHandle) -> Option<i64> {
        None
    }

    /// A plugin-injected log message; `level` is 0-3. The default never
    /// has anything to report.
    fn pending_message(&self, _conn: ConnHandle) -> Option<(u8, String)> {
        None
    }

    fn list_attrs(&self) -> Vec<AttrDecl> {
        Vec::new()
    }

    fn validate_attr(&self, _name: &str, _value: &str) -> Result<(), String> {
        Ok(())
    }

    /// Performance hint: every field name the engine will touch this cycle.
    fn set_referenced_fields(&self, _proj: ProjHandle, _names: &[String]) {}

    /// Advertises the segment predicate so the plugin can restrict
    /// server-side queries (§4.3).
    fn set_segment_filters(&self, _proj: ProjHandle, _filters: &[FieldDesc]) {}

    /// Probed once at load time; `Some` only for the SCM-side Perforce-class
    /// plugin that implements `find_defects`/`list_fixes`/`describe_fix`.
    fn as_scm_query(&self) -> Option<&dyn ScmQuery> {
        None
    }
}

/// The SCM-only operation triad (§4.1). A plugin is recognized as the
/// Perforce-class SCM plugin by implementing all three simultaneously.
pub trait ScmQuery: Adapter {
    fn find_defects(&self, proj: ProjHandle, max_rows: i64, query: &str) -> AResult<Vec<String>>;
    fn list_fixes(&self, proj: ProjHandle, id: &str) -> AResult<Vec<String>>;
    fn describe_fix(&self, proj: ProjHandle, fix: &str) -> AResult<FixDesc>;
}
