use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Per-mapping watermark record. Owned by the engine: read at startup,
/// advanced after each successful cycle, rewritten externally only under
/// the settings file lock (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: String,
    pub starting_date: Timestamp,
    pub last_update_scm: Timestamp,
    pub last_update_dts: Timestamp,
    #[serde(default)]
    pub force: bool,
    #[serde(skip)]
    pub dirty: bool,
}

impl Settings {
    pub fn new(id: impl Into<String>, starting_date: Timestamp) -> Self {
        Settings {
            id: id.into(),
            starting_date,
            last_update_scm: starting_date,
            last_update_dts: starting_date,
            force: true,
            dirty: true,
        }
    }

    /// Applies a successful cycle's captured server clocks and clears the
    /// force flag (§4.8 step 9). Watermarks only ever move forward: this
    /// asserts that in debug builds to keep the idempotence invariant
    /// (§8.1) honest.
    pub fn advance(&mut self, scm_clock: Timestamp, dts_clock: Timestamp) {
        debug_assert!(scm_clock >= self.last_update_scm || self.force);
        debug_assert!(dts_clock >= self.last_update_dts || self.force);
        self.last_update_scm = scm_clock;
        self.last_update_dts = dts_clock;
        self.force = false;
        self.dirty = true;
    }

    /// When `force` is set, the next cycle treats both watermarks as the
    /// mapping's `starting_date` (§3, §4.8 step 3).
    pub fn effective_scm_watermark(&self) -> Timestamp {
        if self.force {
            self.starting_date
        } else {
            self.last_update_scm
        }
    }

    pub fn effective_dts_watermark(&self) -> Timestamp {
        if self.force {
            self.starting_date
        } else {
            self.last_update_dts
        }
    }
}
