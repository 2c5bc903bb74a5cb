//! Sources, mappings, rules, filters and settings — the in-memory form of
//! the engine's configuration (§3). XML (de)serialization lives in
//! [`crate::config`]; this module is the data contract only.

pub mod field;
pub mod mapping;
pub mod settings;
pub mod source;
pub mod timestamp;

pub use field::{FieldDesc, FieldType, ReadOnly};
pub use mapping::{ConflictPolicy, CopyMap, CopyRule, CopyType, DataMapping, FixAction, FixRule, MappingAttrs, Side};
pub use settings::Settings;
pub use source::{ConnectStatus, FilterRule, FilterSet, Source, SourceKind, Utf8Capability};
pub use timestamp::Timestamp;

use std::collections::HashMap;

/// Owns the `Source` registry (keyed by nickname) that `DataMapping`s
/// borrow from. Breaks the quasi-cyclic mapping/source reference (§9
/// design note: "Quasi-cyclic references") by making the registry the sole
/// owner and mappings hold only nickname keys.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source) {
        self.sources.insert(source.nickname.clone(), source);
    }

    pub fn get(&self, nickname: &str) -> Option<&Source> {
        self.sources.get(nickname)
    }

    pub fn get_mut(&mut self, nickname: &str) -> Option<&mut Source> {
        self.sources.get_mut(nickname)
    }

    pub fn remove(&mut self, nickname: &str) -> Option<Source> {
        self.sources.remove(nickname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Cross-references every mapping's `scm_id`/`dts_id` to a source in
    /// this registry, bumping `refcnt` on each (§3 "Ownership", §9
    /// "Quasi-cyclic references"). Returns the nicknames that a mapping
    /// referenced but that are missing from the registry.
    pub fn cross_reference(&mut self, mappings: &[DataMapping]) -> Vec<String> {
        let mut missing = Vec::new();
        for m in mappings {
            for id in [&m.scm_id, &m.dts_id] {
                if let Some(src) = self.sources.get_mut(id) {
                    src.refcnt += 1;
                } else {
                    missing.push(id.clone());
                }
            }
        }
        missing
    }
}
