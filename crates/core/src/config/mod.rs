//! The on-disk configuration store (§3, §4.2, §6): a directory of
//! `src-*.xml`, `map-*.xml` and `set-*.xml` files, loaded into the
//! in-memory model and written back under an advisory per-file lock.

pub mod lock;
pub mod password;
pub mod xml;
pub mod xmltree;

use crate::error::{ReplError, ReplResult};
use crate::model::mapping::DataMapping;
use crate::model::settings::Settings;
use crate::model::source::Source;
use crate::model::SourceRegistry;
use lock::FileLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Owns the config directory and the in-memory records loaded from it.
/// `dir` is the `config/` directory named in §6; `repl/` (run-state files)
/// is a sibling, not managed here.
pub struct ConfigStore {
    dir: PathBuf,
    pub sources: SourceRegistry,
    pub mappings: HashMap<String, DataMapping>,
    pub settings: HashMap<String, Settings>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ConfigStore {
            dir: dir.into(),
            sources: SourceRegistry::default(),
            mappings: HashMap::new(),
            settings: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scans the config directory for every `src-*.xml`, `map-*.xml` and
    /// `set-*.xml` file, loads them, and cross-references mappings to their
    /// sources. A mapping whose `scm_id`/`dts_id` does not resolve is kept
    /// in `mappings` but will fail the mapping validator later (§4.3), not
    /// here — `load` only reports I/O and parse failures.
    pub fn load(&mut self) -> ReplResult<()> {
        if !self.dir.is_dir() {
            return Err(ReplError::Config(format!(
                "config directory {} does not exist",
                self.dir.display()
            )));
        }

        for entry in std::fs::read_dir(&self.dir).map_err(|e| ReplError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })? {
            let entry = entry.map_err(|e| ReplError::Io {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with("src-") && name.ends_with(".xml") {
                let source = xml::load_source(&path)?;
                self.sources.insert(source);
            } else if let Some(stem) =
                name.strip_prefix("map-").and_then(|s| s.strip_suffix(".xml"))
            {
                let mapping = xml::load_mapping(&path)?;
                self.mappings.insert(stem.to_string(), mapping);
            } else if let Some(stem) =
                name.strip_prefix("set-").and_then(|s| s.strip_suffix(".xml"))
            {
                let settings = xml::load_settings(&path)?;
                self.settings.insert(stem.to_string(), settings);
            }
        }

        let mappings: Vec<DataMapping> = self.mappings.values().cloned().collect();
        self.sources.cross_reference(&mappings);
        Ok(())
    }

    /// Persists one source under its per-file lock, using the backup-first
    /// write protocol.
    pub fn save_source(&self, source: &Source) -> ReplResult<()> {
        let path = xml::source_path(&self.dir, &source.nickname);
        let _lock = FileLock::acquire(&path)?;
        xml::save_source(&path, source)
    }

    pub fn save_mapping(&self, mapping: &DataMapping) -> ReplResult<()> {
        let path = xml::mapping_path(&self.dir, &mapping.id);
        let _lock = FileLock::acquire(&path)?;
        xml::save_mapping(&path, mapping)
    }

    /// Only called with `settings.dirty` set; clears it on success so the
    /// caller doesn't re-acquire the lock on the next cycle for nothing.
    pub fn save_settings(&mut self, mapping_id: &str) -> ReplResult<()> {
        let path = xml::settings_path(&self.dir, mapping_id);
        let _lock = FileLock::acquire(&path)?;
        let settings = self
            .settings
            .get(mapping_id)
            .ok_or_else(|| ReplError::Config(format!("no settings loaded for {}", mapping_id)))?;
        xml::save_settings(&path, settings)?;
        if let Some(s) = self.settings.get_mut(mapping_id) {
            s.dirty = false;
        }
        Ok(())
    }

    pub fn mapping(&self, id: &str) -> Option<&DataMapping> {
        self.mappings.get(id)
    }

    pub fn settings_mut(&mut self, id: &str) -> Option<&mut Settings> {
        self.settings.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mapping::ConflictPolicy;
    use crate::model::settings::Settings;
    use crate::model::source::{ConnectStatus, SourceKind, Utf8Capability};
    use crate::model::timestamp::Timestamp;

    fn sample_source(nickname: &str, kind: SourceKind) -> Source {
        Source {
            kind,
            nickname: nickname.into(),
            plugin: "p4".into(),
            server: "perforce:1666".into(),
            user: "dtg".into(),
            password: "".into(),
            module: "".into(),
            moddate_field: "".into(),
            moduser_field: "".into(),
            filter_sets: Vec::new(),
            attrs: Vec::new(),
            cached_fields: Vec::new(),
            cached_modules: Vec::new(),
            status: ConnectStatus::Unknown,
            warnings: None,
            error: None,
            version: None,
            accept_utf8: Utf8Capability::Unknown,
            seg_ok: false,
            refcnt: 0,
        }
    }

    #[test]
    fn load_scans_directory_and_cross_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path());

        let scm = sample_source("p4-src", SourceKind::Scm);
        let dts = sample_source("jira-src", SourceKind::Dts);
        store.save_source(&scm).unwrap();
        store.save_source(&dts).unwrap();

        let mapping = DataMapping {
            id: "m1".into(),
            scm_id: "p4-src".into(),
            dts_id: "jira-src".into(),
            scm_filter: None,
            dts_filter: None,
            mirror_conflicts: ConflictPolicy::Newer,
            mirror_rules: Vec::new(),
            scm_to_dts_rules: Vec::new(),
            dts_to_scm_rules: Vec::new(),
            fix_rules: Vec::new(),
            attrs: Default::default(),
            recheck_on_new_scm: false,
            recheck_on_new_dts: false,
        };
        store.save_mapping(&mapping).unwrap();

        let settings = Settings::new("m1", Timestamp::EPOCH);
        store.settings.insert("m1".into(), settings);
        store.save_settings("m1").unwrap();

        let mut reloaded = ConfigStore::new(dir.path());
        reloaded.load().unwrap();
        assert!(reloaded.sources.get("p4-src").is_some());
        assert!(reloaded.sources.get("jira-src").is_some());
        assert_eq!(reloaded.sources.get("p4-src").unwrap().refcnt, 1);
        assert!(reloaded.mapping("m1").is_some());
        assert!(reloaded.settings.contains_key("m1"));
    }
}
