//! Enumerates a plugin directory, loads every module that exports the
//! adapter constructor, and keeps the Perforce-class SCM plugin at the head
//! of the list (§4.1, §6 "Plugin directory protocol").

use super::adapter::Adapter;
use super::native::{load_module, LoadedAdapter};
use crate::error::ReplError;
use std::path::Path;

pub struct PluginRegistry {
    loaded: Vec<LoadedAdapter>,
}

impl PluginRegistry {
    /// Scans `dir` non-recursively in directory order, loading each
    /// candidate module. A module missing the adapter symbol is logged and
    /// skipped rather than aborting the scan.
    pub fn scan(dir: &Path) -> Result<Self, ReplError> {
        let mut loaded = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| ReplError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            match load_module(&path) {
                Ok(Some(adapter)) => {
                    tracing::info!(module = %path.display(), name = %adapter.name(), "loaded adapter");
                    loaded.push(adapter);
                }
                Ok(None) => {
                    tracing::debug!(module = %path.display(), "skipping: no adapter constructor symbol");
                }
                Err(e) => {
                    tracing::warn!(module = %path.display(), error = %e, "failed to load adapter module");
                }
            }
        }

        let mut registry = PluginRegistry { loaded };
        registry.promote_perforce_class();
        Ok(registry)
    }

    /// The Perforce-class SCM plugin (the one implementing `ScmQuery`) is
    /// moved to the head of the list (§4.1, §6).
    fn promote_perforce_class(&mut self) {
        if let Some(idx) = self
            .loaded
            .iter()
            .position(|a| a.adapter.as_scm_query().is_some())
        {
            let head = self.loaded.remove(idx);
            self.loaded.insert(0, head);
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn Adapter> {
        self.loaded
            .iter()
            .find(|a| a.adapter.name() == name)
            .map(|a| a.adapter.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Adapter> {
        self.loaded.iter().map(|a| a.adapter.as_ref())
    }
}
