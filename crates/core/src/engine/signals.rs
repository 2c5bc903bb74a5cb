//! Stop/run/err signal files under the per-engine `repl/` directory (§4.8,
//! §6 "Stop protocol"). Plain marker files; presence/absence is the whole
//! protocol, so this module is a thin, testable wrapper over `std::fs`.

use crate::error::{ReplError, ReplResult};
use std::path::{Path, PathBuf};

pub struct Signals {
    run: PathBuf,
    stop: PathBuf,
    err: PathBuf,
}

impl Signals {
    pub fn new(repl_dir: &Path, mapping_id: &str) -> Self {
        Signals {
            run: repl_dir.join(format!("run-{}", mapping_id)),
            stop: repl_dir.join(format!("stop-{}", mapping_id)),
            err: repl_dir.join(format!("err-{}", mapping_id)),
        }
    }

    /// §7 "the presence of `err-<mapping>` inhibits restart": the engine
    /// must refuse to start while this file exists.
    pub fn err_present(&self) -> bool {
        self.err.exists()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.exists()
    }

    /// Touched on engine start (§4.8 step list preamble).
    pub fn mark_running(&self) -> ReplResult<()> {
        std::fs::write(&self.run, "").map_err(|e| ReplError::Io {
            path: self.run.display().to_string(),
            source: e,
        })
    }

    /// Removed on clean exit, regardless of why the loop stopped.
    pub fn clear_running(&self) {
        let _ = std::fs::remove_file(&self.run);
    }

    /// Created when a cycle ends with fatal per-record failures (§4.8 step
    /// 8, §7); `lines` is one failure summary per record.
    pub fn write_err(&self, lines: &[String]) -> ReplResult<()> {
        std::fs::write(&self.err, lines.join("\n")).map_err(|e| ReplError::Io {
            path: self.err.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_marker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::new(dir.path(), "m1");
        assert!(!signals.stop_requested());
        signals.mark_running().unwrap();
        assert!(dir.path().join("run-m1").exists());
        signals.clear_running();
        assert!(!dir.path().join("run-m1").exists());
    }

    #[test]
    fn err_present_blocks_start() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::new(dir.path(), "m1");
        assert!(!signals.err_present());
        signals.write_err(&["scm=123 dts=456: save failed".to_string()]).unwrap();
        assert!(signals.err_present());
    }
}
