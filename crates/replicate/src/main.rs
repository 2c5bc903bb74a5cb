//! Replication engine process: runs exactly one mapping's replication loop
//! (§4.8) until a stop signal appears or the loop gives up offline.
//!
//! # Usage
//!
//! ```text
//! dtg-replicate <mapping-id> [<root-dir>]
//! ```
//!
//! `<root-dir>` falls back to the `DTG_ROOT` environment variable. The root
//! holds `plugins/`, `config/` and `repl/` (§6).
//!
//! # Lifecycle
//!
//! 1. Parse CLI arguments
//! 2. Refuse to start if `repl/err-<mapping>` is present
//! 3. Load `config/` and the requested mapping
//! 4. Load plugin modules, connect both sides once to cache field lists
//! 5. Run the mapping validator; exit before touching `repl/` on failure
//! 6. Open the per-mapping log and drive the replication loop until stopped

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dtg_core::config::ConfigStore;
use dtg_core::engine::{run, validate, Connections, LoopDeps, Signals, StopReason};
use dtg_core::logger::{EngineLog, FileLogger, LogLevel};
use dtg_core::model::{ConnectStatus, DataMapping, Settings, Source, Timestamp, Utf8Capability};
use dtg_core::plugin::{Adapter, PluginRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// CLI arguments for the replication engine process.
#[derive(Parser, Debug)]
#[command(name = "dtg-replicate", about = "Runs one mapping's replication loop until stopped")]
struct Args {
    /// Mapping to replicate, e.g. `m1` for `config/map-m1.xml`.
    mapping_id: String,

    /// Root directory holding `plugins/`, `config/` and `repl/`. Falls back
    /// to the `DTG_ROOT` environment variable when omitted.
    root_dir: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mapping_id = args.mapping_id.clone();
    if let Err(e) = run_engine(args) {
        tracing::error!(mapping_id = %mapping_id, error = %e, "dtg-replicate exiting");
        std::process::exit(1);
    }
}

fn run_engine(args: Args) -> Result<()> {
    let root = args
        .root_dir
        .or_else(|| std::env::var_os("DTG_ROOT").map(PathBuf::from))
        .ok_or_else(|| anyhow!("no root directory given and DTG_ROOT is not set"))?;

    tracing::info!(mapping_id = %args.mapping_id, root = %root.display(), "starting replication engine");

    // 2. Refuse to start while a previous cycle left err-<mapping> behind.
    let repl_dir = root.join("repl");
    std::fs::create_dir_all(&repl_dir)
        .with_context(|| format!("creating {}", repl_dir.display()))?;
    let signals = Signals::new(&repl_dir, &args.mapping_id);
    if signals.err_present() {
        return Err(anyhow!(
            "repl/err-{} is present; clear it before restarting",
            args.mapping_id
        ));
    }

    // 3. Load configuration and look up the requested mapping.
    let mut store = ConfigStore::new(root.join("config"));
    store.load().map_err(|e| anyhow!(e))?;
    let mapping: DataMapping = store
        .mapping(&args.mapping_id)
        .cloned()
        .ok_or_else(|| anyhow!("no mapping {} in {}", args.mapping_id, store.dir().display()))?;

    // 4. Load plugin modules, connect both sides once to cache field lists.
    let registry = PluginRegistry::scan(&root.join("plugins")).map_err(|e| anyhow!(e))?;
    let scm_plugin = plugin_name_for(&store, &mapping.scm_id)?;
    let dts_plugin = plugin_name_for(&store, &mapping.dts_id)?;
    let scm: &dyn Adapter = registry
        .find(&scm_plugin)
        .ok_or_else(|| anyhow!("plugin {} is not loaded", scm_plugin))?;
    let dts: &dyn Adapter = registry
        .find(&dts_plugin)
        .ok_or_else(|| anyhow!("plugin {} is not loaded", dts_plugin))?;

    probe(scm, &mut store, &mapping.scm_id)?;
    probe(dts, &mut store, &mapping.dts_id)?;

    // 5. Validate before touching repl/ at all (a failed validator must not
    // leave run-<mapping> or log-<mapping> behind).
    {
        let scm_src = store.sources.get(&mapping.scm_id).expect("probed above");
        let dts_src = store.sources.get(&mapping.dts_id).expect("probed above");
        let outcome = validate(&mapping, scm_src, dts_src);
        for w in &outcome.warnings {
            tracing::warn!(mapping_id = %mapping.id, "{}", w);
        }
        if !outcome.is_valid() {
            return Err(anyhow!(
                "mapping {} failed validation: {}",
                mapping.id,
                outcome.errors.join("; ")
            ));
        }
    }

    let scm_src: Source = store.sources.get(&mapping.scm_id).cloned().expect("probed above");
    let dts_src: Source = store.sources.get(&mapping.dts_id).cloned().expect("probed above");
    let dts_user = dts_src.user.clone();

    let connect_fn = move || -> Result<Connections, String> {
        let scm_conn = scm
            .connect(&scm_src.server, &scm_src.user, &scm_src.password, &scm_src.attrs)
            .map_err(|e| e.message)?;
        let scm_proj = scm.get_project(scm_conn, &scm_src.module).map_err(|e| e.message)?;
        let scm_fields = scm.list_fields(scm_proj).map_err(|e| e.message)?;

        let dts_conn = dts
            .connect(&dts_src.server, &dts_src.user, &dts_src.password, &dts_src.attrs)
            .map_err(|e| e.message)?;
        let dts_proj = dts.get_project(dts_conn, &dts_src.module).map_err(|e| e.message)?;
        let dts_fields = dts.list_fields(dts_proj).map_err(|e| e.message)?;

        Ok(Connections {
            scm_conn,
            scm_proj,
            scm_fields,
            dts_conn,
            dts_proj,
            dts_fields,
        })
    };

    // 6. Open the per-mapping log and drive the loop.
    let log_path = repl_dir.join(format!("log-{}", mapping.id));
    let logger: Arc<dyn EngineLog> = Arc::new(
        FileLogger::open(&log_path, LogLevel::from_attr(mapping.attrs.log_level))
            .with_context(|| format!("opening {}", log_path.display()))?,
    );

    let mut settings = store.settings_mut(&mapping.id).cloned().unwrap_or_else(|| {
        tracing::warn!(mapping_id = %mapping.id, "no settings file found; starting a full resync from the epoch");
        Settings::new(&mapping.id, Timestamp::EPOCH)
    });

    let mapping_id_for_persist = mapping.id.clone();
    let persist = move |s: &Settings| -> Result<(), String> {
        store.settings.insert(mapping_id_for_persist.clone(), s.clone());
        store
            .save_settings(&mapping_id_for_persist)
            .map_err(|e| e.to_string())
    };

    let deps = LoopDeps {
        mapping: &mapping,
        scm,
        dts,
        dts_user: &dts_user,
        log: logger.as_ref(),
        signals: &signals,
        connect: &connect_fn,
    };

    match run(&deps, &mut settings, persist) {
        StopReason::Stopped | StopReason::ExitedOffline => {
            tracing::info!(mapping_id = %mapping.id, "replication engine stopped cleanly");
            Ok(())
        }
        StopReason::Fatal(msg) => Err(anyhow!(msg)),
    }
}

fn plugin_name_for(store: &ConfigStore, nickname: &str) -> Result<String> {
    store
        .sources
        .get(nickname)
        .map(|s| s.plugin.clone())
        .ok_or_else(|| anyhow!("source {} is not defined in config/", nickname))
}

/// Connects once, lists fields, and caches the capability probe on the
/// source (§4.3's validator reads `cached_fields`/`accept_utf8`/`status`
/// rather than reaching out to the network itself).
fn probe(adapter: &dyn Adapter, store: &mut ConfigStore, nickname: &str) -> Result<()> {
    let src = store
        .sources
        .get(nickname)
        .cloned()
        .ok_or_else(|| anyhow!("source {} is not defined in config/", nickname))?;

    let conn = adapter
        .connect(&src.server, &src.user, &src.password, &src.attrs)
        .map_err(|e| anyhow!("connecting to {}: {}", nickname, e.message))?;
    let proj = adapter
        .get_project(conn, &src.module)
        .map_err(|e| anyhow!("opening project for {}: {}", nickname, e.message));
    let result = proj.and_then(|proj| {
        adapter
            .list_fields(proj)
            .map_err(|e| anyhow!("listing fields for {}: {}", nickname, e.message))
    });
    let utf8 = Utf8Capability::from_i8(adapter.accept_utf8(conn));
    adapter.disconnect(conn);
    let fields = result?;

    let src_mut = store.sources.get_mut(nickname).expect("checked above");
    src_mut.cached_fields = fields;
    src_mut.accept_utf8 = utf8;
    src_mut.status = ConnectStatus::Pass;
    src_mut.recompute_status();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        dir
    }

    #[test]
    fn refuses_to_start_when_err_marker_present() {
        let dir = make_root();
        std::fs::create_dir_all(dir.path().join("repl")).unwrap();
        std::fs::write(dir.path().join("repl").join("err-m1"), "boom").unwrap();

        let args = Args {
            mapping_id: "m1".into(),
            root_dir: Some(dir.path().to_path_buf()),
        };
        let err = run_engine(args).unwrap_err();
        assert!(err.to_string().contains("err-m1"));
    }

    #[test]
    fn refuses_to_start_when_mapping_is_missing() {
        let dir = make_root();
        let args = Args {
            mapping_id: "m1".into(),
            root_dir: Some(dir.path().to_path_buf()),
        };
        let err = run_engine(args).unwrap_err();
        assert!(err.to_string().contains("no mapping m1"));
    }
}
