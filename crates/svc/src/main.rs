//! Service supervisor CLI front (§6 "CLI surface of the service
//! supervisor"). Platform-specific service registration (the Windows
//! service wrapper itself) is out of scope here; this binary only manages
//! the `config/svc-<mapping>` marker a platform wrapper would consult to
//! decide which mappings to start `dtg-replicate` for.
//!
//! # Usage
//!
//! ```text
//! dtg-svc install <mapping-id> [<root-dir>]
//! dtg-svc remove <mapping-id> [<root-dir>]
//! dtg-svc remove-all [<root-dir>]
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dtg-svc", about = "Install or remove per-mapping service markers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mark a mapping for service startup. Refuses if the mapping doesn't
    /// exist, is already installed, or is currently running.
    Install {
        mapping_id: String,
        root_dir: Option<PathBuf>,
    },
    /// Clear a mapping's service marker.
    Remove {
        mapping_id: String,
        root_dir: Option<PathBuf>,
    },
    /// Clear every mapping's service marker.
    RemoveAll { root_dir: Option<PathBuf> },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = dispatch(args.command) {
        tracing::error!(error = %e, "dtg-svc failed");
        std::process::exit(1);
    }
}

fn resolve_root(root_dir: Option<PathBuf>) -> Result<PathBuf> {
    root_dir
        .or_else(|| std::env::var_os("DTG_ROOT").map(PathBuf::from))
        .ok_or_else(|| anyhow!("no root directory given and DTG_ROOT is not set"))
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Install { mapping_id, root_dir } => install(&resolve_root(root_dir)?, &mapping_id),
        Command::Remove { mapping_id, root_dir } => remove(&resolve_root(root_dir)?, &mapping_id),
        Command::RemoveAll { root_dir } => remove_all(&resolve_root(root_dir)?),
    }
}

fn mapping_file(root: &Path, mapping_id: &str) -> PathBuf {
    root.join("config").join(format!("map-{}.xml", mapping_id))
}

fn run_marker(root: &Path, mapping_id: &str) -> PathBuf {
    root.join("repl").join(format!("run-{}", mapping_id))
}

fn svc_marker(root: &Path, mapping_id: &str) -> PathBuf {
    root.join("config").join(format!("svc-{}", mapping_id))
}

/// Installs a service marker for `mapping_id` (§6): requires the mapping to
/// exist and refuses if it is already running or already installed.
fn install(root: &Path, mapping_id: &str) -> Result<()> {
    if !mapping_file(root, mapping_id).is_file() {
        return Err(anyhow!(
            "no mapping {} in {}",
            mapping_id,
            root.join("config").display()
        ));
    }
    if run_marker(root, mapping_id).exists() {
        return Err(anyhow!("mapping {} is currently running", mapping_id));
    }
    let marker = svc_marker(root, mapping_id);
    if marker.exists() {
        return Err(anyhow!("mapping {} is already installed", mapping_id));
    }
    std::fs::write(&marker, "").with_context(|| format!("creating {}", marker.display()))?;
    tracing::info!(mapping_id, "installed service marker");
    Ok(())
}

/// Clears `mapping_id`'s service marker, if any. Removing an uninstalled
/// mapping is a no-op rather than an error — the supervisor script may
/// call this unconditionally during teardown.
fn remove(root: &Path, mapping_id: &str) -> Result<()> {
    let marker = svc_marker(root, mapping_id);
    if marker.exists() {
        std::fs::remove_file(&marker).with_context(|| format!("removing {}", marker.display()))?;
        tracing::info!(mapping_id, "removed service marker");
    } else {
        tracing::info!(mapping_id, "no service marker to remove");
    }
    Ok(())
}

fn remove_all(root: &Path) -> Result<()> {
    let config_dir = root.join("config");
    let entries = std::fs::read_dir(&config_dir)
        .with_context(|| format!("reading {}", config_dir.display()))?;
    let mut removed = 0u32;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading {}", config_dir.display()))?;
        let path = entry.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("svc-"))
        {
            std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            removed += 1;
        }
    }
    tracing::info!(removed, "cleared service markers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(dir.path().join("repl")).unwrap();
        dir
    }

    #[test]
    fn install_requires_mapping_to_exist() {
        let dir = make_root();
        let err = install(dir.path(), "m1").unwrap_err();
        assert!(err.to_string().contains("no mapping"));
    }

    #[test]
    fn install_refuses_when_already_running() {
        let dir = make_root();
        std::fs::write(mapping_file(dir.path(), "m1"), "").unwrap();
        std::fs::write(run_marker(dir.path(), "m1"), "").unwrap();
        let err = install(dir.path(), "m1").unwrap_err();
        assert!(err.to_string().contains("running"));
    }

    #[test]
    fn install_refuses_when_already_installed() {
        let dir = make_root();
        std::fs::write(mapping_file(dir.path(), "m1"), "").unwrap();
        install(dir.path(), "m1").unwrap();
        let err = install(dir.path(), "m1").unwrap_err();
        assert!(err.to_string().contains("already installed"));
    }

    #[test]
    fn install_then_remove_clears_marker() {
        let dir = make_root();
        std::fs::write(mapping_file(dir.path(), "m1"), "").unwrap();
        install(dir.path(), "m1").unwrap();
        assert!(svc_marker(dir.path(), "m1").exists());
        remove(dir.path(), "m1").unwrap();
        assert!(!svc_marker(dir.path(), "m1").exists());
    }

    #[test]
    fn remove_all_clears_every_marker() {
        let dir = make_root();
        for id in ["m1", "m2"] {
            std::fs::write(mapping_file(dir.path(), id), "").unwrap();
            install(dir.path(), id).unwrap();
        }
        remove_all(dir.path()).unwrap();
        assert!(!svc_marker(dir.path(), "m1").exists());
        assert!(!svc_marker(dir.path(), "m2").exists());
    }
}
