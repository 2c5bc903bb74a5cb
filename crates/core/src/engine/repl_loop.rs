//! The Replication Loop (§4.8): drives cycles until a stop signal is
//! observed or an unrecoverable offline condition forces exit.

use super::pipeline::{dts_originated, scm_originated, PipelineCtx, PipelineOutcome};
use super::signals::Signals;
use crate::logger::EngineLog;
use crate::model::field::FieldDesc;
use crate::model::mapping::DataMapping;
use crate::model::settings::Settings;
use crate::plugin::{Adapter, ConnHandle, ProjHandle};
use std::thread::sleep;
use std::time::Duration;

/// Why the loop stopped. `Stopped` and `ExitedOffline` are clean exits (the
/// supervisor may restart); `Fatal` means the caller should surface an
/// error to the operator.
pub enum StopReason {
    Stopped,
    ExitedOffline,
    Fatal(String),
}

pub struct Connections {
    pub scm_conn: ConnHandle,
    pub scm_proj: ProjHandle,
    pub scm_fields: Vec<FieldDesc>,
    pub dts_conn: ConnHandle,
    pub dts_proj: ProjHandle,
    pub dts_fields: Vec<FieldDesc>,
}

/// Callback the loop uses to (re-)establish both plugin connections; kept
/// as a closure rather than a method so tests can substitute an in-memory
/// pair without a real `connect()` round trip.
pub type Connector<'a> = dyn Fn() -> Result<Connections, String> + 'a;

pub struct LoopDeps<'a> {
    pub mapping: &'a DataMapping,
    pub scm: &'a dyn Adapter,
    pub dts: &'a dyn Adapter,
    pub dts_user: &'a str,
    pub log: &'a dyn EngineLog,
    pub signals: &'a Signals,
    pub connect: &'a Connector<'a>,
}

/// Runs one cycle (§4.8 steps 1-9). Exposed so scenario tests can drive a
/// single cycle deterministically without the sleep/reconnect machinery in
/// [`run`].
pub fn run_cycle(
    deps: &LoopDeps,
    conns: &Connections,
    settings: &mut Settings,
) -> Result<bool, StopReason> {
    if deps.signals.stop_requested() {
        return Err(StopReason::Stopped);
    }

    let scm_clock = deps
        .scm
        .server_date(conns.scm_conn)
        .map_err(|e| StopReason::Fatal(e.message))?;
    let dts_clock = deps
        .dts
        .server_date(conns.dts_conn)
        .map_err(|e| StopReason::Fatal(e.message))?;

    let dts_watermark = settings.effective_dts_watermark();
    let scm_watermark = settings.effective_scm_watermark();

    let ctx = PipelineCtx {
        mapping: deps.mapping,
        scm: deps.scm,
        scm_proj: conns.scm_proj,
        scm_fields: &conns.scm_fields,
        dts: deps.dts,
        dts_proj: conns.dts_proj,
        dts_fields: &conns.dts_fields,
        last_update_scm: scm_watermark,
        last_update_dts: dts_watermark,
        dts_user: deps.dts_user,
        force: settings.force,
        last_chance: false,
        log: deps.log,
    };

    let mut retry_queue: Vec<String> = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    let dts_ids = deps
        .dts
        .list_changed_defects(conns.dts_proj, -1, dts_watermark, "", "", Some(deps.dts_user))
        .map_err(|e| StopReason::Fatal(e.message))?;
    for id in dts_ids {
        if deps.signals.stop_requested() {
            return Err(StopReason::Stopped);
        }
        match dts_originated(&ctx, &id) {
            PipelineOutcome::Ok => {}
            PipelineOutcome::Retry { scm_id } => retry_queue.push(scm_id),
            PipelineOutcome::Failed { scm_id, reason } => {
                failures.push(format_failure(scm_id.as_deref(), Some(&id), &reason))
            }
        }
    }

    let scm_ids = deps
        .scm
        .list_changed_defects(conns.scm_proj, -1, scm_watermark, "", "", None)
        .map_err(|e| StopReason::Fatal(e.message))?;
    for id in &scm_ids {
        if deps.signals.stop_requested() {
            return Err(StopReason::Stopped);
        }
        match scm_originated(&ctx, id) {
            PipelineOutcome::Ok => {}
            PipelineOutcome::Retry { scm_id } => retry_queue.push(scm_id),
            PipelineOutcome::Failed { scm_id, reason } => {
                failures.push(format_failure(scm_id.as_deref(), None, &reason))
            }
        }
    }

    let retry_ctx = PipelineCtx { last_chance: true, ..ctx };
    for scm_id in retry_queue {
        match scm_originated(&retry_ctx, &scm_id) {
            PipelineOutcome::Ok => {}
            PipelineOutcome::Retry { .. } | PipelineOutcome::Failed { .. } => {
                if let Err(e) = deps.scm.get_defect(conns.scm_proj, &scm_id).map(|rec| {
                    deps.scm.set_field(rec, crate::model::field::DTG_ERROR, "replication failed");
                    deps.scm.free(rec);
                }) {
                    deps.log.warn(&format!("could not set DTG_ERROR on {}: {}", scm_id, e.message));
                }
                failures.push(format_failure(Some(&scm_id), None, "retry pass exhausted"));
            }
        }
    }

    if !failures.is_empty() {
        deps.signals
            .write_err(&failures)
            .map_err(|e| StopReason::Fatal(e.to_string()))?;
        return Ok(false);
    }

    settings.advance(scm_clock, dts_clock);
    Ok(true)
}

fn format_failure(scm_id: Option<&str>, dts_id: Option<&str>, reason: &str) -> String {
    format!(
        "scm={} dts={}: {}",
        scm_id.unwrap_or("-"),
        dts_id.unwrap_or("-"),
        reason
    )
}

/// Sleeps `secs`, waking early if the stop signal appears (§5
/// "Cancellation": honored during sleep, not just between records).
fn interruptible_sleep(signals: &Signals, secs: u64) {
    let step = Duration::from_millis(200);
    let mut remaining = Duration::from_secs(secs);
    while remaining > Duration::ZERO {
        if signals.stop_requested() {
            return;
        }
        let this_step = step.min(remaining);
        sleep(this_step);
        remaining -= this_step;
    }
}

/// Drives cycles until told to stop. `settings` is advanced and its
/// `dirty` flag set in place; the caller persists it (and clears `dirty`)
/// after each cycle that returns `Ok`, under the settings file lock.
pub fn run<F: FnMut(&Settings) -> Result<(), String>>(
    deps: &LoopDeps,
    settings: &mut Settings,
    mut persist: F,
) -> StopReason {
    deps.signals.mark_running().ok();

    let mut conns = match (deps.connect)() {
        Ok(c) => c,
        Err(e) => {
            deps.signals.clear_running();
            return StopReason::Fatal(e);
        }
    };

    let mut cycles_since_reconnect: u32 = 0;
    let reason = loop {
        match run_cycle(deps, &conns, settings) {
            Ok(advanced) => {
                if advanced {
                    if let Err(e) = persist(settings) {
                        deps.log.warn(&format!("failed to persist settings: {}", e));
                    }
                }
                cycles_since_reconnect += 1;
                let force_reconnect = settings.force
                    || cycles_since_reconnect >= deps.mapping.attrs.connection_reset;
                if force_reconnect {
                    match (deps.connect)() {
                        Ok(fresh) => {
                            conns = fresh;
                            cycles_since_reconnect = 0;
                        }
                        Err(e) => {
                            deps.log.warn(&format!("reconnect failed: {}", e));
                        }
                    }
                }
            }
            Err(reason @ StopReason::Stopped) => break reason,
            Err(StopReason::Fatal(msg)) => {
                deps.log.err(&format!("offline/fatal: {}", msg));
                let wait = deps.mapping.attrs.wait_duration;
                if wait < 0 {
                    break StopReason::ExitedOffline;
                }
                interruptible_sleep(deps.signals, wait as u64);
                if deps.signals.stop_requested() {
                    break StopReason::Stopped;
                }
                continue;
            }
            Err(other) => break other,
        }

        if deps.signals.stop_requested() {
            break StopReason::Stopped;
        }
        interruptible_sleep(deps.signals, deps.mapping.attrs.polling_period as u64);
    };

    deps.signals.clear_running();
    reason
}
