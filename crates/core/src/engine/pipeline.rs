//! Per-record pipelines (§4.7): SCM-originated, DTS-originated, and the
//! end-of-cycle retry pass. Each pipeline loads both record halves, derives
//! each side's [`ChangeStatus`], and hands off to [`crate::reconcile::reconcile`].

use crate::logger::EngineLog;
use crate::model::field::{FieldDesc, DTG_DTISSUE, DTG_ERROR, DTG_FIXES, DTG_MAPID};
use crate::model::mapping::DataMapping;
use crate::model::timestamp::Timestamp;
use crate::plugin::{Adapter, FixDesc, ProjHandle, RecordGuard};
use crate::reconcile::{reconcile, ChangeStatus, SideFields};

/// What a pipeline run accomplished, for the cycle driver to fold into its
/// retry/failure bookkeeping (§4.8 steps 4-7).
pub enum PipelineOutcome {
    Ok,
    /// Save failed on a non-retry pass; queue `scm_id` for the retry pass.
    Retry { scm_id: String },
    /// Save failed on the retry pass, or the record was fatally invalid;
    /// `DTG_ERROR` should be set on `scm_id` if possible.
    Failed { scm_id: Option<String>, reason: String },
}

pub struct PipelineCtx<'a> {
    pub mapping: &'a DataMapping,
    pub scm: &'a dyn Adapter,
    pub scm_proj: ProjHandle,
    pub scm_fields: &'a [FieldDesc],
    pub dts: &'a dyn Adapter,
    pub dts_proj: ProjHandle,
    pub dts_fields: &'a [FieldDesc],
    pub last_update_scm: Timestamp,
    pub last_update_dts: Timestamp,
    pub dts_user: &'a str,
    pub force: bool,
    pub last_chance: bool,
    pub log: &'a dyn EngineLog,
}

fn moddate_of(fields: &[FieldDesc], adapter: &dyn Adapter, rec: crate::plugin::RecordHandle, moddate_field: &str) -> Option<Timestamp> {
    if moddate_field.is_empty() || !fields.iter().any(|f| f.name == moddate_field) {
        return None;
    }
    adapter.get_field(rec, moddate_field).and_then(|s| adapter.extract_date(&s))
}

/// Computes added/removed fix ids by diffing `list_fixes` against the
/// whitespace-joined ids currently stored in `DTG_FIXES` (§4.6 step 1,
/// §8.6 "Fix ledger").
fn diff_fixes(stored: &str, current: &[String]) -> (Vec<String>, Vec<String>) {
    let stored_ids: Vec<&str> = stored.split_whitespace().collect();
    let added = current
        .iter()
        .filter(|id| !stored_ids.contains(&id.as_str()))
        .cloned()
        .collect();
    let removed = stored_ids
        .iter()
        .filter(|id| !current.iter().any(|c| c == *id))
        .map(|s| s.to_string())
        .collect();
    (added, removed)
}

/// §4.7 "SCM-originated": one already-discovered changed SCM record.
pub fn scm_originated(ctx: &PipelineCtx, scm_id: &str) -> PipelineOutcome {
    let scm_rec = match ctx.scm.get_defect(ctx.scm_proj, scm_id) {
        Ok(h) => h,
        Err(e) => {
            return PipelineOutcome::Failed {
                scm_id: Some(scm_id.to_string()),
                reason: e.message,
            }
        }
    };
    let scm_guard = RecordGuard::new(ctx.scm, ctx.scm_proj, scm_rec);

    if let Some(err) = scm_guard.get(DTG_ERROR) {
        if !err.is_empty() {
            ctx.log.debug(&format!("scm {} has a pending DTG_ERROR; skipping", scm_id));
            return PipelineOutcome::Ok;
        }
    }
    if let Some(existing_map) = scm_guard.get(DTG_MAPID) {
        if !existing_map.is_empty() && existing_map != ctx.mapping.id {
            return PipelineOutcome::Failed {
                scm_id: Some(scm_id.to_string()),
                reason: format!("DTG_MAPID {} does not match mapping {}", existing_map, ctx.mapping.id),
            };
        }
    }
    if scm_guard.get(DTG_MAPID).unwrap_or_default().is_empty() {
        scm_guard.set(DTG_MAPID, &ctx.mapping.id);
    }

    let dts_issue = scm_guard.get(DTG_DTISSUE).unwrap_or_default();
    let (dts_rec, dts_is_new) = if dts_issue.is_empty() {
        match ctx.dts.new_defect(ctx.dts_proj) {
            Ok(h) => (h, true),
            Err(e) => {
                return PipelineOutcome::Failed {
                    scm_id: Some(scm_id.to_string()),
                    reason: e.message,
                }
            }
        }
    } else {
        match ctx.dts.get_defect(ctx.dts_proj, &dts_issue) {
            Ok(h) => (h, false),
            Err(e) => {
                return PipelineOutcome::Failed {
                    scm_id: Some(scm_id.to_string()),
                    reason: e.message,
                }
            }
        }
    };
    let dts_guard = RecordGuard::new(ctx.dts, ctx.dts_proj, dts_rec);

    let dts_moddate = moddate_of(ctx.dts_fields, ctx.dts, dts_rec, moddate_field_name(ctx.dts_fields));
    let dts_status = if dts_is_new {
        ChangeStatus::New
    } else if dts_moddate.map(|d| d > ctx.last_update_dts).unwrap_or(false) {
        ChangeStatus::Changed
    } else {
        ChangeStatus::Unchanged
    };

    let (added_fixes, removed_ids): (Vec<FixDesc>, Vec<String>) =
        if let Some(scm_query) = ctx.scm.as_scm_query() {
            let stored = scm_guard.get(DTG_FIXES).unwrap_or_default();
            match scm_query.list_fixes(ctx.scm_proj, scm_id) {
                Ok(current) => {
                    let (added_ids, removed_ids) = diff_fixes(&stored, &current);
                    let added = added_ids
                        .iter()
                        .filter_map(|id| scm_query.describe_fix(ctx.scm_proj, id).ok())
                        .collect();
                    (added, removed_ids)
                }
                Err(_) => (Vec::new(), Vec::new()),
            }
        } else {
            (Vec::new(), Vec::new())
        };

    let scm_side = SideFields {
        adapter: ctx.scm,
        record: scm_rec,
        fields: ctx.scm_fields,
        writable_override: ctx.mapping.attrs.enable_write_to_readonly,
    };
    let dts_side = SideFields {
        adapter: ctx.dts,
        record: dts_rec,
        fields: ctx.dts_fields,
        writable_override: false,
    };

    let scm_moddate = moddate_of(ctx.scm_fields, ctx.scm, scm_rec, moddate_field_name(ctx.scm_fields));

    if let Err(e) = reconcile(
        ctx.mapping,
        &scm_side,
        &dts_side,
        ChangeStatus::Changed,
        dts_status,
        scm_moddate,
        dts_moddate,
        &added_fixes,
        &removed_ids,
        ctx.log,
    ) {
        return PipelineOutcome::Failed {
            scm_id: Some(scm_id.to_string()),
            reason: e.0,
        };
    }

    let new_dts_id = match ctx.dts.save(ctx.dts_proj, dts_rec) {
        Ok(id) => id,
        Err(e) if ctx.last_chance => {
            return PipelineOutcome::Failed {
                scm_id: Some(scm_id.to_string()),
                reason: e.message,
            }
        }
        Err(_) => {
            return PipelineOutcome::Retry {
                scm_id: scm_id.to_string(),
            }
        }
    };
    if dts_is_new {
        scm_guard.set(DTG_DTISSUE, &new_dts_id);
    }

    if let Err(e) = ctx.scm.save(ctx.scm_proj, scm_rec) {
        if ctx.last_chance {
            return PipelineOutcome::Failed {
                scm_id: Some(scm_id.to_string()),
                reason: e.message,
            };
        }
        return PipelineOutcome::Retry {
            scm_id: scm_id.to_string(),
        };
    }

    PipelineOutcome::Ok
}

fn moddate_field_name(fields: &[FieldDesc]) -> &str {
    fields
        .iter()
        .find(|f| f.readonly == crate::model::field::ReadOnly::ModDate)
        .map(|f| f.name.as_str())
        .unwrap_or("")
}

/// §4.7 "DTS-originated": one already-discovered changed DTS record.
pub fn dts_originated(ctx: &PipelineCtx, dts_id: &str) -> PipelineOutcome {
    let dts_rec = match ctx.dts.get_defect(ctx.dts_proj, dts_id) {
        Ok(h) => h,
        Err(e) => {
            return PipelineOutcome::Failed {
                scm_id: None,
                reason: e.message,
            }
        }
    };
    let dts_guard = RecordGuard::new(ctx.dts, ctx.dts_proj, dts_rec);

    if !ctx.dts_user.is_empty() && !ctx.force {
        if let Some(moduser_field) = find_moduser_field(ctx.dts_fields) {
            if dts_guard.get(moduser_field).as_deref() == Some(ctx.dts_user) {
                return PipelineOutcome::Ok;
            }
        }
    }

    let moddate_field = moddate_field_name(ctx.dts_fields);
    let dts_moddate = moddate_of(ctx.dts_fields, ctx.dts, dts_rec, moddate_field);
    if !ctx.force {
        if let Some(d) = dts_moddate {
            if d <= ctx.last_update_dts {
                return PipelineOutcome::Ok;
            }
        }
    }

    let Some(scm_query) = ctx.scm.as_scm_query() else {
        return PipelineOutcome::Failed {
            scm_id: None,
            reason: "SCM plugin does not support find_defects".into(),
        };
    };

    let query = format!("{}={} {}={}", DTG_DTISSUE, dts_id, DTG_MAPID, ctx.mapping.id);
    let matches = scm_query
        .find_defects(ctx.scm_proj, 1, &query)
        .unwrap_or_default();

    let (scm_rec, scm_is_new) = if let Some(id) = matches.first() {
        match ctx.scm.get_defect(ctx.scm_proj, id) {
            Ok(h) => (h, false),
            Err(e) => {
                return PipelineOutcome::Failed {
                    scm_id: None,
                    reason: e.message,
                }
            }
        }
    } else {
        match ctx.scm.new_defect(ctx.scm_proj) {
            Ok(h) => (h, true),
            Err(e) => {
                return PipelineOutcome::Failed {
                    scm_id: None,
                    reason: e.message,
                }
            }
        }
    };
    let scm_guard = RecordGuard::new(ctx.scm, ctx.scm_proj, scm_rec);

    if let Some(err) = scm_guard.get(DTG_ERROR) {
        if !err.is_empty() {
            return PipelineOutcome::Ok;
        }
    }

    let scm_moddate = moddate_of(ctx.scm_fields, ctx.scm, scm_rec, moddate_field_name(ctx.scm_fields));
    let scm_status = if scm_is_new {
        ChangeStatus::New
    } else if scm_moddate.map(|d| d > ctx.last_update_scm).unwrap_or(false) {
        ChangeStatus::Changed
    } else {
        ChangeStatus::Unchanged
    };

    let scm_side = SideFields {
        adapter: ctx.scm,
        record: scm_rec,
        fields: ctx.scm_fields,
        writable_override: ctx.mapping.attrs.enable_write_to_readonly,
    };
    let dts_side = SideFields {
        adapter: ctx.dts,
        record: dts_rec,
        fields: ctx.dts_fields,
        writable_override: false,
    };

    if let Err(e) = reconcile(
        ctx.mapping,
        &scm_side,
        &dts_side,
        scm_status,
        ChangeStatus::Changed,
        scm_moddate,
        dts_moddate,
        &[],
        &[],
        ctx.log,
    ) {
        return PipelineOutcome::Failed {
            scm_id: scm_guard.get(DTG_DTISSUE).filter(|s| !s.is_empty()),
            reason: e.0,
        };
    }

    if let Err(e) = ctx.dts.save(ctx.dts_proj, dts_rec) {
        scm_guard.set(DTG_ERROR, &e.message);
        let _ = ctx.scm.save(ctx.scm_proj, scm_rec);
        return PipelineOutcome::Ok;
    }

    if let Err(e) = ctx.scm.save(ctx.scm_proj, scm_rec) {
        return PipelineOutcome::Failed {
            scm_id: None,
            reason: e.message,
        };
    }

    if scm_is_new {
        scm_guard.set(DTG_DTISSUE, dts_id);
        scm_guard.set(DTG_MAPID, &ctx.mapping.id);
        match ctx.scm.save(ctx.scm_proj, scm_rec) {
            Ok(new_scm_id) if ctx.mapping.recheck_on_new_scm => {
                return PipelineOutcome::Retry { scm_id: new_scm_id };
            }
            Ok(_) => {}
            Err(e) => {
                return PipelineOutcome::Failed {
                    scm_id: None,
                    reason: e.message,
                }
            }
        }
    }

    PipelineOutcome::Ok
}

fn find_moduser_field(fields: &[FieldDesc]) -> Option<&str> {
    fields
        .iter()
        .find(|f| f.readonly == crate::model::field::ReadOnly::ModUser)
        .map(|f| f.name.as_str())
}
