//! Mapping Validator (§4.3): runs once at engine start, before the
//! replication loop. Produces a [`ValidationOutcome`] rather than a bare
//! bool so callers can distinguish a hard failure from a warning override.

use crate::model::field::{FieldDesc, FieldType, ReadOnly};
use crate::model::mapping::{CopyType, DataMapping};
use crate::model::source::{ConnectStatus, Source, SourceKind, Utf8Capability};

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn field<'a>(fields: &'a [FieldDesc], name: &str) -> Option<&'a FieldDesc> {
    fields.iter().find(|f| f.name == name)
}

/// Validates `mapping` against the already-connected `scm`/`dts` sources'
/// cached field lists (§4.3). Does not touch the network; the caller is
/// expected to have already run `connect` + `list_fields` for both sides.
pub fn validate(mapping: &DataMapping, scm: &Source, dts: &Source) -> ValidationOutcome {
    let mut out = ValidationOutcome::default();

    if scm.kind != SourceKind::Scm {
        out.errors.push(format!("{} is not an SCM source", scm.nickname));
    }
    if dts.kind != SourceKind::Dts {
        out.errors.push(format!("{} is not a DTS source", dts.nickname));
    }

    if scm.status != ConnectStatus::Ready {
        out.errors
            .push(format!("SCM source {} is not READY", scm.nickname));
    }
    if dts.status < ConnectStatus::Pass {
        out.errors
            .push(format!("DTS source {} is below PASS", dts.nickname));
    }

    if mapping.scm_filter.is_some() {
        match field(&scm.cached_fields, crate::model::field::DTG_MAPID) {
            Some(f) if f.readonly.is_writable() => {}
            Some(_) => out
                .errors
                .push("DTG_MAPID exists but is not writable".into()),
            None => out
                .errors
                .push("filtered mapping requires a writable DTG_MAPID field".into()),
        }
    }

    check_moddate_field(&mut out, scm, "SCM", ReadOnly::ModDate);
    check_moduser_field(&mut out, scm, "SCM");
    check_moddate_field(&mut out, dts, "DTS", ReadOnly::ModDate);
    check_moduser_field(&mut out, dts, "DTS");

    for rule in mapping.all_copy_rules() {
        if rule.copy_type == CopyType::Unmap {
            out.errors.push(format!(
                "copy rule {}/{} is left UNMAP",
                rule.scm_field, rule.dts_field
            ));
        }
        if !rule.scm_field.is_empty() && field(&scm.cached_fields, &rule.scm_field).is_none() {
            out.errors
                .push(format!("SCM field {} does not exist", rule.scm_field));
        }
        if !rule.dts_field.is_empty() && field(&dts.cached_fields, &rule.dts_field).is_none() {
            out.errors
                .push(format!("DTS field {} does not exist", rule.dts_field));
        }
    }

    for rule in &mapping.mirror_rules {
        check_writable_target(&mut out, scm, &rule.scm_field, mapping.attrs.enable_write_to_readonly, "SCM");
        check_writable_target(&mut out, dts, &rule.dts_field, false, "DTS");
    }

    for rule in &mapping.fix_rules {
        match field(&dts.cached_fields, &rule.dts_field) {
            Some(f) if f.readonly.is_writable() => {}
            Some(_) => out
                .errors
                .push(format!("fix rule target {} is not writable", rule.dts_field)),
            None => out
                .errors
                .push(format!("fix rule target {} does not exist", rule.dts_field)),
        }
    }

    if let Some(name) = &mapping.scm_filter {
        check_filter_set(&mut out, scm, name);
    }
    if let Some(name) = &mapping.dts_filter {
        check_filter_set(&mut out, dts, name);
    }

    check_unicode_matrix(&mut out, scm, dts);

    out
}

fn check_moddate_field(out: &mut ValidationOutcome, source: &Source, label: &str, marker: ReadOnly) {
    if source.moddate_field.is_empty() {
        return;
    }
    match field(&source.cached_fields, &source.moddate_field) {
        Some(f) if f.readonly == marker || f.ty == FieldType::Date => {}
        Some(_) => out.errors.push(format!(
            "{} moddate_field {} is not a mod-date field",
            label, source.moddate_field
        )),
        None => out.errors.push(format!(
            "{} moddate_field {} does not exist",
            label, source.moddate_field
        )),
    }
}

fn check_moduser_field(out: &mut ValidationOutcome, source: &Source, label: &str) {
    if source.moduser_field.is_empty() {
        return;
    }
    if field(&source.cached_fields, &source.moduser_field).is_none() {
        out.errors.push(format!(
            "{} moduser_field {} does not exist",
            label, source.moduser_field
        ));
    }
}

fn check_writable_target(
    out: &mut ValidationOutcome,
    source: &Source,
    field_name: &str,
    allow_readonly_override: bool,
    label: &str,
) {
    if field_name.is_empty() {
        return;
    }
    match field(&source.cached_fields, field_name) {
        Some(f) if f.readonly.is_writable() => {}
        Some(_) if allow_readonly_override => out.warnings.push(format!(
            "{} field {} is read-only; writing anyway (enable_write_to_readonly)",
            label, field_name
        )),
        Some(_) => out
            .errors
            .push(format!("{} mirror target {} is read-only", label, field_name)),
        None => out
            .errors
            .push(format!("{} mirror target {} does not exist", label, field_name)),
    }
}

fn check_filter_set(out: &mut ValidationOutcome, source: &Source, name: &str) {
    match source.filter_set(name) {
        Some(set) if !set.rules.is_empty() => {}
        Some(_) => out
            .errors
            .push(format!("filter set {} on {} is empty", name, source.nickname)),
        None => out.errors.push(format!(
            "filter set {} does not exist on {}",
            name, source.nickname
        )),
    }
}

fn check_unicode_matrix(out: &mut ValidationOutcome, scm: &Source, dts: &Source) {
    match (scm.accept_utf8, dts.accept_utf8) {
        (Utf8Capability::Unknown, _) => out
            .errors
            .push("SCM plugin predates UTF-8 awareness".into()),
        (_, Utf8Capability::Unknown) => out.warnings.push(
            "DTS plugin predates UTF-8 awareness; SCM-side UTF-8 content may not round-trip".into(),
        ),
        (Utf8Capability::Yes, Utf8Capability::No) | (Utf8Capability::No, Utf8Capability::Yes) => {
            out.errors.push("SCM/DTS UTF-8 capability mismatch".into())
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::{FieldDesc, DTG_DTISSUE, DTG_ERROR, DTG_FIXES, DTG_MAPID};
    use crate::model::mapping::{ConflictPolicy, MappingAttrs};

    fn rw_field(name: &str, ty: FieldType) -> FieldDesc {
        FieldDesc {
            name: name.into(),
            ty,
            readonly: ReadOnly::ReadWrite,
            select_values: Vec::new(),
            pseudo: false,
        }
    }

    fn ready_scm() -> Source {
        Source {
            kind: SourceKind::Scm,
            nickname: "p4-src".into(),
            plugin: "p4".into(),
            server: "".into(),
            user: "".into(),
            password: "".into(),
            module: "".into(),
            moddate_field: "".into(),
            moduser_field: "".into(),
            filter_sets: Vec::new(),
            attrs: Vec::new(),
            cached_fields: vec![
                rw_field(DTG_DTISSUE, FieldType::Word),
                rw_field(DTG_FIXES, FieldType::Text),
                rw_field(DTG_ERROR, FieldType::Text),
                rw_field(DTG_MAPID, FieldType::Word),
                rw_field("Status", FieldType::Select),
            ],
            cached_modules: Vec::new(),
            status: ConnectStatus::Ready,
            warnings: None,
            error: None,
            version: None,
            accept_utf8: Utf8Capability::Yes,
            seg_ok: true,
            refcnt: 0,
        }
    }

    fn pass_dts() -> Source {
        Source {
            kind: SourceKind::Dts,
            nickname: "jira-src".into(),
            plugin: "jira".into(),
            server: "".into(),
            user: "".into(),
            password: "".into(),
            module: "".into(),
            moddate_field: "".into(),
            moduser_field: "".into(),
            filter_sets: Vec::new(),
            attrs: Vec::new(),
            cached_fields: vec![rw_field("State", FieldType::Select)],
            cached_modules: Vec::new(),
            status: ConnectStatus::Pass,
            warnings: None,
            error: None,
            version: None,
            accept_utf8: Utf8Capability::Yes,
            seg_ok: false,
            refcnt: 0,
        }
    }

    fn base_mapping() -> DataMapping {
        DataMapping {
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
            attrs: MappingAttrs::default(),
            recheck_on_new_scm: false,
            recheck_on_new_dts: false,
        }
    }

    #[test]
    fn clean_mapping_is_valid() {
        let out = validate(&base_mapping(), &ready_scm(), &pass_dts());
        assert!(out.is_valid(), "{:?}", out.errors);
    }

    #[test]
    fn unmap_rule_is_rejected() {
        use crate::model::mapping::{CopyRule, CopyType};
        let mut mapping = base_mapping();
        mapping.mirror_rules.push(CopyRule {
            scm_field: "Status".into(),
            dts_field: "State".into(),
            copy_type: CopyType::Unmap,
            truncate: false,
            mirror_conflict: None,
            maps: Vec::new(),
        });
        let out = validate(&mapping, &ready_scm(), &pass_dts());
        assert!(!out.is_valid());
    }

    #[test]
    fn scm_not_ready_is_rejected() {
        let mut scm = ready_scm();
        scm.status = ConnectStatus::Pass;
        let out = validate(&base_mapping(), &scm, &pass_dts());
        assert!(!out.is_valid());
    }
}
