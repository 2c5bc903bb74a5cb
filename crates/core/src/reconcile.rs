//! Record Reconciler (§4.6) and the per-record pipelines built on top of it
//! (§4.7). This module only evaluates rules against two already-open record
//! handles; discovering which records to visit and driving cycles end to
//! end is the replication loop's job (`crate::engine`).

use crate::convert::{convert, MapDirection};
use crate::logger::EngineLog;
use crate::model::field::{FieldDesc, ReadOnly};
use crate::model::mapping::{ConflictPolicy, DataMapping, Side};
use crate::plugin::{Adapter, FixDesc, RecordHandle};

/// Whether a side changed this cycle, relative to its watermark. `New`
/// covers both a freshly created DTS record and an SCM record the engine
/// just created for a DTS-originated update (§4.6 step 2, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    New,
    Unchanged,
    Changed,
}

impl ChangeStatus {
    /// `New` and `Changed` both carry a value the mirror step should
    /// consider writing; only `Unchanged` is inert. Treating `New` like
    /// `Changed` for directionality is a deliberate reading of "both NEW"
    /// in §4.6 step 2 (recorded in DESIGN.md): a record with no prior
    /// watermark has nothing to compare against, so its current value is
    /// what "changed" means for it.
    fn is_active(self) -> bool {
        !matches!(self, ChangeStatus::Unchanged)
    }
}

pub struct ReconcileError(pub String);

/// Everything the reconciler needs about one side of the mapping to decide
/// whether a write is permitted and to normalize comparisons.
pub struct SideFields<'a> {
    pub adapter: &'a dyn Adapter,
    pub record: RecordHandle,
    pub fields: &'a [FieldDesc],
    pub writable_override: bool,
}

impl SideFields<'_> {
    fn is_writable(&self, name: &str) -> bool {
        match self.fields.iter().find(|f| f.name == name) {
            Some(f) => f.readonly.is_writable() || self.writable_override,
            None => true,
        }
    }

    fn get(&self, name: &str) -> String {
        self.adapter.get_field(self.record, name).unwrap_or_default()
    }
}

fn normalize(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_if_differs(side: &SideFields, field: &str, new_value: &str, log: &dyn EngineLog) {
    if !side.is_writable(field) {
        log.debug(&format!("skipping write to read-only field {}", field));
        return;
    }
    let current = side.get(field);
    if normalize(&current) != normalize(new_value) {
        side.adapter.set_field(side.record, field, new_value);
    }
}

/// Runs §4.6 steps 1-4 against one already-loaded record pair.
///
/// `scm_moddate`/`dts_moddate` are only consulted when a mirror rule's
/// conflict falls back to the mapping's `Newer` policy; pass `None` when
/// unavailable (e.g. a freshly created record) — a `Newer` comparison
/// against `None` always keeps the existing side to avoid clobbering data
/// with an unknown timestamp.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    mapping: &DataMapping,
    scm: &SideFields,
    dts: &SideFields,
    scm_status: ChangeStatus,
    dts_status: ChangeStatus,
    scm_moddate: Option<crate::model::Timestamp>,
    dts_moddate: Option<crate::model::Timestamp>,
    added_fixes: &[FixDesc],
    removed_fixes: &[String],
    log: &dyn EngineLog,
) -> Result<(), ReconcileError> {
    // Step 1: fix rules.
    if !added_fixes.is_empty() || !removed_fixes.is_empty() {
        for rule in &mapping.fix_rules {
            let current = dts.get(&rule.dts_field);
            let rendered =
                crate::fixrender::apply_fix_ledger(rule, &current, added_fixes, removed_fixes);
            write_if_differs(dts, &rule.dts_field, &rendered, log);
        }
    }

    // Step 2: mirror rules.
    for rule in &mapping.mirror_rules {
        let scm_active = scm_status.is_active();
        let dts_active = dts_status.is_active();

        let winner = if scm_active && dts_active {
            match rule.mirror_conflict {
                Some(side) => side,
                None => match mapping.mirror_conflicts {
                    ConflictPolicy::Scm => Side::Scm,
                    ConflictPolicy::Dts => Side::Dts,
                    ConflictPolicy::Error => {
                        return Err(ReconcileError(format!(
                            "mirror conflict on {}/{} with policy=Error",
                            rule.scm_field, rule.dts_field
                        )))
                    }
                    ConflictPolicy::Newer => match (scm_moddate, dts_moddate) {
                        (Some(s), Some(d)) if s > d => Side::Scm,
                        (Some(s), Some(d)) if d > s => Side::Dts,
                        // Tie (same second) or an unknown clock falls back to
                        // DTS silently — open question (b) in §9, resolved in
                        // DESIGN.md.
                        _ => Side::Dts,
                    },
                },
            }
        } else if scm_active {
            Side::Scm
        } else if dts_active {
            Side::Dts
        } else {
            continue;
        };

        match winner {
            Side::Scm => {
                let value = scm.get(&rule.scm_field);
                let converted = convert(rule, &value, MapDirection::Forward, scm.adapter, dts.adapter);
                write_if_differs(dts, &rule.dts_field, &converted, log);
            }
            Side::Dts => {
                let value = dts.get(&rule.dts_field);
                let converted = convert(rule, &value, MapDirection::Reverse, dts.adapter, scm.adapter);
                write_if_differs(scm, &rule.scm_field, &converted, log);
            }
        }
    }

    // Step 3: dts -> scm, unconditional.
    for rule in &mapping.dts_to_scm_rules {
        let value = dts.get(&rule.dts_field);
        let converted = convert(rule, &value, MapDirection::Reverse, dts.adapter, scm.adapter);
        write_if_differs(scm, &rule.scm_field, &converted, log);
    }

    // Step 4: scm -> dts, unconditional.
    for rule in &mapping.scm_to_dts_rules {
        let value = scm.get(&rule.scm_field);
        let converted = convert(rule, &value, MapDirection::Forward, scm.adapter, dts.adapter);
        write_if_differs(dts, &rule.dts_field, &converted, log);
    }

    Ok(())
}

/// `ReadOnly::ModDate`/`ModUser` markers identify which field in a
/// `FieldDesc` list is `moddate_field`/`moduser_field` for a given source,
/// used by the replication loop when deciding each side's `ChangeStatus`.
pub fn find_field_by_readonly(fields: &[FieldDesc], marker: ReadOnly) -> Option<&FieldDesc> {
    fields.iter().find(|f| f.readonly == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::FieldType;
    use crate::model::mapping::{CopyRule, CopyType, FixAction, FixRule, MappingAttrs};
    use crate::model::timestamp::Timestamp;
    use crate::plugin::{AResult, ConnHandle, ProjHandle};
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MockAdapter {
        name: String,
        fields: RefCell<HashMap<(u64, String), String>>,
    }

    impl MockAdapter {
        fn new(name: &str) -> Self {
            MockAdapter {
                name: name.into(),
                fields: RefCell::new(HashMap::new()),
            }
        }

        fn set(&self, handle: RecordHandle, field: &str, value: &str) {
            self.fields
                .borrow_mut()
                .insert((handle.0, field.to_string()), value.to_string());
        }
    }

    impl Adapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }
        fn module_version(&self) -> &str {
            "0"
        }
        fn extract_date(&self, s: &str) -> Option<Timestamp> {
            Timestamp::parse(s)
        }
        fn format_date(&self, d: Timestamp) -> String {
            d.format()
        }
        fn connect(&self, _: &str, _: &str, _: &str, _: &[(String, String)]) -> AResult<ConnHandle> {
            unimplemented!()
        }
        fn disconnect(&self, _: ConnHandle) {}
        fn server_version(&self, _: ConnHandle) -> AResult<String> {
            unimplemented!()
        }
        fn server_warnings(&self, _: ConnHandle) -> AResult<Vec<String>> {
            unimplemented!()
        }
        fn server_date(&self, _: ConnHandle) -> AResult<Timestamp> {
            unimplemented!()
        }
        fn list_projects(&self, _: ConnHandle) -> AResult<Vec<String>> {
            unimplemented!()
        }
        fn get_project(&self, _: ConnHandle, _: &str) -> AResult<ProjHandle> {
            unimplemented!()
        }
        fn list_fields(&self, _: ProjHandle) -> AResult<Vec<FieldDesc>> {
            unimplemented!()
        }
        fn list_changed_defects(
            &self,
            _: ProjHandle,
            _: i64,
            _: Timestamp,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> AResult<Vec<String>> {
            unimplemented!()
        }
        fn get_defect(&self, _: ProjHandle, _: &str) -> AResult<RecordHandle> {
            unimplemented!()
        }
        fn new_defect(&self, _: ProjHandle) -> AResult<RecordHandle> {
            unimplemented!()
        }
        fn get_field(&self, rec: RecordHandle, name: &str) -> Option<String> {
            self.fields.borrow().get(&(rec.0, name.to_string())).cloned()
        }
        fn set_field(&self, rec: RecordHandle, name: &str, value: &str) {
            self.set(rec, name, value);
        }
        fn save(&self, _: ProjHandle, _: RecordHandle) -> AResult<String> {
            unimplemented!()
        }
        fn free(&self, _: RecordHandle) {}
    }

    fn mapping_with_mirror(policy: ConflictPolicy) -> DataMapping {
        DataMapping {
            id: "m1".into(),
            scm_id: "scm-src".into(),
            dts_id: "dts-src".into(),
            scm_filter: None,
            dts_filter: None,
            mirror_conflicts: policy,
            mirror_rules: vec![CopyRule {
                scm_field: "Status".into(),
                dts_field: "State".into(),
                copy_type: CopyType::Text,
                truncate: false,
                mirror_conflict: None,
                maps: Vec::new(),
            }],
            scm_to_dts_rules: Vec::new(),
            dts_to_scm_rules: Vec::new(),
            fix_rules: vec![FixRule {
                dts_field: "Notes".into(),
                action: FixAction::Append,
                include_files: false,
                include_change: true,
                include_description: true,
                include_fixed_by: false,
                include_fixed_date: false,
            }],
            attrs: MappingAttrs::default(),
            recheck_on_new_scm: false,
            recheck_on_new_dts: false,
        }
    }

    #[test]
    fn mirror_rule_copies_from_changed_side_only() {
        let scm_adapter = MockAdapter::new("scm");
        let dts_adapter = MockAdapter::new("dts");
        let scm_rec = RecordHandle(1);
        let dts_rec = RecordHandle(1);
        scm_adapter.set(scm_rec, "Status", "Open");
        dts_adapter.set(dts_rec, "State", "");

        let mapping = mapping_with_mirror(ConflictPolicy::Newer);
        let scm = SideFields {
            adapter: &scm_adapter,
            record: scm_rec,
            fields: &[],
            writable_override: false,
        };
        let dts = SideFields {
            adapter: &dts_adapter,
            record: dts_rec,
            fields: &[],
            writable_override: false,
        };

        reconcile(
            &mapping,
            &scm,
            &dts,
            ChangeStatus::Changed,
            ChangeStatus::Unchanged,
            None,
            None,
            &[],
            &[],
            &crate::logger::NullLogger,
        )
        .unwrap();

        assert_eq!(dts_adapter.get_field(dts_rec, "State"), Some("Open".to_string()));
    }

    #[test]
    fn mirror_conflict_dts_policy_wins_on_both_changed() {
        let scm_adapter = MockAdapter::new("scm");
        let dts_adapter = MockAdapter::new("dts");
        let scm_rec = RecordHandle(1);
        let dts_rec = RecordHandle(1);
        scm_adapter.set(scm_rec, "Status", "Open");
        dts_adapter.set(dts_rec, "State", "Closed");

        let mapping = mapping_with_mirror(ConflictPolicy::Dts);
        let scm = SideFields {
            adapter: &scm_adapter,
            record: scm_rec,
            fields: &[],
            writable_override: false,
        };
        let dts = SideFields {
            adapter: &dts_adapter,
            record: dts_rec,
            fields: &[],
            writable_override: false,
        };

        reconcile(
            &mapping,
            &scm,
            &dts,
            ChangeStatus::Changed,
            ChangeStatus::Changed,
            None,
            None,
            &[],
            &[],
            &crate::logger::NullLogger,
        )
        .unwrap();

        assert_eq!(scm_adapter.get_field(scm_rec, "Status"), Some("Closed".to_string()));
        assert_eq!(dts_adapter.get_field(dts_rec, "State"), Some("Closed".to_string()));
    }

    #[test]
    fn readonly_scm_field_is_not_written_without_override() {
        let scm_adapter = MockAdapter::new("scm");
        let dts_adapter = MockAdapter::new("dts");
        let scm_rec = RecordHandle(1);
        let dts_rec = RecordHandle(1);
        dts_adapter.set(dts_rec, "State", "Closed");

        let mapping = mapping_with_mirror(ConflictPolicy::Dts);
        let scm_fields = vec![FieldDesc {
            name: "Status".into(),
            ty: FieldType::Select,
            readonly: ReadOnly::ReadOnly,
            select_values: Vec::new(),
            pseudo: false,
        }];
        let scm = SideFields {
            adapter: &scm_adapter,
            record: scm_rec,
            fields: &scm_fields,
            writable_override: false,
        };
        let dts = SideFields {
            adapter: &dts_adapter,
            record: dts_rec,
            fields: &[],
            writable_override: false,
        };

        reconcile(
            &mapping,
            &scm,
            &dts,
            ChangeStatus::Unchanged,
            ChangeStatus::Changed,
            None,
            None,
            &[],
            &[],
            &crate::logger::NullLogger,
        )
        .unwrap();

        assert_eq!(scm_adapter.get_field(scm_rec, "Status"), None);
    }

    #[test]
    fn fix_rules_apply_even_without_mirror_changes() {
        let scm_adapter = MockAdapter::new("scm");
        let dts_adapter = MockAdapter::new("dts");
        let scm_rec = RecordHandle(1);
        let dts_rec = RecordHandle(1);

        let mapping = mapping_with_mirror(ConflictPolicy::Dts);
        let scm = SideFields {
            adapter: &scm_adapter,
            record: scm_rec,
            fields: &[],
            writable_override: false,
        };
        let dts = SideFields {
            adapter: &dts_adapter,
            record: dts_rec,
            fields: &[],
            writable_override: false,
        };
        let fix = FixDesc {
            change: "1234".into(),
            user: "a".into(),
            stamp: Timestamp::parse("2024/01/03 00:00:00").unwrap(),
            desc: "fix".into(),
            files: Vec::new(),
        };

        reconcile(
            &mapping,
            &scm,
            &dts,
            ChangeStatus::Unchanged,
            ChangeStatus::Unchanged,
            None,
            None,
            &[fix],
            &[],
            &crate::logger::NullLogger,
        )
        .unwrap();

        let notes = dts_adapter.get_field(dts_rec, "Notes").unwrap();
        assert!(notes.contains("Change: 1234"));
    }
}
