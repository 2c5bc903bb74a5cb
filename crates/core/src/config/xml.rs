//! The XML data contract (§3, §6): `src-<nickname>.xml`, `map-<mapping>.xml`
//! and `set-<mapping>.xml`, each rooted at `version="1" updated="<UTC
//! timestamp>"`, plus the backup-first write protocol (§4.2).

use super::password;
use super::xmltree::{self, Element};
use crate::error::{ReplError, ReplResult};
use crate::model::field::{FieldType, ReadOnly};
use crate::model::mapping::{
    ConflictPolicy, CopyMap, CopyRule, CopyType, DataMapping, FixAction, FixRule, MappingAttrs,
    Side,
};
use crate::model::source::{FilterRule, FilterSet, Source, SourceKind};
use crate::model::timestamp::Timestamp;
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: &str = "1";

pub fn source_path(dir: &Path, nickname: &str) -> PathBuf {
    dir.join(format!("src-{}.xml", nickname))
}

pub fn mapping_path(dir: &Path, mapping_id: &str) -> PathBuf {
    dir.join(format!("map-{}.xml", mapping_id))
}

pub fn settings_path(dir: &Path, mapping_id: &str) -> PathBuf {
    dir.join(format!("set-{}.xml", mapping_id))
}

/// Copies `path` to `path.old` if it exists, writes `contents` to `path`,
/// and leaves the previous file (or its backup) untouched if any step
/// fails (§4.2 "Configuration write protocol").
fn write_with_backup(path: &Path, contents: &str) -> ReplResult<()> {
    let backup = backup_path(path);
    if path.exists() {
        fs::copy(path, &backup).map_err(|e| ReplError::Io {
            path: backup.display().to_string(),
            source: e,
        })?;
    }
    fs::write(path, contents).map_err(|e| ReplError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".old");
    PathBuf::from(s)
}

fn read_to_string(path: &Path) -> ReplResult<String> {
    fs::read_to_string(path).map_err(|e| ReplError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn parse_bool(s: &str) -> bool {
    s == "true" || s == "1"
}

// ---------------------------------------------------------------- source

pub fn load_source(path: &Path) -> ReplResult<Source> {
    let xml = read_to_string(path)?;
    let root = xmltree::parse(&xml)?;
    source_from_element(&root)
}

pub fn save_source(path: &Path, source: &Source) -> ReplResult<()> {
    let el = source_to_element(source);
    let xml = xmltree::render(&el)?;
    write_with_backup(path, &xml)
}

fn source_to_element(s: &Source) -> Element {
    let nickname_field = s.nickname.clone();
    let mut root = Element::new("source")
        .attr("version", SCHEMA_VERSION)
        .attr("updated", Timestamp::now().format())
        .child(Element::new("kind").text(match s.kind {
            SourceKind::Scm => "scm",
            SourceKind::Dts => "dts",
        }))
        .child(Element::new("nickname").text(nickname_field))
        .child(Element::new("plugin").text(s.plugin.clone()))
        .child(Element::new("server").text(s.server.clone()))
        .child(Element::new("user").text(s.user.clone()))
        .child(Element::new("module").text(s.module.clone()))
        .child(Element::new("moddate-field").text(s.moddate_field.clone()))
        .child(Element::new("moduser-field").text(s.moduser_field.clone()));

    let (enc, obfuscated) = password::obfuscate(&s.password, &s.nickname, &s.server);
    root = if obfuscated {
        root.child(Element::new("epassword").text(enc))
    } else {
        root.child(Element::new("password").text(enc))
    };

    for fs_ in &s.filter_sets {
        let mut fset = Element::new("filter-set").attr("name", fs_.name.clone());
        for rule in &fs_.rules {
            fset = fset.child(
                Element::new("rule")
                    .attr("field", rule.field.clone())
                    .attr("pattern", rule.pattern.clone()),
            );
        }
        root = root.child(fset);
    }

    for (k, v) in &s.attrs {
        root = root.child(
            Element::new("attr")
                .attr("key", k.clone())
                .attr("value", v.clone()),
        );
    }

    root
}

fn source_from_element(root: &Element) -> ReplResult<Source> {
    let kind = match root.child_text("kind") {
        Some("dts") => SourceKind::Dts,
        _ => SourceKind::Scm,
    };
    let nickname = root.child_text("nickname").unwrap_or_default().to_string();
    let server = root.child_text("server").unwrap_or_default().to_string();

    let password = if let Some(enc) = root.child_text("epassword") {
        password::deobfuscate(enc, &nickname, &server)
            .ok_or_else(|| ReplError::Config(format!("malformed epassword for {}", nickname)))?
    } else {
        root.child_text("password").unwrap_or_default().to_string()
    };

    let mut filter_sets = Vec::new();
    for fset in root.children_named("filter-set") {
        let name = fset.get_attr("name").unwrap_or_default().to_string();
        let rules = fset
            .children_named("rule")
            .map(|r| FilterRule {
                field: r.get_attr("field").unwrap_or_default().to_string(),
                pattern: r.get_attr("pattern").unwrap_or_default().to_string(),
            })
            .collect();
        filter_sets.push(FilterSet {
            name,
            rules,
            refcnt: 0,
        });
    }

    let attrs = root
        .children_named("attr")
        .map(|a| {
            (
                a.get_attr("key").unwrap_or_default().to_string(),
                a.get_attr("value").unwrap_or_default().to_string(),
            )
        })
        .collect();

    Ok(Source {
        kind,
        nickname,
        plugin: root.child_text("plugin").unwrap_or_default().to_string(),
        server,
        user: root.child_text("user").unwrap_or_default().to_string(),
        password,
        module: root.child_text("module").unwrap_or_default().to_string(),
        moddate_field: root
            .child_text("moddate-field")
            .unwrap_or_default()
            .to_string(),
        moduser_field: root
            .child_text("moduser-field")
            .unwrap_or_default()
            .to_string(),
        filter_sets,
        attrs,
        cached_fields: Vec::new(),
        cached_modules: Vec::new(),
        status: Default::default(),
        warnings: None,
        error: None,
        version: None,
        accept_utf8: Default::default(),
        seg_ok: false,
        refcnt: 0,
    })
}

// --------------------------------------------------------------- mapping

pub fn load_mapping(path: &Path) -> ReplResult<DataMapping> {
    let xml = read_to_string(path)?;
    let root = xmltree::parse(&xml)?;
    mapping_from_element(&root)
}

pub fn save_mapping(path: &Path, mapping: &DataMapping) -> ReplResult<()> {
    let el = mapping_to_element(mapping);
    let xml = xmltree::render(&el)?;
    write_with_backup(path, &xml)
}

fn copy_type_str(t: CopyType) -> &'static str {
    match t {
        CopyType::Text => "text",
        CopyType::Word => "word",
        CopyType::Line => "line",
        CopyType::Date => "date",
        CopyType::Map => "map",
        CopyType::Unmap => "unmap",
    }
}

fn copy_type_from_str(s: &str) -> CopyType {
    match s {
        "word" => CopyType::Word,
        "line" => CopyType::Line,
        "date" => CopyType::Date,
        "map" => CopyType::Map,
        "unmap" => CopyType::Unmap,
        _ => CopyType::Text,
    }
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Scm => "scm",
        Side::Dts => "dts",
    }
}

fn side_from_str(s: &str) -> Option<Side> {
    match s {
        "scm" => Some(Side::Scm),
        "dts" => Some(Side::Dts),
        _ => None,
    }
}

fn copy_rule_to_element(tag: &str, r: &CopyRule) -> Element {
    let mut el = Element::new(tag)
        .attr("scm-field", r.scm_field.clone())
        .attr("dts-field", r.dts_field.clone())
        .attr("copy-type", copy_type_str(r.copy_type))
        .attr("truncate", bool_str(r.truncate));
    if let Some(side) = r.mirror_conflict {
        el = el.attr("mirror-conflict", side_str(side));
    }
    for m in &r.maps {
        el = el.child(
            Element::new("map")
                .attr("value1", m.value1.clone())
                .attr("value2", m.value2.clone()),
        );
    }
    el
}

fn copy_rule_from_element(e: &Element) -> CopyRule {
    CopyRule {
        scm_field: e.get_attr("scm-field").unwrap_or_default().to_string(),
        dts_field: e.get_attr("dts-field").unwrap_or_default().to_string(),
        copy_type: copy_type_from_str(e.get_attr("copy-type").unwrap_or_default()),
        truncate: e.get_attr("truncate").map(parse_bool).unwrap_or(false),
        mirror_conflict: e.get_attr("mirror-conflict").and_then(side_from_str),
        maps: e
            .children_named("map")
            .map(|m| CopyMap {
                value1: m.get_attr("value1").unwrap_or_default().to_string(),
                value2: m.get_attr("value2").unwrap_or_default().to_string(),
            })
            .collect(),
    }
}

fn fix_action_str(a: FixAction) -> &'static str {
    match a {
        FixAction::Append => "append",
        FixAction::Replace => "replace",
    }
}

fn fix_action_from_str(s: &str) -> FixAction {
    match s {
        "replace" => FixAction::Replace,
        _ => FixAction::Append,
    }
}

fn fix_rule_to_element(r: &FixRule) -> Element {
    Element::new("fix-rule")
        .attr("dts-field", r.dts_field.clone())
        .attr("action", fix_action_str(r.action))
        .attr("include-files", bool_str(r.include_files))
        .attr("include-change", bool_str(r.include_change))
        .attr("include-description", bool_str(r.include_description))
        .attr("include-fixed-by", bool_str(r.include_fixed_by))
        .attr("include-fixed-date", bool_str(r.include_fixed_date))
}

fn fix_rule_from_element(e: &Element) -> FixRule {
    FixRule {
        dts_field: e.get_attr("dts-field").unwrap_or_default().to_string(),
        action: fix_action_from_str(e.get_attr("action").unwrap_or_default()),
        include_files: e.get_attr("include-files").map(parse_bool).unwrap_or(false),
        include_change: e
            .get_attr("include-change")
            .map(parse_bool)
            .unwrap_or(false),
        include_description: e
            .get_attr("include-description")
            .map(parse_bool)
            .unwrap_or(false),
        include_fixed_by: e
            .get_attr("include-fixed-by")
            .map(parse_bool)
            .unwrap_or(false),
        include_fixed_date: e
            .get_attr("include-fixed-date")
            .map(parse_bool)
            .unwrap_or(false),
    }
}

fn conflict_policy_str(p: ConflictPolicy) -> &'static str {
    match p {
        ConflictPolicy::Scm => "scm",
        ConflictPolicy::Dts => "dts",
        ConflictPolicy::Newer => "newer",
        ConflictPolicy::Error => "error",
    }
}

fn conflict_policy_from_str(s: &str) -> ConflictPolicy {
    match s {
        "scm" => ConflictPolicy::Scm,
        "dts" => ConflictPolicy::Dts,
        "error" => ConflictPolicy::Error,
        _ => ConflictPolicy::Newer,
    }
}

fn mapping_to_element(m: &DataMapping) -> Element {
    let attrs = &m.attrs;
    let mut root = Element::new("mapping")
        .attr("version", SCHEMA_VERSION)
        .attr("updated", Timestamp::now().format())
        .child(Element::new("id").text(m.id.clone()))
        .child(Element::new("scm-id").text(m.scm_id.clone()))
        .child(Element::new("dts-id").text(m.dts_id.clone()))
        .child(Element::new("mirror-conflicts").text(conflict_policy_str(m.mirror_conflicts)))
        .child(Element::new("recheck-on-new-scm").text(bool_str(m.recheck_on_new_scm)))
        .child(Element::new("recheck-on-new-dts").text(bool_str(m.recheck_on_new_dts)))
        .child(
            Element::new("attrs")
                .attr("log-level", attrs.log_level.to_string())
                .attr("polling-period", attrs.polling_period.to_string())
                .attr("connection-reset", attrs.connection_reset.to_string())
                .attr("wait-duration", attrs.wait_duration.to_string())
                .attr("cycle-threshold", attrs.cycle_threshold.to_string())
                .attr("update-period", attrs.update_period.to_string())
                .attr(
                    "enable-write-to-readonly",
                    bool_str(attrs.enable_write_to_readonly),
                ),
        );

    if let Some(f) = &m.scm_filter {
        root = root.child(Element::new("scm-filter").text(f.clone()));
    }
    if let Some(f) = &m.dts_filter {
        root = root.child(Element::new("dts-filter").text(f.clone()));
    }
    for r in &m.mirror_rules {
        root = root.child(copy_rule_to_element("mirror-rule", r));
    }
    for r in &m.scm_to_dts_rules {
        root = root.child(copy_rule_to_element("scm-to-dts-rule", r));
    }
    for r in &m.dts_to_scm_rules {
        root = root.child(copy_rule_to_element("dts-to-scm-rule", r));
    }
    for r in &m.fix_rules {
        root = root.child(fix_rule_to_element(r));
    }
    root
}

fn mapping_from_element(root: &Element) -> ReplResult<DataMapping> {
    let attrs_el = root.child_named("attrs");
    let attrs = if let Some(a) = attrs_el {
        MappingAttrs {
            log_level: a
                .get_attr("log-level")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            polling_period: a
                .get_attr("polling-period")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            connection_reset: a
                .get_attr("connection-reset")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            wait_duration: a
                .get_attr("wait-duration")
                .and_then(|v| v.parse().ok())
                .unwrap_or(150),
            cycle_threshold: a
                .get_attr("cycle-threshold")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            update_period: a
                .get_attr("update-period")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            enable_write_to_readonly: a
                .get_attr("enable-write-to-readonly")
                .map(parse_bool)
                .unwrap_or(false),
        }
    } else {
        MappingAttrs::default()
    };

    Ok(DataMapping {
        id: root.child_text("id").unwrap_or_default().to_string(),
        scm_id: root.child_text("scm-id").unwrap_or_default().to_string(),
        dts_id: root.child_text("dts-id").unwrap_or_default().to_string(),
        scm_filter: root.child_text("scm-filter").map(str::to_string),
        dts_filter: root.child_text("dts-filter").map(str::to_string),
        mirror_conflicts: conflict_policy_from_str(
            root.child_text("mirror-conflicts").unwrap_or_default(),
        ),
        mirror_rules: root
            .children_named("mirror-rule")
            .map(copy_rule_from_element)
            .collect(),
        scm_to_dts_rules: root
            .children_named("scm-to-dts-rule")
            .map(copy_rule_from_element)
            .collect(),
        dts_to_scm_rules: root
            .children_named("dts-to-scm-rule")
            .map(copy_rule_from_element)
            .collect(),
        fix_rules: root
            .children_named("fix-rule")
            .map(fix_rule_from_element)
            .collect(),
        attrs,
        recheck_on_new_scm: root
            .child_text("recheck-on-new-scm")
            .map(parse_bool)
            .unwrap_or(false),
        recheck_on_new_dts: root
            .child_text("recheck-on-new-dts")
            .map(parse_bool)
            .unwrap_or(false),
    })
}

// -------------------------------------------------------------- settings

pub fn load_settings(path: &Path) -> ReplResult<crate::model::settings::Settings> {
    use crate::model::settings::Settings;

    let xml = read_to_string(path)?;
    let root = xmltree::parse(&xml)?;

    let id = root.child_text("id").unwrap_or_default().to_string();
    let starting_date = Timestamp::parse(root.child_text("starting-date").unwrap_or_default())
        .ok_or_else(|| ReplError::Config(format!("{}: missing starting-date", path.display())))?;

    // Legacy single-watermark files carry `last-update` instead of the pair;
    // copy it into both on load (§4.2 "Legacy settings migration").
    let legacy = root.child_text("last-update").and_then(Timestamp::parse);
    let last_update_scm = root
        .child_text("last-update-scm")
        .and_then(Timestamp::parse)
        .or(legacy)
        .unwrap_or(starting_date);
    let last_update_dts = root
        .child_text("last-update-dts")
        .and_then(Timestamp::parse)
        .or(legacy)
        .unwrap_or(starting_date);
    let force = root.child_text("force").map(parse_bool).unwrap_or(false);

    Ok(Settings {
        id,
        starting_date,
        last_update_scm,
        last_update_dts,
        force,
        dirty: false,
    })
}

pub fn save_settings(path: &Path, settings: &crate::model::settings::Settings) -> ReplResult<()> {
    let root = Element::new("settings")
        .attr("version", SCHEMA_VERSION)
        .attr("updated", Timestamp::now().format())
        .child(Element::new("id").text(settings.id.clone()))
        .child(Element::new("starting-date").text(settings.starting_date.format()))
        .child(Element::new("last-update-scm").text(settings.last_update_scm.format()))
        .child(Element::new("last-update-dts").text(settings.last_update_dts.format()))
        .child(Element::new("force").text(bool_str(settings.force)));
    let xml = xmltree::render(&root)?;
    write_with_backup(path, &xml)
}

// Field descriptors travel over the wire from adapters, not through config
// files, but the type/readonly string forms are shared with the log and fix
// renderer, so expose them here for reuse.
pub fn field_type_str(t: FieldType) -> &'static str {
    match t {
        FieldType::Word => "word",
        FieldType::Date => "date",
        FieldType::Line => "line",
        FieldType::Text => "text",
        FieldType::Select => "select",
        FieldType::Fix => "fix",
    }
}

pub fn readonly_str(r: ReadOnly) -> &'static str {
    match r {
        ReadOnly::ReadWrite => "rw",
        ReadOnly::ReadOnly => "ro",
        ReadOnly::ModDate => "moddate",
        ReadOnly::ModUser => "moduser",
        ReadOnly::DefectId => "defectid",
    }
}
