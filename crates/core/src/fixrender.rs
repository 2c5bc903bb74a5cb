//! Fix-Detail Renderer (§4.5): formats SCM change metadata into the DTS
//! text field named by a [`FixRule`].

use crate::model::mapping::{FixAction, FixRule};
use crate::plugin::FixDesc;

/// Renders one fix into a text block. Single-component rules (only one of
/// the scalar/description/files flags set, no others) produce the bare
/// component value; otherwise a header line carries the enabled scalars,
/// followed by an optional `Description:` line and an optional `Files:`
/// block. Always newline-terminated.
pub fn render_fix(rule: &FixRule, fix: &FixDesc) -> String {
    if let Some(bare) = bare_component(rule, fix) {
        return ensure_trailing_newline(&bare);
    }

    let mut header_parts = Vec::new();
    if rule.include_change {
        header_parts.push(format!("Change: {}", fix.change));
    }
    if rule.include_fixed_by {
        header_parts.push(format!("User: {}", fix.user));
    }
    if rule.include_fixed_date {
        header_parts.push(format!("Date: {}", fix.stamp));
    }

    let mut block = String::new();
    if !header_parts.is_empty() {
        block.push_str(&header_parts.join(", "));
        block.push('\n');
    }
    if rule.include_description {
        block.push_str("Description: ");
        block.push_str(&fix.desc);
        block.push('\n');
    }
    if rule.include_files && !fix.files.is_empty() {
        block.push_str("Files:\n");
        for f in &fix.files {
            block.push_str(f);
            block.push('\n');
        }
    }
    ensure_trailing_newline(&block)
}

/// If exactly one of the five content flags is set, the rule is rendered
/// as the bare component rather than a labeled, multi-line block.
fn bare_component(rule: &FixRule, fix: &FixDesc) -> Option<String> {
    let flags = [
        rule.include_change,
        rule.include_fixed_by,
        rule.include_fixed_date,
        rule.include_description,
        rule.include_files,
    ];
    if flags.iter().filter(|f| **f).count() != 1 {
        return None;
    }
    if rule.include_change {
        Some(fix.change.clone())
    } else if rule.include_fixed_by {
        Some(fix.user.clone())
    } else if rule.include_fixed_date {
        Some(fix.stamp.to_string())
    } else if rule.include_description {
        Some(fix.desc.clone())
    } else {
        Some(fix.files.join("\n"))
    }
}

fn ensure_trailing_newline(s: &str) -> String {
    let trimmed = s.trim_end_matches('\n');
    format!("{}\n", trimmed)
}

fn deleted_change_line(id: &str) -> String {
    format!("Deleted change {}\n", id)
}

/// Applies the add/remove fix lists to the DTS field's current content
/// (§4.5): appends one rendered block per added fix, then one
/// `Deleted change <id>` line per removed id. On `FixAction::Replace`,
/// `current` is discarded and the field is rebuilt from scratch; on
/// `FixAction::Append`, the new content is separated from the old by
/// exactly one newline if `current` was already newline-terminated, two
/// otherwise.
pub fn apply_fix_ledger(
    rule: &FixRule,
    current: &str,
    added: &[FixDesc],
    removed: &[String],
) -> String {
    let mut addition = String::new();
    for fix in added {
        addition.push_str(&render_fix(rule, fix));
    }
    for id in removed {
        addition.push_str(&deleted_change_line(id));
    }

    if addition.is_empty() {
        return current.to_string();
    }

    match rule.action {
        FixAction::Replace => addition,
        FixAction::Append => {
            if current.is_empty() {
                addition
            } else if current.ends_with('\n') {
                format!("{}{}", current, addition)
            } else {
                format!("{}\n\n{}", current, addition)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::timestamp::Timestamp;

    fn sample_fix() -> FixDesc {
        FixDesc {
            change: "1234".into(),
            user: "a".into(),
            stamp: Timestamp::parse("2024/01/03 00:00:00").unwrap(),
            desc: "fix".into(),
            files: vec!["f.c".into()],
        }
    }

    fn full_rule() -> FixRule {
        FixRule {
            dts_field: "Notes".into(),
            action: FixAction::Append,
            include_files: true,
            include_change: true,
            include_description: true,
            include_fixed_by: true,
            include_fixed_date: true,
        }
    }

    #[test]
    fn multi_component_rule_assembles_header_desc_files() {
        let rendered = render_fix(&full_rule(), &sample_fix());
        assert!(rendered.contains("Change: 1234, User: a, Date: 2024/01/03 00:00:00"));
        assert!(rendered.contains("Description: fix"));
        assert!(rendered.contains("Files:\nf.c"));
        assert!(rendered.ends_with('\n'));
        assert!(!rendered.ends_with("\n\n"));
    }

    #[test]
    fn single_component_rule_is_bare() {
        let mut rule = full_rule();
        rule.include_files = false;
        rule.include_description = false;
        rule.include_fixed_by = false;
        rule.include_fixed_date = false;
        let rendered = render_fix(&rule, &sample_fix());
        assert_eq!(rendered, "1234\n");
    }

    #[test]
    fn apply_ledger_appends_added_and_deleted() {
        let rule = full_rule();
        let out = apply_fix_ledger(&rule, "", &[sample_fix()], &["999".to_string()]);
        assert!(out.contains("Change: 1234"));
        assert!(out.contains("Deleted change 999"));
    }

    #[test]
    fn apply_ledger_separates_from_unterminated_existing_text() {
        let rule = full_rule();
        let out = apply_fix_ledger(&rule, "existing notes", &[sample_fix()], &[]);
        assert!(out.starts_with("existing notes\n\nChange:"));
    }

    #[test]
    fn apply_ledger_with_no_changes_returns_current_unmodified() {
        let rule = full_rule();
        let out = apply_fix_ledger(&rule, "existing notes", &[], &[]);
        assert_eq!(out, "existing notes");
    }
}
