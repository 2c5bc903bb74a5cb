//! Field Value Converter (§4.4): turns a source-side field value into its
//! target-side counterpart for one [`CopyRule`].

use crate::model::mapping::CopyRule;
use crate::plugin::Adapter;

/// Direction a [`CopyRule::maps`] lookup runs in. `Forward` matches
/// `value1`→`value2` (SCM→DTS and mirror); `Reverse` matches `value2`→
/// `value1` (DTS→SCM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapDirection {
    Forward,
    Reverse,
}

/// Converts `value` (read from the side named implicitly by `direction`)
/// using `rule`. `source_plugin`/`target_plugin` are only consulted for
/// `CopyType::Date`. Unmatched MAP lookups return an empty string and the
/// caller is expected to log it with the current record identifiers (§4.4).
pub fn convert(
    rule: &CopyRule,
    value: &str,
    direction: MapDirection,
    source_plugin: &dyn Adapter,
    target_plugin: &dyn Adapter,
) -> String {
    use crate::model::mapping::CopyType;

    match rule.copy_type {
        CopyType::Text => strip_outer_quotes(value).to_string(),
        CopyType::Word => first_word(value).to_string(),
        CopyType::Line => first_line(value).to_string(),
        CopyType::Date => convert_date(value, source_plugin, target_plugin),
        CopyType::Map => convert_map(rule, value, direction),
        CopyType::Unmap => {
            debug_assert!(false, "UNMAP rule reached the converter; validator should have rejected it");
            String::new()
        }
    }
}

fn strip_outer_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn first_word(value: &str) -> &str {
    match value.find(char::is_whitespace) {
        Some(idx) => &value[..idx],
        None => value,
    }
}

fn first_line(value: &str) -> &str {
    match value.find(['\r', '\n']) {
        Some(idx) => &value[..idx],
        None => value,
    }
}

fn convert_date(value: &str, source_plugin: &dyn Adapter, target_plugin: &dyn Adapter) -> String {
    if value.is_empty() {
        return String::new();
    }
    match source_plugin.extract_date(value) {
        Some(ts) => target_plugin.format_date(ts),
        None => String::new(),
    }
}

fn convert_map(rule: &CopyRule, value: &str, direction: MapDirection) -> String {
    if value.is_empty() {
        return String::new();
    }
    let found = rule.maps.iter().find(|m| match direction {
        MapDirection::Forward => m.value1.eq_ignore_ascii_case(value),
        MapDirection::Reverse => m.value2.eq_ignore_ascii_case(value),
    });
    match found {
        Some(m) => match direction {
            MapDirection::Forward => m.value2.clone(),
            MapDirection::Reverse => m.value1.clone(),
        },
        None => {
            tracing::error!(
                scm_field = %rule.scm_field,
                dts_field = %rule.dts_field,
                value = %value,
                "no select-map entry for value; emitting empty string"
            );
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mapping::{CopyMap, CopyType};
    use crate::model::timestamp::Timestamp;

    struct StubAdapter;
    impl Adapter for StubAdapter {
        fn name(&self) -> &str {
            "stub"
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
        fn connect(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &[(String, String)],
        ) -> crate::plugin::AResult<crate::plugin::ConnHandle> {
            unimplemented!()
        }
        fn disconnect(&self, _: crate::plugin::ConnHandle) {}
        fn server_version(&self, _: crate::plugin::ConnHandle) -> crate::plugin::AResult<String> {
            unimplemented!()
        }
        fn server_warnings(
            &self,
            _: crate::plugin::ConnHandle,
        ) -> crate::plugin::AResult<Vec<String>> {
            unimplemented!()
        }
        fn server_date(
            &self,
            _: crate::plugin::ConnHandle,
        ) -> crate::plugin::AResult<Timestamp> {
            unimplemented!()
        }
        fn list_projects(
            &self,
            _: crate::plugin::ConnHandle,
        ) -> crate::plugin::AResult<Vec<String>> {
            unimplemented!()
        }
        fn get_project(
            &self,
            _: crate::plugin::ConnHandle,
            _: &str,
        ) -> crate::plugin::AResult<crate::plugin::ProjHandle> {
            unimplemented!()
        }
        fn list_fields(
            &self,
            _: crate::plugin::ProjHandle,
        ) -> crate::plugin::AResult<Vec<crate::model::FieldDesc>> {
            unimplemented!()
        }
        fn list_changed_defects(
            &self,
            _: crate::plugin::ProjHandle,
            _: i64,
            _: Timestamp,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> crate::plugin::AResult<Vec<String>> {
            unimplemented!()
        }
        fn get_defect(
            &self,
            _: crate::plugin::ProjHandle,
            _: &str,
        ) -> crate::plugin::AResult<crate::plugin::RecordHandle> {
            unimplemented!()
        }
        fn new_defect(
            &self,
            _: crate::plugin::ProjHandle,
        ) -> crate::plugin::AResult<crate::plugin::RecordHandle> {
            unimplemented!()
        }
        fn get_field(&self, _: crate::plugin::RecordHandle, _: &str) -> Option<String> {
            unimplemented!()
        }
        fn set_field(&self, _: crate::plugin::RecordHandle, _: &str, _: &str) {}
        fn save(
            &self,
            _: crate::plugin::ProjHandle,
            _: crate::plugin::RecordHandle,
        ) -> crate::plugin::AResult<String> {
            unimplemented!()
        }
        fn free(&self, _: crate::plugin::RecordHandle) {}
    }

    fn map_rule() -> CopyRule {
        CopyRule {
            scm_field: "Status".into(),
            dts_field: "State".into(),
            copy_type: CopyType::Map,
            truncate: false,
            mirror_conflict: None,
            maps: vec![
                CopyMap {
                    value1: "open".into(),
                    value2: "Open".into(),
                },
                CopyMap {
                    value1: "closed".into(),
                    value2: "Closed".into(),
                },
            ],
        }
    }

    #[test]
    fn text_strips_outer_quotes() {
        let rule = CopyRule {
            scm_field: "a".into(),
            dts_field: "b".into(),
            copy_type: CopyType::Text,
            truncate: false,
            mirror_conflict: None,
            maps: Vec::new(),
        };
        let stub = StubAdapter;
        assert_eq!(
            convert(&rule, "\"hello\"", MapDirection::Forward, &stub, &stub),
            "hello"
        );
        assert_eq!(
            convert(&rule, "hello", MapDirection::Forward, &stub, &stub),
            "hello"
        );
    }

    #[test]
    fn word_stops_at_whitespace() {
        assert_eq!(first_word("open now"), "open");
        assert_eq!(first_word("open"), "open");
    }

    #[test]
    fn line_stops_at_newline() {
        assert_eq!(first_line("first\nsecond"), "first");
        assert_eq!(first_line("first\r\nsecond"), "first");
    }

    #[test]
    fn map_forward_and_reverse_round_trip() {
        let rule = map_rule();
        let stub = StubAdapter;
        let dts = convert(&rule, "open", MapDirection::Forward, &stub, &stub);
        assert_eq!(dts, "Open");
        let scm = convert(&rule, &dts, MapDirection::Reverse, &stub, &stub);
        assert_eq!(scm.to_lowercase(), "open");
    }

    #[test]
    fn map_unmatched_value_yields_empty() {
        let rule = map_rule();
        let stub = StubAdapter;
        assert_eq!(
            convert(&rule, "unknown", MapDirection::Forward, &stub, &stub),
            ""
        );
    }

    #[test]
    fn date_round_trips_through_same_plugin() {
        let rule = CopyRule {
            scm_field: "Date".into(),
            dts_field: "due".into(),
            copy_type: CopyType::Date,
            truncate: false,
            mirror_conflict: None,
            maps: Vec::new(),
        };
        let stub = StubAdapter;
        let out = convert(&rule, "2024/01/02 03:04:05", MapDirection::Forward, &stub, &stub);
        assert_eq!(out, "2024/01/02 03:04:05");
    }
}
