//! Field values on the wire are always strings tagged by a [`FieldType`];
//! interpretation is per [`crate::model::mapping::CopyRule`]. This module
//! never assumes numeric/date types end-to-end (design note in §9).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Word,
    Date,
    Line,
    Text,
    Select,
    Fix,
}

/// Mirrors the plugin SDK's `readonly` marker values exactly so a wire value
/// received from an adapter can be matched without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReadOnly {
    ReadWrite = 0,
    ReadOnly = 1,
    ModDate = 2,
    ModUser = 3,
    DefectId = 4,
}

impl ReadOnly {
    pub fn is_writable(&self) -> bool {
        matches!(self, ReadOnly::ReadWrite)
    }
}

/// Field descriptor as returned by an adapter's `list_fields`.
///
/// Pseudo-fields injected by the adapter layer (`DTGConfig-*`,
/// `DTGAttribute-*`, see §6) carry `pseudo = true` and must be skipped by
/// segmentation logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDesc {
    pub name: String,
    pub ty: FieldType,
    pub readonly: ReadOnly,
    pub select_values: Vec<String>,
    #[serde(default)]
    pub pseudo: bool,
}

impl FieldDesc {
    pub fn is_pseudo_name(name: &str) -> bool {
        name.starts_with("DTGConfig-") || name.starts_with("DTGAttribute-")
    }
}

/// Engine-reserved field names on the SCM side (§6).
pub const DTG_DTISSUE: &str = "DTG_DTISSUE";
pub const DTG_FIXES: &str = "DTG_FIXES";
pub const DTG_ERROR: &str = "DTG_ERROR";
pub const DTG_MAPID: &str = "DTG_MAPID";
