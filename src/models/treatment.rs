//! Per-visit treatment status flags as the backend reports them.
//!
//! The backend sends a flat object of flag name → integer. A missing key
//! means the stage does not apply to the visit's treatment type, `0` means
//! the stage can be started, anything else means the flag is set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{EndReasonCode, Stage};

pub const TRIGGER_START: &str = "TRIGGER_START";

impl Stage {
    /// Stages in the order the prescription screen lists them.
    pub const ALL: [Stage; 6] = [
        Stage::Icsi,
        Stage::Iui,
        Stage::Oiti,
        Stage::Fet,
        Stage::Era,
        Stage::Hysteroscopy,
    ];

    pub fn start_flag(&self) -> &'static str {
        match self {
            Self::Icsi => "START_ICSI",
            Self::Iui => "START_IUI",
            Self::Oiti => "START_OITI",
            Self::Fet => "FET_START",
            Self::Era => "START_ERA",
            Self::Hysteroscopy => "START_HYSTEROSCOPY",
        }
    }

    pub fn end_flag(&self) -> &'static str {
        match self {
            Self::Icsi => "END_ICSI",
            Self::Iui => "END_IUI",
            Self::Oiti => "END_OITI",
            Self::Fet => "END_FET",
            Self::Era => "END_ERA",
            Self::Hysteroscopy => "END_HYSTEROSCOPY",
        }
    }

    /// Reasons offered by the end-treatment dialog. Empty for stages that
    /// end without a reason.
    pub fn end_reasons(&self) -> &'static [EndReasonCode] {
        match self {
            Self::Icsi => &[EndReasonCode::Freeze, EndReasonCode::Cancel],
            Self::Iui | Self::Oiti | Self::Fet => &[
                EndReasonCode::UptPositive,
                EndReasonCode::UptNegative,
                EndReasonCode::Cancel,
            ],
            Self::Era | Self::Hysteroscopy => &[],
        }
    }

    pub fn requires_end_reason(&self) -> bool {
        !self.end_reasons().is_empty()
    }
}

/// Treatment type of the visit. Types 6 and 7 run ICSI without the
/// follicular/medication/scan sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreatmentTypeId(pub i64);

impl TreatmentTypeId {
    pub fn skips_cycle_sheets(&self) -> bool {
        matches!(self.0, 6 | 7)
    }
}

/// A single status flag after interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Absent,
    Off,
    On,
}

/// Flat flag map returned by `getTreatmentStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreatmentStatus(BTreeMap<String, Option<i64>>);

impl TreatmentStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by tests and the mock backend.
    pub fn with_flag(mut self, name: &str, value: i64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: i64) {
        self.0.insert(name.to_string(), Some(value));
    }

    pub fn flag(&self, name: &str) -> Flag {
        match self.0.get(name) {
            None | Some(None) => Flag::Absent,
            Some(Some(0)) => Flag::Off,
            Some(Some(_)) => Flag::On,
        }
    }

    pub fn trigger_fired(&self) -> bool {
        self.flag(TRIGGER_START) == Flag::On
    }

    /// Stages whose END flag is set while the START flag is not.
    pub fn check_consistency(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| {
                self.flag(stage.end_flag()) == Flag::On && self.flag(stage.start_flag()) != Flag::On
            })
            .collect()
    }
}
