//! Treatment stage controller.
//!
//! Projects the last fetched [`TreatmentStatus`] onto what the prescription
//! screen shows for each stage. Nothing here transitions state: a stage only
//! moves after a server mutation succeeds and the status is refetched.

pub mod close_visit;
pub mod end;
pub mod modal;
pub mod workflow;

pub use close_visit::*;
pub use end::*;
pub use modal::*;
pub use workflow::*;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Flag, Stage, TreatmentStatus, TreatmentTypeId, TRIGGER_START};

/// Client-side validation failures. Raised before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Treatment status has not been loaded")]
    StatusNotLoaded,

    #[error("{0} is not part of this treatment")]
    StageNotApplicable(Stage),

    #[error("Cannot {action} {stage}: stage is {state}")]
    ActionNotAllowed {
        stage: Stage,
        action: &'static str,
        state: StageState,
    },

    #[error("Please select a reason to end {0}")]
    MissingEndReason(Stage),

    #[error("{reason} is not a valid reason to end {stage}")]
    InvalidEndReason { stage: Stage, reason: String },

    #[error("Please enter the reason for cancelling")]
    MissingCancelText,

    #[error("Please select a hysteroscopy time")]
    MissingHysteroscopyTime,

    #[error("Trigger has already been given")]
    TriggerAlreadyFired,

    #[error("Trigger is not part of this treatment")]
    TriggerNotApplicable,

    #[error("Please select a reason to close the visit")]
    MissingCloseReason,

    #[error("Please select the UPT result")]
    MissingUptResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotApplicable,
    NotStarted,
    InProgress,
    Ended,
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotApplicable => "not applicable",
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryAction {
    Start,
    Update,
}

/// A section of the stage modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Consent,
    HysteroscopyTimePicker,
    Follicular,
    Medication,
    Scan,
    FetSheet,
    EraSheet,
    HysteroscopySheet,
}

impl Panel {
    /// Field name the sheet's data travels under in update payloads.
    pub fn payload_field(&self) -> Option<&'static str> {
        match self {
            Self::Follicular => Some("follicularSheet"),
            Self::Medication => Some("medicationSheet"),
            Self::Scan => Some("scanSheet"),
            Self::FetSheet => Some("fetSheet"),
            Self::EraSheet => Some("eraSheet"),
            Self::HysteroscopySheet => Some("hysteroscopySheet"),
            Self::Consent | Self::HysteroscopyTimePicker => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: Stage,
    pub state: StageState,
    pub primary_action: Option<PrimaryAction>,
    pub end_enabled: bool,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerView {
    pub visible: bool,
    pub enabled: bool,
}

/// Everything the prescription screen renders for one visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreatmentBoard {
    pub stages: Vec<StageView>,
    pub trigger: TriggerView,
}

impl TreatmentBoard {
    pub fn stage(&self, stage: Stage) -> Option<&StageView> {
        self.stages.iter().find(|v| v.stage == stage)
    }
}

/// Inputs besides the status flags that change what a stage shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardContext {
    pub treatment_type: TreatmentTypeId,
    /// A non-null hysteroscopy template has been returned by the start call.
    pub hysteroscopy_template: bool,
}

pub fn stage_state(status: Option<&TreatmentStatus>, stage: Stage) -> StageState {
    let Some(status) = status else {
        return StageState::NotApplicable;
    };

    match (status.flag(stage.start_flag()), status.flag(stage.end_flag())) {
        (Flag::Absent, Flag::On) => {
            tracing::warn!(stage = stage.as_str(), "End flag set on a stage that does not apply");
            StageState::NotApplicable
        }
        (Flag::Absent, _) => StageState::NotApplicable,
        (Flag::Off, Flag::On) => {
            tracing::warn!(stage = stage.as_str(), "End flag set before start; treating as not started");
            StageState::NotStarted
        }
        (Flag::Off, _) => StageState::NotStarted,
        (Flag::On, Flag::On) => StageState::Ended,
        (Flag::On, _) => StageState::InProgress,
    }
}

fn sheet_panels(stage: Stage, ctx: &BoardContext) -> Vec<Panel> {
    match stage {
        Stage::Icsi if ctx.treatment_type.skips_cycle_sheets() => Vec::new(),
        Stage::Icsi | Stage::Iui | Stage::Oiti => {
            vec![Panel::Follicular, Panel::Medication, Panel::Scan]
        }
        Stage::Fet => vec![Panel::FetSheet],
        Stage::Era => vec![Panel::EraSheet],
        Stage::Hysteroscopy if ctx.hysteroscopy_template => vec![Panel::HysteroscopySheet],
        Stage::Hysteroscopy => vec![Panel::HysteroscopyTimePicker],
    }
}

pub fn stage_view(status: Option<&TreatmentStatus>, stage: Stage, ctx: &BoardContext) -> StageView {
    let state = stage_state(status, stage);
    let (primary_action, end_enabled, panels) = match state {
        StageState::NotApplicable => (None, false, Vec::new()),
        StageState::NotStarted => {
            let panel = match stage {
                Stage::Hysteroscopy => Panel::HysteroscopyTimePicker,
                _ => Panel::Consent,
            };
            (Some(PrimaryAction::Start), false, vec![panel])
        }
        // No template yet: the time picker resubmits the start call.
        StageState::InProgress if stage == Stage::Hysteroscopy && !ctx.hysteroscopy_template => {
            (Some(PrimaryAction::Start), true, sheet_panels(stage, ctx))
        }
        StageState::InProgress => (Some(PrimaryAction::Update), true, sheet_panels(stage, ctx)),
        // Ended stages stay editable so post-end corrections can be saved.
        StageState::Ended => (Some(PrimaryAction::Update), false, sheet_panels(stage, ctx)),
    };

    StageView {
        stage,
        state,
        primary_action,
        end_enabled,
        panels,
    }
}

pub fn trigger_view(status: Option<&TreatmentStatus>) -> TriggerView {
    let flag = status.map_or(Flag::Absent, |s| s.flag(TRIGGER_START));
    TriggerView {
        visible: flag != Flag::Absent,
        enabled: flag == Flag::Off,
    }
}

/// Board of every applicable stage. Stages whose flag is absent are omitted.
pub fn board(status: Option<&TreatmentStatus>, ctx: &BoardContext) -> TreatmentBoard {
    let stages = Stage::ALL
        .into_iter()
        .map(|stage| stage_view(status, stage, ctx))
        .filter(|view| view.state != StageState::NotApplicable)
        .collect();

    TreatmentBoard {
        stages,
        trigger: trigger_view(status),
    }
}
