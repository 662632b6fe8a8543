//! Typed commands for the stage modal and their translation into
//! `updateTreatmentStatus` requests.
//!
//! Sheet components depend on [`WorkflowCommand`] rather than on concrete
//! callbacks. Planning a command checks the guards against the last fetched
//! status and yields the request plus what to do once it succeeds.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use super::{sheet_panels, stage_state, BoardContext, EndTreatmentForm, Panel, StageState, WorkflowError};
use crate::api::TreatmentStatusUpdate;
use crate::models::{Flag, Stage, TreatmentStatus, TreatmentTypeId, TRIGGER_START};

/// Wire format of `hysteroscopyTime`.
pub const HYSTEROSCOPY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowCommand {
    /// Consent reviewed; start the stage.
    StartStage(Stage),
    /// Save one sheet of an active or ended stage.
    UpdateSheet {
        stage: Stage,
        panel: Panel,
        data: Value,
    },
    EndStage(EndTreatmentForm),
    FireTrigger,
}

/// Follow-up applied locally after the mutation succeeds. Every variant is
/// followed by a status refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSuccess {
    Refetch,
    /// Keep the returned default sheet template, if any.
    StoreTemplate,
    /// Keep the returned hysteroscopy template, if any.
    StoreHysteroscopyTemplate,
    /// Close the open modal.
    CloseModal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub request: TreatmentStatusUpdate,
    pub on_success: AfterSuccess,
}

/// Visit-level inputs needed to build requests.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    pub visit_id: i64,
    pub treatment_type: TreatmentTypeId,
    pub hysteroscopy_time: Option<NaiveDateTime>,
    pub hysteroscopy_template: bool,
}

impl PlanContext {
    fn board_context(&self) -> BoardContext {
        BoardContext {
            treatment_type: self.treatment_type,
            hysteroscopy_template: self.hysteroscopy_template,
        }
    }

    fn request(&self, stage: String, fields: Map<String, Value>) -> TreatmentStatusUpdate {
        TreatmentStatusUpdate {
            visit_id: self.visit_id,
            stage,
            treatment_type: self.treatment_type,
            fields,
        }
    }
}

fn require_state(
    status: &TreatmentStatus,
    stage: Stage,
    action: &'static str,
    allowed: &[StageState],
) -> Result<StageState, WorkflowError> {
    let state = stage_state(Some(status), stage);
    if state == StageState::NotApplicable {
        return Err(WorkflowError::StageNotApplicable(stage));
    }
    if !allowed.contains(&state) {
        return Err(WorkflowError::ActionNotAllowed { stage, action, state });
    }
    Ok(state)
}

pub fn update_stage_name(stage: Stage) -> String {
    format!("UPDATE_{}", stage.as_str())
}

pub fn plan(
    command: &WorkflowCommand,
    status: Option<&TreatmentStatus>,
    ctx: &PlanContext,
) -> Result<MutationPlan, WorkflowError> {
    let status = status.ok_or(WorkflowError::StatusNotLoaded)?;

    match command {
        WorkflowCommand::StartStage(stage) => {
            let stage = *stage;
            // A started hysteroscopy without a template can ask for one again.
            let allowed: &[StageState] = if stage == Stage::Hysteroscopy && !ctx.hysteroscopy_template {
                &[StageState::NotStarted, StageState::InProgress]
            } else {
                &[StageState::NotStarted]
            };
            require_state(status, stage, "start", allowed)?;

            let mut fields = Map::new();
            let on_success = match stage {
                Stage::Hysteroscopy => {
                    let time = ctx
                        .hysteroscopy_time
                        .ok_or(WorkflowError::MissingHysteroscopyTime)?;
                    fields.insert(
                        "hysteroscopyTime".to_string(),
                        Value::from(time.format(HYSTEROSCOPY_TIME_FORMAT).to_string()),
                    );
                    AfterSuccess::StoreHysteroscopyTemplate
                }
                Stage::Icsi if ctx.treatment_type.skips_cycle_sheets() => AfterSuccess::CloseModal,
                _ => AfterSuccess::StoreTemplate,
            };

            Ok(MutationPlan {
                request: ctx.request(stage.start_flag().to_string(), fields),
                on_success,
            })
        }
        WorkflowCommand::UpdateSheet { stage, panel, data } => {
            let stage = *stage;
            require_state(status, stage, "update", &[StageState::InProgress, StageState::Ended])?;

            let field = panel
                .payload_field()
                .filter(|_| sheet_panels(stage, &ctx.board_context()).contains(panel))
                .ok_or(WorkflowError::ActionNotAllowed {
                    stage,
                    action: "update this sheet of",
                    state: stage_state(Some(status), stage),
                })?;

            let mut fields = Map::new();
            fields.insert(field.to_string(), data.clone());
            let on_success = match stage {
                Stage::Hysteroscopy => AfterSuccess::StoreHysteroscopyTemplate,
                _ => AfterSuccess::StoreTemplate,
            };
            Ok(MutationPlan {
                request: ctx.request(update_stage_name(stage), fields),
                on_success,
            })
        }
        WorkflowCommand::EndStage(form) => {
            require_state(status, form.stage, "end", &[StageState::InProgress])?;
            let end = form.validate()?;
            Ok(MutationPlan {
                request: ctx.request(end.stage.end_flag().to_string(), end.payload_fields()),
                on_success: AfterSuccess::CloseModal,
            })
        }
        WorkflowCommand::FireTrigger => match status.flag(TRIGGER_START) {
            Flag::Absent => Err(WorkflowError::TriggerNotApplicable),
            Flag::On => Err(WorkflowError::TriggerAlreadyFired),
            Flag::Off => Ok(MutationPlan {
                request: ctx.request(TRIGGER_START.to_string(), Map::new()),
                on_success: AfterSuccess::Refetch,
            }),
        },
    }
}
