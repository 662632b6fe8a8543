//! Visit-level orchestration.
//!
//! `TreatmentSession` drives the stage modal: user commands are validated
//! locally, sent once to the backend, and only a successful response leads
//! to a status refetch. `PrescriptionSession` does the same for one
//! prescription modal (patient or spouse) and its bill lines.

use chrono::NaiveDateTime;
use serde_json::Value;
use thiserror::Error;

use crate::api::{
    ApiError, AppointmentRef, ClinicApi, PreviousAppointment, SaveLineBillsRequest, SheetTemplate,
};
use crate::billing::{copy_from_previous, values_for_owner, BillingError, LineBillReconciler};
use crate::models::{Ownership, Stage, TreatmentStatus, TreatmentTypeId};
use crate::treatment::{
    self, board, stage_state, AfterSuccess, BoardContext, CloseVisitForm, ModalAction, ModalKey,
    PlanContext, StageState, TreatmentBoard, WorkflowCommand, WorkflowError,
};

/// Generic toast text for failures the user cannot act on.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] WorkflowError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    /// Text shown to the user in a toast.
    pub fn toast_message(&self) -> String {
        match self {
            SessionError::Validation(e) => e.to_string(),
            SessionError::Billing(e) => e.to_string(),
            SessionError::Api(ApiError::Server { message, .. }) if !message.is_empty() => {
                message.clone()
            }
            SessionError::Api(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub message: String,
    /// False when the mutation succeeded but the status refetch did not.
    pub refreshed: bool,
}

pub struct TreatmentSession<'a> {
    api: &'a dyn ClinicApi,
    token: String,
    visit_id: i64,
    treatment_type: TreatmentTypeId,
    status: Option<TreatmentStatus>,
    template: Option<SheetTemplate>,
    hysteroscopy_template: Option<Value>,
    hysteroscopy_time: Option<NaiveDateTime>,
    modal: Option<ModalKey>,
}

impl<'a> TreatmentSession<'a> {
    pub fn new(
        api: &'a dyn ClinicApi,
        token: &str,
        visit_id: i64,
        treatment_type: TreatmentTypeId,
    ) -> Self {
        Self {
            api,
            token: token.to_string(),
            visit_id,
            treatment_type,
            status: None,
            template: None,
            hysteroscopy_template: None,
            hysteroscopy_time: None,
            modal: None,
        }
    }

    pub fn status(&self) -> Option<&TreatmentStatus> {
        self.status.as_ref()
    }

    pub fn template(&self) -> Option<&SheetTemplate> {
        self.template.as_ref()
    }

    pub fn hysteroscopy_template(&self) -> Option<&Value> {
        self.hysteroscopy_template.as_ref()
    }

    pub fn modal(&self) -> Option<ModalKey> {
        self.modal
    }

    pub fn open_modal(&mut self, key: ModalKey) {
        self.modal = treatment::reduce(self.modal, ModalAction::Open(key));
    }

    pub fn close_modal(&mut self, key: ModalKey) {
        self.modal = treatment::reduce(self.modal, ModalAction::Close(key));
    }

    pub fn select_hysteroscopy_time(&mut self, time: NaiveDateTime) {
        self.hysteroscopy_time = Some(time);
    }

    fn board_context(&self) -> BoardContext {
        BoardContext {
            treatment_type: self.treatment_type,
            hysteroscopy_template: self.hysteroscopy_template.is_some(),
        }
    }

    pub fn board(&self) -> TreatmentBoard {
        board(self.status.as_ref(), &self.board_context())
    }

    /// Fetch the status again. On failure the previous status is kept.
    ///
    /// A started hysteroscopy whose template this session never received
    /// also gets its template fetched.
    pub fn refresh(&mut self) -> Result<&TreatmentStatus, SessionError> {
        let status = self
            .api
            .get_treatment_status(&self.token, self.visit_id, self.treatment_type)
            .inspect_err(|e| {
                tracing::error!(visit_id = self.visit_id, error = %e, "Failed to fetch treatment status");
            })?;

        let inconsistent = status.check_consistency();
        if !inconsistent.is_empty() {
            tracing::warn!(visit_id = self.visit_id, stages = ?inconsistent, "Treatment status has end flags without start");
        }

        let hysteroscopy_started = matches!(
            stage_state(Some(&status), Stage::Hysteroscopy),
            StageState::InProgress | StageState::Ended
        );
        if hysteroscopy_started && self.hysteroscopy_template.is_none() {
            self.load_hysteroscopy_template();
        }
        Ok(&*self.status.insert(status))
    }

    fn load_hysteroscopy_template(&mut self) {
        match self.api.get_hysteroscopy_template(&self.token, self.visit_id) {
            Ok(template) => self.hysteroscopy_template = template,
            Err(e) => {
                tracing::warn!(visit_id = self.visit_id, error = %e, "Failed to fetch hysteroscopy template");
            }
        }
    }

    /// Validate `command` against the current status, send it, and refetch
    /// on success. Nothing local changes when validation or the request fails.
    pub fn dispatch(&mut self, command: WorkflowCommand) -> Result<DispatchOutcome, SessionError> {
        let ctx = PlanContext {
            visit_id: self.visit_id,
            treatment_type: self.treatment_type,
            hysteroscopy_time: self.hysteroscopy_time,
            hysteroscopy_template: self.hysteroscopy_template.is_some(),
        };
        let plan = treatment::plan(&command, self.status.as_ref(), &ctx).inspect_err(|e| {
            tracing::info!(visit_id = self.visit_id, error = %e, "Command rejected before sending");
        })?;

        // Modal open when the request went out; a later modal is left alone.
        let modal_at_dispatch = self.modal;

        let outcome = self
            .api
            .update_treatment_status(&self.token, &plan.request)
            .inspect_err(|e| {
                tracing::error!(
                    visit_id = self.visit_id,
                    stage = %plan.request.stage,
                    error = %e,
                    "Treatment status update failed"
                );
            })?;
        tracing::info!(visit_id = self.visit_id, stage = %plan.request.stage, "Treatment status updated");

        match plan.on_success {
            AfterSuccess::Refetch => {}
            AfterSuccess::StoreTemplate => {
                let returned = outcome.data.filter(|v| !v.is_null()).and_then(|data| {
                    serde_json::from_value(data)
                        .inspect_err(|e| tracing::warn!(error = %e, "Ignoring malformed sheet template"))
                        .ok()
                });
                if returned.is_some() {
                    self.template = returned;
                }
            }
            AfterSuccess::StoreHysteroscopyTemplate => {
                if let Some(data) = outcome.data.filter(|v| !v.is_null()) {
                    self.hysteroscopy_template = Some(data);
                }
            }
            AfterSuccess::CloseModal => {
                if let Some(key) = modal_at_dispatch {
                    self.close_modal(key);
                }
            }
        }

        let refreshed = match self.refresh() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Status refetch after update failed");
                false
            }
        };

        Ok(DispatchOutcome {
            message: outcome.message,
            refreshed,
        })
    }

    /// Close the visit. Validation happens before any request.
    pub fn close_visit(&mut self, form: &CloseVisitForm) -> Result<String, SessionError> {
        let close = form.validate()?;
        let outcome = self.api.close_visit(&self.token, &close).inspect_err(|e| {
            tracing::error!(visit_id = close.visit_id, error = %e, "Closing visit failed");
        })?;
        tracing::info!(
            visit_id = close.visit_id,
            visit_type = close.visit_type.as_str(),
            status = close.reason.status().as_str(),
            "Visit closed"
        );
        self.close_modal(ModalKey::CloseVisit);
        Ok(outcome.message)
    }
}

/// One prescription modal: the bill lines and notes of either the patient
/// or the spouse for an appointment.
pub struct PrescriptionSession<'a> {
    api: &'a dyn ClinicApi,
    token: String,
    appointment: AppointmentRef,
    owner: Ownership,
    reconciler: LineBillReconciler,
    notes: String,
}

impl<'a> PrescriptionSession<'a> {
    /// Fetch the catalog and the appointment's current lines.
    pub fn open(
        api: &'a dyn ClinicApi,
        token: &str,
        appointment: AppointmentRef,
        owner: Ownership,
    ) -> Result<Self, SessionError> {
        let catalog = api.get_bill_type_catalog(token)?;
        if catalog.pharmacy_id().is_none() {
            tracing::warn!("Bill type catalog has no Pharmacy entry; prescriptions disabled");
        }
        let mut session = Self {
            api,
            token: token.to_string(),
            appointment,
            owner,
            reconciler: LineBillReconciler::new(catalog),
            notes: String::new(),
        };
        session.load()?;
        Ok(session)
    }

    pub fn reconciler(&self) -> &LineBillReconciler {
        &self.reconciler
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn owner(&self) -> Ownership {
        self.owner
    }

    /// Replace local lines and notes with what the server holds.
    pub fn load(&mut self) -> Result<(), SessionError> {
        let response = self
            .api
            .get_line_bills_and_notes(&self.token, &self.appointment)?;
        let owned = values_for_owner(&response, self.owner);
        self.reconciler.replace_values(owned.values);
        self.notes = owned.notes;
        Ok(())
    }

    pub fn select(&mut self, bill_type_name: &str, item_ids: &[i64]) -> Result<(), SessionError> {
        Ok(self.reconciler.set_selected_values(bill_type_name, item_ids)?)
    }

    pub fn set_days(&mut self, entry_id: i64, days: u32) -> Result<u32, SessionError> {
        Ok(self.reconciler.handle_days_change(entry_id, days)?)
    }

    pub fn set_intake(&mut self, entry_id: i64, intake: &str) -> Result<u32, SessionError> {
        Ok(self.reconciler.handle_intake_change(entry_id, intake)?)
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
    }

    pub fn previous_appointments(&self, patient_id: i64) -> Result<Vec<PreviousAppointment>, SessionError> {
        Ok(self.api.get_previous_appointments(&self.token, patient_id)?)
    }

    /// Replace the current lines and notes with a copy of a previous
    /// appointment's, all marked UNPAID.
    pub fn copy_from_previous(&mut self, previous: &AppointmentRef) -> Result<(), SessionError> {
        let response = self.api.get_line_bills_and_notes(&self.token, previous)?;
        let copied = copy_from_previous(&response, self.owner);
        tracing::info!(
            from_appointment = previous.appointment_id,
            to_appointment = self.appointment.appointment_id,
            "Copied prescription from previous appointment"
        );
        self.reconciler.replace_values(copied.values);
        self.notes = copied.notes;
        Ok(())
    }

    pub fn save_request(&self) -> SaveLineBillsRequest {
        SaveLineBillsRequest {
            appointment_type: self.appointment.appointment_type,
            appointment_id: self.appointment.appointment_id,
            is_spouse: self.owner,
            notes: self.notes.clone(),
            line_bills: self.reconciler.to_db_format(),
        }
    }

    pub fn save(&self) -> Result<String, SessionError> {
        let request = self.save_request();
        let outcome = self
            .api
            .save_line_bills_and_notes(&self.token, &request)
            .inspect_err(|e| {
                tracing::error!(appointment_id = request.appointment_id, error = %e, "Saving line bills failed");
            })?;
        tracing::info!(
            appointment_id = request.appointment_id,
            bill_types = request.line_bills.len(),
            "Line bills saved"
        );
        Ok(outcome.message)
    }

    pub fn print(&self) -> Result<Vec<u8>, SessionError> {
        Ok(self
            .api
            .print_prescription(&self.token, &self.appointment, self.owner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LineBillsAndNotes, MockClinicApi};
    use crate::models::{
        BillStatus, BillType, BillTypeCatalog, BillTypeId, CatalogItem, EndReasonCode, Flag, Stage,
        VisitType, TRIGGER_START, UptResult,
    };
    use crate::treatment::{EndTreatmentForm, Panel, PrimaryAction, StageState};
    use chrono::NaiveDate;

    fn status_fetches(api: &MockClinicApi) -> usize {
        api.calls()
            .iter()
            .filter(|c| c.as_str() == "get_treatment_status")
            .count()
    }

    #[test]
    fn start_then_refetch_moves_stage_forward() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_IUI", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(2));
        session.refresh().unwrap();
        assert_eq!(
            session.board().stage(Stage::Iui).unwrap().primary_action,
            Some(PrimaryAction::Start)
        );

        let outcome = session.dispatch(WorkflowCommand::StartStage(Stage::Iui)).unwrap();
        assert!(outcome.refreshed);
        assert!(session.template().is_some());
        let view = session.board().stage(Stage::Iui).cloned().unwrap();
        assert_eq!(view.state, StageState::InProgress);
        assert!(view.end_enabled);
        assert_eq!(status_fetches(&api), 2);
    }

    #[test]
    fn icsi_type_six_consent_closes_modal_without_sheets() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_ICSI", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(6));
        session.refresh().unwrap();
        session.open_modal(ModalKey::Stage(Stage::Icsi));
        assert_eq!(session.board().stage(Stage::Icsi).unwrap().panels, vec![Panel::Consent]);

        session.dispatch(WorkflowCommand::StartStage(Stage::Icsi)).unwrap();
        assert_eq!(session.modal(), None);
        assert!(session.template().is_none());
        let view = session.board().stage(Stage::Icsi).cloned().unwrap();
        assert_eq!(view.state, StageState::InProgress);
        assert!(view.panels.is_empty());
    }

    #[test]
    fn validation_failure_sends_nothing() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("START_OITI", 1)
                .with_flag("END_OITI", 0),
        );
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(3));
        session.refresh().unwrap();

        let err = session
            .dispatch(WorkflowCommand::EndStage(EndTreatmentForm::new(Stage::Oiti)))
            .unwrap_err();
        assert_eq!(err.toast_message(), "Please select a reason to end OITI");
        assert!(api.updates().is_empty());
    }

    #[test]
    fn command_before_status_loaded_is_rejected() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag(TRIGGER_START, 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(1));
        let err = session.dispatch(WorkflowCommand::FireTrigger).unwrap_err();
        assert_eq!(err, SessionError::Validation(WorkflowError::StatusNotLoaded));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn server_failure_keeps_modal_and_status() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("FET_START", 1)
                .with_flag("END_FET", 0),
        );
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(4));
        session.refresh().unwrap();
        session.open_modal(ModalKey::EndTreatment(Stage::Fet));

        api.fail_next(ApiError::Server {
            status: 400,
            message: "Embryo transfer details missing".into(),
        });
        let form = EndTreatmentForm::new(Stage::Fet).with_reason(EndReasonCode::UptPositive);
        let err = session.dispatch(WorkflowCommand::EndStage(form.clone())).unwrap_err();

        assert_eq!(err.toast_message(), "Embryo transfer details missing");
        assert_eq!(session.modal(), Some(ModalKey::EndTreatment(Stage::Fet)));
        assert_eq!(session.board().stage(Stage::Fet).unwrap().state, StageState::InProgress);
        assert_eq!(status_fetches(&api), 1);

        session.dispatch(WorkflowCommand::EndStage(form)).unwrap();
        assert_eq!(session.modal(), None);
        let view = session.board().stage(Stage::Fet).cloned().unwrap();
        assert_eq!(view.state, StageState::Ended);
        assert!(!view.end_enabled);
        assert_eq!(api.updates().last().unwrap().fields["fetEndedReason"], "UPT_POSITIVE");
    }

    #[test]
    fn network_failure_gets_generic_toast() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag(TRIGGER_START, 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(1));
        session.refresh().unwrap();
        api.fail_next(ApiError::Connection("http://clinic".into()));
        let err = session.dispatch(WorkflowCommand::FireTrigger).unwrap_err();
        assert_eq!(err.toast_message(), GENERIC_FAILURE_MESSAGE);
        assert!(session.board().trigger.enabled);
    }

    #[test]
    fn end_success_closes_end_dialog() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("START_ERA", 1)
                .with_flag("END_ERA", 0),
        );
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(5));
        session.refresh().unwrap();
        session.open_modal(ModalKey::EndTreatment(Stage::Era));
        session.dispatch(WorkflowCommand::EndStage(EndTreatmentForm::new(Stage::Era))).unwrap();
        assert_eq!(session.modal(), None);
        assert!(api.updates()[0].fields.is_empty());
    }

    #[test]
    fn sheet_update_keeps_modal_open() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("START_IUI", 1)
                .with_flag("END_IUI", 0),
        );
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(2));
        session.refresh().unwrap();
        session.open_modal(ModalKey::Stage(Stage::Iui));
        session
            .dispatch(WorkflowCommand::UpdateSheet {
                stage: Stage::Iui,
                panel: Panel::Scan,
                data: serde_json::json!({"rows": [{"day": 5}]}),
            })
            .unwrap();
        assert_eq!(session.modal(), Some(ModalKey::Stage(Stage::Iui)));
        assert_eq!(api.updates()[0].stage, "UPDATE_IUI");
        assert_eq!(api.updates()[0].fields["scanSheet"]["rows"][0]["day"], 5);
    }

    #[test]
    fn trigger_disabled_after_firing() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag(TRIGGER_START, 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(1));
        session.refresh().unwrap();
        session.dispatch(WorkflowCommand::FireTrigger).unwrap();
        assert!(!session.board().trigger.enabled);
        assert!(matches!(
            session.dispatch(WorkflowCommand::FireTrigger),
            Err(SessionError::Validation(WorkflowError::TriggerAlreadyFired))
        ));
    }

    #[test]
    fn hysteroscopy_time_then_template_then_sheet() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_HYSTEROSCOPY", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(8));
        session.refresh().unwrap();

        assert!(session
            .dispatch(WorkflowCommand::StartStage(Stage::Hysteroscopy))
            .is_err());

        let time = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        session.select_hysteroscopy_time(time);
        session
            .dispatch(WorkflowCommand::StartStage(Stage::Hysteroscopy))
            .unwrap();

        assert_eq!(api.updates()[0].fields["hysteroscopyTime"], "2024-06-03T14:00");
        assert!(session.hysteroscopy_template().is_some());
        assert_eq!(
            session.board().stage(Stage::Hysteroscopy).unwrap().panels,
            vec![Panel::HysteroscopySheet]
        );
    }

    #[test]
    fn null_hysteroscopy_template_keeps_time_picker() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_HYSTEROSCOPY", 0))
            .with_hysteroscopy_template(Value::Null);
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(8));
        session.refresh().unwrap();
        session.select_hysteroscopy_time(
            NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        session
            .dispatch(WorkflowCommand::StartStage(Stage::Hysteroscopy))
            .unwrap();
        assert_eq!(
            session.board().stage(Stage::Hysteroscopy).unwrap().panels,
            vec![Panel::HysteroscopyTimePicker]
        );
    }

    #[test]
    fn close_visit_validates_then_sends() {
        let api = MockClinicApi::new(TreatmentStatus::new());
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(1));
        session.open_modal(ModalKey::CloseVisit);

        let missing = CloseVisitForm::new(VisitType::Treatment, 55);
        assert!(session.close_visit(&missing).is_err());
        assert!(api.closed_visits().is_empty());
        assert_eq!(session.modal(), Some(ModalKey::CloseVisit));

        let form = CloseVisitForm::new(VisitType::Treatment, 55).completed(UptResult::Positive);
        assert_eq!(session.close_visit(&form).unwrap(), "Visit closed");
        assert_eq!(api.closed_visits()[0].visit_id, 55);
        assert_eq!(session.modal(), None);
    }

    #[test]
    fn failed_refetch_reported_not_fatal() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_ERA", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(5));
        session.refresh().unwrap();

        api.fail_next_call("get_treatment_status", ApiError::Connection("http://clinic".into()));
        let outcome = session.dispatch(WorkflowCommand::StartStage(Stage::Era)).unwrap();
        assert!(!outcome.refreshed);
        assert_eq!(api.current_status().flag("START_ERA"), Flag::On);
        assert_eq!(session.board().stage(Stage::Era).unwrap().state, StageState::NotStarted);

        session.refresh().unwrap();
        assert_eq!(session.board().stage(Stage::Era).unwrap().state, StageState::InProgress);
    }

    #[test]
    fn reopened_hysteroscopy_fetches_its_template() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("START_HYSTEROSCOPY", 1)
                .with_flag("END_HYSTEROSCOPY", 0),
        );
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(8));
        session.refresh().unwrap();

        assert!(session.hysteroscopy_template().is_some());
        let view = session.board().stage(Stage::Hysteroscopy).cloned().unwrap();
        assert_eq!(view.panels, vec![Panel::HysteroscopySheet]);
        assert_eq!(view.primary_action, Some(PrimaryAction::Update));

        session
            .dispatch(WorkflowCommand::UpdateSheet {
                stage: Stage::Hysteroscopy,
                panel: Panel::HysteroscopySheet,
                data: serde_json::json!({"findings": "normal cavity"}),
            })
            .unwrap();
        assert_eq!(api.updates()[0].stage, "UPDATE_HYSTEROSCOPY");

        session.refresh().unwrap();
        let fetched = api
            .calls()
            .iter()
            .filter(|c| c.as_str() == "get_hysteroscopy_template")
            .count();
        assert_eq!(fetched, 1);
    }

    #[test]
    fn started_hysteroscopy_without_template_can_resend_start() {
        let api = MockClinicApi::new(
            TreatmentStatus::new()
                .with_flag("START_HYSTEROSCOPY", 1)
                .with_flag("END_HYSTEROSCOPY", 0),
        )
        .with_hysteroscopy_template(Value::Null);
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(8));
        session.refresh().unwrap();

        let view = session.board().stage(Stage::Hysteroscopy).cloned().unwrap();
        assert_eq!(view.panels, vec![Panel::HysteroscopyTimePicker]);
        assert_eq!(view.primary_action, Some(PrimaryAction::Start));

        session.select_hysteroscopy_time(
            NaiveDate::from_ymd_opt(2024, 6, 4)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
        );
        session
            .dispatch(WorkflowCommand::StartStage(Stage::Hysteroscopy))
            .unwrap();
        assert_eq!(api.updates()[0].fields["hysteroscopyTime"], "2024-06-04T10:30");
    }

    #[test]
    fn sheet_update_replaces_template() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_IUI", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(2));
        session.refresh().unwrap();
        session.dispatch(WorkflowCommand::StartStage(Stage::Iui)).unwrap();
        assert_eq!(session.template().unwrap().date.as_deref(), Some("2024-01-15"));

        api.set_sheet_template(serde_json::json!({
            "date": "2024-09-09",
            "follicularSheet": {"rows": [{"day": 9}]},
            "medicationSheet": {"rows": []},
            "scanSheet": {"rows": []}
        }));
        session
            .dispatch(WorkflowCommand::UpdateSheet {
                stage: Stage::Iui,
                panel: Panel::Follicular,
                data: serde_json::json!({"rows": [{"day": 9}]}),
            })
            .unwrap();
        let template = session.template().unwrap();
        assert_eq!(template.date.as_deref(), Some("2024-09-09"));
        assert_eq!(template.follicular_sheet.as_ref().unwrap()["rows"][0]["day"], 9);
    }

    #[test]
    fn update_without_data_keeps_template() {
        let api = MockClinicApi::new(TreatmentStatus::new().with_flag("START_OITI", 0));
        let mut session = TreatmentSession::new(&api, "tok", 10, TreatmentTypeId(3));
        session.refresh().unwrap();
        session.dispatch(WorkflowCommand::StartStage(Stage::Oiti)).unwrap();

        api.set_sheet_template(Value::Null);
        session
            .dispatch(WorkflowCommand::UpdateSheet {
                stage: Stage::Oiti,
                panel: Panel::Scan,
                data: serde_json::json!({"rows": []}),
            })
            .unwrap();
        assert_eq!(session.template().unwrap().date.as_deref(), Some("2024-01-15"));
    }

    // ── Prescription modal ──────────────────────────────────

    const PHARMACY: BillTypeId = BillTypeId(3);

    fn catalog() -> BillTypeCatalog {
        BillTypeCatalog::new(vec![
            BillType {
                id: BillTypeId(1),
                name: "Scan".into(),
                items: vec![CatalogItem { id: 10, name: "TVS".into(), amount: 800.0 }],
            },
            BillType {
                id: PHARMACY,
                name: "Pharmacy".into(),
                items: vec![
                    CatalogItem { id: 1, name: "Progesterone".into(), amount: 120.0 },
                    CatalogItem { id: 2, name: "Letrozole".into(), amount: 80.0 },
                ],
            },
        ])
    }

    fn current() -> AppointmentRef {
        AppointmentRef {
            appointment_type: VisitType::Treatment,
            appointment_id: 900,
        }
    }

    fn previous() -> AppointmentRef {
        AppointmentRef {
            appointment_type: VisitType::Consultation,
            appointment_id: 850,
        }
    }

    fn bills() -> LineBillsAndNotes {
        serde_json::from_value(serde_json::json!({
            "notes": [{"isSpouse": 0, "notes": "Day 2 scan"}],
            "lineBills": [
                {"billTypeId": 3, "isSpouse": 0, "billTypeValues": [
                    {"id": 1, "name": "Progesterone", "amount": 120.0, "status": "PAID",
                     "prescribedQuantity": 6, "prescriptionDetails": "BID", "prescriptionDays": 3}
                ]},
                {"billTypeId": 3, "isSpouse": 1, "billTypeValues": [
                    {"id": 2, "name": "Letrozole", "amount": 80.0, "status": "UNPAID",
                     "prescribedQuantity": 1, "prescriptionDetails": "OD", "prescriptionDays": 1}
                ]}
            ]
        }))
        .unwrap()
    }

    fn api() -> MockClinicApi {
        MockClinicApi::new(TreatmentStatus::new())
            .with_catalog(catalog())
            .with_line_bills(current(), bills())
            .with_line_bills(previous(), bills())
    }

    #[test]
    fn open_loads_owner_lines() {
        let api = api();
        let patient = PrescriptionSession::open(&api, "tok", current(), Ownership::Patient).unwrap();
        assert_eq!(patient.notes(), "Day 2 scan");
        let lines = patient.reconciler().values().entries(PHARMACY);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].status, BillStatus::Paid);

        let spouse = PrescriptionSession::open(&api, "tok", current(), Ownership::Spouse).unwrap();
        assert_eq!(spouse.reconciler().values().entries(PHARMACY)[0].id, 2);
        assert_eq!(spouse.notes(), "");
    }

    #[test]
    fn edit_and_save_sends_only_unpaid() {
        let api = api();
        let mut session = PrescriptionSession::open(&api, "tok", current(), Ownership::Patient).unwrap();
        session.select("Pharmacy", &[1, 2]).unwrap();
        session.set_days(2, 3).unwrap();
        assert_eq!(session.set_intake(2, "BID").unwrap(), 6);
        session.set_notes("Start letrozole day 3");

        assert_eq!(session.save().unwrap(), "Prescription saved");
        let saved = &api.saved()[0];
        assert_eq!(saved.is_spouse, Ownership::Patient);
        assert_eq!(saved.notes, "Start letrozole day 3");
        assert_eq!(saved.line_bills.len(), 1);
        let lines = &saved.line_bills[0].bill_type_values;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, 2);
        assert_eq!(lines[0].prescribed_quantity, Some(6));
    }

    #[test]
    fn paid_line_edit_rejected_with_toast() {
        let api = api();
        let mut session = PrescriptionSession::open(&api, "tok", current(), Ownership::Patient).unwrap();
        let err = session.set_days(1, 10).unwrap_err();
        assert_eq!(err.toast_message(), "Line 1 is already paid and cannot be changed");
    }

    #[test]
    fn copy_from_previous_replaces_with_unpaid() {
        let api = api();
        let mut session = PrescriptionSession::open(&api, "tok", current(), Ownership::Patient).unwrap();
        session.select("Scan", &[10]).unwrap();
        session.set_notes("draft");

        session.copy_from_previous(&previous()).unwrap();
        let values = session.reconciler().values();
        assert!(values.entries(BillTypeId(1)).is_empty());
        let pharmacy = values.entries(PHARMACY);
        assert_eq!(pharmacy.len(), 1);
        assert_eq!(pharmacy[0].status, BillStatus::Unpaid);
        assert_eq!(pharmacy[0].prescribed_quantity, Some(6));
        assert_eq!(session.notes(), "Day 2 scan");
        assert_eq!(session.save_request().line_bills[0].bill_type_values.len(), 1);
    }

    #[test]
    fn failed_save_keeps_local_edits() {
        let api = api();
        let mut session = PrescriptionSession::open(&api, "tok", current(), Ownership::Spouse).unwrap();
        session.set_intake(2, "2TID").unwrap();
        api.fail_next(ApiError::Server {
            status: 400,
            message: "Appointment locked".into(),
        });
        let err = session.save().unwrap_err();
        assert_eq!(err.toast_message(), "Appointment locked");
        assert_eq!(
            session.reconciler().values().entries(PHARMACY)[0].prescribed_quantity,
            Some(6)
        );
        assert!(api.saved().is_empty());
    }

    #[test]
    fn print_and_previous_appointments() {
        let api = api().with_previous_appointments(vec![PreviousAppointment {
            appointment_type: VisitType::Consultation,
            appointment_id: 850,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            label: Some("Baseline".into()),
        }]);
        let session = PrescriptionSession::open(&api, "tok", current(), Ownership::Spouse).unwrap();
        let list = session.previous_appointments(77).unwrap();
        assert_eq!(list[0].reference(), previous());

        let pdf = session.print().unwrap();
        assert_eq!(pdf, b"%PDF-mock Treatment 900 1".to_vec());
    }
}
