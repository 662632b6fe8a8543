//! In-process stand-in for the clinic backend.
//!
//! Applies the flag changes a real backend would make on successful
//! mutations, records every call, and can be told to fail the next call.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::error::ApiError;
use super::types::*;
use super::ClinicApi;
use crate::models::{BillTypeCatalog, Flag, Ownership, Stage, TreatmentStatus, TreatmentTypeId, TRIGGER_START};
use crate::treatment::{update_stage_name, CloseVisit};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockClinicApi {
    status: Mutex<TreatmentStatus>,
    sheet_template: Mutex<Value>,
    hysteroscopy_template: Value,
    catalog: BillTypeCatalog,
    line_bills: Mutex<HashMap<AppointmentRef, LineBillsAndNotes>>,
    previous: Vec<PreviousAppointment>,
    failures: Mutex<VecDeque<(Option<&'static str>, ApiError)>>,
    calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<TreatmentStatusUpdate>>,
    closed_visits: Mutex<Vec<CloseVisit>>,
    saved: Mutex<Vec<SaveLineBillsRequest>>,
}

impl MockClinicApi {
    pub fn new(status: TreatmentStatus) -> Self {
        Self {
            status: Mutex::new(status),
            sheet_template: Mutex::new(serde_json::json!({
                "date": "2024-01-15",
                "follicularSheet": {"rows": []},
                "medicationSheet": {"rows": []},
                "scanSheet": {"rows": []}
            })),
            hysteroscopy_template: serde_json::json!({"findings": "", "procedure": ""}),
            catalog: BillTypeCatalog::default(),
            line_bills: Mutex::new(HashMap::new()),
            previous: Vec::new(),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            closed_visits: Mutex::new(Vec::new()),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: BillTypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_line_bills(self, appointment: AppointmentRef, bills: LineBillsAndNotes) -> Self {
        lock(&self.line_bills).insert(appointment, bills);
        self
    }

    pub fn with_previous_appointments(mut self, previous: Vec<PreviousAppointment>) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_hysteroscopy_template(mut self, template: Value) -> Self {
        self.hysteroscopy_template = template;
        self
    }

    /// Template returned by later start and sheet-update calls.
    pub fn set_sheet_template(&self, template: Value) {
        *lock(&self.sheet_template) = template;
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: ApiError) {
        lock(&self.failures).push_back((None, err));
    }

    /// Make the next call to `call` fail with `err`; other calls go through.
    pub fn fail_next_call(&self, call: &'static str, err: ApiError) {
        lock(&self.failures).push_back((Some(call), err));
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn updates(&self) -> Vec<TreatmentStatusUpdate> {
        lock(&self.updates).clone()
    }

    pub fn closed_visits(&self) -> Vec<CloseVisit> {
        lock(&self.closed_visits).clone()
    }

    pub fn saved(&self) -> Vec<SaveLineBillsRequest> {
        lock(&self.saved).clone()
    }

    pub fn current_status(&self) -> TreatmentStatus {
        lock(&self.status).clone()
    }

    fn record(&self, call: &str) -> Result<(), ApiError> {
        lock(&self.calls).push(call.to_string());
        let mut failures = lock(&self.failures);
        let position = failures
            .iter()
            .position(|(target, _)| target.map_or(true, |t| t == call));
        match position.and_then(|i| failures.remove(i)) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn sheet_template(&self) -> Value {
        lock(&self.sheet_template).clone()
    }

    /// Flag changes and returned data for a successful update.
    fn apply(&self, update: &TreatmentStatusUpdate) -> Option<Value> {
        let mut status = lock(&self.status);
        if update.stage == TRIGGER_START {
            status.set(TRIGGER_START, 1);
            return None;
        }
        if update.stage == update_stage_name(Stage::Hysteroscopy) {
            return Some(self.hysteroscopy_template.clone());
        }
        if update.stage.starts_with("UPDATE_") {
            return Some(self.sheet_template());
        }
        for stage in Stage::ALL {
            if update.stage == stage.start_flag() {
                status.set(stage.start_flag(), 1);
                status.set(stage.end_flag(), 0);
                return match stage {
                    Stage::Hysteroscopy => Some(self.hysteroscopy_template.clone()),
                    Stage::Icsi if update.treatment_type.skips_cycle_sheets() => None,
                    _ => Some(self.sheet_template()),
                };
            }
            if update.stage == stage.end_flag() {
                status.set(stage.end_flag(), 1);
                return None;
            }
        }
        None
    }
}

impl ClinicApi for MockClinicApi {
    fn get_treatment_status(
        &self,
        _token: &str,
        _visit_id: i64,
        _treatment_type: TreatmentTypeId,
    ) -> Result<TreatmentStatus, ApiError> {
        self.record("get_treatment_status")?;
        Ok(self.current_status())
    }

    fn update_treatment_status(
        &self,
        _token: &str,
        update: &TreatmentStatusUpdate,
    ) -> Result<MutationOutcome, ApiError> {
        self.record("update_treatment_status")?;
        lock(&self.updates).push(update.clone());
        let data = self.apply(update);
        Ok(MutationOutcome {
            data,
            message: format!("{} saved", update.stage),
        })
    }

    fn get_hysteroscopy_template(&self, _token: &str, _visit_id: i64) -> Result<Option<Value>, ApiError> {
        self.record("get_hysteroscopy_template")?;
        let started = lock(&self.status).flag(Stage::Hysteroscopy.start_flag()) == Flag::On;
        Ok(Some(self.hysteroscopy_template.clone()).filter(|v| started && !v.is_null()))
    }

    fn close_visit(&self, _token: &str, close: &CloseVisit) -> Result<MutationOutcome, ApiError> {
        self.record("close_visit")?;
        lock(&self.closed_visits).push(close.clone());
        Ok(MutationOutcome {
            data: None,
            message: "Visit closed".into(),
        })
    }

    fn get_bill_type_catalog(&self, _token: &str) -> Result<BillTypeCatalog, ApiError> {
        self.record("get_bill_type_catalog")?;
        Ok(self.catalog.clone())
    }

    fn get_line_bills_and_notes(
        &self,
        _token: &str,
        appointment: &AppointmentRef,
    ) -> Result<LineBillsAndNotes, ApiError> {
        self.record("get_line_bills_and_notes")?;
        Ok(lock(&self.line_bills)
            .get(appointment)
            .cloned()
            .unwrap_or_default())
    }

    fn save_line_bills_and_notes(
        &self,
        _token: &str,
        request: &SaveLineBillsRequest,
    ) -> Result<MutationOutcome, ApiError> {
        self.record("save_line_bills_and_notes")?;
        lock(&self.saved).push(request.clone());
        Ok(MutationOutcome {
            data: None,
            message: "Prescription saved".into(),
        })
    }

    fn print_prescription(
        &self,
        _token: &str,
        appointment: &AppointmentRef,
        owner: Ownership,
    ) -> Result<Vec<u8>, ApiError> {
        self.record("print_prescription")?;
        Ok(format!(
            "%PDF-mock {} {} {}",
            appointment.appointment_type,
            appointment.appointment_id,
            owner.is_spouse()
        )
        .into_bytes())
    }

    fn get_previous_appointments(
        &self,
        _token: &str,
        _patient_id: i64,
    ) -> Result<Vec<PreviousAppointment>, ApiError> {
        self.record("get_previous_appointments")?;
        Ok(self.previous.clone())
    }
}
