//! Client side of the clinic REST backend.
//!
//! The backend owns every endpoint; this module only describes the calls
//! the treatment and billing flows make. Requests are one-shot: no retry,
//! no backoff, no cancellation.

pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use error::ApiError;
pub use http::HttpClinicApi;
pub use mock::MockClinicApi;
pub use types::*;

use serde_json::Value;

use crate::models::{BillTypeCatalog, Ownership, TreatmentStatus, TreatmentTypeId};
use crate::treatment::CloseVisit;

pub trait ClinicApi: Send + Sync {
    fn get_treatment_status(
        &self,
        token: &str,
        visit_id: i64,
        treatment_type: TreatmentTypeId,
    ) -> Result<TreatmentStatus, ApiError>;

    fn update_treatment_status(
        &self,
        token: &str,
        update: &TreatmentStatusUpdate,
    ) -> Result<MutationOutcome, ApiError>;

    /// Hysteroscopy sheet saved for the visit. `None` until the backend has one.
    fn get_hysteroscopy_template(&self, token: &str, visit_id: i64) -> Result<Option<Value>, ApiError>;

    fn close_visit(&self, token: &str, close: &CloseVisit) -> Result<MutationOutcome, ApiError>;

    fn get_bill_type_catalog(&self, token: &str) -> Result<BillTypeCatalog, ApiError>;

    fn get_line_bills_and_notes(
        &self,
        token: &str,
        appointment: &AppointmentRef,
    ) -> Result<LineBillsAndNotes, ApiError>;

    fn save_line_bills_and_notes(
        &self,
        token: &str,
        request: &SaveLineBillsRequest,
    ) -> Result<MutationOutcome, ApiError>;

    fn print_prescription(
        &self,
        token: &str,
        appointment: &AppointmentRef,
        owner: Ownership,
    ) -> Result<Vec<u8>, ApiError>;

    fn get_previous_appointments(
        &self,
        token: &str,
        patient_id: i64,
    ) -> Result<Vec<PreviousAppointment>, ApiError>;
}
