//! Wire types of the clinic backend. Field names are the backend's.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ApiError;
use crate::models::{BillTypeId, LineBillEntry, LineBillGroup, Ownership, TreatmentTypeId, VisitType};

/// Status the backend puts in the envelope on success.
pub const ENVELOPE_OK: u16 = 200;

/// `{status, data, message}` wrapper used by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: u16,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: ENVELOPE_OK,
            data: Some(data),
            message: None,
        }
    }

    /// Split into data and message, or the server-reported error.
    pub fn into_result(self) -> Result<(Option<T>, String), ApiError> {
        let message = self.message.unwrap_or_default();
        if self.status != ENVELOPE_OK {
            return Err(ApiError::Server {
                status: self.status,
                message,
            });
        }
        Ok((self.data, message))
    }
}

/// Body of `updateTreatmentStatus`. Stage-specific fields are flattened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentStatusUpdate {
    pub visit_id: i64,
    pub stage: String,
    pub treatment_type: TreatmentTypeId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Result of a mutation call. `data` is present when the backend returns a
/// template (stage start).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MutationOutcome {
    pub data: Option<Value>,
    pub message: String,
}

/// Default sheet template returned when a stage starts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTemplate {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub follicular_sheet: Option<Value>,
    #[serde(default)]
    pub medication_sheet: Option<Value>,
    #[serde(default)]
    pub scan_sheet: Option<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Appointment a bill belongs to (`type` + `appointmentId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRef {
    #[serde(rename = "type")]
    pub appointment_type: VisitType,
    pub appointment_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentNotes {
    pub is_spouse: Ownership,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedLineBillGroup {
    pub bill_type_id: BillTypeId,
    pub is_spouse: Ownership,
    #[serde(default)]
    pub bill_type_values: Vec<LineBillEntry>,
}

/// Response of `getLineBillsAndNotesForAppointment`: both sides of the
/// couple, told apart by `isSpouse`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBillsAndNotes {
    #[serde(default)]
    pub notes: Vec<AppointmentNotes>,
    #[serde(default)]
    pub line_bills: Vec<OwnedLineBillGroup>,
}

/// Body of `saveLineBillsAndNotes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLineBillsRequest {
    #[serde(rename = "type")]
    pub appointment_type: VisitType,
    pub appointment_id: i64,
    pub is_spouse: Ownership,
    pub notes: String,
    pub line_bills: Vec<LineBillGroup>,
}

/// Entry of the copy-from-previous selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousAppointment {
    #[serde(rename = "type")]
    pub appointment_type: VisitType,
    pub appointment_id: i64,
    pub date: NaiveDate,
    #[serde(default)]
    pub label: Option<String>,
}

impl PreviousAppointment {
    pub fn reference(&self) -> AppointmentRef {
        AppointmentRef {
            appointment_type: self.appointment_type,
            appointment_id: self.appointment_id,
        }
    }
}
