use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use super::types::*;
use super::ClinicApi;
use crate::config::ClinicConfig;
use crate::models::{BillTypeCatalog, Ownership, TreatmentStatus, TreatmentTypeId, VisitType};
use crate::treatment::CloseVisit;

const TREATMENT_STATUS_PATH: &str = "/treatment/status";
const HYSTEROSCOPY_TEMPLATE_PATH: &str = "/treatment/hysteroscopy";
const CLOSE_TREATMENT_PATH: &str = "/treatment-cycle/close";
const CLOSE_CONSULTATION_PATH: &str = "/consultation/close";
const BILL_TYPES_PATH: &str = "/bill-types";
const LINE_BILLS_PATH: &str = "/appointments/line-bills";

/// Blocking HTTP client for the clinic backend.
pub struct HttpClinicApi {
    base_url: String,
    client: Client,
}

impl HttpClinicApi {
    pub fn new(config: &ClinicConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn appointment_path(appointment: &AppointmentRef, suffix: &str) -> String {
        format!(
            "/appointments/{}/{}/{}",
            appointment.appointment_type.as_str(),
            appointment.appointment_id,
            suffix
        )
    }

    fn send(&self, request: RequestBuilder, token: &str) -> Result<Response, ApiError> {
        let response = request
            .bearer_auth(token)
            .send()
            .map_err(|e| ApiError::from_reqwest(e, &self.base_url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Business errors come back as 4xx with the usual envelope; fall
        // back to the raw body when it is not JSON.
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ApiEnvelope<Value>>(&body)
            .ok()
            .and_then(|env| env.message)
            .unwrap_or(body);
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    fn envelope<T: DeserializeOwned>(&self, response: Response) -> Result<(Option<T>, String), ApiError> {
        let envelope: ApiEnvelope<T> = response
            .json()
            .map_err(|e| ApiError::ResponseParsing(e.to_string()))?;
        envelope.into_result()
    }

    fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, token: &str) -> Result<T, ApiError> {
        let response = self.send(request, token)?;
        let (data, _) = self.envelope(response)?;
        data.ok_or(ApiError::MissingData)
    }

    fn mutate<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: &str,
    ) -> Result<MutationOutcome, ApiError> {
        let response = self.send(self.client.post(self.url(path)).json(body), token)?;
        let (data, message) = self.envelope::<Value>(response)?;
        Ok(MutationOutcome {
            data: data.filter(|v| !v.is_null()),
            message,
        })
    }
}

impl ClinicApi for HttpClinicApi {
    fn get_treatment_status(
        &self,
        token: &str,
        visit_id: i64,
        treatment_type: TreatmentTypeId,
    ) -> Result<TreatmentStatus, ApiError> {
        let request = self.client.get(self.url(TREATMENT_STATUS_PATH)).query(&[
            ("visitId", visit_id),
            ("treatmentTypeId", treatment_type.0),
        ]);
        let response = self.send(request, token)?;
        let (data, _) = self.envelope::<TreatmentStatus>(response)?;
        // A visit with no applicable stages comes back without data.
        Ok(data.unwrap_or_default())
    }

    fn update_treatment_status(
        &self,
        token: &str,
        update: &TreatmentStatusUpdate,
    ) -> Result<MutationOutcome, ApiError> {
        tracing::debug!(visit_id = update.visit_id, stage = %update.stage, "POST treatment status");
        self.mutate(TREATMENT_STATUS_PATH, update, token)
    }

    fn get_hysteroscopy_template(&self, token: &str, visit_id: i64) -> Result<Option<Value>, ApiError> {
        let request = self
            .client
            .get(self.url(HYSTEROSCOPY_TEMPLATE_PATH))
            .query(&[("visitId", visit_id)]);
        let response = self.send(request, token)?;
        let (data, _) = self.envelope::<Value>(response)?;
        Ok(data.filter(|v| !v.is_null()))
    }

    fn close_visit(&self, token: &str, close: &CloseVisit) -> Result<MutationOutcome, ApiError> {
        let path = match close.visit_type {
            VisitType::Treatment => CLOSE_TREATMENT_PATH,
            VisitType::Consultation => CLOSE_CONSULTATION_PATH,
        };
        self.mutate(path, &close.to_payload(), token)
    }

    fn get_bill_type_catalog(&self, token: &str) -> Result<BillTypeCatalog, ApiError> {
        self.fetch(self.client.get(self.url(BILL_TYPES_PATH)), token)
    }

    fn get_line_bills_and_notes(
        &self,
        token: &str,
        appointment: &AppointmentRef,
    ) -> Result<LineBillsAndNotes, ApiError> {
        let path = Self::appointment_path(appointment, "line-bills");
        let response = self.send(self.client.get(self.url(&path)), token)?;
        let (data, _) = self.envelope::<LineBillsAndNotes>(response)?;
        Ok(data.unwrap_or_default())
    }

    fn save_line_bills_and_notes(
        &self,
        token: &str,
        request: &SaveLineBillsRequest,
    ) -> Result<MutationOutcome, ApiError> {
        self.mutate(LINE_BILLS_PATH, request, token)
    }

    fn print_prescription(
        &self,
        token: &str,
        appointment: &AppointmentRef,
        owner: Ownership,
    ) -> Result<Vec<u8>, ApiError> {
        let path = Self::appointment_path(appointment, "prescription/print");
        let request = self
            .client
            .get(self.url(&path))
            .query(&[("isSpouse", owner.is_spouse())]);
        let response = self.send(request, token)?;
        let bytes = response
            .bytes()
            .map_err(|e| ApiError::from_reqwest(e, &self.base_url))?;
        Ok(bytes.to_vec())
    }

    fn get_previous_appointments(
        &self,
        token: &str,
        patient_id: i64,
    ) -> Result<Vec<PreviousAppointment>, ApiError> {
        let url = self.url(&format!("/patients/{patient_id}/appointments"));
        let response = self.send(self.client.get(url), token)?;
        let (data, _) = self.envelope::<Vec<PreviousAppointment>>(response)?;
        Ok(data.unwrap_or_default())
    }
}
