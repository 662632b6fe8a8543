//! Close-visit dialog. Independent of ending individual stages.

use serde_json::{Map, Value};

use super::WorkflowError;
use crate::models::{CloseVisitStatus, UptResult, VisitType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseVisitReason {
    Completed(UptResult),
    Cancelled(String),
}

impl CloseVisitReason {
    pub fn status(&self) -> CloseVisitStatus {
        match self {
            Self::Completed(_) => CloseVisitStatus::Completed,
            Self::Cancelled(_) => CloseVisitStatus::Cancelled,
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Completed(upt) => upt.as_str(),
            Self::Cancelled(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseVisitForm {
    pub visit_type: VisitType,
    /// Treatment cycle id or consultation id, depending on `visit_type`.
    pub visit_id: i64,
    pub status: Option<CloseVisitStatus>,
    pub upt: Option<UptResult>,
    pub cancel_text: String,
}

impl CloseVisitForm {
    pub fn new(visit_type: VisitType, visit_id: i64) -> Self {
        Self {
            visit_type,
            visit_id,
            status: None,
            upt: None,
            cancel_text: String::new(),
        }
    }

    pub fn completed(mut self, upt: UptResult) -> Self {
        self.status = Some(CloseVisitStatus::Completed);
        self.upt = Some(upt);
        self
    }

    pub fn cancelled(mut self, text: &str) -> Self {
        self.status = Some(CloseVisitStatus::Cancelled);
        self.cancel_text = text.to_string();
        self
    }

    pub fn validate(&self) -> Result<CloseVisit, WorkflowError> {
        let reason = match self.status {
            None => return Err(WorkflowError::MissingCloseReason),
            Some(CloseVisitStatus::Completed) => {
                CloseVisitReason::Completed(self.upt.ok_or(WorkflowError::MissingUptResult)?)
            }
            Some(CloseVisitStatus::Cancelled) => {
                let text = self.cancel_text.trim();
                if text.is_empty() {
                    return Err(WorkflowError::MissingCancelText);
                }
                CloseVisitReason::Cancelled(text.to_string())
            }
        };

        Ok(CloseVisit {
            visit_type: self.visit_type,
            visit_id: self.visit_id,
            reason,
        })
    }
}

/// A validated close-visit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseVisit {
    pub visit_type: VisitType,
    pub visit_id: i64,
    pub reason: CloseVisitReason,
}

impl CloseVisit {
    pub fn id_field(&self) -> &'static str {
        match self.visit_type {
            VisitType::Treatment => "treatmentCycleId",
            VisitType::Consultation => "consultationId",
        }
    }

    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(self.id_field().to_string(), Value::from(self.visit_id));
        payload.insert(
            "visitClosedStatus".to_string(),
            Value::from(self.reason.status().as_str()),
        );
        payload.insert(
            "visitClosedReason".to_string(),
            Value::from(self.reason.detail()),
        );
        Value::Object(payload)
    }
}
