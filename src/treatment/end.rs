//! End-treatment dialog: reason selection and the legacy payload fields.

use serde_json::{Map, Value};

use super::WorkflowError;
use crate::models::{EndReasonCode, Stage};

/// Free-text field carrying the explanation when a stage is cancelled.
pub const CANCEL_REASON_FIELD: &str = "cancelReason";

/// Reason-field name the backend expects per stage. FET is the odd one out.
pub fn legacy_reason_field(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Fet => Some("fetEndedReason"),
        Stage::Icsi | Stage::Iui | Stage::Oiti => Some("endedReason"),
        Stage::Era | Stage::Hysteroscopy => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Freeze,
    UptPositive,
    UptNegative,
    Cancel(String),
}

impl EndReason {
    pub fn code(&self) -> EndReasonCode {
        match self {
            Self::Freeze => EndReasonCode::Freeze,
            Self::UptPositive => EndReasonCode::UptPositive,
            Self::UptNegative => EndReasonCode::UptNegative,
            Self::Cancel(_) => EndReasonCode::Cancel,
        }
    }
}

/// Raw state of the end-treatment dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTreatmentForm {
    pub stage: Stage,
    pub reason: Option<EndReasonCode>,
    pub cancel_text: String,
}

impl EndTreatmentForm {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            reason: None,
            cancel_text: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: EndReasonCode) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_cancel_text(mut self, text: &str) -> Self {
        self.cancel_text = text.to_string();
        self
    }

    pub fn validate(&self) -> Result<EndTreatment, WorkflowError> {
        if !self.stage.requires_end_reason() {
            return Ok(EndTreatment {
                stage: self.stage,
                reason: None,
            });
        }

        let code = self
            .reason
            .ok_or(WorkflowError::MissingEndReason(self.stage))?;
        if !self.stage.end_reasons().contains(&code) {
            return Err(WorkflowError::InvalidEndReason {
                stage: self.stage,
                reason: code.as_str().to_string(),
            });
        }

        let reason = match code {
            EndReasonCode::Freeze => EndReason::Freeze,
            EndReasonCode::UptPositive => EndReason::UptPositive,
            EndReasonCode::UptNegative => EndReason::UptNegative,
            EndReasonCode::Cancel => {
                let text = self.cancel_text.trim();
                if text.is_empty() {
                    return Err(WorkflowError::MissingCancelText);
                }
                EndReason::Cancel(text.to_string())
            }
        };

        Ok(EndTreatment {
            stage: self.stage,
            reason: Some(reason),
        })
    }
}

/// A validated request to end a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTreatment {
    pub stage: Stage,
    pub reason: Option<EndReason>,
}

impl EndTreatment {
    /// Stage-specific fields merged into the update payload.
    pub fn payload_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        let (Some(reason), Some(field)) = (&self.reason, legacy_reason_field(self.stage)) else {
            return fields;
        };

        fields.insert(field.to_string(), Value::from(reason.code().as_str()));
        if let EndReason::Cancel(text) = reason {
            fields.insert(CANCEL_REASON_FIELD.to_string(), Value::from(text.as_str()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reason_rejected() {
        let err = EndTreatmentForm::new(Stage::Iui).validate().unwrap_err();
        assert_eq!(err, WorkflowError::MissingEndReason(Stage::Iui));
    }

    #[test]
    fn freeze_only_for_icsi() {
        let err = EndTreatmentForm::new(Stage::Fet)
            .with_reason(EndReasonCode::Freeze)
            .validate()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidEndReason { .. }));

        let ok = EndTreatmentForm::new(Stage::Icsi)
            .with_reason(EndReasonCode::Freeze)
            .validate()
            .unwrap();
        assert_eq!(ok.reason, Some(EndReason::Freeze));
    }

    #[test]
    fn cancel_requires_text() {
        let err = EndTreatmentForm::new(Stage::Oiti)
            .with_reason(EndReasonCode::Cancel)
            .with_cancel_text("   ")
            .validate()
            .unwrap_err();
        assert_eq!(err, WorkflowError::MissingCancelText);
    }

    #[test]
    fn fet_uses_fet_ended_reason() {
        let end = EndTreatmentForm::new(Stage::Fet)
            .with_reason(EndReasonCode::UptPositive)
            .validate()
            .unwrap();
        let fields = end.payload_fields();
        assert_eq!(fields["fetEndedReason"], "UPT_POSITIVE");
        assert!(!fields.contains_key("endedReason"));
    }

    #[test]
    fn icsi_cancel_carries_text() {
        let end = EndTreatmentForm::new(Stage::Icsi)
            .with_reason(EndReasonCode::Cancel)
            .with_cancel_text(" poor response ")
            .validate()
            .unwrap();
        let fields = end.payload_fields();
        assert_eq!(fields["endedReason"], "CANCEL");
        assert_eq!(fields[CANCEL_REASON_FIELD], "poor response");
    }

    #[test]
    fn era_ends_without_reason() {
        let end = EndTreatmentForm::new(Stage::Era).validate().unwrap();
        assert!(end.reason.is_none());
        assert!(end.payload_fields().is_empty());
    }
}
