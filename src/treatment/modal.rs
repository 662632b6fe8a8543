//! Which modal is open, as a pure reducer over explicit actions.

use serde::Serialize;

use crate::models::{Ownership, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ModalKey {
    Stage(Stage),
    EndTreatment(Stage),
    Trigger,
    CloseVisit,
    Prescription(Ownership),
    ReviewTreatmentCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalAction {
    Open(ModalKey),
    Close(ModalKey),
    CloseAll,
}

/// Next open modal. At most one modal is open; opening replaces it, and a
/// close aimed at a modal that is no longer open is ignored.
pub fn reduce(current: Option<ModalKey>, action: ModalAction) -> Option<ModalKey> {
    match action {
        ModalAction::Open(key) => Some(key),
        ModalAction::Close(key) if current == Some(key) => None,
        ModalAction::Close(_) => current,
        ModalAction::CloseAll => None,
    }
}
