//! Building a modal's bill lines from a `getLineBillsAndNotesForAppointment`
//! response, either for the appointment itself or copied from an earlier one.

use super::DefaultLineBillValues;
use crate::api::LineBillsAndNotes;
use crate::models::{BillStatus, Ownership};

/// Bill lines and notes belonging to one side of the couple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedPrescription {
    pub values: DefaultLineBillValues,
    pub notes: String,
}

fn collect(response: &LineBillsAndNotes, owner: Ownership, force_unpaid: bool) -> OwnedPrescription {
    let mut values = DefaultLineBillValues::new();
    for group in response.line_bills.iter().filter(|g| g.is_spouse == owner) {
        let entries = group
            .bill_type_values
            .iter()
            .cloned()
            .map(|mut entry| {
                if force_unpaid {
                    entry.status = BillStatus::Unpaid;
                }
                entry
            })
            .collect();
        values.extend(group.bill_type_id, entries);
    }

    let notes = response
        .notes
        .iter()
        .find(|n| n.is_spouse == owner)
        .map(|n| n.notes.clone())
        .unwrap_or_default();

    OwnedPrescription { values, notes }
}

/// Lines as stored for this appointment, statuses preserved.
pub fn values_for_owner(response: &LineBillsAndNotes, owner: Ownership) -> OwnedPrescription {
    collect(response, owner, false)
}

/// Lines of a previous appointment, re-billed: every copied line is UNPAID
/// whatever its original status.
pub fn copy_from_previous(response: &LineBillsAndNotes, owner: Ownership) -> OwnedPrescription {
    collect(response, owner, true)
}
