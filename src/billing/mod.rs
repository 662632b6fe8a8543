//! Billing line reconciler.
//!
//! Keeps the per-modal bill lines (`defaultLineBillValues`) in sync with the
//! multi-select controls. PAID lines come from the payment flow on the
//! server: they are never created, changed or dropped here.

pub mod copy;

pub use copy::*;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{
    BillStatus, BillTypeCatalog, BillTypeId, IntakeCode, LineBillEntry, LineBillGroup,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("Unknown bill type: {0}")]
    UnknownBillType(String),

    #[error("Item {item_id} is not offered under {bill_type}")]
    UnknownCatalogItem { bill_type: String, item_id: i64 },

    #[error("The bill type catalog has no Pharmacy entry")]
    PharmacyNotInCatalog,

    #[error("No pharmacy line with id {0}")]
    EntryNotFound(i64),

    #[error("Line {0} is already paid and cannot be changed")]
    EntryPaid(i64),

    #[error("Unknown intake code: {0}")]
    UnknownIntakeCode(String),

    #[error("Quantity overflow: {days} days x {multiplier}")]
    QuantityOverflow { days: u32, multiplier: u32 },
}

/// Bill lines of one prescription modal, grouped by bill type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultLineBillValues(BTreeMap<BillTypeId, Vec<LineBillEntry>>);

impl DefaultLineBillValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, bill_type: BillTypeId) -> &[LineBillEntry] {
        self.0.get(&bill_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_entries(&mut self, bill_type: BillTypeId, entries: Vec<LineBillEntry>) {
        if entries.is_empty() {
            self.0.remove(&bill_type);
        } else {
            self.0.insert(bill_type, entries);
        }
    }

    /// Append entries to a bill type, keeping existing ones first.
    pub fn extend(&mut self, bill_type: BillTypeId, entries: Vec<LineBillEntry>) {
        if !entries.is_empty() {
            self.0.entry(bill_type).or_default().extend(entries);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BillTypeId, &Vec<LineBillEntry>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    fn entry_mut(&mut self, bill_type: BillTypeId, id: i64) -> Option<&mut LineBillEntry> {
        self.0.get_mut(&bill_type)?.iter_mut().find(|e| e.id == id)
    }

    /// Shape posted on save: PAID lines dropped, `status` stripped, empty
    /// bill types omitted. Order follows bill-type id then entry order.
    /// Prescription fields are kept only under `pharmacy`.
    pub fn to_db_format(&self, pharmacy: Option<BillTypeId>) -> Vec<LineBillGroup> {
        self.0
            .iter()
            .filter_map(|(bill_type_id, entries)| {
                let is_pharmacy = pharmacy == Some(*bill_type_id);
                let bill_type_values: Vec<_> = entries
                    .iter()
                    .filter(|e| !e.is_paid())
                    .map(|e| e.to_line(is_pharmacy))
                    .collect();
                (!bill_type_values.is_empty()).then_some(LineBillGroup {
                    bill_type_id: *bill_type_id,
                    bill_type_values,
                })
            })
            .collect()
    }

    /// Re-wrap saved groups as unpaid entries.
    pub fn from_db_format(groups: &[LineBillGroup]) -> Self {
        let mut values = Self::new();
        for group in groups {
            let entries = group
                .bill_type_values
                .iter()
                .map(|line| LineBillEntry {
                    id: line.id,
                    name: line.name.clone(),
                    amount: line.amount,
                    status: BillStatus::Unpaid,
                    prescribed_quantity: line.prescribed_quantity,
                    prescription_details: line.prescription_details.clone(),
                    prescription_days: line.prescription_days,
                })
                .collect();
            values.extend(group.bill_type_id, entries);
        }
        values
    }
}

fn quantity(days: u32, multiplier: u32) -> Result<u32, BillingError> {
    days.checked_mul(multiplier)
        .ok_or(BillingError::QuantityOverflow { days, multiplier })
}

/// Multiplier of whatever intake is stored on an entry. Entries without a
/// recognised code (none chosen yet, or legacy data) count once per day.
fn stored_multiplier(entry: &LineBillEntry) -> u32 {
    match entry.prescription_details.as_deref() {
        None | Some("") => 1,
        Some(code) => match IntakeCode::parse(code) {
            Ok(intake) => intake.multiplier(),
            Err(_) => {
                tracing::warn!(entry_id = entry.id, code, "Stored intake code not recognised; using 1");
                1
            }
        },
    }
}

pub struct LineBillReconciler {
    catalog: BillTypeCatalog,
    values: DefaultLineBillValues,
}

impl LineBillReconciler {
    pub fn new(catalog: BillTypeCatalog) -> Self {
        Self {
            catalog,
            values: DefaultLineBillValues::new(),
        }
    }

    pub fn with_values(mut self, values: DefaultLineBillValues) -> Self {
        self.values = values;
        self
    }

    pub fn catalog(&self) -> &BillTypeCatalog {
        &self.catalog
    }

    pub fn values(&self) -> &DefaultLineBillValues {
        &self.values
    }

    pub fn replace_values(&mut self, values: DefaultLineBillValues) {
        self.values = values;
    }

    pub fn to_db_format(&self) -> Vec<LineBillGroup> {
        self.values.to_db_format(self.catalog.pharmacy_id())
    }

    /// Rebuild a bill type's lines from the full current selection of its
    /// multi-select: PAID lines first and untouched, then one UNPAID line per
    /// selected item not already paid. Deselected unpaid lines disappear.
    pub fn set_selected_values(
        &mut self,
        bill_type_name: &str,
        selected_item_ids: &[i64],
    ) -> Result<(), BillingError> {
        let bill_type = self
            .catalog
            .by_name(bill_type_name)
            .ok_or_else(|| BillingError::UnknownBillType(bill_type_name.to_string()))?;
        let is_pharmacy = self.catalog.pharmacy_id() == Some(bill_type.id);

        let existing = self.values.entries(bill_type.id);
        let mut next: Vec<LineBillEntry> =
            existing.iter().filter(|e| e.is_paid()).cloned().collect();

        for &item_id in selected_item_ids {
            if next.iter().any(|e| e.id == item_id) {
                continue;
            }
            let item = bill_type.item(item_id).ok_or_else(|| BillingError::UnknownCatalogItem {
                bill_type: bill_type.name.clone(),
                item_id,
            })?;

            let entry = if is_pharmacy {
                let mut entry = LineBillEntry::unpaid_prescription(item);
                if let Some(previous) = existing.iter().find(|e| e.id == item_id) {
                    entry.prescribed_quantity = previous.prescribed_quantity.or(entry.prescribed_quantity);
                    entry.prescription_details =
                        previous.prescription_details.clone().or(entry.prescription_details);
                    entry.prescription_days = previous.prescription_days.or(entry.prescription_days);
                }
                entry
            } else {
                LineBillEntry::unpaid(item)
            };
            next.push(entry);
        }

        tracing::debug!(
            bill_type_id = %bill_type.id,
            lines = next.len(),
            "Bill type selection updated"
        );
        let bill_type_id = bill_type.id;
        self.values.set_entries(bill_type_id, next);
        Ok(())
    }

    fn pharmacy_entry_mut(&mut self, id: i64) -> Result<&mut LineBillEntry, BillingError> {
        let pharmacy = self
            .catalog
            .pharmacy_id()
            .ok_or(BillingError::PharmacyNotInCatalog)?;
        let entry = self
            .values
            .entry_mut(pharmacy, id)
            .ok_or(BillingError::EntryNotFound(id))?;
        if entry.is_paid() {
            return Err(BillingError::EntryPaid(id));
        }
        Ok(entry)
    }

    /// Set the prescribed days of a pharmacy line and recompute its quantity.
    pub fn handle_days_change(&mut self, id: i64, days: u32) -> Result<u32, BillingError> {
        let entry = self.pharmacy_entry_mut(id)?;
        let prescribed = quantity(days, stored_multiplier(entry))?;
        entry.prescription_days = Some(days);
        entry.prescribed_quantity = Some(prescribed);
        Ok(prescribed)
    }

    /// Set the intake code of a pharmacy line and recompute its quantity.
    /// Unrecognised codes are rejected and leave the line unchanged.
    pub fn handle_intake_change(&mut self, id: i64, intake: &str) -> Result<u32, BillingError> {
        let code = IntakeCode::parse(intake)
            .map_err(|_| BillingError::UnknownIntakeCode(intake.to_string()))?;
        let entry = self.pharmacy_entry_mut(id)?;
        let prescribed = quantity(entry.prescription_days.unwrap_or(1), code.multiplier())?;
        entry.prescription_details = Some(code.as_code());
        entry.prescribed_quantity = Some(prescribed);
        Ok(prescribed)
    }
}
