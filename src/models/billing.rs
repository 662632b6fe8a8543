use serde::{Deserialize, Serialize};

use super::enums::BillStatus;

/// Catalog name of the bill type whose items carry prescription fields.
pub const PHARMACY_BILL_TYPE: &str = "Pharmacy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillTypeId(pub i64);

impl std::fmt::Display for BillTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A purchasable item of a bill type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillType {
    pub id: BillTypeId,
    pub name: String,
    #[serde(rename = "billTypeValues", default)]
    pub items: Vec<CatalogItem>,
}

impl BillType {
    pub fn item(&self, item_id: i64) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

/// All bill types offered by the clinic (`allBillTypeValues`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillTypeCatalog {
    pub bill_types: Vec<BillType>,
}

impl BillTypeCatalog {
    pub fn new(bill_types: Vec<BillType>) -> Self {
        Self { bill_types }
    }

    pub fn by_name(&self, name: &str) -> Option<&BillType> {
        self.bill_types
            .iter()
            .find(|bt| bt.name.eq_ignore_ascii_case(name))
    }

    pub fn by_id(&self, id: BillTypeId) -> Option<&BillType> {
        self.bill_types.iter().find(|bt| bt.id == id)
    }

    pub fn pharmacy_id(&self) -> Option<BillTypeId> {
        self.by_name(PHARMACY_BILL_TYPE).map(|bt| bt.id)
    }
}

/// One selected item on the current appointment's bill.
///
/// The prescription fields are only populated for pharmacy items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBillEntry {
    pub id: i64,
    pub name: String,
    pub amount: f64,
    pub status: BillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescribed_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_days: Option<u32>,
}

impl LineBillEntry {
    /// Fresh unpaid entry for a catalog item.
    pub fn unpaid(item: &CatalogItem) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            amount: item.amount,
            status: BillStatus::Unpaid,
            prescribed_quantity: None,
            prescription_details: None,
            prescription_days: None,
        }
    }

    /// Fresh unpaid pharmacy entry with default prescription fields.
    pub fn unpaid_prescription(item: &CatalogItem) -> Self {
        Self {
            prescribed_quantity: Some(1),
            prescription_details: Some(String::new()),
            prescription_days: Some(1),
            ..Self::unpaid(item)
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }

    /// Drop the status, producing the shape posted on save. Prescription
    /// fields only travel on pharmacy lines.
    pub fn to_line(&self, is_pharmacy: bool) -> LineBillLine {
        let mut line = LineBillLine {
            id: self.id,
            name: self.name.clone(),
            amount: self.amount,
            prescribed_quantity: None,
            prescription_details: None,
            prescription_days: None,
        };
        if is_pharmacy {
            line.prescribed_quantity = self.prescribed_quantity;
            line.prescription_details = self.prescription_details.clone();
            line.prescription_days = self.prescription_days;
        }
        line
    }
}

/// A line bill entry as saved: identical to [`LineBillEntry`] minus `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBillLine {
    pub id: i64,
    pub name: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescribed_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBillGroup {
    pub bill_type_id: BillTypeId,
    pub bill_type_values: Vec<LineBillLine>,
}
