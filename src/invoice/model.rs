//! Invoice records and form-state snapshots.
//!
//! The live form is an explicit [`InvoiceFormState`] owned by the caller, not
//! an implicit global. Saving or exporting materializes an immutable
//! [`Invoice`] snapshot; stored records are never mutated, later edits
//! produce new snapshots.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::totals::{parse_amount, parse_percent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hsn: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub rate: f64,
    /// Percentage as a bare number; no `%` suffix is ever stored.
    #[serde(default)]
    pub sgst_pct: f64,
    #[serde(default)]
    pub cgst_pct: f64,
}

/// Raw per-row form payload. Numeric cells arrive exactly as typed and are
/// coerced through the soft-fail parsers, so a half-edited cell reads as 0.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hsn: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub qty: String,
    #[serde(default)]
    pub rate: String,
    #[serde(default)]
    pub sgst_pct: String,
    #[serde(default)]
    pub cgst_pct: String,
}

impl LineItem {
    pub fn from_input(input: &LineItemInput) -> LineItem {
        LineItem {
            description: input.description.clone(),
            hsn: input.hsn.clone(),
            unit: input.unit.clone(),
            qty: parse_amount(&input.qty),
            rate: parse_amount(&input.rate),
            sgst_pct: parse_percent(&input.sgst_pct),
            cgst_pct: parse_percent(&input.cgst_pct),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFormState {
    #[serde(default)]
    pub bill_no: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub challan: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub party_gst: String,
    /// Ordered; row order is significant and preserved end to end.
    #[serde(default)]
    pub rows: Vec<LineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFormInput {
    #[serde(default)]
    pub bill_no: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub challan: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub party_gst: String,
    #[serde(default)]
    pub rows: Vec<LineItemInput>,
}

impl InvoiceFormState {
    pub fn from_input(input: &InvoiceFormInput) -> InvoiceFormState {
        InvoiceFormState {
            bill_no: input.bill_no.clone(),
            date: input.date.clone(),
            challan: input.challan.clone(),
            customer: input.customer.clone(),
            address: input.address.clone(),
            party_gst: input.party_gst.clone(),
            rows: input.rows.iter().map(LineItem::from_input).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default)]
    pub bill_no: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub challan: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub party_gst: String,
    #[serde(default)]
    pub rows: Vec<LineItem>,
    /// RFC 3339 timestamp stamped at materialization, never mutated.
    #[serde(default)]
    pub created_at: String,
}

pub fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Captures the current form as a new immutable record.
pub fn materialize_invoice(form: &InvoiceFormState) -> Invoice {
    Invoice {
        bill_no: form.bill_no.clone(),
        date: form.date.clone(),
        challan: form.challan.clone(),
        customer: form.customer.clone(),
        address: form.address.clone(),
        party_gst: form.party_gst.clone(),
        rows: form.rows.clone(),
        created_at: now_iso(),
    }
}

/// Inverse of [`materialize_invoice`]: rebuilds form state from a stored
/// record. Every field and the whole row list are replaced, never merged, so
/// no rows from a previously loaded invoice can survive.
pub fn apply_invoice(record: &Invoice) -> InvoiceFormState {
    InvoiceFormState {
        bill_no: record.bill_no.clone(),
        date: record.date.clone(),
        challan: record.challan.clone(),
        customer: record.customer.clone(),
        address: record.address.clone(),
        party_gst: record.party_gst.clone(),
        rows: record.rows.clone(),
    }
}
