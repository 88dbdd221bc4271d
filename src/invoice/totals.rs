//! Numeric input coercion and the totals engine.
//!
//! The engine is a pure recompute-from-scratch function: the UI layer decides
//! when to call it (it runs on every edit) and how to render the result.

use serde::Serialize;

use super::model::LineItem;

/// Soft-fail parse of a user-typed amount. Empty, invalid and non-finite
/// input all coerce to `0.0`; the form must stay usable mid-edit, so no
/// error ever surfaces from here.
pub fn parse_amount(v: &str) -> f64 {
    v.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Like [`parse_amount`], after stripping one optional trailing `%`.
pub fn parse_percent(v: &str) -> f64 {
    let trimmed = v.trim();
    parse_amount(trimmed.strip_suffix('%').unwrap_or(trimmed))
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTotals {
    pub base: f64,
    pub sgst_amt: f64,
    pub cgst_amt: f64,
    /// Displayed line amount. Tax amounts are informational per line and
    /// only enter the aggregates, so this stays the pre-tax base.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub per_line: Vec<LineTotals>,
    pub subtotal: f64,
    pub total_sgst: f64,
    pub total_cgst: f64,
    pub grand_total: f64,
}

/// Recomputes per-line and aggregate amounts for the given rows.
///
/// Aggregates accumulate at full f64 precision and are rounded only at the
/// presentation boundary (sum-then-round): pre-rounding each line and then
/// summing can disagree with the rounded sum. Negative qty/rate/percent
/// values pass through unvalidated.
pub fn compute_totals(rows: &[LineItem]) -> Totals {
    let mut per_line: Vec<LineTotals> = Vec::with_capacity(rows.len());
    let mut subtotal = 0.0_f64;
    let mut total_sgst = 0.0_f64;
    let mut total_cgst = 0.0_f64;

    for row in rows {
        let base = row.qty * row.rate;
        let sgst_amt = base * row.sgst_pct / 100.0;
        let cgst_amt = base * row.cgst_pct / 100.0;

        subtotal += base;
        total_sgst += sgst_amt;
        total_cgst += cgst_amt;

        per_line.push(LineTotals {
            base,
            sgst_amt,
            cgst_amt,
            amount: base,
        });
    }

    Totals {
        per_line,
        subtotal,
        total_sgst,
        total_cgst,
        grand_total: subtotal + total_sgst + total_cgst,
    }
}

/// The one place implementing the display contract: `₹` prefix, exactly two
/// decimals.
pub fn format_currency(v: f64) -> String {
    format!("₹{:.2}", v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(qty: f64, rate: f64, sgst_pct: f64, cgst_pct: f64) -> LineItem {
        LineItem {
            description: String::new(),
            hsn: String::new(),
            unit: String::new(),
            qty,
            rate,
            sgst_pct,
            cgst_pct,
        }
    }

    #[test]
    fn parse_amount_accepts_plain_numbers() {
        assert_eq!(parse_amount("12"), 12.0);
        assert_eq!(parse_amount(" 12.5 "), 12.5);
        assert_eq!(parse_amount("-3"), -3.0);
    }

    #[test]
    fn parse_amount_soft_fails_to_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("12abc"), 0.0);
        // Never NaN, never infinite.
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);
    }

    #[test]
    fn parse_percent_strips_trailing_percent_sign() {
        assert_eq!(parse_percent("9"), 9.0);
        assert_eq!(parse_percent("9%"), 9.0);
        assert_eq!(parse_percent(" 18.5% "), 18.5);
        assert_eq!(parse_percent("%"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
    }

    #[test]
    fn single_row_reference_values() {
        let totals = compute_totals(&[row(2.0, 100.0, 9.0, 9.0)]);
        assert_eq!(totals.per_line.len(), 1);
        assert_eq!(totals.per_line[0].base, 200.0);
        assert_eq!(totals.per_line[0].sgst_amt, 18.0);
        assert_eq!(totals.per_line[0].cgst_amt, 18.0);
        assert_eq!(totals.per_line[0].amount, 200.0);
        assert_eq!(totals.subtotal, 200.0);
        assert_eq!(totals.grand_total, 236.0);
        assert_eq!(format_currency(totals.grand_total), "₹236.00");
    }

    #[test]
    fn grand_total_is_sum_of_aggregates() {
        let rows = vec![
            row(2.0, 100.0, 9.0, 9.0),
            row(1.5, 33.33, 2.5, 2.5),
            row(7.0, 0.99, 14.0, 14.0),
        ];
        let totals = compute_totals(&rows);
        let expected = totals.subtotal + totals.total_sgst + totals.total_cgst;
        assert!((totals.grand_total - expected).abs() < 1e-9);
    }

    #[test]
    fn line_amount_excludes_tax() {
        let totals = compute_totals(&[row(1.0, 100.0, 18.0, 18.0)]);
        assert_eq!(totals.per_line[0].amount, 100.0);
        assert_eq!(totals.grand_total, 136.0);
    }

    #[test]
    fn empty_rows_total_zero() {
        let totals = compute_totals(&[]);
        assert!(totals.per_line.is_empty());
        assert_eq!(totals.subtotal, 0.0);
        assert_eq!(totals.grand_total, 0.0);
    }

    #[test]
    fn negative_inputs_pass_through_unvalidated() {
        let totals = compute_totals(&[row(-1.0, 50.0, 9.0, 9.0)]);
        assert_eq!(totals.subtotal, -50.0);
        assert_eq!(totals.grand_total, -59.0);
    }

    #[test]
    fn currency_formats_two_decimals() {
        assert_eq!(format_currency(0.0), "₹0.00");
        assert_eq!(format_currency(1234.5), "₹1234.50");
        assert_eq!(format_currency(0.005), "₹0.01");
        assert_eq!(format_currency(-5.0), "₹-5.00");
    }
}
