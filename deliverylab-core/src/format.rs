//! Indian-notation number formatting for display.

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;
const THOUSAND: f64 = 1_000.0;

/// Format `value` in crores, lakhs or thousands with two decimals.
///
/// Missing and NaN render as `"0"`; values under a thousand are rounded to an
/// integer.
pub fn format_indian_number(value: impl Into<Option<f64>>) -> String {
    let value = match value.into() {
        Some(v) if !v.is_nan() => v,
        _ => return "0".to_string(),
    };
    if value >= CRORE {
        format!("{:.2} Cr", value / CRORE)
    } else if value >= LAKH {
        format!("{:.2} L", value / LAKH)
    } else if value >= THOUSAND {
        format!("{:.2} K", value / THOUSAND)
    } else {
        format!("{value:.0}")
    }
}

/// Convenience for the `u64` quantity columns.
pub fn format_quantity(value: Option<u64>) -> String {
    format_indian_number(value.map(|v| v as f64))
}
