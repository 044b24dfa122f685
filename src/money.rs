//! Decimal money strings.
//!
//! Amounts stay strings end to end. They are parsed with `rust_decimal` only
//! to validate them and to format display values; a validated amount is
//! stored exactly as it was written so replaying a snapshot never drifts.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::ValidationError;

/// Checks that `value` is a decimal number and returns it trimmed, otherwise
/// unchanged.
pub fn validate_decimal(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let s = value.trim();
    if s.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Decimal::from_str(s)
        .map(|_| s.to_string())
        .map_err(|_| ValidationError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}

/// Like [`validate_decimal`], but an absent or blank value means zero.
pub fn validate_decimal_or_zero(
    field: &'static str,
    value: Option<&str>,
) -> Result<String, ValidationError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(v) => validate_decimal(field, v),
        None => Ok("0".to_string()),
    }
}

/// Formats an amount with two decimals and `,` thousands separators.
pub fn format_money(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.round_dp(2));
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };
    let (int_part, dec_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut out = String::new();
    let chars: Vec<char> = int_part.chars().collect();
    let mut cnt = 0;
    for i in (0..chars.len()).rev() {
        if cnt == 3 {
            out.push(',');
            cnt = 0;
        }
        out.push(chars[i]);
        cnt += 1;
    }
    let int_with_sep: String = out.chars().rev().collect();
    format!("{}{}.{}", sign, int_with_sep, dec_part)
}

/// Display form of an amount due, e.g. `1,250.00 RSD`. Unparseable amounts
/// are shown verbatim.
pub fn format_amount_due(total: &str, currency: &str) -> String {
    let amount = match Decimal::from_str(total.trim()) {
        Ok(d) => format_money(d),
        Err(_) => total.trim().to_string(),
    };
    let cur = currency.trim();
    if cur.is_empty() {
        amount
    } else {
        format!("{} {}", amount, cur)
    }
}
