//! Recurring invoice scheduling.
//!
//! A [`RecurringSeries`] is created once from a base invoice and a
//! [`RecurrenceRule`]. It freezes a snapshot of the invoice and its line
//! items, and every generation replays that snapshot. All functions here are
//! pure: "today" is always passed in and updated series are returned, never
//! written.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::Date;

use crate::dates::{self, add_days, add_months};
use crate::error::ValidationError;
use crate::model::{Invoice, InvoiceItem, InvoiceStatus, NewInvoice, NewInvoiceItem};
use crate::money::{validate_decimal, validate_decimal_or_zero};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Parses a stored frequency. Anything unrecognised is treated as
    /// monthly so series created under a newer frequency set keep running.
    pub fn parse_lenient(raw: &str) -> Frequency {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "monthly" => Frequency::Monthly,
            "quarterly" => Frequency::Quarterly,
            "yearly" => Frequency::Yearly,
            other => {
                tracing::warn!(frequency = other, "unknown recurrence frequency, using monthly");
                Frequency::Monthly
            }
        }
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Frequency::parse_lenient(&raw))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(with = "dates::ymd")]
    pub start_date: Date,
    #[serde(default, with = "dates::ymd_option")]
    pub end_date: Option<Date>,
    #[serde(default)]
    pub max_occurrences: Option<u32>,
    #[serde(default)]
    pub auto_send: bool,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ValidationError::EndBeforeStart {
                    start: dates::format_ymd(self.start_date),
                    end: dates::format_ymd(end),
                });
            }
        }
        if self.max_occurrences == Some(0) {
            return Err(ValidationError::ZeroMaxOccurrences);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    Active,
    Paused,
    Cancelled,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Active => "active",
            SeriesStatus::Paused => "paused",
            SeriesStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<SeriesStatus> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(SeriesStatus::Active),
            "paused" => Some(SeriesStatus::Paused),
            "cancelled" | "canceled" => Some(SeriesStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice header fields frozen at series creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSnapshot {
    #[serde(default)]
    pub template_id: Option<String>,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub currency: String,
    pub notes: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub payment_terms_days: i64,
    pub subtotal: String,
    pub tax_total: String,
    pub total: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub tax_rate: String,
    pub discount: String,
    pub line_total: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSeries {
    pub id: String,
    pub user_id: String,
    pub base_invoice_id: String,
    pub client_id: String,
    pub rule: RecurrenceRule,
    pub invoice_snapshot: InvoiceSnapshot,
    pub items_snapshot: Vec<ItemSnapshot>,
    pub status: SeriesStatus,
    #[serde(with = "dates::ymd")]
    pub next_generation_date: Date,
    pub total_generated_count: u32,
    #[serde(default, with = "dates::ymd_option")]
    pub last_generated_at: Option<Date>,
}

/// Next generation date after `from`. Month-based frequencies keep the day
/// of month and clip it to the target month's length.
///
/// Strictly later than `from` for every date whose successor is still
/// representable. Near the end of the calendar (`Date::MAX`, 9999-12-31) the
/// result saturates at `Date::MAX` and can equal `from`.
pub fn compute_next_date(from: Date, frequency: Frequency) -> Date {
    match frequency {
        Frequency::Daily => add_days(from, 1),
        Frequency::Weekly => add_days(from, 7),
        Frequency::Monthly => add_months(from, 1),
        Frequency::Quarterly => add_months(from, 3),
        Frequency::Yearly => add_months(from, 12),
    }
}

/// Copies the replayable parts of an invoice. Amounts are validated as
/// decimals and kept verbatim.
pub fn build_snapshot(
    invoice: &Invoice,
    items: &[InvoiceItem],
) -> Result<(InvoiceSnapshot, Vec<ItemSnapshot>), ValidationError> {
    let payment_terms_days = match invoice.due_date.as_deref().map(str::trim) {
        Some(due) if !due.is_empty() => {
            dates::days_between_ceil("issueDate", &invoice.issue_date, "dueDate", due)?.max(0)
        }
        _ => {
            dates::parse_date("issueDate", &invoice.issue_date)?;
            0
        }
    };

    let snapshot = InvoiceSnapshot {
        template_id: invoice.template_id.clone(),
        client_name: invoice.client_name.clone(),
        client_email: invoice.client_email.clone(),
        currency: invoice.currency.clone(),
        notes: invoice.notes.clone(),
        payment_method: invoice.payment_method.clone(),
        payment_terms_days,
        subtotal: validate_decimal("subtotal", &invoice.subtotal)?,
        tax_total: validate_decimal_or_zero("taxTotal", Some(&invoice.tax_total))?,
        total: validate_decimal("total", &invoice.total)?,
    };

    let items = items
        .iter()
        .map(|it| {
            Ok(ItemSnapshot {
                description: it.description.clone(),
                quantity: validate_decimal("quantity", &it.quantity)?,
                unit_price: validate_decimal("unitPrice", &it.unit_price)?,
                tax_rate: validate_decimal_or_zero("taxRate", it.tax_rate.as_deref())?,
                discount: validate_decimal_or_zero("discount", it.discount.as_deref())?,
                line_total: validate_decimal("lineTotal", &it.line_total)?,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    Ok((snapshot, items))
}

/// Creates an active series whose first generation falls on the rule's
/// start date.
pub fn new_series(
    id: impl Into<String>,
    invoice: &Invoice,
    items: &[InvoiceItem],
    rule: RecurrenceRule,
) -> Result<RecurringSeries, ValidationError> {
    rule.validate()?;
    let (invoice_snapshot, items_snapshot) = build_snapshot(invoice, items)?;

    Ok(RecurringSeries {
        id: id.into(),
        user_id: invoice.user_id.clone(),
        base_invoice_id: invoice.id.clone(),
        client_id: invoice.client_id.clone(),
        next_generation_date: rule.start_date,
        rule,
        invoice_snapshot,
        items_snapshot,
        status: SeriesStatus::Active,
        total_generated_count: 0,
        last_generated_at: None,
    })
}

fn occurrences_left(series: &RecurringSeries) -> bool {
    series
        .rule
        .max_occurrences
        .map_or(true, |max| series.total_generated_count < max)
}

/// Whether an invoice should be generated for `series` on `today`.
pub fn should_generate(series: &RecurringSeries, today: Date) -> bool {
    series.status == SeriesStatus::Active
        && today >= series.next_generation_date
        && series.rule.end_date.map_or(true, |end| today <= end)
        && occurrences_left(series)
}

/// Whether the series can never generate again under its rule, regardless
/// of status.
pub fn is_exhausted(series: &RecurringSeries, today: Date) -> bool {
    if !occurrences_left(series) {
        return true;
    }
    match series.rule.end_date {
        Some(end) => today > end || series.next_generation_date > end,
        None => false,
    }
}

/// Series state after a successful generation on `today`.
pub fn advance(series: &RecurringSeries, today: Date) -> RecurringSeries {
    RecurringSeries {
        next_generation_date: compute_next_date(today, series.rule.frequency),
        total_generated_count: series.total_generated_count.saturating_add(1),
        last_generated_at: Some(today),
        ..series.clone()
    }
}

/// Validates a status change. `cancelled` is terminal.
pub fn transition_status(
    from: SeriesStatus,
    to: SeriesStatus,
) -> Result<SeriesStatus, ValidationError> {
    if from == SeriesStatus::Cancelled && to != SeriesStatus::Cancelled {
        return Err(ValidationError::InvalidStatusTransition { from, to });
    }
    Ok(to)
}

/// The invoice to insert for a generation on `today`.
pub fn invoice_from_snapshot(series: &RecurringSeries, today: Date) -> NewInvoice {
    let snap = &series.invoice_snapshot;
    let due = add_days(today, snap.payment_terms_days);

    NewInvoice {
        user_id: series.user_id.clone(),
        client_id: series.client_id.clone(),
        client_name: snap.client_name.clone(),
        client_email: snap.client_email.clone(),
        issue_date: dates::format_ymd(today),
        due_date: Some(dates::format_ymd(due)),
        status: if series.rule.auto_send {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::Draft
        },
        currency: snap.currency.clone(),
        notes: snap.notes.clone(),
        template_id: snap.template_id.clone(),
        payment_method: snap.payment_method.clone(),
        subtotal: snap.subtotal.clone(),
        tax_total: snap.tax_total.clone(),
        total: snap.total.clone(),
        items: series
            .items_snapshot
            .iter()
            .map(|it| NewInvoiceItem {
                description: it.description.clone(),
                quantity: it.quantity.clone(),
                unit_price: it.unit_price.clone(),
                tax_rate: Some(it.tax_rate.clone()),
                discount: Some(it.discount.clone()),
                line_total: it.line_total.clone(),
            })
            .collect(),
        recurring_series_id: Some(series.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use time::macros::date;

    fn invoice() -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            invoice_number: "INV-0001".to_string(),
            user_id: "user-1".to_string(),
            client_id: "client-1".to_string(),
            client_name: "Ada".to_string(),
            client_email: Some("ada@example.com".to_string()),
            issue_date: "2024-04-01".to_string(),
            due_date: Some("2024-04-15".to_string()),
            status: InvoiceStatus::Sent,
            currency: "USD".to_string(),
            notes: "Thanks".to_string(),
            template_id: Some("classic".to_string()),
            payment_method: Some("bank".to_string()),
            subtotal: "19.99".to_string(),
            tax_total: "0".to_string(),
            total: "19.99".to_string(),
            items: vec![],
            recurring_series_id: None,
            created_at: "2024-04-01T08:00:00Z".to_string(),
        }
    }

    fn items() -> Vec<InvoiceItem> {
        vec![InvoiceItem {
            id: "item-1".to_string(),
            description: "Hosting".to_string(),
            quantity: "1".to_string(),
            unit_price: "19.99".to_string(),
            tax_rate: None,
            discount: Some("0.00".to_string()),
            line_total: "19.99".to_string(),
        }]
    }

    fn rule(max: Option<u32>) -> RecurrenceRule {
        RecurrenceRule {
            frequency: Frequency::Monthly,
            start_date: date!(2024 - 04 - 01),
            end_date: None,
            max_occurrences: max,
            auto_send: false,
        }
    }

    #[rstest]
    #[case(Frequency::Daily, date!(2024 - 02 - 28), date!(2024 - 02 - 29))]
    #[case(Frequency::Daily, date!(2023 - 12 - 31), date!(2024 - 01 - 01))]
    #[case(Frequency::Weekly, date!(2024 - 02 - 26), date!(2024 - 03 - 04))]
    #[case(Frequency::Monthly, date!(2024 - 01 - 31), date!(2024 - 02 - 29))]
    #[case(Frequency::Monthly, date!(2023 - 01 - 31), date!(2023 - 02 - 28))]
    #[case(Frequency::Monthly, date!(2024 - 03 - 31), date!(2024 - 04 - 30))]
    #[case(Frequency::Quarterly, date!(2024 - 11 - 30), date!(2025 - 02 - 28))]
    #[case(Frequency::Quarterly, date!(2024 - 01 - 15), date!(2024 - 04 - 15))]
    #[case(Frequency::Yearly, date!(2024 - 02 - 29), date!(2025 - 02 - 28))]
    #[case(Frequency::Yearly, date!(2023 - 06 - 01), date!(2024 - 06 - 01))]
    fn next_date_follows_calendar(
        #[case] frequency: Frequency,
        #[case] from: Date,
        #[case] expected: Date,
    ) {
        let next = compute_next_date(from, frequency);
        assert_eq!(next, expected);
        assert!(next > from);
    }

    #[rstest]
    #[case(Frequency::Daily)]
    #[case(Frequency::Weekly)]
    #[case(Frequency::Monthly)]
    #[case(Frequency::Quarterly)]
    #[case(Frequency::Yearly)]
    fn next_date_saturates_at_calendar_end(#[case] frequency: Frequency) {
        assert_eq!(compute_next_date(Date::MAX, frequency), Date::MAX);
    }

    #[test]
    fn unknown_frequency_falls_back_to_monthly() {
        let f: Frequency = serde_json::from_str("\"fortnightly\"").unwrap();
        assert_eq!(f, Frequency::Monthly);
        assert_eq!(Frequency::parse_lenient(" Weekly "), Frequency::Weekly);
    }

    #[test]
    fn snapshot_copies_amounts_verbatim() {
        let (snap, items) = build_snapshot(&invoice(), &items()).unwrap();
        assert_eq!(snap.total, "19.99");
        assert_eq!(snap.subtotal, "19.99");
        assert_eq!(snap.payment_terms_days, 14);
        assert_eq!(snap.template_id.as_deref(), Some("classic"));
        assert_eq!(items[0].tax_rate, "0");
        assert_eq!(items[0].discount, "0.00");
    }

    #[test]
    fn snapshot_rejects_bad_input() {
        let mut inv = invoice();
        inv.due_date = Some("15.04.2024".to_string());
        assert!(matches!(
            build_snapshot(&inv, &items()),
            Err(ValidationError::InvalidDate { field: "dueDate", .. })
        ));

        let mut inv = invoice();
        inv.total = "19.99 USD".to_string();
        assert!(matches!(
            build_snapshot(&inv, &items()),
            Err(ValidationError::InvalidDecimal { field: "total", .. })
        ));
    }

    #[test]
    fn snapshot_without_due_date_has_zero_terms() {
        let mut inv = invoice();
        inv.due_date = None;
        let (snap, _) = build_snapshot(&inv, &[]).unwrap();
        assert_eq!(snap.payment_terms_days, 0);
    }

    #[test]
    fn rule_validation() {
        let mut r = rule(Some(0));
        assert_eq!(r.validate(), Err(ValidationError::ZeroMaxOccurrences));
        r.max_occurrences = None;
        r.end_date = Some(date!(2024 - 03 - 01));
        assert!(matches!(r.validate(), Err(ValidationError::EndBeforeStart { .. })));
        r.end_date = Some(date!(2024 - 04 - 01));
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn should_generate_stops_at_max_occurrences() {
        let mut series = new_series("s-1", &invoice(), &items(), rule(Some(2))).unwrap();
        let today = date!(2024 - 04 - 01);
        assert!(should_generate(&series, today));

        series = advance(&series, today);
        assert_eq!(series.next_generation_date, date!(2024 - 05 - 01));
        assert!(should_generate(&series, date!(2024 - 05 - 01)));
        assert!(!is_exhausted(&series, date!(2024 - 05 - 01)));

        series = advance(&series, date!(2024 - 05 - 01));
        assert_eq!(series.total_generated_count, 2);
        assert!(!should_generate(&series, date!(2024 - 06 - 01)));
        assert!(is_exhausted(&series, date!(2024 - 06 - 01)));
    }

    #[test]
    fn should_generate_respects_status_and_dates() {
        let mut r = rule(None);
        r.end_date = Some(date!(2024 - 06 - 30));
        let mut series = new_series("s-1", &invoice(), &items(), r).unwrap();

        assert!(!should_generate(&series, date!(2024 - 03 - 31)));
        assert!(should_generate(&series, date!(2024 - 04 - 03)));
        assert!(!should_generate(&series, date!(2024 - 07 - 01)));
        assert!(is_exhausted(&series, date!(2024 - 07 - 01)));

        series.status = SeriesStatus::Paused;
        assert!(!should_generate(&series, date!(2024 - 04 - 03)));
        // Repeated calls with unchanged inputs agree.
        assert_eq!(
            should_generate(&series, date!(2024 - 04 - 03)),
            should_generate(&series, date!(2024 - 04 - 03))
        );
    }

    #[test]
    fn next_date_beyond_end_is_exhausted() {
        let mut r = rule(None);
        r.end_date = Some(date!(2024 - 04 - 20));
        let series = new_series("s-1", &invoice(), &items(), r).unwrap();
        let series = advance(&series, date!(2024 - 04 - 01));
        assert!(is_exhausted(&series, date!(2024 - 04 - 10)));
    }

    #[test]
    fn cancelled_is_terminal() {
        use SeriesStatus::*;
        assert_eq!(transition_status(Active, Paused), Ok(Paused));
        assert_eq!(transition_status(Paused, Active), Ok(Active));
        assert_eq!(transition_status(Paused, Cancelled), Ok(Cancelled));
        assert_eq!(transition_status(Cancelled, Cancelled), Ok(Cancelled));
        assert_eq!(
            transition_status(Cancelled, Active),
            Err(ValidationError::InvalidStatusTransition {
                from: Cancelled,
                to: Active
            })
        );
    }

    #[test]
    fn replay_keeps_amounts_exact() {
        let mut series = new_series("s-1", &invoice(), &items(), rule(None)).unwrap();
        let mut today = series.next_generation_date;
        for _ in 0..10 {
            let generated = invoice_from_snapshot(&series, today);
            assert_eq!(generated.total, "19.99");
            assert_eq!(generated.items[0].line_total, "19.99");
            series = advance(&series, today);
            today = series.next_generation_date;
        }
        assert_eq!(series.total_generated_count, 10);
        assert_eq!(series.next_generation_date, date!(2025 - 02 - 01));
    }

    #[test]
    fn generated_invoice_uses_payment_terms() {
        let mut r = rule(None);
        r.auto_send = true;
        let series = new_series("s-1", &invoice(), &items(), r).unwrap();
        let generated = invoice_from_snapshot(&series, date!(2024 - 05 - 01));
        assert_eq!(generated.issue_date, "2024-05-01");
        assert_eq!(generated.due_date.as_deref(), Some("2024-05-15"));
        assert_eq!(generated.status, InvoiceStatus::Sent);
        assert_eq!(generated.recurring_series_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn series_serializes_dates_as_ymd() {
        let series = new_series("s-1", &invoice(), &items(), rule(Some(3))).unwrap();
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["nextGenerationDate"], "2024-04-01");
        assert_eq!(json["rule"]["frequency"], "monthly");
        assert_eq!(json["status"], "active");
        let back: RecurringSeries = serde_json::from_value(json).unwrap();
        assert_eq!(back, series);
    }
}
