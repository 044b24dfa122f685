//! Scheduled work over the store traits: generating due recurring invoices
//! and collecting the reminder emails that fire today.
//!
//! Neither job sends anything. Callers own the clock and the email
//! transport; both jobs are safe to re-run for the same `today`.

use serde::Serialize;
use time::Date;

use crate::dates::{self, format_ymd, parse_date};
use crate::error::{StoreError, StoreResult};
use crate::model::Invoice;
use crate::money::format_amount_due;
use crate::recurrence::{
    advance, invoice_from_snapshot, is_exhausted, should_generate, RecurringSeries, SeriesStatus,
};
use crate::reminders::{
    compose_reminder_email, is_due, render_message, render_preset, resolve_config, schedule_dates,
    ComposedEmail, EffectiveReminderConfig, EmailContext, OffsetKey, Placeholders, ReminderMessage,
    ResolutionFallback, Tone,
};
use crate::store::{InvoiceStore, ReminderSettingsStore, SeriesStore};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedInvoice {
    pub series_id: String,
    pub invoice_id: String,
    pub invoice_number: String,
    #[serde(with = "dates::ymd")]
    pub issue_date: Date,
}

/// Outcome of one [`run_due_generations`] pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub generated: Vec<GeneratedInvoice>,
    /// Series cancelled because their rule can no longer produce invoices.
    pub cancelled: Vec<String>,
    /// Due series another worker advanced first, or that were paused or
    /// cancelled after being listed.
    pub skipped: usize,
    pub failed: usize,
}

enum SeriesOutcome {
    NotDue,
    Skipped,
    Generated {
        invoice: GeneratedInvoice,
        cancelled: bool,
    },
    Cancelled,
}

fn cancel_series<S: SeriesStore>(store: &S, series_id: &str) -> StoreResult<()> {
    store.update_series_status(series_id, SeriesStatus::Cancelled)?;
    tracing::info!(series_id, "recurring series exhausted, cancelled");
    Ok(())
}

fn process_series<S>(store: &S, series: &RecurringSeries, today: Date) -> StoreResult<SeriesOutcome>
where
    S: InvoiceStore + SeriesStore,
{
    if !should_generate(series, today) {
        if is_exhausted(series, today) {
            cancel_series(store, &series.id)?;
            return Ok(SeriesOutcome::Cancelled);
        }
        return Ok(SeriesOutcome::NotDue);
    }

    // Claim the occurrence before inserting, so a lost race creates nothing.
    let advanced = advance(series, today);
    let claimed = store.update_series_progress(
        &series.id,
        series.next_generation_date,
        advanced.next_generation_date,
        advanced.total_generated_count,
        today,
    )?;
    if !claimed {
        tracing::debug!(series_id = %series.id, "series advanced or deactivated by another writer");
        return Ok(SeriesOutcome::Skipped);
    }

    let created = store.create_invoice_from_snapshot(invoice_from_snapshot(series, today))?;
    tracing::info!(
        series_id = %series.id,
        invoice_number = %created.invoice_number,
        status = created.status.as_str(),
        next = %format_ymd(advanced.next_generation_date),
        "generated recurring invoice"
    );

    let cancelled = is_exhausted(&advanced, today);
    if cancelled {
        cancel_series(store, &series.id)?;
    }

    Ok(SeriesOutcome::Generated {
        invoice: GeneratedInvoice {
            series_id: series.id.clone(),
            invoice_id: created.id,
            invoice_number: created.invoice_number,
            issue_date: today,
        },
        cancelled,
    })
}

/// Generates one invoice for every active series due on `today`.
///
/// A failure on one series is logged and counted; the pass continues with
/// the next one. Only listing the series can fail the whole run.
pub fn run_due_generations<S>(store: &S, today: Date) -> StoreResult<GenerationReport>
where
    S: InvoiceStore + SeriesStore,
{
    let mut report = GenerationReport::default();

    for series in store.list_series(SeriesStatus::Active)? {
        match process_series(store, &series, today) {
            Ok(SeriesOutcome::NotDue) => {}
            Ok(SeriesOutcome::Skipped) => report.skipped += 1,
            Ok(SeriesOutcome::Generated { invoice, cancelled }) => {
                if cancelled {
                    report.cancelled.push(series.id.clone());
                }
                report.generated.push(invoice);
            }
            Ok(SeriesOutcome::Cancelled) => report.cancelled.push(series.id.clone()),
            Err(e) => {
                tracing::error!(series_id = %series.id, error = %e, "recurring generation failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        today = %format_ymd(today),
        generated = report.generated.len(),
        cancelled = report.cancelled.len(),
        skipped = report.skipped,
        failed = report.failed,
        "recurring generation finished"
    );
    Ok(report)
}

/// A reminder email ready to hand to a sender.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingReminder {
    pub invoice_id: String,
    pub invoice_number: String,
    /// `None` when the client has no email address on file.
    pub to: Option<String>,
    pub offset: OffsetKey,
    #[serde(with = "dates::ymd")]
    pub fire_date: Date,
    pub tone: Tone,
    pub attach_pdf: bool,
    pub email: ComposedEmail,
    /// Stored settings that could not be read as written. The email was
    /// rendered with the replacements.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ResolutionFallback>,
}

fn placeholders_for(invoice: &Invoice, due: Date, business_name: &str) -> Placeholders {
    Placeholders {
        invoice_number: invoice.invoice_number.clone(),
        amount_due: format_amount_due(&invoice.total, &invoice.currency),
        due_date: format_ymd(due),
        client_name: invoice.client_name.clone(),
        business_name: business_name.to_string(),
        status_trigger: String::new(),
    }
}

fn email_context(invoice: &Invoice, placeholders: &Placeholders, attach_pdf: bool) -> EmailContext {
    EmailContext {
        business_name: placeholders.business_name.clone(),
        invoice_number: invoice.invoice_number.clone(),
        amount_due: placeholders.amount_due.clone(),
        due_date: placeholders.due_date.clone(),
        attach_pdf,
    }
}

fn effective_config<S: ReminderSettingsStore>(
    store: &S,
    invoice: &Invoice,
) -> StoreResult<EffectiveReminderConfig> {
    let defaults = store.get_defaults(&invoice.user_id)?;
    let override_ = store.get_override(&invoice.id)?;
    Ok(resolve_config(&defaults, override_.as_ref())?)
}

fn invoice_due_date(invoice: &Invoice) -> StoreResult<Option<Date>> {
    match invoice.due_date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(Some(parse_date("dueDate", raw)?)),
        _ => Ok(None),
    }
}

fn collect_for_invoice<S: ReminderSettingsStore>(
    store: &S,
    invoice: &Invoice,
    today: Date,
    business_name: &str,
    out: &mut Vec<OutgoingReminder>,
) -> StoreResult<()> {
    let Some(due) = invoice_due_date(invoice)? else {
        return Ok(());
    };

    let config = match effective_config(store, invoice) {
        Ok(c) => c,
        Err(StoreError::Validation(e)) => {
            tracing::warn!(invoice_id = %invoice.id, error = %e, "invalid reminder settings, skipping invoice");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if !config.reminders_enabled {
        return Ok(());
    }

    let placeholders = placeholders_for(invoice, due, business_name);
    for (offset, fire_date) in schedule_dates(due, &config) {
        if !is_due(fire_date, today) {
            continue;
        }
        if !store.record_reminder_sent(&invoice.id, offset, fire_date)? {
            tracing::debug!(invoice_id = %invoice.id, offset = offset.as_str(), "reminder already collected");
            continue;
        }

        for fallback in &config.fallbacks {
            tracing::warn!(invoice_id = %invoice.id, %fallback, "reminder settings fallback");
        }
        let message = render_preset(offset, config.tone, &placeholders);
        let email = compose_reminder_email(
            &message,
            &email_context(invoice, &placeholders, config.attach_pdf),
        );
        out.push(OutgoingReminder {
            invoice_id: invoice.id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            to: invoice.client_email.clone(),
            offset,
            fire_date,
            tone: config.tone,
            attach_pdf: config.attach_pdf,
            email,
            fallbacks: config.fallbacks.clone(),
        });
    }
    Ok(())
}

/// Reminders firing on `today` across all sent invoices.
///
/// Each returned reminder is recorded as sent before it is returned, so a
/// second call for the same day yields nothing new.
pub fn collect_due_reminders<S>(
    store: &S,
    today: Date,
    business_name: &str,
) -> StoreResult<Vec<OutgoingReminder>>
where
    S: InvoiceStore + ReminderSettingsStore,
{
    let mut out = Vec::new();
    for invoice in store.list_open_invoices()? {
        if let Err(e) = collect_for_invoice(store, &invoice, today, business_name, &mut out) {
            tracing::error!(invoice_id = %invoice.id, error = %e, "collecting reminders failed");
        }
    }
    tracing::info!(today = %format_ymd(today), count = out.len(), "collected due reminders");
    Ok(out)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub offset: OffsetKey,
    #[serde(with = "dates::ymd")]
    pub fire_date: Date,
    pub due_today: bool,
    pub message: ReminderMessage,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPreview {
    pub invoice_id: String,
    pub config: EffectiveReminderConfig,
    pub entries: Vec<PreviewEntry>,
}

/// Every scheduled reminder of one invoice, rendered. Nothing is recorded.
///
/// `tone` renders with the named tone instead of the configured one; an
/// unknown name falls back to friendly with a warning.
pub fn preview_invoice_reminders<S>(
    store: &S,
    invoice_id: &str,
    today: Date,
    business_name: &str,
    tone: Option<&str>,
) -> StoreResult<ReminderPreview>
where
    S: InvoiceStore + ReminderSettingsStore,
{
    let invoice = store.get_invoice(invoice_id)?.ok_or_else(|| StoreError::NotFound {
        entity: "invoice",
        id: invoice_id.to_string(),
    })?;
    let config = effective_config(store, &invoice)?;

    let Some(due) = invoice_due_date(&invoice)? else {
        return Ok(ReminderPreview {
            invoice_id: invoice.id,
            config,
            entries: Vec::new(),
        });
    };

    let placeholders = placeholders_for(&invoice, due, business_name);
    let tone_name = tone.unwrap_or(config.tone.as_str());
    let entries = schedule_dates(due, &config)
        .into_iter()
        .map(|(offset, fire_date)| {
            let rendered = render_message(offset.as_str(), tone_name, &placeholders);
            for fallback in &rendered.fallbacks {
                tracing::warn!(invoice_id, %fallback, "reminder template fallback");
            }
            PreviewEntry {
                offset,
                fire_date,
                due_today: is_due(fire_date, today),
                message: rendered.message,
            }
        })
        .collect();

    Ok(ReminderPreview {
        invoice_id: invoice.id,
        config,
        entries,
    })
}
