use serde::{Deserialize, Serialize};

use super::templates::ReminderMessage;

/// Invoice facts shown in the summary block under the reminder text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailContext {
    pub business_name: String,
    pub invoice_number: String,
    pub amount_due: String,
    pub due_date: String,
    pub attach_pdf: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComposedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

const LABEL_INVOICE_NUMBER: &str = "Invoice number";
const LABEL_AMOUNT_DUE: &str = "Amount due";
const LABEL_DUE_DATE: &str = "Due date";
const PDF_NOTE: &str = "The invoice is attached to this email as a PDF.";
const FOOTER: &str = "This is an automated payment reminder.";

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Lays a rendered reminder out as an email body, returned as html and a
/// plain-text alternative.
///
/// - Email-client-safe layout (tables + inline CSS).
/// - Every interpolated value is escaped exactly once, here.
/// - Empty summary rows are skipped.
pub fn compose_reminder_email(message: &ReminderMessage, ctx: &EmailContext) -> ComposedEmail {
    let business = ctx.business_name.trim();
    let follow_up = message
        .follow_up
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let rows = [
        (LABEL_INVOICE_NUMBER, ctx.invoice_number.trim()),
        (LABEL_AMOUNT_DUE, ctx.amount_due.trim()),
        (LABEL_DUE_DATE, ctx.due_date.trim()),
    ];

    // ---- Plain-text fallback ----
    let mut text = String::new();
    text.push_str(message.intro.trim());
    text.push_str("\n\n");
    for (label, value) in rows {
        if !value.is_empty() {
            text.push_str(&format!("{}: {}\n", label, value));
        }
    }
    if ctx.attach_pdf {
        text.push('\n');
        text.push_str(PDF_NOTE);
        text.push('\n');
    }
    if let Some(f) = follow_up {
        text.push('\n');
        text.push_str(f);
        text.push('\n');
    }
    text.push_str("\n--------------------------------\n");
    text.push_str(FOOTER);
    text.push('\n');

    // ---- HTML ----
    fn push_detail_row(html: &mut String, label: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        html.push_str(&format!(
            "<tr><td style=\"padding:6px 0;font-size:13px;color:#4b5563;\">{}</td><td align=\"right\" style=\"padding:6px 0;font-size:13px;color:#111827;font-weight:600;\">{}</td></tr>",
            escape_html(label),
            escape_html(value)
        ));
    }

    let mut html = String::new();
    html.push_str("<!doctype html><html><head><meta charset=\"utf-8\"></head>");
    html.push_str("<body style=\"margin:0;padding:0;background-color:#f6f7f9;font-family:Arial,Helvetica,sans-serif;\">");
    html.push_str("<table role=\"presentation\" width=\"100%\" cellspacing=\"0\" cellpadding=\"0\" style=\"background-color:#f6f7f9;padding:24px 0;\">\
<tr><td align=\"center\">\
<table role=\"presentation\" width=\"600\" cellspacing=\"0\" cellpadding=\"0\" style=\"width:600px;max-width:600px;background-color:#ffffff;border:1px solid #e6e8ec;border-radius:10px;overflow:hidden;\">\
");

    // Header
    if !business.is_empty() {
        html.push_str("<tr><td style=\"padding:20px 24px 0 24px;\">");
        html.push_str(&format!(
            "<div style=\"font-size:18px;font-weight:700;color:#111827;\">{}</div>",
            escape_html(business)
        ));
        html.push_str("</td></tr>");
    }

    // Body
    html.push_str("<tr><td style=\"padding:16px 24px 20px 24px;\">");
    html.push_str(&format!(
        "<p style=\"margin:0;font-size:14px;line-height:20px;color:#111827;\">{}</p>",
        escape_html(message.intro.trim())
    ));

    html.push_str("<table role=\"presentation\" width=\"100%\" cellspacing=\"0\" cellpadding=\"0\" style=\"margin-top:16px;border:1px solid #e6e8ec;border-radius:10px;\">\
<tr><td style=\"padding:14px;\">\
<table role=\"presentation\" width=\"100%\" cellspacing=\"0\" cellpadding=\"0\">\
");
    for (label, value) in rows {
        push_detail_row(&mut html, label, value);
    }
    html.push_str("</table></td></tr></table>");

    if ctx.attach_pdf {
        html.push_str(&format!(
            "<p style=\"margin:16px 0 0 0;font-size:13px;color:#4b5563;\">{}</p>",
            escape_html(PDF_NOTE)
        ));
    }
    if let Some(f) = follow_up {
        html.push_str(&format!(
            "<p style=\"margin:16px 0 0 0;font-size:14px;line-height:20px;color:#111827;white-space:pre-wrap;\">{}</p>",
            escape_html(f)
        ));
    }
    html.push_str("</td></tr>");

    // Footer
    html.push_str("<tr><td style=\"padding:0 24px 22px 24px;\">");
    html.push_str(&format!(
        "<div style=\"padding-top:12px;border-top:1px solid #e6e8ec;font-size:12px;color:#6b7280;\">{}</div>",
        escape_html(FOOTER)
    ));
    html.push_str("</td></tr>");

    html.push_str("</table></td></tr></table></body></html>");

    ComposedEmail {
        subject: message.subject.trim().to_string(),
        html,
        text,
    }
}
