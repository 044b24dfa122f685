//! Canned reminder wording and `{{token}}` substitution.
//!
//! There is one preset per tone and offset, plus a generic invoice message
//! used outside the reminder flow.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::policy::{OffsetKey, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTemplate {
    pub subject: &'static str,
    pub intro: &'static str,
    pub follow_up: Option<&'static str>,
}

const FRIENDLY: [ReminderTemplate; 3] = [
    ReminderTemplate {
        subject: "Friendly reminder: invoice {{invoiceNumber}} {{statusTrigger}}",
        intro: "Hi {{clientName}}, just a quick heads-up that invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}} ({{dueDate}}).",
        follow_up: Some("If you have already sent the payment, thank you and please ignore this note. {{businessName}}"),
    },
    ReminderTemplate {
        subject: "Invoice {{invoiceNumber}} {{statusTrigger}}",
        intro: "Hi {{clientName}}, a gentle reminder that invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}}.",
        follow_up: Some("Thanks so much for your business! {{businessName}}"),
    },
    ReminderTemplate {
        subject: "Checking in on invoice {{invoiceNumber}}",
        intro: "Hi {{clientName}}, it looks like invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}} (due {{dueDate}}).",
        follow_up: Some("No worries if it slipped through the cracks. Let us know if you need anything from us. {{businessName}}"),
    },
];

const PROFESSIONAL: [ReminderTemplate; 3] = [
    ReminderTemplate {
        subject: "Upcoming payment: invoice {{invoiceNumber}}",
        intro: "Dear {{clientName}}, this is a reminder that invoice {{invoiceNumber}} in the amount of {{amountDue}} {{statusTrigger}}, on {{dueDate}}.",
        follow_up: Some("Kind regards, {{businessName}}"),
    },
    ReminderTemplate {
        subject: "Payment due today: invoice {{invoiceNumber}}",
        intro: "Dear {{clientName}}, invoice {{invoiceNumber}} in the amount of {{amountDue}} {{statusTrigger}}.",
        follow_up: Some("Please arrange payment at your earliest convenience. Kind regards, {{businessName}}"),
    },
    ReminderTemplate {
        subject: "Overdue notice: invoice {{invoiceNumber}}",
        intro: "Dear {{clientName}}, our records show that invoice {{invoiceNumber}} in the amount of {{amountDue}} {{statusTrigger}}. It was due on {{dueDate}}.",
        follow_up: Some("If payment has already been made, please disregard this message. Kind regards, {{businessName}}"),
    },
];

const FIRM: [ReminderTemplate; 3] = [
    ReminderTemplate {
        subject: "Payment required: invoice {{invoiceNumber}} {{statusTrigger}}",
        intro: "{{clientName}}, invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}}. Payment must be received by {{dueDate}}.",
        follow_up: None,
    },
    ReminderTemplate {
        subject: "Payment due today: invoice {{invoiceNumber}}",
        intro: "{{clientName}}, invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}}. Please pay in full today.",
        follow_up: None,
    },
    ReminderTemplate {
        subject: "Final notice: invoice {{invoiceNumber}} is overdue",
        intro: "{{clientName}}, invoice {{invoiceNumber}} for {{amountDue}} {{statusTrigger}}. It was due on {{dueDate}}.",
        follow_up: Some("Please settle the outstanding balance immediately to avoid further action. {{businessName}}"),
    },
];

pub const GENERIC_INVOICE: ReminderTemplate = ReminderTemplate {
    subject: "Invoice {{invoiceNumber}} from {{businessName}}",
    intro: "Hi {{clientName}}, please find invoice {{invoiceNumber}} for {{amountDue}}, due on {{dueDate}}.",
    follow_up: Some("Thank you for your business. {{businessName}}"),
};

pub fn preset(tone: Tone, offset: OffsetKey) -> ReminderTemplate {
    let row = match tone {
        Tone::Friendly => &FRIENDLY,
        Tone::Professional => &PROFESSIONAL,
        Tone::Firm => &FIRM,
    };
    match offset {
        OffsetKey::ThreeDaysBefore => row[0],
        OffsetKey::OnDueDate => row[1],
        OffsetKey::SevenDaysAfter => row[2],
    }
}

/// Default `{{statusTrigger}}` phrase for an offset.
pub fn status_trigger(offset: OffsetKey) -> &'static str {
    match offset {
        OffsetKey::ThreeDaysBefore => "is due in 3 days",
        OffsetKey::OnDueDate => "is due today",
        OffsetKey::SevenDaysAfter => "is 7 days overdue",
    }
}

/// Values for the template tokens. Empty fields render as empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Placeholders {
    pub invoice_number: String,
    pub amount_due: String,
    pub due_date: String,
    pub client_name: String,
    pub business_name: String,
    pub status_trigger: String,
}

impl Placeholders {
    pub fn get(&self, token: &str) -> Option<&str> {
        let v = match token {
            "invoiceNumber" => &self.invoice_number,
            "amountDue" => &self.amount_due,
            "dueDate" => &self.due_date,
            "clientName" => &self.client_name,
            "businessName" => &self.business_name,
            "statusTrigger" => &self.status_trigger,
            _ => return None,
        };
        Some(v.as_str())
    }
}

/// Replaces every `{{token}}` in one pass. Unknown tokens become empty and
/// substituted values are not scanned again. An unterminated `{{` is kept
/// literally.
pub fn substitute(template: &str, placeholders: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let token = after[..end].trim();
                out.push_str(placeholders.get(token).unwrap_or(""));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    pub subject: String,
    pub intro: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
}

/// A stored offset or tone that matched no preset. The message was rendered
/// from the friendly / on-due-date preset instead; callers should log it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ResolutionFallback {
    UnknownOffset(String),
    UnknownTone(String),
}

impl fmt::Display for ResolutionFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionFallback::UnknownOffset(v) => {
                write!(f, "unknown reminder offset {v:?}, used on_due_date")
            }
            ResolutionFallback::UnknownTone(v) => {
                write!(f, "unknown reminder tone {v:?}, used friendly")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub message: ReminderMessage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ResolutionFallback>,
}

fn render_template(template: ReminderTemplate, placeholders: &Placeholders) -> ReminderMessage {
    ReminderMessage {
        subject: substitute(template.subject, placeholders),
        intro: substitute(template.intro, placeholders),
        follow_up: template.follow_up.map(|t| substitute(t, placeholders)),
    }
}

/// Renders the preset for a known tone and offset. A blank
/// `statusTrigger` is filled with the offset's default phrase.
pub fn render_preset(offset: OffsetKey, tone: Tone, placeholders: &Placeholders) -> ReminderMessage {
    if placeholders.status_trigger.trim().is_empty() {
        let filled = Placeholders {
            status_trigger: status_trigger(offset).to_string(),
            ..placeholders.clone()
        };
        return render_template(preset(tone, offset), &filled);
    }
    render_template(preset(tone, offset), placeholders)
}

/// Renders a reminder from stored offset/tone names. Unknown names fall back
/// to `on_due_date` / `friendly` and are reported in
/// [`RenderedMessage::fallbacks`].
pub fn render_message(offset_key: &str, tone: &str, placeholders: &Placeholders) -> RenderedMessage {
    let mut fallbacks = Vec::new();

    let offset = OffsetKey::parse(offset_key).unwrap_or_else(|| {
        fallbacks.push(ResolutionFallback::UnknownOffset(offset_key.to_string()));
        OffsetKey::OnDueDate
    });
    let tone = Tone::parse(tone).unwrap_or_else(|| {
        fallbacks.push(ResolutionFallback::UnknownTone(tone.to_string()));
        Tone::Friendly
    });

    RenderedMessage {
        message: render_preset(offset, tone, placeholders),
        fallbacks,
    }
}

/// The plain invoice message sent outside the reminder schedule.
pub fn render_generic(placeholders: &Placeholders) -> ReminderMessage {
    render_template(GENERIC_INVOICE, placeholders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Placeholders {
        Placeholders {
            invoice_number: "1024".to_string(),
            amount_due: "$50.00".to_string(),
            due_date: "2024-03-10".to_string(),
            client_name: "Ada".to_string(),
            ..Placeholders::default()
        }
    }

    fn has_tokens(m: &ReminderMessage) -> bool {
        m.subject.contains("{{")
            || m.intro.contains("{{")
            || m.follow_up.as_deref().is_some_and(|f| f.contains("{{"))
    }

    #[test]
    fn renders_friendly_due_date_without_leftover_tokens() {
        let rendered = render_message("on_due_date", "friendly", &sample());
        assert!(rendered.fallbacks.is_empty());
        assert!(!has_tokens(&rendered.message));
        assert_eq!(rendered.message.subject, "Invoice 1024 is due today");
        assert_eq!(
            rendered.message.intro,
            "Hi Ada, a gentle reminder that invoice 1024 for $50.00 is due today."
        );
    }

    #[test]
    fn every_preset_substitutes_all_tokens() {
        for tone in [Tone::Friendly, Tone::Professional, Tone::Firm] {
            for offset in OffsetKey::CANONICAL {
                let m = render_preset(offset, tone, &sample());
                assert!(!has_tokens(&m), "{tone}/{offset} left a token");
                assert!(m.subject.contains("1024"), "{tone}/{offset} subject");
            }
        }
        assert!(!has_tokens(&render_generic(&sample())));
    }

    #[test]
    fn unknown_names_fall_back_and_are_reported() {
        let rendered = render_message("tomorrow", "sarcastic", &sample());
        assert_eq!(
            rendered.fallbacks,
            vec![
                ResolutionFallback::UnknownOffset("tomorrow".to_string()),
                ResolutionFallback::UnknownTone("sarcastic".to_string()),
            ]
        );
        assert_eq!(
            rendered.message,
            render_preset(OffsetKey::OnDueDate, Tone::Friendly, &sample())
        );
    }

    #[test]
    fn explicit_status_trigger_is_kept() {
        let p = Placeholders {
            status_trigger: "is awaiting payment".to_string(),
            ..sample()
        };
        let m = render_preset(OffsetKey::OnDueDate, Tone::Firm, &p);
        assert!(m.intro.contains("is awaiting payment"));
    }

    #[test]
    fn substitution_is_single_pass() {
        let p = Placeholders {
            client_name: "{{invoiceNumber}}".to_string(),
            invoice_number: "7".to_string(),
            ..Placeholders::default()
        };
        assert_eq!(substitute("Hi {{clientName}} #{{ invoiceNumber }}", &p), "Hi {{invoiceNumber}} #7");
    }

    #[test]
    fn substitution_edge_cases() {
        let p = sample();
        assert_eq!(substitute("{{unknown}}!", &p), "!");
        assert_eq!(substitute("tail {{clientName", &p), "tail {{clientName");
        assert_eq!(substitute("no tokens", &p), "no tokens");
        assert_eq!(substitute("{{clientName}}{{clientName}}", &p), "AdaAda");
    }
}
