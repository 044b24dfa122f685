//! Payment reminder policy: which reminders fire for an invoice, when, and
//! with what wording.

pub mod email;
pub mod policy;
pub mod templates;

pub use email::{compose_reminder_email, ComposedEmail, EmailContext};
pub use policy::{
    is_due, resolve_config, schedule_dates, ConfigSource, EffectiveReminderConfig, OffsetKey,
    ReminderDefaults, ReminderOverride, Tone,
};
pub use templates::{
    render_generic, render_message, render_preset, status_trigger, substitute, Placeholders,
    ReminderMessage, RenderedMessage, ResolutionFallback,
};
