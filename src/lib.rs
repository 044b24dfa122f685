//! Recurring invoice scheduling and payment reminder policy.
//!
//! The engine modules ([`recurrence`], [`reminders`]) are pure: every
//! function takes "today" as an argument and touches no storage. [`jobs`]
//! drives them over the [`store`] traits, and [`store::SqliteStore`] is the
//! bundled persistence adapter.

pub mod dates;
pub mod error;
pub mod jobs;
pub mod model;
pub mod money;
pub mod recurrence;
pub mod reminders;
pub mod store;

pub use error::{StoreError, StoreResult, ValidationError};
pub use jobs::{
    collect_due_reminders, preview_invoice_reminders, run_due_generations, GenerationReport,
    OutgoingReminder, ReminderPreview,
};
pub use model::{Invoice, InvoiceItem, InvoiceStatus, NewInvoice, NewInvoiceItem};
pub use recurrence::{Frequency, RecurrenceRule, RecurringSeries, SeriesStatus};
pub use store::{InvoiceStore, ReminderSettingsStore, SeriesStore, SqliteStore};
