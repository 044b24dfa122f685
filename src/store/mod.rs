//! Persistence collaborators consumed by the jobs.
//!
//! The engine itself never touches a store; these traits describe what the
//! surrounding system must provide, and [`SqliteStore`] is the bundled
//! implementation.

use time::Date;

use crate::error::StoreResult;
use crate::model::{Invoice, InvoiceItem, NewInvoice};
use crate::recurrence::{RecurringSeries, SeriesStatus};
use crate::reminders::{OffsetKey, ReminderDefaults, ReminderOverride};

mod sqlite;

pub use sqlite::SqliteStore;

pub trait InvoiceStore {
    fn get_invoice(&self, id: &str) -> StoreResult<Option<Invoice>>;

    fn get_items(&self, invoice_id: &str) -> StoreResult<Vec<InvoiceItem>>;

    /// Inserts an invoice, assigning its id and number.
    fn create_invoice_from_snapshot(&self, input: NewInvoice) -> StoreResult<Invoice>;

    /// Sent invoices that carry a due date, i.e. the ones reminders apply to.
    fn list_open_invoices(&self) -> StoreResult<Vec<Invoice>>;
}

pub trait SeriesStore {
    fn get_series_by_base_invoice(&self, invoice_id: &str) -> StoreResult<Option<RecurringSeries>>;

    fn insert_series(&self, series: RecurringSeries) -> StoreResult<RecurringSeries>;

    /// Applies a validated status transition and returns the updated series.
    fn update_series_status(&self, id: &str, status: SeriesStatus) -> StoreResult<RecurringSeries>;

    /// Writes generation progress only if the series is still active and its
    /// stored next generation date still equals `expected_next`. Returns
    /// `false` when another writer got there first or the series was paused
    /// or cancelled meanwhile.
    fn update_series_progress(
        &self,
        id: &str,
        expected_next: Date,
        next: Date,
        count: u32,
        last_generated_at: Date,
    ) -> StoreResult<bool>;

    fn list_series(&self, status: SeriesStatus) -> StoreResult<Vec<RecurringSeries>>;
}

pub trait ReminderSettingsStore {
    /// Returns the user's defaults, creating the built-in ones on first read.
    fn get_defaults(&self, user_id: &str) -> StoreResult<ReminderDefaults>;

    fn update_defaults(&self, user_id: &str, defaults: &ReminderDefaults) -> StoreResult<()>;

    fn get_override(&self, invoice_id: &str) -> StoreResult<Option<ReminderOverride>>;

    fn upsert_override(&self, invoice_id: &str, reminder: &ReminderOverride) -> StoreResult<()>;

    fn delete_override(&self, invoice_id: &str) -> StoreResult<bool>;

    /// Remembers that a reminder went out. Returns `false` if this exact
    /// (invoice, offset, fire date) was already recorded.
    fn record_reminder_sent(
        &self,
        invoice_id: &str,
        offset: OffsetKey,
        fire_date: Date,
    ) -> StoreResult<bool>;
}
