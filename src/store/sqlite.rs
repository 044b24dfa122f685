use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::{InvoiceStore, ReminderSettingsStore, SeriesStore};
use crate::dates::{format_ymd, parse_date};
use crate::error::{sqlite_error_string, StoreError, StoreResult};
use crate::model::{Invoice, InvoiceItem, NewInvoice};
use crate::recurrence::{transition_status, RecurringSeries, SeriesStatus};
use crate::reminders::{OffsetKey, ReminderDefaults, ReminderOverride, ResolutionFallback, Tone};

const SCHEMA_VERSION: i64 = 2;
const NEXT_INVOICE_NUMBER_KEY: &str = "nextInvoiceNumber";
const DEFAULT_INVOICE_PREFIX: &str = "INV";

fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn format_invoice_number(prefix: &str, next: i64) -> String {
    format!("{}-{:0>4}", prefix, next)
}

fn configure_sqlite(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Apply PRAGMAs on init (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY NOT NULL,
            invoiceNumber TEXT NOT NULL,
            userId TEXT NOT NULL,
            clientId TEXT NOT NULL,
            issueDate TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            dueDate TEXT,
            currency TEXT NOT NULL,
            totalAmount TEXT NOT NULL,
            recurringSeriesId TEXT,
            createdAt TEXT NOT NULL,
            data_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recurring_series (
            id TEXT PRIMARY KEY NOT NULL,
            userId TEXT NOT NULL,
            baseInvoiceId TEXT NOT NULL UNIQUE,
            clientId TEXT NOT NULL,
            status TEXT NOT NULL,
            nextGenerationDate TEXT NOT NULL,
            totalGeneratedCount INTEGER NOT NULL DEFAULT 0,
            lastGeneratedAt TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            data_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reminder_defaults (
            userId TEXT PRIMARY KEY NOT NULL,
            enabled INTEGER NOT NULL,
            schedule TEXT NOT NULL,
            tone TEXT NOT NULL,
            attachPdf INTEGER NOT NULL,
            updatedAt TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reminder_overrides (
            invoiceId TEXT PRIMARY KEY NOT NULL,
            remindersEnabled INTEGER NOT NULL,
            schedule TEXT NOT NULL,
            tone TEXT NOT NULL,
            attachPdf INTEGER NOT NULL,
            updatedAt TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reminder_log (
            invoiceId TEXT NOT NULL,
            offsetKey TEXT NOT NULL,
            fireDate TEXT NOT NULL,
            sentAt TEXT NOT NULL,
            PRIMARY KEY (invoiceId, offsetKey, fireDate)
        );

        CREATE INDEX IF NOT EXISTS idx_invoices_invoiceNumber ON invoices(invoiceNumber);
        CREATE INDEX IF NOT EXISTS idx_invoices_status_dueDate ON invoices(status, dueDate);
        CREATE INDEX IF NOT EXISTS idx_series_status_next ON recurring_series(status, nextGenerationDate);
        "#,
    )?;
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    // v=0 means a fresh DB (init_schema created the latest tables).
    if v == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        return Ok(());
    }

    if v < 2 {
        // v1 predates generated invoices being linked back to their series.
        // reminder_log itself is created by init_schema.
        conn.execute_batch(
            "ALTER TABLE invoices ADD COLUMN recurringSeriesId TEXT;\n\
             PRAGMA user_version = 2;\n",
        )?;
    }

    Ok(())
}

fn app_meta_get(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_meta WHERE key = ?1",
        params![key],
        |r| r.get(0),
    )
    .optional()
}

fn app_meta_set(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_meta(key, value) VALUES(?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn encode_schedule(schedule: &[OffsetKey]) -> StoreResult<String> {
    Ok(serde_json::to_string(schedule)?)
}

/// Offsets written by other clients may include keys this build does not
/// know; those are dropped so the rest of the schedule still applies. An
/// unknown tone reads as friendly. Each replacement is reported.
fn decode_settings(
    schedule_raw: &str,
    tone_raw: &str,
) -> StoreResult<(Vec<OffsetKey>, Tone, Vec<ResolutionFallback>)> {
    let keys: Vec<String> = serde_json::from_str(schedule_raw)?;
    let mut schedule = Vec::with_capacity(keys.len());
    let mut fallbacks = Vec::new();
    for key in keys {
        match OffsetKey::parse(&key) {
            Some(k) => {
                if !schedule.contains(&k) {
                    schedule.push(k);
                }
            }
            None => {
                tracing::warn!(offset = %key, "ignoring unknown reminder offset");
                fallbacks.push(ResolutionFallback::UnknownOffset(key));
            }
        }
    }

    let tone = Tone::parse(tone_raw).unwrap_or_else(|| {
        tracing::warn!(tone = tone_raw, "unknown reminder tone, using friendly");
        fallbacks.push(ResolutionFallback::UnknownTone(tone_raw.to_string()));
        Tone::Friendly
    });

    Ok((schedule, tone, fallbacks))
}

fn read_invoice(conn: &Connection, id: &str) -> StoreResult<Option<Invoice>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT data_json FROM invoices WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;

    match json {
        Some(j) => Ok(Some(serde_json::from_str::<Invoice>(&j)?)),
        None => Ok(None),
    }
}

const SERIES_COLUMNS: &str =
    "data_json, status, nextGenerationDate, totalGeneratedCount, lastGeneratedAt";

type SeriesRow = (String, String, String, i64, Option<String>);

fn series_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SeriesRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn decode_series(row: SeriesRow) -> StoreResult<RecurringSeries> {
    let (data_json, status, next, count, last) = row;
    let mut series: RecurringSeries = serde_json::from_str(&data_json)?;

    // Progress and status live in dedicated columns; update_series_progress
    // does not rewrite data_json, so the JSON copy may be stale.
    match SeriesStatus::parse(&status) {
        Some(s) => series.status = s,
        None => tracing::warn!(
            series_id = %series.id,
            status = %status,
            fallback = series.status.as_str(),
            "unknown series status column, using stored json"
        ),
    }
    series.next_generation_date = parse_date("nextGenerationDate", &next)?;
    // A count that does not fit reads as exhausted so the series stops.
    series.total_generated_count = u32::try_from(count).unwrap_or_else(|_| {
        tracing::warn!(series_id = %series.id, count, "invalid generated count, treating series as exhausted");
        u32::MAX
    });
    series.last_generated_at = last
        .as_deref()
        .map(|d| parse_date("lastGeneratedAt", d))
        .transpose()?;
    Ok(series)
}

fn read_series_by_id(conn: &Connection, id: &str) -> StoreResult<Option<RecurringSeries>> {
    let row = conn
        .query_row(
            &format!("SELECT {SERIES_COLUMNS} FROM recurring_series WHERE id = ?1"),
            params![id],
            series_row,
        )
        .optional()?;
    row.map(decode_series).transpose()
}

fn log_failure(op_name: &'static str, err: &StoreError) {
    match err {
        StoreError::Sqlite(e) => {
            tracing::error!(op = op_name, error = %sqlite_error_string(e), "sqlite operation failed")
        }
        StoreError::Json(e) => tracing::error!(op = op_name, error = %e, "stored json is invalid"),
        other => tracing::debug!(op = op_name, error = %other, "store operation rejected"),
    }
}

/// SQLite-backed implementation of every store trait.
///
/// One connection guarded by a mutex; writes that read-then-write run in
/// `IMMEDIATE` transactions.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    invoice_prefix: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        configure_sqlite(&conn)?;
        init_schema(&conn)?;
        apply_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
        })
    }

    /// Prefix for numbers of invoices created through this store.
    pub fn with_invoice_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.trim().is_empty() {
            self.invoice_prefix = prefix.trim().to_string();
        }
        self
    }

    fn with_read<T, F>(&self, op_name: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard).map_err(|e| {
            log_failure(op_name, &e);
            e
        })
    }

    fn with_write<T, F>(&self, op_name: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard).map_err(|e| {
            log_failure(op_name, &e);
            e
        })
    }
}

impl InvoiceStore for SqliteStore {
    fn get_invoice(&self, id: &str) -> StoreResult<Option<Invoice>> {
        self.with_read("get_invoice", |conn| read_invoice(conn, id))
    }

    fn get_items(&self, invoice_id: &str) -> StoreResult<Vec<InvoiceItem>> {
        self.with_read("get_items", |conn| {
            let invoice = read_invoice(conn, invoice_id)?.ok_or_else(|| StoreError::NotFound {
                entity: "invoice",
                id: invoice_id.to_string(),
            })?;
            Ok(invoice.items)
        })
    }

    fn create_invoice_from_snapshot(&self, input: NewInvoice) -> StoreResult<Invoice> {
        let prefix = self.invoice_prefix.clone();
        self.with_write("create_invoice_from_snapshot", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let next_num = app_meta_get(&tx, NEXT_INVOICE_NUMBER_KEY)?
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(1);
            let invoice_number = format_invoice_number(&prefix, next_num);

            let items = input
                .items
                .into_iter()
                .map(|it| InvoiceItem {
                    id: Uuid::new_v4().to_string(),
                    description: it.description,
                    quantity: it.quantity,
                    unit_price: it.unit_price,
                    tax_rate: it.tax_rate,
                    discount: it.discount,
                    line_total: it.line_total,
                })
                .collect();

            let created = Invoice {
                id: Uuid::new_v4().to_string(),
                invoice_number,
                user_id: input.user_id,
                client_id: input.client_id,
                client_name: input.client_name,
                client_email: input.client_email,
                issue_date: input.issue_date,
                due_date: input.due_date,
                status: input.status,
                currency: input.currency,
                notes: input.notes,
                template_id: input.template_id,
                payment_method: input.payment_method,
                subtotal: input.subtotal,
                tax_total: input.tax_total,
                total: input.total,
                items,
                recurring_series_id: input.recurring_series_id,
                created_at: now_iso(),
            };

            let json = serde_json::to_string(&created)?;
            tx.execute(
                r#"INSERT INTO invoices (
                    id, invoiceNumber, userId, clientId, issueDate, status, dueDate, currency,
                    totalAmount, recurringSeriesId, createdAt, data_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
                params![
                    created.id,
                    created.invoice_number,
                    created.user_id,
                    created.client_id,
                    created.issue_date,
                    created.status.as_str(),
                    created.due_date,
                    created.currency,
                    created.total,
                    created.recurring_series_id,
                    created.created_at,
                    json,
                ],
            )?;

            app_meta_set(&tx, NEXT_INVOICE_NUMBER_KEY, &(next_num + 1).to_string())?;

            tx.commit()?;
            Ok(created)
        })
    }

    fn list_open_invoices(&self) -> StoreResult<Vec<Invoice>> {
        self.with_read("list_open_invoices", |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT data_json
                   FROM invoices
                   WHERE status = 'SENT' AND dueDate IS NOT NULL AND TRIM(dueDate) <> ''
                   ORDER BY dueDate, invoiceNumber"#,
            )?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str::<Invoice>(&row?)?);
            }
            Ok(out)
        })
    }
}

impl SeriesStore for SqliteStore {
    fn get_series_by_base_invoice(&self, invoice_id: &str) -> StoreResult<Option<RecurringSeries>> {
        self.with_read("get_series_by_base_invoice", |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {SERIES_COLUMNS} FROM recurring_series WHERE baseInvoiceId = ?1"),
                    params![invoice_id],
                    series_row,
                )
                .optional()?;
            row.map(decode_series).transpose()
        })
    }

    fn insert_series(&self, series: RecurringSeries) -> StoreResult<RecurringSeries> {
        series.rule.validate()?;
        self.with_write("insert_series", move |conn| {
            let now = now_iso();
            let json = serde_json::to_string(&series)?;
            conn.execute(
                r#"INSERT INTO recurring_series (
                    id, userId, baseInvoiceId, clientId, status, nextGenerationDate,
                    totalGeneratedCount, lastGeneratedAt, createdAt, updatedAt, data_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    series.id,
                    series.user_id,
                    series.base_invoice_id,
                    series.client_id,
                    series.status.as_str(),
                    format_ymd(series.next_generation_date),
                    series.total_generated_count,
                    series.last_generated_at.map(format_ymd),
                    now,
                    now,
                    json,
                ],
            )?;
            Ok(series)
        })
    }

    fn update_series_status(&self, id: &str, status: SeriesStatus) -> StoreResult<RecurringSeries> {
        self.with_write("update_series_status", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = read_series_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound {
                entity: "recurring series",
                id: id.to_string(),
            })?;
            let next = transition_status(current.status, status)?;

            tx.execute(
                "UPDATE recurring_series SET status = ?2, updatedAt = ?3 WHERE id = ?1",
                params![id, next.as_str(), now_iso()],
            )?;
            tx.commit()?;

            Ok(RecurringSeries {
                status: next,
                ..current
            })
        })
    }

    fn update_series_progress(
        &self,
        id: &str,
        expected_next: Date,
        next: Date,
        count: u32,
        last_generated_at: Date,
    ) -> StoreResult<bool> {
        self.with_write("update_series_progress", |conn| {
            let affected = conn.execute(
                r#"UPDATE recurring_series
                   SET nextGenerationDate = ?3, totalGeneratedCount = ?4, lastGeneratedAt = ?5, updatedAt = ?6
                   WHERE id = ?1 AND nextGenerationDate = ?2 AND status = 'active'"#,
                params![
                    id,
                    format_ymd(expected_next),
                    format_ymd(next),
                    count,
                    format_ymd(last_generated_at),
                    now_iso(),
                ],
            )?;
            Ok(affected > 0)
        })
    }

    fn list_series(&self, status: SeriesStatus) -> StoreResult<Vec<RecurringSeries>> {
        self.with_read("list_series", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SERIES_COLUMNS} FROM recurring_series WHERE status = ?1 ORDER BY nextGenerationDate, id"
            ))?;
            let rows = stmt.query_map(params![status.as_str()], series_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode_series(row?)?);
            }
            Ok(out)
        })
    }
}

impl ReminderSettingsStore for SqliteStore {
    fn get_defaults(&self, user_id: &str) -> StoreResult<ReminderDefaults> {
        self.with_write("get_defaults", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = tx
                .query_row(
                    "SELECT enabled, schedule, tone, attachPdf FROM reminder_defaults WHERE userId = ?1",
                    params![user_id],
                    |r| {
                        Ok((
                            r.get::<_, i64>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            let defaults = match row {
                Some((enabled, schedule, tone, attach_pdf)) => {
                    let (schedule, tone, fallbacks) = decode_settings(&schedule, &tone)?;
                    ReminderDefaults {
                        enabled: enabled != 0,
                        schedule,
                        tone,
                        attach_pdf: attach_pdf != 0,
                        fallbacks,
                    }
                }
                None => {
                    let d = ReminderDefaults::default();
                    tx.execute(
                        "INSERT INTO reminder_defaults (userId, enabled, schedule, tone, attachPdf, updatedAt) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            user_id,
                            d.enabled as i32,
                            encode_schedule(&d.schedule)?,
                            d.tone.as_str(),
                            d.attach_pdf as i32,
                            now_iso(),
                        ],
                    )?;
                    tracing::debug!(user_id, "created built-in reminder defaults");
                    d
                }
            };

            tx.commit()?;
            Ok(defaults)
        })
    }

    fn update_defaults(&self, user_id: &str, defaults: &ReminderDefaults) -> StoreResult<()> {
        if defaults.enabled && defaults.schedule.is_empty() {
            return Err(crate::error::ValidationError::EmptySchedule.into());
        }
        self.with_write("update_defaults", |conn| {
            conn.execute(
                r#"INSERT INTO reminder_defaults (userId, enabled, schedule, tone, attachPdf, updatedAt)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(userId) DO UPDATE SET
                       enabled = excluded.enabled,
                       schedule = excluded.schedule,
                       tone = excluded.tone,
                       attachPdf = excluded.attachPdf,
                       updatedAt = excluded.updatedAt"#,
                params![
                    user_id,
                    defaults.enabled as i32,
                    encode_schedule(&defaults.schedule)?,
                    defaults.tone.as_str(),
                    defaults.attach_pdf as i32,
                    now_iso(),
                ],
            )?;
            Ok(())
        })
    }

    fn get_override(&self, invoice_id: &str) -> StoreResult<Option<ReminderOverride>> {
        self.with_read("get_override", |conn| {
            let row = conn
                .query_row(
                    "SELECT remindersEnabled, schedule, tone, attachPdf FROM reminder_overrides WHERE invoiceId = ?1",
                    params![invoice_id],
                    |r| {
                        Ok((
                            r.get::<_, i64>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            match row {
                Some((enabled, schedule, tone, attach_pdf)) => {
                    let (schedule, tone, fallbacks) = decode_settings(&schedule, &tone)?;
                    Ok(Some(ReminderOverride {
                        reminders_enabled: enabled != 0,
                        schedule,
                        tone,
                        attach_pdf: attach_pdf != 0,
                        fallbacks,
                    }))
                }
                None => Ok(None),
            }
        })
    }

    fn upsert_override(&self, invoice_id: &str, reminder: &ReminderOverride) -> StoreResult<()> {
        reminder.validate()?;
        self.with_write("upsert_override", |conn| {
            conn.execute(
                r#"INSERT INTO reminder_overrides (invoiceId, remindersEnabled, schedule, tone, attachPdf, updatedAt)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(invoiceId) DO UPDATE SET
                       remindersEnabled = excluded.remindersEnabled,
                       schedule = excluded.schedule,
                       tone = excluded.tone,
                       attachPdf = excluded.attachPdf,
                       updatedAt = excluded.updatedAt"#,
                params![
                    invoice_id,
                    reminder.reminders_enabled as i32,
                    encode_schedule(&reminder.schedule)?,
                    reminder.tone.as_str(),
                    reminder.attach_pdf as i32,
                    now_iso(),
                ],
            )?;
            Ok(())
        })
    }

    fn delete_override(&self, invoice_id: &str) -> StoreResult<bool> {
        self.with_write("delete_override", |conn| {
            let affected = conn.execute(
                "DELETE FROM reminder_overrides WHERE invoiceId = ?1",
                params![invoice_id],
            )?;
            Ok(affected > 0)
        })
    }

    fn record_reminder_sent(
        &self,
        invoice_id: &str,
        offset: OffsetKey,
        fire_date: Date,
    ) -> StoreResult<bool> {
        self.with_write("record_reminder_sent", |conn| {
            let affected = conn.execute(
                "INSERT OR IGNORE INTO reminder_log (invoiceId, offsetKey, fireDate, sentAt) VALUES (?1, ?2, ?3, ?4)",
                params![invoice_id, offset.as_str(), format_ymd(fire_date), now_iso()],
            )?;
            Ok(affected > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::model::{InvoiceStatus, NewInvoiceItem};
    use crate::recurrence::{new_series, Frequency, RecurrenceRule};
    use pretty_assertions::assert_eq;
    use time::macros::date;

    fn new_invoice(total: &str) -> NewInvoice {
        NewInvoice {
            user_id: "user-1".to_string(),
            client_id: "client-1".to_string(),
            client_name: "Ada".to_string(),
            client_email: Some("ada@example.com".to_string()),
            issue_date: "2024-04-01".to_string(),
            due_date: Some("2024-04-15".to_string()),
            status: InvoiceStatus::Sent,
            currency: "USD".to_string(),
            notes: String::new(),
            template_id: None,
            payment_method: None,
            subtotal: total.to_string(),
            tax_total: "0".to_string(),
            total: total.to_string(),
            items: vec![NewInvoiceItem {
                description: "Hosting".to_string(),
                quantity: "1".to_string(),
                unit_price: total.to_string(),
                tax_rate: None,
                discount: None,
                line_total: total.to_string(),
            }],
            recurring_series_id: None,
        }
    }

    fn seeded_series(store: &SqliteStore) -> RecurringSeries {
        let base = store.create_invoice_from_snapshot(new_invoice("19.99")).unwrap();
        let items = store.get_items(&base.id).unwrap();
        let rule = RecurrenceRule {
            frequency: Frequency::Monthly,
            start_date: date!(2024 - 05 - 01),
            end_date: None,
            max_occurrences: Some(3),
            auto_send: true,
        };
        let series = new_series("series-1", &base, &items, rule).unwrap();
        store.insert_series(series).unwrap()
    }

    #[test]
    fn invoices_are_numbered_sequentially() {
        let store = SqliteStore::open_in_memory().unwrap().with_invoice_prefix("ACME");
        let a = store.create_invoice_from_snapshot(new_invoice("10")).unwrap();
        let b = store.create_invoice_from_snapshot(new_invoice("20")).unwrap();
        assert_eq!(a.invoice_number, "ACME-0001");
        assert_eq!(b.invoice_number, "ACME-0002");

        let read = store.get_invoice(&b.id).unwrap().unwrap();
        assert_eq!(read, b);
        assert_eq!(read.items.len(), 1);
        assert!(store.get_invoice("missing").unwrap().is_none());
    }

    #[test]
    fn open_invoices_exclude_drafts_and_paid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let sent = store.create_invoice_from_snapshot(new_invoice("10")).unwrap();
        let mut draft = new_invoice("10");
        draft.status = InvoiceStatus::Draft;
        store.create_invoice_from_snapshot(draft).unwrap();
        let mut paid = new_invoice("10");
        paid.status = InvoiceStatus::Paid;
        store.create_invoice_from_snapshot(paid).unwrap();

        let open = store.list_open_invoices().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, sent.id);
    }

    #[test]
    fn defaults_are_created_lazily_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.get_defaults("user-1").unwrap();
        assert_eq!(first, ReminderDefaults::default());

        let custom = ReminderDefaults {
            enabled: true,
            schedule: vec![OffsetKey::SevenDaysAfter],
            tone: Tone::Firm,
            attach_pdf: true,
            fallbacks: vec![],
        };
        store.update_defaults("user-1", &custom).unwrap();
        assert_eq!(store.get_defaults("user-1").unwrap(), custom);
        assert_eq!(store.get_defaults("user-2").unwrap(), ReminderDefaults::default());
    }

    #[test]
    fn overrides_roundtrip_and_reject_empty_enabled_schedule() {
        let store = SqliteStore::open_in_memory().unwrap();
        let o = ReminderOverride {
            reminders_enabled: true,
            schedule: vec![OffsetKey::OnDueDate, OffsetKey::ThreeDaysBefore],
            tone: Tone::Professional,
            attach_pdf: false,
            fallbacks: vec![],
        };
        store.upsert_override("inv-1", &o).unwrap();
        assert_eq!(store.get_override("inv-1").unwrap(), Some(o.clone()));

        let empty = ReminderOverride {
            schedule: vec![],
            ..o.clone()
        };
        assert!(matches!(
            store.upsert_override("inv-1", &empty),
            Err(StoreError::Validation(ValidationError::EmptySchedule))
        ));
        assert_eq!(store.get_override("inv-1").unwrap(), Some(o));

        assert!(store.delete_override("inv-1").unwrap());
        assert!(!store.delete_override("inv-1").unwrap());
        assert_eq!(store.get_override("inv-1").unwrap(), None);
    }

    #[test]
    fn unknown_stored_values_are_normalized() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_write("seed", |conn| {
                conn.execute(
                    "INSERT INTO reminder_overrides (invoiceId, remindersEnabled, schedule, tone, attachPdf, updatedAt) VALUES ('inv-9', 1, '[\"7_days_after\",\"14_days_after\"]', 'stern', 0, 'x')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let o = store.get_override("inv-9").unwrap().unwrap();
        assert_eq!(o.schedule, vec![OffsetKey::SevenDaysAfter]);
        assert_eq!(o.tone, Tone::Friendly);
        assert_eq!(
            o.fallbacks,
            vec![
                ResolutionFallback::UnknownOffset("14_days_after".to_string()),
                ResolutionFallback::UnknownTone("stern".to_string()),
            ]
        );
    }

    #[test]
    fn unreadable_series_columns_are_tolerated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = seeded_series(&store);
        store
            .with_write("seed", |conn| {
                conn.execute(
                    "UPDATE recurring_series SET status = 'archived', totalGeneratedCount = -1 WHERE id = ?1",
                    params![series.id],
                )?;
                Ok(())
            })
            .unwrap();

        let read = store.get_series_by_base_invoice(&series.base_invoice_id).unwrap().unwrap();
        assert_eq!(read.status, SeriesStatus::Active);
        assert_eq!(read.total_generated_count, u32::MAX);
    }

    #[test]
    fn progress_is_not_claimed_for_inactive_series() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = seeded_series(&store);
        store.update_series_status(&series.id, SeriesStatus::Paused).unwrap();

        let claimed = store
            .update_series_progress(&series.id, date!(2024 - 05 - 01), date!(2024 - 06 - 01), 1, date!(2024 - 05 - 01))
            .unwrap();
        assert!(!claimed);

        let read = store.get_series_by_base_invoice(&series.base_invoice_id).unwrap().unwrap();
        assert_eq!(read.total_generated_count, 0);
        assert_eq!(read.next_generation_date, date!(2024 - 05 - 01));
    }

    #[test]
    fn progress_update_is_compare_and_swap() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = seeded_series(&store);

        let won = store
            .update_series_progress(&series.id, date!(2024 - 05 - 01), date!(2024 - 06 - 01), 1, date!(2024 - 05 - 01))
            .unwrap();
        assert!(won);

        let lost = store
            .update_series_progress(&series.id, date!(2024 - 05 - 01), date!(2024 - 06 - 01), 1, date!(2024 - 05 - 01))
            .unwrap();
        assert!(!lost);

        let read = store.get_series_by_base_invoice(&series.base_invoice_id).unwrap().unwrap();
        assert_eq!(read.next_generation_date, date!(2024 - 06 - 01));
        assert_eq!(read.total_generated_count, 1);
        assert_eq!(read.last_generated_at, Some(date!(2024 - 05 - 01)));
        assert_eq!(read.invoice_snapshot.total, "19.99");
    }

    #[test]
    fn status_changes_are_validated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = seeded_series(&store);

        let paused = store.update_series_status(&series.id, SeriesStatus::Paused).unwrap();
        assert_eq!(paused.status, SeriesStatus::Paused);
        assert!(store.list_series(SeriesStatus::Active).unwrap().is_empty());
        assert_eq!(store.list_series(SeriesStatus::Paused).unwrap().len(), 1);

        store.update_series_status(&series.id, SeriesStatus::Cancelled).unwrap();
        assert!(matches!(
            store.update_series_status(&series.id, SeriesStatus::Active),
            Err(StoreError::Validation(ValidationError::InvalidStatusTransition { .. }))
        ));
        assert!(matches!(
            store.update_series_status("nope", SeriesStatus::Paused),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn one_series_per_base_invoice() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = seeded_series(&store);
        let dup = RecurringSeries {
            id: "series-2".to_string(),
            ..series
        };
        assert!(matches!(store.insert_series(dup), Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn reminder_log_records_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let d = date!(2024 - 03 - 10);
        assert!(store.record_reminder_sent("inv-1", OffsetKey::OnDueDate, d).unwrap());
        assert!(!store.record_reminder_sent("inv-1", OffsetKey::OnDueDate, d).unwrap());
        assert!(store.record_reminder_sent("inv-1", OffsetKey::SevenDaysAfter, d).unwrap());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recurring.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.get_defaults("user-1").unwrap();
            store.create_invoice_from_snapshot(new_invoice("5")).unwrap().id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_invoice(&id).unwrap().is_some());
        let next = store.create_invoice_from_snapshot(new_invoice("6")).unwrap();
        assert_eq!(next.invoice_number, "INV-0002");
    }

    #[test]
    fn v1_database_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE invoices (
                    id TEXT PRIMARY KEY NOT NULL,
                    invoiceNumber TEXT NOT NULL,
                    userId TEXT NOT NULL,
                    clientId TEXT NOT NULL,
                    issueDate TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'DRAFT',
                    dueDate TEXT,
                    currency TEXT NOT NULL,
                    totalAmount TEXT NOT NULL,
                    createdAt TEXT NOT NULL,
                    data_json TEXT NOT NULL
                );
                PRAGMA user_version = 1;
                "#,
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let mut input = new_invoice("7");
        input.recurring_series_id = Some("series-1".to_string());
        let created = store.create_invoice_from_snapshot(input).unwrap();
        assert_eq!(created.recurring_series_id.as_deref(), Some("series-1"));

        let version: i64 = store
            .with_read("version", |conn| {
                Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
