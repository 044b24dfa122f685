use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pausaler_recurring::dates::{format_ymd, parse_date};
use pausaler_recurring::recurrence::compute_next_date;
use pausaler_recurring::{
  collect_due_reminders, preview_invoice_reminders, run_due_generations, Frequency, SqliteStore,
};
use serde::Serialize;

mod config;

#[derive(Parser, Debug)]
#[command(name = "recurring-job")]
struct Cli {
  /// SQLite database file (falls back to PAUSALER_DB).
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Prefix for generated invoice numbers (falls back to PAUSALER_INVOICE_PREFIX, then INV).
  #[arg(long, global = true)]
  prefix: Option<String>,

  /// Sender name used in reminder emails (falls back to PAUSALER_BUSINESS_NAME).
  #[arg(long, global = true)]
  business_name: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Prints the next generation dates after --from.
  NextDate {
    #[arg(long)]
    from: String,

    #[arg(long, default_value = "monthly")]
    frequency: String,

    #[arg(long, default_value_t = 1)]
    count: u32,
  },

  /// Shows every scheduled reminder of one invoice without recording anything.
  PreviewReminders {
    #[arg(long)]
    invoice: String,

    #[arg(long)]
    today: Option<String>,

    /// Render with this tone instead of the configured one.
    #[arg(long)]
    tone: Option<String>,
  },

  /// Generates due recurring invoices and collects today's reminders.
  Run {
    #[arg(long)]
    today: Option<String>,

    #[arg(long)]
    skip_generation: bool,

    #[arg(long)]
    skip_reminders: bool,
  },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput {
  today: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  generation: Option<pausaler_recurring::GenerationReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  reminders: Option<Vec<pausaler_recurring::OutgoingReminder>>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn open_store(cfg: &config::JobConfig) -> anyhow::Result<SqliteStore> {
  let store = SqliteStore::open(&cfg.db_path)
    .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", cfg.db_path.display()))?;
  Ok(store.with_invoice_prefix(cfg.invoice_prefix.clone()))
}

fn main() -> anyhow::Result<()> {
  // stdout carries the JSON output.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();
  let flags = config::Overrides {
    db: cli.db,
    prefix: cli.prefix,
    business_name: cli.business_name,
  };

  match cli.command {
    Command::NextDate {
      from,
      frequency,
      count,
    } => {
      let frequency = Frequency::parse_lenient(&frequency);
      let mut current = parse_date("from", &from)?;
      let count = count.max(1);
      let mut dates = Vec::with_capacity(count as usize);
      for _ in 0..count {
        current = compute_next_date(current, frequency);
        dates.push(format_ymd(current));
      }
      print_json(&dates)?;
    }

    Command::PreviewReminders {
      invoice,
      today,
      tone,
    } => {
      let cfg = config::from_env(flags)?;
      let today = config::today(today.as_deref())?;
      let store = open_store(&cfg)?;
      let preview =
        preview_invoice_reminders(&store, &invoice, today, &cfg.business_name, tone.as_deref())?;
      print_json(&preview)?;
    }

    Command::Run {
      today,
      skip_generation,
      skip_reminders,
    } => {
      let cfg = config::from_env(flags)?;
      let today = config::today(today.as_deref())?;
      let store = open_store(&cfg)?;
      tracing::info!(db = %cfg.db_path.display(), today = %format_ymd(today), "recurring job starting");

      let generation = if skip_generation {
        None
      } else {
        Some(run_due_generations(&store, today)?)
      };
      let reminders = if skip_reminders {
        None
      } else {
        Some(collect_due_reminders(&store, today, &cfg.business_name)?)
      };

      print_json(&RunOutput {
        today: format_ymd(today),
        generation,
        reminders,
      })?;
    }
  }

  Ok(())
}
