use std::path::PathBuf;

use pausaler_recurring::dates::parse_date;
use time::{Date, OffsetDateTime};

pub const ENV_DB: &str = "PAUSALER_DB";
pub const ENV_INVOICE_PREFIX: &str = "PAUSALER_INVOICE_PREFIX";
pub const ENV_BUSINESS_NAME: &str = "PAUSALER_BUSINESS_NAME";

const DEFAULT_INVOICE_PREFIX: &str = "INV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
  pub db_path: PathBuf,
  pub invoice_prefix: String,
  pub business_name: String,
}

/// Values given on the command line. Each one wins over its env variable.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub db: Option<PathBuf>,
  pub prefix: Option<String>,
  pub business_name: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
  v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn resolve(flags: Overrides, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<JobConfig> {
  let db_path = match flags.db {
    Some(p) => p,
    None => non_empty(env(ENV_DB))
      .map(PathBuf::from)
      .ok_or_else(|| anyhow::anyhow!("no database given: pass --db or set {ENV_DB}"))?,
  };

  let invoice_prefix = non_empty(flags.prefix)
    .or_else(|| non_empty(env(ENV_INVOICE_PREFIX)))
    .unwrap_or_else(|| DEFAULT_INVOICE_PREFIX.to_string());

  let business_name = non_empty(flags.business_name)
    .or_else(|| non_empty(env(ENV_BUSINESS_NAME)))
    .unwrap_or_default();

  Ok(JobConfig {
    db_path,
    invoice_prefix,
    business_name,
  })
}

pub fn from_env(flags: Overrides) -> anyhow::Result<JobConfig> {
  resolve(flags, |key| std::env::var(key).ok())
}

/// `--today` when given, otherwise the current UTC date.
pub fn today(arg: Option<&str>) -> anyhow::Result<Date> {
  match arg {
    Some(raw) => Ok(parse_date("today", raw)?),
    None => Ok(OffsetDateTime::now_utc().date()),
  }
}
