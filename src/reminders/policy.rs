//! Reminder settings resolution and fire-date expansion.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::Date;

use super::templates::ResolutionFallback;
use crate::dates::add_days;
use crate::error::ValidationError;

/// One of the fixed reminder timing slots relative to an invoice due date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OffsetKey {
    #[serde(rename = "3_days_before")]
    ThreeDaysBefore,
    #[serde(rename = "on_due_date")]
    OnDueDate,
    #[serde(rename = "7_days_after")]
    SevenDaysAfter,
}

impl OffsetKey {
    /// All offsets in chronological order.
    pub const CANONICAL: [OffsetKey; 3] = [
        OffsetKey::ThreeDaysBefore,
        OffsetKey::OnDueDate,
        OffsetKey::SevenDaysAfter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetKey::ThreeDaysBefore => "3_days_before",
            OffsetKey::OnDueDate => "on_due_date",
            OffsetKey::SevenDaysAfter => "7_days_after",
        }
    }

    pub fn parse(raw: &str) -> Option<OffsetKey> {
        match raw.trim() {
            "3_days_before" => Some(OffsetKey::ThreeDaysBefore),
            "on_due_date" => Some(OffsetKey::OnDueDate),
            "7_days_after" => Some(OffsetKey::SevenDaysAfter),
            _ => None,
        }
    }

    /// Days relative to the due date.
    pub fn day_offset(&self) -> i64 {
        match self {
            OffsetKey::ThreeDaysBefore => -3,
            OffsetKey::OnDueDate => 0,
            OffsetKey::SevenDaysAfter => 7,
        }
    }
}

impl fmt::Display for OffsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Professional,
    Firm,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
            Tone::Firm => "firm",
        }
    }

    pub fn parse(raw: &str) -> Option<Tone> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "friendly" => Some(Tone::Friendly),
            "professional" => Some(Tone::Professional),
            "firm" => Some(Tone::Firm),
            _ => None,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workspace-wide reminder settings, one per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDefaults {
    pub enabled: bool,
    pub schedule: Vec<OffsetKey>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub attach_pdf: bool,
    /// Stored values that were unreadable and replaced on load. Never saved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ResolutionFallback>,
}

impl Default for ReminderDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: OffsetKey::CANONICAL.to_vec(),
            tone: Tone::Friendly,
            attach_pdf: false,
            fallbacks: Vec::new(),
        }
    }
}

/// Per-invoice replacement for [`ReminderDefaults`]. When present it wins
/// as a whole; fields are never merged with the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderOverride {
    pub reminders_enabled: bool,
    pub schedule: Vec<OffsetKey>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub attach_pdf: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ResolutionFallback>,
}

impl ReminderOverride {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reminders_enabled && self.schedule.is_empty() {
            return Err(ValidationError::EmptySchedule);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Defaults,
    Override,
}

/// Reminder settings in force for one invoice. Computed on every read,
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveReminderConfig {
    pub reminders_enabled: bool,
    pub schedule: Vec<OffsetKey>,
    pub tone: Tone,
    pub attach_pdf: bool,
    pub source: ConfigSource,
    /// Carried over from the settings the config was resolved from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ResolutionFallback>,
}

pub fn resolve_config(
    defaults: &ReminderDefaults,
    override_: Option<&ReminderOverride>,
) -> Result<EffectiveReminderConfig, ValidationError> {
    let config = match override_ {
        Some(o) => EffectiveReminderConfig {
            reminders_enabled: o.reminders_enabled,
            schedule: o.schedule.clone(),
            tone: o.tone,
            attach_pdf: o.attach_pdf,
            source: ConfigSource::Override,
            fallbacks: o.fallbacks.clone(),
        },
        None => EffectiveReminderConfig {
            reminders_enabled: defaults.enabled,
            schedule: defaults.schedule.clone(),
            tone: defaults.tone,
            attach_pdf: defaults.attach_pdf,
            source: ConfigSource::Defaults,
            fallbacks: defaults.fallbacks.clone(),
        },
    };

    if config.reminders_enabled && config.schedule.is_empty() {
        return Err(ValidationError::EmptySchedule);
    }
    Ok(config)
}

/// Fire dates for the configured offsets, in chronological order whatever
/// order the schedule was saved in.
pub fn schedule_dates(due_date: Date, config: &EffectiveReminderConfig) -> Vec<(OffsetKey, Date)> {
    OffsetKey::CANONICAL
        .iter()
        .filter(|key| config.schedule.contains(*key))
        .map(|key| (*key, add_days(due_date, key.day_offset())))
        .collect()
}

/// A reminder fires on its exact calendar date only; missed days are not
/// caught up.
pub fn is_due(fire_date: Date, today: Date) -> bool {
    fire_date == today
}
