//! Recurrence rules and per-date completion records for repeating nodes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Repetition schedule attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    pub frequency: RecurrenceFrequency,

    /// Every `interval` periods (1 = every day/week/...)
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// Weekday numbers, 0 = Sunday
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl Recurrence {
    pub fn new(frequency: RecurrenceFrequency) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: Vec::new(),
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    #[default]
    Completed,
    Skipped,
}

/// Completion of one occurrence; at most one per `date` on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringCompletion {
    pub date: NaiveDate,
    #[serde(default)]
    pub status: CompletionStatus,
    pub completed_at: DateTime<Utc>,
}

/// Return `completions` with the record for `date` replaced by `record`.
///
/// Every existing entry for the same date is dropped, so a list that was
/// already corrupted with duplicates is repaired as a side effect.
pub fn upsert_completion(
    completions: &[RecurringCompletion],
    record: RecurringCompletion,
) -> Vec<RecurringCompletion> {
    let mut next: Vec<RecurringCompletion> = completions
        .iter()
        .filter(|c| c.date != record.date)
        .cloned()
        .collect();
    next.push(record);
    next
}

/// Return `completions` without any record for `date`
pub fn remove_completion(
    completions: &[RecurringCompletion],
    date: NaiveDate,
) -> Vec<RecurringCompletion> {
    completions
        .iter()
        .filter(|c| c.date != date)
        .cloned()
        .collect()
}

/// Latest date carrying a `Completed` record
pub fn latest_completed_date(completions: &[RecurringCompletion]) -> Option<NaiveDate> {
    completions
        .iter()
        .filter(|c| c.status == CompletionStatus::Completed)
        .map(|c| c.date)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn completed(d: &str) -> RecurringCompletion {
        RecurringCompletion {
            date: date(d),
            status: CompletionStatus::Completed,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_replaces_same_date() {
        let first = upsert_completion(&[], completed("2024-01-15"));
        let second = upsert_completion(&first, completed("2024-01-15"));

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].date, date("2024-01-15"));
    }

    #[test]
    fn test_upsert_keeps_other_dates() {
        let list = upsert_completion(&[completed("2024-01-14")], completed("2024-01-15"));
        assert_eq!(list.len(), 2);
        assert_eq!(latest_completed_date(&list), Some(date("2024-01-15")));
    }

    #[test]
    fn test_remove_completion() {
        let list = vec![completed("2024-01-14"), completed("2024-01-15")];
        let list = remove_completion(&list, date("2024-01-15"));
        assert_eq!(list.len(), 1);
        assert_eq!(latest_completed_date(&list), Some(date("2024-01-14")));
    }

    #[test]
    fn test_recurrence_interval_defaults_to_one() {
        let rule: Recurrence = serde_json::from_str(r#"{"frequency":"weekly"}"#).unwrap();
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.frequency, RecurrenceFrequency::Weekly);
    }
}
