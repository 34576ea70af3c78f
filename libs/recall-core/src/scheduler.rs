//! Due-item selection and grade scheduling.
//!
//! Review intervals back off exponentially: an item studied `n` times becomes
//! due once more than `2^n - 1` whole days have passed since it was last
//! updated. Independently, any item whose last answer lost more than half of
//! its value is due right away.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Grade, Item, LastStudied, ReviewMetadata};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Scheduler with configurable loss thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduler {
    /// Items whose loss is strictly above this are always due.
    pub due_loss_threshold: f64,
    /// Grades whose loss is at or above this are retried within the session.
    pub requeue_loss_threshold: f64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            due_loss_threshold: 0.5,
            requeue_loss_threshold: 0.75,
        }
    }
}

impl Scheduler {
    /// Whether a single item is due at `now`.
    pub fn is_due(&self, item: &Item, now: DateTime<Utc>) -> bool {
        let metadata = item.review_metadata();
        days_passed(item.updated_at, now) > review_interval_days(metadata.times_studied)
            || metadata.loss_value > self.due_loss_threshold
    }

    /// Keep the items that are due, preserving input order.
    pub fn select_due(&self, items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
        items
            .into_iter()
            .filter(|item| self.is_due(item, now))
            .collect()
    }

    /// Metadata an item should carry after being graded.
    pub fn apply_grade(
        &self,
        item: &Item,
        grade: &Grade,
        user_answer: &str,
        now: DateTime<Utc>,
    ) -> ReviewMetadata {
        let current = item.review_metadata();
        ReviewMetadata {
            last_studied: LastStudied { date: now },
            times_studied: current.times_studied.saturating_add(1),
            loss_value: grade_to_loss(grade),
            grade: Some(grade.clone()),
            user_answer: Some(user_answer.to_string()),
        }
    }

    /// Whether a grade is bad enough to retry the item in the same session.
    pub fn should_requeue(&self, grade: &Grade) -> bool {
        grade_to_loss(grade) >= self.requeue_loss_threshold
    }
}

/// Fill defaults for missing or malformed metadata fields.
///
/// Each field is checked on its own, so one broken field never discards a
/// well-formed sibling.
pub fn normalize_metadata(raw: Option<&Value>) -> ReviewMetadata {
    let mut metadata = ReviewMetadata::default();
    let Some(map) = raw.and_then(Value::as_object) else {
        return metadata;
    };

    if let Some(date) = map
        .get("last_studied")
        .and_then(Value::as_object)
        .and_then(|last| last.get("date"))
        .and_then(parse_date)
    {
        metadata.last_studied = LastStudied { date };
    }

    if let Some(times) = map.get("number_of_times_studied").and_then(parse_count) {
        metadata.times_studied = times;
    }

    if let Some(loss) = map
        .get("loss_value")
        .and_then(Value::as_f64)
        .filter(|loss| loss.is_finite())
    {
        metadata.loss_value = loss;
    }

    metadata.grade = map
        .get("grade")
        .and_then(Value::as_str)
        .map(Grade::parse);
    metadata.user_answer = map
        .get("user_answer")
        .and_then(Value::as_str)
        .map(str::to_string);

    metadata
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    serde_json::from_value(value.clone()).ok()
}

fn parse_count(value: &Value) -> Option<u32> {
    if let Some(count) = value.as_u64() {
        return u32::try_from(count).ok();
    }
    value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

/// Map a grade to a loss value in `[0, 1]`. Unknown grades count as total failure.
pub fn grade_to_loss(grade: &Grade) -> f64 {
    match grade {
        Grade::A => 0.0,
        Grade::B => 0.25,
        Grade::C => 0.5,
        Grade::D => 0.75,
        Grade::F | Grade::Unrecognized(_) => 1.0,
    }
}

/// Whole days between `updated_at` and `now`, rounded down.
pub fn days_passed(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - updated_at)
        .num_milliseconds()
        .div_euclid(MILLIS_PER_DAY)
}

/// `2^times_studied - 1`, saturating at `i64::MAX`.
pub fn review_interval_days(times_studied: u32) -> i64 {
    2i64.checked_pow(times_studied)
        .map(|days| days - 1)
        .unwrap_or(i64::MAX)
}

/// Items due at `now` under the default thresholds.
pub fn select_due(items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
    Scheduler::default().select_due(items, now)
}

/// Updated metadata under the default thresholds.
pub fn apply_grade(item: &Item, grade: &Grade, user_answer: &str, now: DateTime<Utc>) -> ReviewMetadata {
    Scheduler::default().apply_grade(item, grade, user_answer, now)
}

/// Sort worst-recalled items first. Ties keep their relative order.
pub fn order_worst_first(items: &mut [Item]) {
    items.sort_by(|a, b| {
        let a = a.review_metadata().loss_value;
        let b = b.review_metadata().loss_value;
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });
}
