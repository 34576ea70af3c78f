//! Test fixtures and factory functions for creating study items.

use chrono::{Duration, Utc};
use serde_json::json;

use recall_core::Item;

/// An item that has never been reviewed.
pub fn fresh_item(id: &str) -> Item {
    Item::new(
        id,
        format!("Question {id}?"),
        Some(format!("Answer {id}.")),
        Utc::now(),
    )
}

/// An item reviewed `times` times, last updated `days_ago` days back.
pub fn studied_item(id: &str, times: u32, loss: f64, days_ago: i64) -> Item {
    let updated_at = Utc::now() - Duration::days(days_ago);
    Item {
        metadata: Some(json!({
            "last_studied": { "date": updated_at },
            "number_of_times_studied": times,
            "loss_value": loss,
            "grade": "B",
            "user_answer": "previous answer",
        })),
        updated_at,
        ..fresh_item(id)
    }
}

/// `count` fresh items named `item1..=itemN`.
pub fn sample_items(count: usize) -> Vec<Item> {
    (1..=count).map(|i| fresh_item(&format!("item{i}"))).collect()
}
