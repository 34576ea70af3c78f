//! Core types for the study engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Letter grade returned by the grading oracle.
///
/// Anything that is not one of the five letters is kept verbatim so it can be
/// shown back to the user; the scheduler treats it as a total failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    Unrecognized(String),
}

impl Grade {
    /// Parse a letter grade. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "A" => Self::A,
            "B" => Self::B,
            "C" => Self::C,
            "D" => Self::D,
            "F" => Self::F,
            _ => Self::Unrecognized(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<&str> for Grade {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Grade {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Grade> for String {
    fn from(grade: Grade) -> Self {
        match grade {
            Grade::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When an item was last studied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastStudied {
    pub date: DateTime<Utc>,
}

impl LastStudied {
    /// Sentinel for an item that has never been studied.
    pub fn never() -> Self {
        Self {
            date: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn is_never(&self) -> bool {
        self.date == DateTime::<Utc>::MIN_UTC
    }
}

impl Default for LastStudied {
    fn default() -> Self {
        Self::never()
    }
}

/// Normalized review metadata of an item.
///
/// Field names on the wire match the stored records (`number_of_times_studied`
/// and friends), so a serialized value can be written back as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetadata {
    pub last_studied: LastStudied,
    #[serde(rename = "number_of_times_studied")]
    pub times_studied: u32,
    pub loss_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<String>,
}

impl Default for ReviewMetadata {
    fn default() -> Self {
        Self {
            last_studied: LastStudied::never(),
            times_studied: 0,
            loss_value: 1.0,
            grade: None,
            user_answer: None,
        }
    }
}

impl ReviewMetadata {
    /// Raw JSON form, suitable for storing in an item's `metadata` column.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "last_studied": { "date": self.last_studied.date },
            "number_of_times_studied": self.times_studied,
            "loss_value": self.loss_value,
        });
        if let Some(map) = value.as_object_mut() {
            if let Some(grade) = &self.grade {
                map.insert("grade".into(), Value::String(grade.as_str().to_string()));
            }
            if let Some(answer) = &self.user_answer {
                map.insert("user_answer".into(), Value::String(answer.clone()));
            }
        }
        value
    }
}

/// A single study item ("data point").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Raw stored metadata. May be missing or malformed.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Item {
    /// Create an item that has never been reviewed.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        expected_answer: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            expected_answer,
            updated_at,
            metadata: None,
        }
    }

    /// Metadata with defaults filled in for missing or malformed fields.
    pub fn review_metadata(&self) -> ReviewMetadata {
        crate::scheduler::normalize_metadata(self.metadata.as_ref())
    }

    /// Copy of this item carrying freshly written metadata.
    pub fn with_metadata(&self, metadata: &ReviewMetadata, updated_at: DateTime<Utc>) -> Self {
        Self {
            metadata: Some(metadata.to_value()),
            updated_at,
            ..self.clone()
        }
    }
}

/// Position within a review session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Zero-based index of the current item.
    pub index: usize,
    /// Current queue length, including re-queued items.
    pub total: usize,
}
