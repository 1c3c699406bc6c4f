//! Core conversation data shapes: sessions, turns, tabular results and
//! derived chart specs. Pure data - every other module consumes or produces
//! these types, none of them carry behavior beyond construction.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============ Session ============

/// One conversation scoped to a single uploaded dataset.
///
/// `dataset_ref` is an opaque handle issued by the ingestion service and
/// never changes after creation. `turns` is append-only while the session
/// is live. `submitting` is the transient in-flight flag the presentation
/// layer renders as a spinner; it is not part of the conversation itself.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub id: String,
    pub label: String,
    pub dataset_ref: String,
    pub created_at: String,
    pub turns: Vec<Turn>,
    pub submitting: bool,
}

impl Session {
    pub fn new(label: &str, dataset_ref: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            dataset_ref: dataset_ref.to_string(),
            created_at: Utc::now().to_rfc3339(),
            turns: Vec::new(),
            submitting: false,
        }
    }
}

// ============ Turns ============

/// One message in a conversation, authored by the user or the assistant.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    User(UserTurn),
    Assistant(AssistantTurn),
}

impl Turn {
    pub fn user(text: &str) -> Self {
        Turn::User(UserTurn {
            text: text.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserTurn {
    pub text: String,
}

/// A synthesized assistant reply. On a successful exchange `table` (and
/// possibly `chart`) are populated and `error_kind` is `None`; on a failed
/// one `error_kind` is set and the structured fields stay empty.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AssistantTurn {
    pub intro: String,
    pub table: Option<TabularResult>,
    pub chart: Option<ChartSpec>,
    pub generated_query: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Backend, // the query service explicitly reported failure
    Network, // transport error, bad status, or unparseable response
}

// ============ Tabular Data ============

/// A column/row result set returned by the backend.
///
/// Invariant: every row's length equals `columns.len()`. The Synthesizer
/// guarantees this at construction by projecting records onto the resolved
/// column list; anything handing a `TabularResult` to the classifier must
/// uphold it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// A single cell scalar. Untagged so it round-trips the plain JSON values
/// the backend emits (null, booleans, numbers, strings).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_))
    }

    /// Convert a raw JSON value into a cell scalar. Non-scalar values
    /// (arrays, objects) should not appear in result cells; they are
    /// stringified rather than rejected so projection never fails.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => CellValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============ Chart Spec ============

/// A derived, bounded (x, y) series for visualization. Always computed from
/// a `TabularResult`, never persisted independently of it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChartSpec {
    pub x_key: String,
    pub y_key: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChartPoint {
    pub x: CellValue,
    pub y: CellValue,
}
