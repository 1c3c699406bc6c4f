//! Backend payload normalization and assistant-turn synthesis.
//!
//! The query service answers with a loosely structured envelope: a nested
//! `result` object with optional `columns`/`data`/`message` fields, plus
//! top-level `sql` and `error` strings depending on where the workflow
//! stopped. `decode_payload` flattens all of that into one normalized
//! `QueryPayload` at the edge; `synthesize` turns a payload into exactly
//! one `AssistantTurn`. Both are pure transformations.

use serde_json::{Map, Value};

use crate::chart::chart_for;
use crate::turn::{AssistantTurn, CellValue, ErrorKind, TabularResult};

/// Intro shown when the query service reported a failure.
pub const INTRO_EXECUTION_FAILED: &str = "execution failed";
/// Intro fallback when a success payload matches no recognized shape.
pub const INTRO_NO_DATA: &str = "no data to display";

// ============ Payload Decode ============

/// Normalized form of one query response. Fields are optional because the
/// backend populates different subsets per outcome; the synthesizer is the
/// only consumer and handles every combination.
#[derive(Debug, Default, Clone)]
pub struct QueryPayload {
    pub columns: Option<Vec<String>>,
    pub data: Option<Vec<Map<String, Value>>>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub generated_query: Option<String>,
}

impl QueryPayload {
    pub fn from_error(description: &str) -> Self {
        Self {
            error: Some(description.to_string()),
            ..Default::default()
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Flatten a raw response body into a `QueryPayload`.
///
/// Accepts both the enveloped form (`{"result": {...}, "sql": ..}`) and a
/// bare result object, and looks for the error description under `error`
/// or `detail` at either level. Never fails: unrecognized shapes simply
/// produce an empty payload, which the synthesizer renders as its
/// no-data fallback.
pub fn decode_payload(raw: &Value) -> QueryPayload {
    let body = match raw.get("result") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };

    QueryPayload {
        columns: body.get("columns").and_then(Value::as_array).map(|cols| {
            cols.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
        data: body.get("data").and_then(Value::as_array).map(|records| {
            records
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        }),
        message: non_empty_str(body.get("message")),
        error: non_empty_str(raw.get("error"))
            .or_else(|| non_empty_str(raw.get("detail")))
            .or_else(|| non_empty_str(body.get("error"))),
        generated_query: non_empty_str(raw.get("sql")),
    }
}

// ============ Synthesis ============

/// Build the assistant turn for one normalized payload.
///
/// Branch order matters: an explicit error wins over everything, tabular
/// data over a bare message, and the no-data fallback catches malformed
/// success payloads. The full row set is kept on the turn; truncating for
/// display is the presentation layer's call.
pub fn synthesize(payload: &QueryPayload) -> AssistantTurn {
    let mut turn = if payload.error.is_some() {
        AssistantTurn {
            intro: INTRO_EXECUTION_FAILED.to_string(),
            error_kind: Some(ErrorKind::Backend),
            ..Default::default()
        }
    } else if let Some(records) = &payload.data {
        let table = project_records(payload.columns.as_deref(), records);
        let intro = match &payload.message {
            // An explicit backend message always wins over the derived text.
            Some(message) => message.clone(),
            None if table.rows.len() == 1 && table.columns.len() == 1 => {
                format!("the result is: {}", table.rows[0][0])
            }
            None => format!("found {} matching results.", table.rows.len()),
        };
        let chart = chart_for(Some(&table));
        AssistantTurn {
            intro,
            table: Some(table),
            chart,
            ..Default::default()
        }
    } else if let Some(message) = &payload.message {
        AssistantTurn {
            intro: message.clone(),
            ..Default::default()
        }
    } else {
        AssistantTurn {
            intro: INTRO_NO_DATA.to_string(),
            ..Default::default()
        }
    };

    turn.generated_query = payload.generated_query.clone();
    turn
}

/// Project raw records onto a fixed column list.
///
/// Columns come from the backend when provided, otherwise from the first
/// record's key order. Missing keys become `Null`, which is what upholds
/// the row/column-length invariant even for heterogeneous records.
fn project_records(columns: Option<&[String]>, records: &[Map<String, Value>]) -> TabularResult {
    let columns: Vec<String> = match columns {
        Some(cols) if !cols.is_empty() => cols.to_vec(),
        _ => records
            .first()
            .map(|record| record.keys().cloned().collect())
            .unwrap_or_default(),
    };

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|col| {
                    record
                        .get(col)
                        .map(CellValue::from_json)
                        .unwrap_or(CellValue::Null)
                })
                .collect()
        })
        .collect();

    TabularResult { columns, rows }
}
