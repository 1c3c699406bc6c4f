//! Chart viability classification.
//!
//! Decides whether a tabular result is also presentable as a quick bar
//! chart: first column as the categorical axis, second column as the
//! numeric series.

use crate::turn::{ChartPoint, ChartSpec, TabularResult};

/// Charts are previews, not full plots; cap the series length.
pub const MAX_CHART_POINTS: usize = 10;

/// Classify a tabular result as chartable or not.
///
/// Viable iff there are at least two columns, at least two rows, and the
/// second cell of the first row is numeric. Checking only the first row is
/// a deliberate approximation kept for compatibility with the existing
/// rendering behavior; a mixed-type second column can still slip through.
pub fn chart_for(table: Option<&TabularResult>) -> Option<ChartSpec> {
    let table = table?;
    if table.columns.len() < 2 || table.rows.len() < 2 {
        return None;
    }
    // Row/column invariant guarantees rows[0] has >= 2 cells here.
    if !table.rows[0][1].is_numeric() {
        return None;
    }

    let points = table
        .rows
        .iter()
        .take(MAX_CHART_POINTS)
        .map(|row| ChartPoint {
            x: row[0].clone(),
            y: row[1].clone(),
        })
        .collect();

    Some(ChartSpec {
        x_key: table.columns[0].clone(),
        y_key: table.columns[1].clone(),
        points,
    })
}
