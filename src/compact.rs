//! History compaction.
//!
//! Prior turns are folded into short role/content pairs that ground the
//! backend's follow-up query planning. Compaction is lossy and one-way: a
//! table collapses to its row count, error text is dropped entirely so
//! failure noise never feeds back into the next query's context.

use serde::{Deserialize, Serialize};

use crate::turn::Turn;

/// One grounding message sent to the backend as chat history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

/// Compact an ordered turn sequence into grounding context, one message
/// per turn. Empty fields contribute nothing; this never panics.
pub fn compact(turns: &[Turn]) -> Vec<ContextMessage> {
    turns
        .iter()
        .map(|turn| match turn {
            Turn::User(user) => ContextMessage {
                role: "user".to_string(),
                content: user.text.clone(),
            },
            Turn::Assistant(reply) => {
                let mut lines = Vec::new();
                if !reply.intro.is_empty() {
                    lines.push(reply.intro.clone());
                }
                if let Some(query) = &reply.generated_query {
                    if !query.is_empty() {
                        lines.push(format!("query: {}", query));
                    }
                }
                if let Some(table) = &reply.table {
                    lines.push(format!("(returned {} rows)", table.rows.len()));
                }
                ContextMessage {
                    role: "assistant".to_string(),
                    content: lines.join("\n"),
                }
            }
        })
        .collect()
}
