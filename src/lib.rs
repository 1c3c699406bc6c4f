//! Tablechat core: multi-turn natural-language conversations about uploaded
//! tabular datasets.
//!
//! The crate owns the session/turn state machine and the response-synthesis
//! pipeline. Questions go to an external natural-language-to-query service;
//! this core compacts prior turns into grounding context for that call,
//! classifies and reshapes the raw result (rows, a scalar message, or an
//! error) into a structured assistant turn, and decides whether a tabular
//! result is also presentable as a chart. Rendering, dataset ingestion and
//! query execution live in external collaborators.

pub mod backend;
pub mod chart;
pub mod compact;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod synthesize;
pub mod turn;

pub use backend::{
    BackendError, DataPreview, DatasetSummary, HttpBackend, QueryBackend, UploadResult,
    DEFAULT_BASE_URL,
};
pub use chart::{chart_for, MAX_CHART_POINTS};
pub use compact::{compact, ContextMessage};
pub use pipeline::SubmissionPipeline;
pub use store::SessionStore;
pub use synthesize::{decode_payload, synthesize, QueryPayload};
pub use turn::{
    AssistantTurn, CellValue, ChartPoint, ChartSpec, ErrorKind, Session, TabularResult, Turn,
    UserTurn,
};
