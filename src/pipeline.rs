//! Query submission pipeline.
//!
//! Orchestrates one question/answer cycle per session: builds the grounding
//! context, calls the backend, synthesizes the assistant turn and appends
//! it. Per session the pipeline is Idle -> Submitting -> Idle; failure is
//! represented by the appended turn's content, never by a resting error
//! state, so the conversation always advances by exactly one turn pair.

use std::sync::{Arc, Mutex};

use crate::backend::QueryBackend;
use crate::logging;
use crate::store::SessionStore;
use crate::synthesize::synthesize;
use crate::turn::{AssistantTurn, ErrorKind};

/// Intro for transport-level failures, where no backend payload exists.
pub const INTRO_COMMUNICATION_ERROR: &str = "communication error";

pub struct SubmissionPipeline<B: QueryBackend> {
    store: Arc<Mutex<SessionStore>>,
    backend: B,
}

impl<B: QueryBackend> SubmissionPipeline<B> {
    pub fn new(store: Arc<Mutex<SessionStore>>, backend: B) -> Self {
        Self { store, backend }
    }

    /// The shared store, for the presentation layer to read.
    pub fn store(&self) -> Arc<Mutex<SessionStore>> {
        self.store.clone()
    }

    /// Submit one question for a session. Returns whether the submission
    /// was accepted; a blank question, an unknown session or an already
    /// in-flight submission is rejected as a no-op. An accepted submission
    /// always appends exactly one user turn and one assistant turn, even
    /// when the backend call fails.
    pub async fn submit(&self, session_id: &str, question: &str) -> bool {
        let question = question.trim();
        if question.is_empty() {
            return false;
        }

        // Phase one: atomically snapshot the context, flag the session as
        // submitting and append the user turn. The lock is released before
        // the backend round trip.
        let (dataset_ref, context) = {
            let mut store = self.store.lock().unwrap();
            match store.begin_submission(session_id, question) {
                Some(parts) => parts,
                None => {
                    logging::log_query(Some(session_id), "submission rejected");
                    return false;
                }
            }
        };

        logging::log_query(
            Some(session_id),
            &format!("submitting question with {} context messages", context.len()),
        );

        let reply = match self.backend.submit_query(question, &dataset_ref, &context).await {
            Ok(payload) => {
                if let Some(description) = &payload.error {
                    // The description stays out of the turn and the
                    // compacted history; the log is where it survives.
                    logging::log_error(
                        Some(session_id),
                        &format!("backend reported failure: {}", description),
                    );
                }
                synthesize(&payload)
            }
            Err(err) => {
                logging::log_error(Some(session_id), &format!("backend call failed: {}", err));
                AssistantTurn {
                    intro: INTRO_COMMUNICATION_ERROR.to_string(),
                    error_kind: Some(ErrorKind::Network),
                    ..Default::default()
                }
            }
        };

        // Phase two: append by session id, not by active-session state, so
        // a reply arriving after a session switch still lands where it
        // belongs.
        let mut store = self.store.lock().unwrap();
        if !store.finish_submission(session_id, reply) {
            logging::log_query(
                Some(session_id),
                "session deleted while submission was in flight; reply dropped",
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::compact::ContextMessage;
    use crate::synthesize::{decode_payload, QueryPayload};
    use crate::turn::Turn;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    /// Replies with a canned payload and records the context it was given.
    struct CannedBackend {
        response: Value,
        seen_context: Mutex<Vec<Vec<ContextMessage>>>,
    }

    impl CannedBackend {
        fn new(response: Value) -> Self {
            Self {
                response,
                seen_context: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryBackend for CannedBackend {
        async fn submit_query(
            &self,
            _question: &str,
            _dataset_ref: &str,
            context: &[ContextMessage],
        ) -> Result<QueryPayload, BackendError> {
            self.seen_context.lock().unwrap().push(context.to_vec());
            Ok(decode_payload(&self.response))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl QueryBackend for FailingBackend {
        async fn submit_query(
            &self,
            _question: &str,
            _dataset_ref: &str,
            _context: &[ContextMessage],
        ) -> Result<QueryPayload, BackendError> {
            Err("connection refused".into())
        }
    }

    /// Holds every call until the test releases the gate.
    struct GatedBackend {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl QueryBackend for GatedBackend {
        async fn submit_query(
            &self,
            _question: &str,
            _dataset_ref: &str,
            _context: &[ContextMessage],
        ) -> Result<QueryPayload, BackendError> {
            self.gate.notified().await;
            Ok(QueryPayload {
                message: Some("done".to_string()),
                ..Default::default()
            })
        }
    }

    fn store_with_session() -> (Arc<Mutex<SessionStore>>, String) {
        let store = Arc::new(Mutex::new(SessionStore::new()));
        let id = store
            .lock()
            .unwrap()
            .create_session("sales.csv", "databases/sales.db");
        (store, id)
    }

    #[tokio::test]
    async fn test_successful_submits_append_alternating_pairs() {
        let (store, id) = store_with_session();
        let pipeline = SubmissionPipeline::new(
            store.clone(),
            CannedBackend::new(json!({"result": {"data": [{"a": 1}]}})),
        );

        for _ in 0..3 {
            assert!(pipeline.submit(&id, "how many rows?").await);
        }

        let store = store.lock().unwrap();
        let turns = &store.session(&id).unwrap().turns;
        assert_eq!(turns.len(), 6);
        for (i, turn) in turns.iter().enumerate() {
            match turn {
                Turn::User(_) => assert_eq!(i % 2, 0),
                Turn::Assistant(_) => assert_eq!(i % 2, 1),
            }
        }
        assert!(!store.is_submitting(&id));
    }

    #[tokio::test]
    async fn test_context_excludes_the_current_question() {
        let (store, id) = store_with_session();
        let backend = Arc::new(CannedBackend::new(json!({"result": {"data": [{"a": 1}]}})));
        let pipeline = SubmissionPipeline::new(store.clone(), backend.clone());

        pipeline.submit(&id, "first?").await;
        pipeline.submit(&id, "second?").await;

        let seen = backend.seen_context.lock().unwrap();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].len(), 2);
        assert_eq!(seen[1][0].content, "first?");
        assert_eq!(seen[1][1].role, "assistant");
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let (store, id) = store_with_session();
        let pipeline = SubmissionPipeline::new(
            store.clone(),
            CannedBackend::new(json!({"result": {"data": []}})),
        );

        assert!(!pipeline.submit(&id, "   ").await);
        assert!(store.lock().unwrap().session(&id).unwrap().turns.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let (store, _) = store_with_session();
        let pipeline = SubmissionPipeline::new(
            store,
            CannedBackend::new(json!({"result": {"data": []}})),
        );
        assert!(!pipeline.submit("no-such-id", "hello?").await);
    }

    #[tokio::test]
    async fn test_backend_failure_appends_network_error_turn() {
        let (store, id) = store_with_session();
        let pipeline = SubmissionPipeline::new(store.clone(), FailingBackend);

        assert!(pipeline.submit(&id, "how many rows?").await);

        let store = store.lock().unwrap();
        let turns = &store.session(&id).unwrap().turns;
        assert_eq!(turns.len(), 2);
        match &turns[1] {
            Turn::Assistant(reply) => {
                assert_eq!(reply.intro, INTRO_COMMUNICATION_ERROR);
                assert_eq!(reply.error_kind, Some(ErrorKind::Network));
                assert!(reply.table.is_none());
            }
            Turn::User(_) => panic!("expected an assistant turn"),
        }
        assert!(!store.is_submitting(&id));
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let (store, id) = store_with_session();
        let gate = Arc::new(Notify::new());
        let pipeline = Arc::new(SubmissionPipeline::new(
            store.clone(),
            GatedBackend { gate: gate.clone() },
        ));

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            let id = id.clone();
            async move { pipeline.submit(&id, "first?").await }
        });

        // Wait until the first submission holds the in-flight flag.
        while !store.lock().unwrap().is_submitting(&id) {
            tokio::task::yield_now().await;
        }

        assert!(!pipeline.submit(&id, "second?").await);

        gate.notify_one();
        assert!(first.await.unwrap());

        let store = store.lock().unwrap();
        // Exactly one accepted pair.
        assert_eq!(store.session(&id).unwrap().turns.len(), 2);
    }

    #[tokio::test]
    async fn test_reply_lands_in_owning_session_after_switch() {
        let (store, first_id) = store_with_session();
        let gate = Arc::new(Notify::new());
        let pipeline = Arc::new(SubmissionPipeline::new(
            store.clone(),
            GatedBackend { gate: gate.clone() },
        ));

        let submit = tokio::spawn({
            let pipeline = pipeline.clone();
            let id = first_id.clone();
            async move { pipeline.submit(&id, "slow question?").await }
        });

        while !store.lock().unwrap().is_submitting(&first_id) {
            tokio::task::yield_now().await;
        }

        // User switches to another dataset while the call is in flight.
        let second_id = store
            .lock()
            .unwrap()
            .create_session("other.csv", "databases/other.db");

        gate.notify_one();
        assert!(submit.await.unwrap());

        let store = store.lock().unwrap();
        assert_eq!(store.session(&first_id).unwrap().turns.len(), 2);
        assert!(store.session(&second_id).unwrap().turns.is_empty());
        assert_eq!(store.active_session_id(), Some(second_id.as_str()));
    }

    #[tokio::test]
    async fn test_deleted_session_mid_flight_drops_reply() {
        let (store, id) = store_with_session();
        let gate = Arc::new(Notify::new());
        let pipeline = Arc::new(SubmissionPipeline::new(
            store.clone(),
            GatedBackend { gate: gate.clone() },
        ));

        let submit = tokio::spawn({
            let pipeline = pipeline.clone();
            let id = id.clone();
            async move { pipeline.submit(&id, "doomed question?").await }
        });

        while !store.lock().unwrap().is_submitting(&id) {
            tokio::task::yield_now().await;
        }

        store.lock().unwrap().delete_session(&id);
        gate.notify_one();

        // The submit itself was accepted; the reply just has nowhere to go.
        assert!(submit.await.unwrap());
        assert!(store.lock().unwrap().session(&id).is_none());
    }
}
