//! In-memory session store.
//!
//! Owns the collection of sessions and the active-session pointer. Sessions
//! live only for the process lifetime; there is no durability. Mutation
//! happens through the lifecycle operations here and through the two-phase
//! append the submission pipeline drives - nothing else touches the turns.

use crate::compact::{compact, ContextMessage};
use crate::logging;
use crate::turn::{AssistantTurn, Session, Turn};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
    active_session_id: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Read Surface (presentation layer) ============

    /// All sessions, most recent first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_session_id
            .as_deref()
            .and_then(|id| self.session(id))
    }

    pub fn is_submitting(&self, id: &str) -> bool {
        self.session(id).map(|s| s.submitting).unwrap_or(false)
    }

    // ============ Session Lifecycle ============

    /// Create a session for a freshly ingested dataset, insert it at the
    /// front and make it active. Returns the new session id.
    pub fn create_session(&mut self, label: &str, dataset_ref: &str) -> String {
        let session = Session::new(label, dataset_ref);
        let id = session.id.clone();
        logging::log_session(
            Some(&id),
            &format!("created session for '{}' ({})", label, dataset_ref),
        );
        self.sessions.insert(0, session);
        self.active_session_id = Some(id.clone());
        id
    }

    /// Remove a session. Deleting the active session clears the active
    /// pointer; other sessions are untouched. Returns whether anything
    /// was removed.
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        let removed = self.sessions.len() != before;

        if removed {
            if self.active_session_id.as_deref() == Some(id) {
                self.active_session_id = None;
            }
            logging::log_session(Some(id), "deleted session");
        }
        removed
    }

    /// Switch the active session. Unknown ids are a no-op.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.session(id).is_some() {
            self.active_session_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    // ============ Two-Phase Append (submission pipeline) ============

    /// Phase one of a submission: checks the per-session preconditions,
    /// compacts the turns as they stand, raises the in-flight flag and
    /// appends the user turn - all atomically under the caller's lock.
    /// Returns the dataset ref and grounding context for the backend call,
    /// or `None` if the submission must be rejected.
    pub(crate) fn begin_submission(
        &mut self,
        id: &str,
        question: &str,
    ) -> Option<(String, Vec<ContextMessage>)> {
        let session = self.sessions.iter_mut().find(|s| s.id == id)?;
        if session.submitting || session.dataset_ref.is_empty() {
            return None;
        }

        // Context reflects the history *before* this question.
        let context = compact(&session.turns);
        session.submitting = true;
        session.turns.push(Turn::user(question));
        Some((session.dataset_ref.clone(), context))
    }

    /// Phase two: append the assistant turn and lower the in-flight flag.
    /// Turns are addressed by session id, so a reply landing after the user
    /// switched the active session still reaches its owner. Returns `false`
    /// if the session was deleted mid-flight (the reply is dropped).
    pub(crate) fn finish_submission(&mut self, id: &str, reply: AssistantTurn) -> bool {
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.turns.push(Turn::Assistant(reply));
                session.submitting = false;
                true
            }
            None => false,
        }
    }
}
