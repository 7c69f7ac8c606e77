//! Pending-session store: the authoritative record of outstanding questions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{AlreadyExists, AlreadyTerminal, TransportError};
use crate::types::{ChannelId, SessionId, SessionState, ThreadRef, UserId};

// ── Outcomes ──

/// Terminal resolution of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Fulfilled(String),
    TimedOut,
    Cancelled,
}

impl SessionOutcome {
    pub fn terminal_state(&self) -> SessionState {
        match self {
            SessionOutcome::Fulfilled(_) => SessionState::Fulfilled,
            SessionOutcome::TimedOut => SessionState::TimedOut,
            SessionOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// What the waiting caller receives through the result slot.
pub type SessionResult = Result<SessionOutcome, TransportError>;

type ResultSlot = oneshot::Sender<SessionResult>;

// ── Session ──

/// One outstanding question. Owned exclusively by the [`SessionTable`];
/// everything outside the table sees only [`SessionSnapshot`]s.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    destination: ChannelId,
    responder: UserId,
    thread_ref: Option<ThreadRef>,
    state: SessionState,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    slot: Option<ResultSlot>,
}

impl Session {
    pub fn new(
        destination: ChannelId,
        responder: UserId,
        timeout: Duration,
        slot: oneshot::Sender<SessionResult>,
    ) -> Self {
        let created_at = Utc::now();
        // absurd timeouts clamp to the calendar's end instead of overflowing
        let deadline = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|delta| created_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: SessionId::generate(),
            destination,
            responder,
            thread_ref: None,
            state: SessionState::Created,
            created_at,
            deadline,
            slot: Some(slot),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            destination: self.destination.clone(),
            responder: self.responder.clone(),
            thread_ref: self.thread_ref.clone(),
            state: self.state,
            created_at: self.created_at,
            deadline: self.deadline,
        }
    }
}

/// Cloned, slot-free view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub destination: ChannelId,
    pub responder: UserId,
    pub thread_ref: Option<ThreadRef>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

// ── Table ──

/// Mapping session id -> pending session, guarded by one mutex. All
/// operations are synchronous; no lock is ever held across an await.
///
/// At most one live (non-terminal) session exists per destination; a
/// settled session awaiting eviction does not count. Operations on an
/// absent id answer [`AlreadyTerminal`]: an evicted session is settled by
/// definition.
#[derive(Debug, Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<SessionId, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Fails if the destination already has a live
    /// one, in which case the session (and its slot) is dropped unposted.
    pub fn insert(&self, session: Session) -> Result<(), AlreadyExists> {
        let mut inner = self.lock();
        let occupied = inner
            .values()
            .any(|s| s.destination == session.destination && !s.state.is_terminal());
        if occupied {
            return Err(AlreadyExists);
        }
        inner.insert(session.id.clone(), session);
        Ok(())
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.lock().get(id).map(Session::snapshot)
    }

    /// Record the thread the question landed in and move Created -> Posted.
    /// Refuses when the session settled while the send was in flight, so a
    /// finished session never comes back to life.
    pub fn mark_posted(&self, id: &SessionId, thread: ThreadRef) -> Result<(), AlreadyTerminal> {
        let mut inner = self.lock();
        let Some(session) = inner.get_mut(id) else {
            return Err(AlreadyTerminal);
        };
        if session.state.is_terminal() {
            return Err(AlreadyTerminal);
        }
        session.thread_ref = Some(thread);
        session.state = SessionState::Posted;
        Ok(())
    }

    /// The single synchronization point for resolution. Exactly one caller
    /// wins the transition to a terminal state and fires the result slot;
    /// every later caller observes [`AlreadyTerminal`] and must do nothing.
    pub fn try_complete(
        &self,
        id: &SessionId,
        outcome: SessionOutcome,
    ) -> Result<(), AlreadyTerminal> {
        let mut inner = self.lock();
        let Some(session) = inner.get_mut(id) else {
            return Err(AlreadyTerminal);
        };
        if session.state.is_terminal() {
            return Err(AlreadyTerminal);
        }
        session.state = outcome.terminal_state();
        if let Some(slot) = session.slot.take() {
            // the caller may have gone away; the transition stands regardless
            let _ = slot.send(Ok(outcome));
        }
        Ok(())
    }

    /// Remove a session. Idempotent; absent ids are a no-op.
    pub fn evict(&self, id: &SessionId) {
        self.lock().remove(id);
    }

    /// The post never went out: drop the session (it was never matchable,
    /// having no thread reference) and hand the error to the waiting
    /// caller. A session that settled mid-send is left to normal eviction.
    pub(crate) fn fail_send(&self, id: &SessionId, error: TransportError) {
        let mut inner = self.lock();
        let Some(session) = inner.get_mut(id) else {
            return;
        };
        if session.state.is_terminal() {
            return;
        }
        if let Some(slot) = session.slot.take() {
            let _ = slot.send(Err(error));
        }
        inner.remove(id);
    }

    /// Cloned views of every session, live or settling.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.lock().values().map(Session::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Session>> {
        self.inner.lock().expect("session table lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(
        destination: &str,
        responder: &str,
    ) -> (Session, oneshot::Receiver<SessionResult>) {
        let (slot, rx) = oneshot::channel();
        let session = Session::new(
            ChannelId::new(destination),
            UserId::new(responder),
            Duration::from_secs(60),
            slot,
        );
        (session, rx)
    }

    #[test]
    fn test_insert_rejects_second_live_session_for_destination() {
        let table = SessionTable::new();
        let (first, _rx1) = open_session("C1", "U1");
        let (second, _rx2) = open_session("C1", "U1");

        assert!(table.insert(first).is_ok());
        assert!(table.insert(second).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_allows_distinct_destinations() {
        let table = SessionTable::new();
        let (first, _rx1) = open_session("C1", "U1");
        let (second, _rx2) = open_session("C2", "U1");

        assert!(table.insert(first).is_ok());
        assert!(table.insert(second).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_settled_session_does_not_block_new_insert() {
        let table = SessionTable::new();
        let (first, _rx1) = open_session("C1", "U1");
        let id = first.id().clone();
        table.insert(first).unwrap();
        table.mark_posted(&id, ThreadRef::new("T1")).unwrap();
        table.try_complete(&id, SessionOutcome::TimedOut).unwrap();

        let (second, _rx2) = open_session("C1", "U1");
        assert!(table.insert(second).is_ok());
    }

    #[test]
    fn test_second_completion_loses_and_leaves_result_untouched() {
        let table = SessionTable::new();
        let (session, mut rx) = open_session("C1", "U1");
        let id = session.id().clone();
        table.insert(session).unwrap();
        table.mark_posted(&id, ThreadRef::new("T1")).unwrap();

        table
            .try_complete(&id, SessionOutcome::Fulfilled("A".into()))
            .unwrap();
        assert!(table.try_complete(&id, SessionOutcome::TimedOut).is_err());

        match rx.try_recv().unwrap() {
            Ok(SessionOutcome::Fulfilled(text)) => assert_eq!(text, "A"),
            other => panic!("unexpected delivery: {other:?}"),
        }
        assert_eq!(table.get(&id).unwrap().state, SessionState::Fulfilled);
    }

    #[test]
    fn test_huge_timeout_clamps_deadline() {
        let (slot, _rx) = oneshot::channel();
        let session = Session::new(
            ChannelId::new("C1"),
            UserId::new("U1"),
            Duration::from_secs(u64::MAX),
            slot,
        );
        let id = session.id().clone();

        let table = SessionTable::new();
        table.insert(session).unwrap();
        let snap = table.get(&id).unwrap();
        assert!(snap.deadline > snap.created_at);
    }

    #[test]
    fn test_evict_is_idempotent_and_final() {
        let table = SessionTable::new();
        let (session, _rx) = open_session("C1", "U1");
        let id = session.id().clone();
        table.insert(session).unwrap();

        table.evict(&id);
        table.evict(&id);
        assert!(table.get(&id).is_none());
        assert!(table.try_complete(&id, SessionOutcome::TimedOut).is_err());
    }

    #[test]
    fn test_posting_after_cancel_does_not_resurrect() {
        let table = SessionTable::new();
        let (session, _rx) = open_session("C1", "U1");
        let id = session.id().clone();
        table.insert(session).unwrap();
        table.try_complete(&id, SessionOutcome::Cancelled).unwrap();

        assert!(table.mark_posted(&id, ThreadRef::new("T1")).is_err());
        let snap = table.get(&id).unwrap();
        assert_eq!(snap.state, SessionState::Cancelled);
        assert!(snap.thread_ref.is_none());
    }

    #[test]
    fn test_fail_send_removes_session_and_delivers_error() {
        let table = SessionTable::new();
        let (session, mut rx) = open_session("C1", "U1");
        let id = session.id().clone();
        table.insert(session).unwrap();

        table.fail_send(&id, TransportError::Api("channel_not_found".into()));
        assert!(table.get(&id).is_none());
        match rx.try_recv().unwrap() {
            Err(TransportError::Api(message)) => assert_eq!(message, "channel_not_found"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }
}
