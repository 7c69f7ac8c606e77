//! Classifies inbound chat events against the live sessions.

use crate::session::{SessionSnapshot, SessionTable};
use crate::types::{InboundEvent, SessionId, SessionState};

/// The three conditions that make an event a candidate reply for a
/// session: same thread, the expected author, and a question that was
/// actually posted. Everything else is background traffic.
pub fn qualifies(session: &SessionSnapshot, event: &InboundEvent) -> bool {
    session.state == SessionState::Posted
        && session.thread_ref.as_ref() == Some(&event.thread_ref)
        && session.responder == event.author_id
}

/// Find the session (if any) this event satisfies. Events with no text
/// left after trimming never match, which filters join notices and other
/// noise. The first qualifying session wins; irrelevant events are a
/// silent no-op.
pub fn match_event(table: &SessionTable, event: &InboundEvent) -> Option<SessionId> {
    if event.text.trim().is_empty() {
        return None;
    }
    table
        .snapshots()
        .into_iter()
        .find(|session| qualifies(session, event))
        .map(|session| session.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::oneshot;

    use crate::session::{Session, SessionOutcome};
    use crate::types::{ChannelId, ThreadRef, UserId};

    fn event(thread: &str, author: &str, text: &str) -> InboundEvent {
        InboundEvent {
            thread_ref: ThreadRef::new(thread),
            author_id: UserId::new(author),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn open_session(table: &SessionTable, destination: &str, responder: &str) -> SessionId {
        let (slot, _rx) = oneshot::channel();
        let session = Session::new(
            ChannelId::new(destination),
            UserId::new(responder),
            Duration::from_secs(60),
            slot,
        );
        let id = session.id().clone();
        table.insert(session).unwrap();
        id
    }

    fn posted_session(
        table: &SessionTable,
        destination: &str,
        responder: &str,
        thread: &str,
    ) -> SessionId {
        let id = open_session(table, destination, responder);
        table.mark_posted(&id, ThreadRef::new(thread)).unwrap();
        id
    }

    #[test]
    fn test_matches_thread_author_and_posted_state() {
        let table = SessionTable::new();
        let id = posted_session(&table, "C1", "U1", "T1");

        assert_eq!(match_event(&table, &event("T1", "U1", "A")), Some(id));
    }

    #[test]
    fn test_ignores_other_thread() {
        let table = SessionTable::new();
        posted_session(&table, "C1", "U1", "T1");

        assert_eq!(match_event(&table, &event("T2", "U1", "A")), None);
    }

    #[test]
    fn test_ignores_other_author() {
        let table = SessionTable::new();
        posted_session(&table, "C1", "U1", "T1");

        assert_eq!(match_event(&table, &event("T1", "U2", "A")), None);
    }

    #[test]
    fn test_ignores_blank_text() {
        let table = SessionTable::new();
        posted_session(&table, "C1", "U1", "T1");

        assert_eq!(match_event(&table, &event("T1", "U1", "   ")), None);
    }

    #[test]
    fn test_ignores_session_that_was_never_posted() {
        let table = SessionTable::new();
        let id = open_session(&table, "C1", "U1");

        assert_eq!(match_event(&table, &event("T1", "U1", "A")), None);
        assert_eq!(table.get(&id).unwrap().state, SessionState::Created);
    }

    #[test]
    fn test_ignores_settled_session() {
        let table = SessionTable::new();
        let id = posted_session(&table, "C1", "U1", "T1");
        table.try_complete(&id, SessionOutcome::TimedOut).unwrap();

        assert_eq!(match_event(&table, &event("T1", "U1", "A")), None);
        assert_eq!(table.get(&id).unwrap().state, SessionState::TimedOut);
    }

    #[test]
    fn test_unmatched_event_changes_no_state() {
        let table = SessionTable::new();
        let id = posted_session(&table, "C1", "U1", "T1");
        let before = table.get(&id).unwrap();

        assert_eq!(match_event(&table, &event("T9", "U9", "hello")), None);

        let after = table.get(&id).unwrap();
        assert_eq!(after.state, before.state);
        assert_eq!(after.thread_ref, before.thread_ref);
        assert_eq!(table.len(), 1);
    }
}
