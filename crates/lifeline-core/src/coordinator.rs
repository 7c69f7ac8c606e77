//! Session coordinator: opens question sessions, posts them, waits for the
//! resolution, and dispatches inbound events to the matcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AskError, TransportError};
use crate::reply;
use crate::session::{Session, SessionOutcome, SessionTable};
use crate::transport::Transport;
use crate::types::{ChannelId, InboundEvent, SessionId, UserId};

// ── Config ──

/// Everything the coordinator needs, injected at construction.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub destination: ChannelId,
    pub responder: UserId,
    pub timeout: Duration,
    pub evict_grace: Duration,
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            destination: config.slack.channel_id.clone(),
            responder: config.slack.user_id.clone(),
            timeout: config.ask.timeout(),
            evict_grace: config.ask.evict_grace(),
        }
    }
}

// ── Coordinator ──

/// Orchestrates the life of a question: create, post, wait, settle, evict.
pub struct SessionCoordinator<T> {
    transport: Arc<T>,
    table: Arc<SessionTable>,
    config: CoordinatorConfig,
}

impl<T: Transport> SessionCoordinator<T> {
    pub fn new(transport: Arc<T>, config: CoordinatorConfig) -> Self {
        Self {
            transport,
            table: Arc::new(SessionTable::new()),
            config,
        }
    }

    /// Ask the configured responder, with the configured timeout.
    pub async fn ask(&self, question: &str, cancel: CancellationToken) -> Result<String, AskError> {
        self.ask_as(
            question,
            &self.config.responder,
            self.config.timeout,
            cancel,
        )
        .await
    }

    /// Post `question` and suspend until the first qualifying reply, the
    /// deadline, or cancellation settles the session. Fails fast with
    /// [`AskError::ConcurrentQuestion`] while another question is live in
    /// the destination, without posting anything.
    pub async fn ask_as(
        &self,
        question: &str,
        responder: &UserId,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String, AskError> {
        if cancel.is_cancelled() {
            return Err(AskError::Cancelled);
        }

        let (slot, rx) = oneshot::channel();
        let session = Session::new(
            self.config.destination.clone(),
            responder.clone(),
            timeout,
            slot,
        );
        let id = session.id().clone();

        self.table
            .insert(session)
            .map_err(|_| AskError::ConcurrentQuestion {
                destination: self.config.destination.clone(),
            })?;
        info!(session = %id, responder = %responder, timeout = ?timeout, "question session opened");

        self.spawn_deadline_watcher(&id, timeout);
        self.spawn_send_task(&id, question);

        let mut rx = rx;
        let winner = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = &mut rx => Some(outcome),
        };

        let outcome = match winner {
            Some(outcome) => outcome,
            None => {
                // cancellation has priority, but only if the session has
                // not already settled
                if self
                    .table
                    .try_complete(&id, SessionOutcome::Cancelled)
                    .is_ok()
                {
                    info!(session = %id, "question cancelled by caller");
                    schedule_evict(Arc::clone(&self.table), id, self.config.evict_grace);
                    return Err(AskError::Cancelled);
                }
                // a reply or the deadline won the race; report that instead
                rx.await
            }
        };

        match outcome {
            Ok(Ok(SessionOutcome::Fulfilled(text))) => {
                info!(session = %id, "reply received");
                Ok(text)
            }
            Ok(Ok(SessionOutcome::TimedOut)) => Err(AskError::Timeout(timeout)),
            Ok(Ok(SessionOutcome::Cancelled)) => Err(AskError::Cancelled),
            Ok(Err(transport_error)) => Err(AskError::Transport(transport_error)),
            Err(_) => Err(AskError::Transport(TransportError::Aborted)),
        }
    }

    /// Dispatcher loop: feed every inbound event through the matcher.
    /// Spawned once at startup; ends when the event stream does.
    pub async fn run(&self) -> Result<()> {
        let mut events = self
            .transport
            .subscribe()
            .await
            .context("Failed to subscribe to inbound events")?;
        info!("reply dispatcher started");

        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        info!("inbound event stream ended; reply dispatcher stopping");
        Ok(())
    }

    /// Handle one inbound event. Never fails: irrelevant events are
    /// silently discarded, and losing a resolution race is not an error.
    fn dispatch(&self, event: InboundEvent) {
        let Some(id) = reply::match_event(&self.table, &event) else {
            return;
        };
        match self
            .table
            .try_complete(&id, SessionOutcome::Fulfilled(event.text))
        {
            Ok(()) => {
                info!(session = %id, author = %event.author_id, "reply matched");
                schedule_evict(Arc::clone(&self.table), id, self.config.evict_grace);
            }
            Err(_) => {
                debug!(session = %id, "reply arrived after the session settled");
            }
        }
    }

    /// Runs detached so a cancelled caller never interrupts a send that is
    /// already on the wire; the table refuses a late `mark_posted` anyway.
    fn spawn_send_task(&self, id: &SessionId, question: &str) {
        let transport = Arc::clone(&self.transport);
        let table = Arc::clone(&self.table);
        let destination = self.config.destination.clone();
        let text = question.to_string();
        let id = id.clone();
        tokio::spawn(async move {
            match transport.send(&destination, &text, None).await {
                Ok(thread) => {
                    if table.mark_posted(&id, thread).is_err() {
                        debug!(session = %id, "send finished after the session settled");
                    }
                }
                Err(e) => {
                    warn!(session = %id, error = %e, "posting the question failed");
                    table.fail_send(&id, e);
                }
            }
        });
    }

    fn spawn_deadline_watcher(&self, id: &SessionId, timeout: Duration) {
        let table = Arc::clone(&self.table);
        let id = id.clone();
        let grace = self.config.evict_grace;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if table.try_complete(&id, SessionOutcome::TimedOut).is_ok() {
                info!(session = %id, elapsed = ?timeout, "deadline passed without a qualifying reply");
                tokio::time::sleep(grace).await;
                table.evict(&id);
            }
        });
    }
}

/// Evict `id` once the grace window passes; eviction is idempotent.
fn schedule_evict(table: Arc<SessionTable>, id: SessionId, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        table.evict(&id);
    });
}
