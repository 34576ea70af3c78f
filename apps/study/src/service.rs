//! Async driver around the review session state machine.
//!
//! The session lock is never held across a store or grader call. Each call is
//! started with a ticket taken under the lock and its result is fed back under
//! the lock, where the session rejects it if a newer dataset selection or
//! grading attempt has happened in the meantime.

use std::sync::Arc;

use chrono::Utc;
use recall_core::{
    order_worst_first, GradeRequest, Phase, PendingWrite, Retry, ReviewSession, Scheduler,
    SessionSnapshot, SessionStats, Ticket,
};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::StudyConfig;
use crate::error::Result;
use crate::grader::GradingOracle;
use crate::store::ItemStore;

/// Notifications emitted alongside the snapshot stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Completed {
        collection_id: String,
        stats: SessionStats,
    },
}

/// Drives one review session against an item store and a grading oracle.
pub struct StudyService {
    store: Arc<dyn ItemStore>,
    grader: Arc<dyn GradingOracle>,
    config: StudyConfig,
    session: Mutex<ReviewSession>,
    state_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl StudyService {
    pub fn new(store: Arc<dyn ItemStore>, grader: Arc<dyn GradingOracle>, config: StudyConfig) -> Self {
        Self::with_scheduler(store, grader, config, Scheduler::default())
    }

    pub fn with_scheduler(
        store: Arc<dyn ItemStore>,
        grader: Arc<dyn GradingOracle>,
        config: StudyConfig,
        scheduler: Scheduler,
    ) -> Self {
        let session = ReviewSession::new(scheduler);
        let (state_tx, _) = watch::channel(session.snapshot());
        let (events_tx, _) = broadcast::channel(16);
        Self {
            store,
            grader,
            config,
            session: Mutex::new(session),
            state_tx,
            events_tx,
        }
    }

    /// Stream of session snapshots, updated on every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Completion notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Select a collection and load its due items, replacing any running session.
    pub async fn start_session(&self, collection_id: &str) -> Result<SessionSnapshot> {
        let ticket = {
            let mut session = self.session.lock().await;
            let ticket = session.select_dataset(collection_id);
            self.publish(&session);
            ticket
        };
        info!(collection_id, generation = ticket.generation, "starting review session");
        self.load(ticket, collection_id).await
    }

    /// Submit an answer for the presented item and see it through grading and
    /// write-back.
    pub async fn submit_answer(&self, answer: &str) -> Result<SessionSnapshot> {
        let request = {
            let mut session = self.session.lock().await;
            let request = session.submit_answer(answer)?;
            self.publish(&session);
            request
        };
        self.grade(request).await
    }

    /// Resume after a failed fetch, grading or write-back.
    ///
    /// A failed write is retried with the metadata already computed; the
    /// grader is only consulted again when no grade was obtained. Refused
    /// while the last call is still running.
    pub async fn retry(&self) -> Result<SessionSnapshot> {
        let next = {
            let mut session = self.session.lock().await;
            let next = session.retry()?;
            self.publish(&session);
            next
        };
        debug!(?next, "retrying");

        match next {
            Retry::Load {
                ticket,
                collection_id,
            } => self.load(ticket, &collection_id).await,
            Retry::Write(write) => self.write_back(write).await,
            Retry::Grade(request) => self.grade(request).await,
        }
    }

    async fn load(&self, ticket: Ticket, collection_id: &str) -> Result<SessionSnapshot> {
        let fetched = self.store.fetch_items_for_collection(collection_id).await;

        let mut session = self.session.lock().await;
        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                warn!(collection_id, error = %e, "failed to fetch items");
                session.load_failed(ticket, e.to_string())?;
                self.publish(&session);
                return Err(e.into());
            }
        };

        let total = items.len();
        let mut due = session.scheduler().select_due(items, Utc::now());
        if self.config.worst_first {
            order_worst_first(&mut due);
        }
        let due_count = due.len();

        let phase = session.due_items_fetched(ticket, due)?;
        info!(collection_id, total, due = due_count, "loaded due items");
        self.finish_transition(&session, phase);
        Ok(session.snapshot())
    }

    async fn grade(&self, request: GradeRequest) -> Result<SessionSnapshot> {
        let result = self
            .grader
            .grade(
                &request.question,
                request.expected_answer.as_deref().unwrap_or_default(),
                &request.answer,
            )
            .await;

        let write = {
            let mut session = self.session.lock().await;
            match result {
                Ok(grade) => {
                    debug!(item_id = %request.item_id, grade = %grade, "answer graded");
                    let write = session.grade_received(request.ticket, grade, Utc::now())?;
                    self.publish(&session);
                    write
                }
                Err(e) => {
                    warn!(item_id = %request.item_id, error = %e, "grading failed");
                    session.grading_failed(request.ticket, e.to_string())?;
                    self.publish(&session);
                    return Err(e.into());
                }
            }
        };

        self.write_back(write).await
    }

    async fn write_back(&self, write: PendingWrite) -> Result<SessionSnapshot> {
        let stored = self.store.write_metadata(&write.item_id, &write.metadata).await;

        let mut session = self.session.lock().await;
        if let Err(e) = stored {
            warn!(item_id = %write.item_id, error = %e, "failed to write review metadata");
            session.write_failed(write.ticket, e.to_string())?;
            self.publish(&session);
            return Err(e.into());
        }

        let phase = session.write_committed(write.ticket)?;
        debug!(
            item_id = %write.item_id,
            times_studied = write.metadata.times_studied,
            loss_value = write.metadata.loss_value,
            "review recorded"
        );
        self.finish_transition(&session, phase);
        Ok(session.snapshot())
    }

    fn finish_transition(&self, session: &ReviewSession, phase: Phase) {
        self.publish(session);
        if phase != Phase::Complete {
            return;
        }

        let stats = session.stats();
        let collection_id = session.collection_id().unwrap_or_default().to_string();
        info!(
            collection_id = %collection_id,
            graded = stats.graded,
            requeued = stats.requeued,
            "review session complete"
        );
        // No receivers is fine.
        let _ = self.events_tx.send(SessionEvent::Completed {
            collection_id,
            stats,
        });
    }

    fn publish(&self, session: &ReviewSession) {
        self.state_tx.send_replace(session.snapshot());
    }
}

impl std::fmt::Debug for StudyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
