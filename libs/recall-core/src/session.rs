//! Review session state machine.
//!
//! A session walks a queue of due items one at a time:
//!
//! ```text
//! Idle -> Loading -> Presenting -> Grading -> Presenting ... -> Complete
//! ```
//!
//! The machine performs no I/O. Callers fetch items, ask the grading oracle
//! and write metadata back themselves, feeding each result in with the
//! [`Ticket`] they were handed when the work started. Tickets from an earlier
//! dataset selection or an earlier grading attempt are rejected, so late
//! results can never touch a newer session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::scheduler::Scheduler;
use crate::types::{Grade, Item, Progress, ReviewMetadata};

/// Coarse session phase, exposed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Presenting,
    Grading,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Presenting => "presenting",
            Self::Grading => "grading",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Identifies one unit of asynchronous work within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    /// Bumped on every dataset selection.
    pub generation: u64,
    /// Bumped on every grading attempt. Zero for the load.
    pub attempt: u64,
}

impl Ticket {
    fn is_older_than(&self, other: Ticket) -> bool {
        (self.generation, self.attempt) < (other.generation, other.attempt)
    }
}

/// Everything the grading oracle needs for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRequest {
    pub ticket: Ticket,
    pub item_id: String,
    pub question: String,
    pub expected_answer: Option<String>,
    pub answer: String,
}

/// Graded metadata waiting to be written back.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub ticket: Ticket,
    pub item_id: String,
    pub grade: Grade,
    pub metadata: ReviewMetadata,
}

/// Running totals for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Gradings whose write-back succeeded.
    pub graded: usize,
    /// Items appended again after a failing grade.
    pub requeued: usize,
}

/// Point-in-time view of a session for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub collection_id: Option<String>,
    pub phase: Phase,
    pub current_item: Option<Item>,
    pub progress: Progress,
    pub last_error: Option<String>,
    pub stats: SessionStats,
}

/// Work a caller should restart after a recorded failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Retry {
    Load { ticket: Ticket, collection_id: String },
    Write(PendingWrite),
    Grade(GradeRequest),
}

// `stalled` is set once the outstanding call has failed. Until then the call
// is still in flight and must not be started again.
#[derive(Debug, Clone)]
enum State {
    Idle,
    Loading {
        ticket: Ticket,
        stalled: bool,
    },
    Presenting,
    Grading {
        ticket: Ticket,
        answer: String,
        pending: Option<PendingWrite>,
        stalled: bool,
    },
    Complete,
}

/// One sitting of review over a single collection.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    scheduler: Scheduler,
    state: State,
    session_id: Option<Uuid>,
    collection_id: Option<String>,
    queue: Vec<Item>,
    cursor: usize,
    generation: u64,
    attempt: u64,
    last_error: Option<String>,
    stats: SessionStats,
}

impl Default for ReviewSession {
    fn default() -> Self {
        Self::new(Scheduler::default())
    }
}

impl ReviewSession {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            state: State::Idle,
            session_id: None,
            collection_id: None,
            queue: Vec::new(),
            cursor: 0,
            generation: 0,
            attempt: 0,
            last_error: None,
            stats: SessionStats::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Loading { .. } => Phase::Loading,
            State::Presenting => Phase::Presenting,
            State::Grading { .. } => Phase::Grading,
            State::Complete => Phase::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    /// The item being presented or graded.
    pub fn current_item(&self) -> Option<&Item> {
        match self.state {
            State::Presenting | State::Grading { .. } => self.queue.get(self.cursor),
            _ => None,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            index: self.cursor,
            total: self.queue.len(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Ticket of the fetch in progress, if loading.
    pub fn loading_ticket(&self) -> Option<Ticket> {
        match self.state {
            State::Loading { ticket, .. } => Some(ticket),
            _ => None,
        }
    }

    /// Whether the outstanding fetch, grading or write has failed and is
    /// waiting for [`ReviewSession::retry`].
    pub fn is_stalled(&self) -> bool {
        matches!(
            self.state,
            State::Loading { stalled: true, .. } | State::Grading { stalled: true, .. }
        )
    }

    /// Graded metadata that still has to be written back.
    pub fn pending_write(&self) -> Option<&PendingWrite> {
        match &self.state {
            State::Grading { pending, .. } => pending.as_ref(),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            collection_id: self.collection_id.clone(),
            phase: self.phase(),
            current_item: self.current_item().cloned(),
            progress: self.progress(),
            last_error: self.last_error.clone(),
            stats: self.stats,
        }
    }

    /// Start a fresh session for a collection, abandoning whatever was running.
    pub fn select_dataset(&mut self, collection_id: impl Into<String>) -> Ticket {
        self.generation += 1;
        self.attempt = 0;
        self.session_id = Some(Uuid::new_v4());
        self.collection_id = Some(collection_id.into());
        self.queue.clear();
        self.cursor = 0;
        self.last_error = None;
        self.stats = SessionStats::default();

        let ticket = self.current_ticket();
        self.state = State::Loading {
            ticket,
            stalled: false,
        };
        ticket
    }

    /// Feed in the due items for the collection being loaded.
    pub fn due_items_fetched(&mut self, ticket: Ticket, items: Vec<Item>) -> Result<Phase> {
        self.check_ticket(ticket, "load items")?;
        if !matches!(self.state, State::Loading { .. }) {
            return Err(self.invalid("load items"));
        }

        self.queue = items;
        self.cursor = 0;
        self.last_error = None;
        self.state = if self.queue.is_empty() {
            State::Complete
        } else {
            State::Presenting
        };
        Ok(self.phase())
    }

    /// Record a failed fetch. The session keeps loading until retried.
    pub fn load_failed(&mut self, ticket: Ticket, reason: impl Into<String>) -> Result<()> {
        self.check_ticket(ticket, "fail loading")?;
        let State::Loading { stalled, .. } = &mut self.state else {
            return Err(self.invalid("fail loading"));
        };
        *stalled = true;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Submit an answer for the presented item.
    pub fn submit_answer(&mut self, answer: &str) -> Result<GradeRequest> {
        match self.state {
            State::Presenting => {}
            State::Grading { .. } => return Err(SessionError::GradingInProgress),
            _ => return Err(self.invalid("submit an answer")),
        }
        if answer.trim().is_empty() {
            return Err(SessionError::EmptyAnswer);
        }

        self.attempt += 1;
        let ticket = self.current_ticket();
        self.state = State::Grading {
            ticket,
            answer: answer.to_string(),
            pending: None,
            stalled: false,
        };
        self.grade_request(ticket, answer)
    }

    /// Restart whatever failed last: the fetch, the grading, or the write-back.
    ///
    /// Refused with [`SessionError::RequestInFlight`] while that call has not
    /// failed yet, so one grading never reaches the oracle or the store twice.
    pub fn retry(&mut self) -> Result<Retry> {
        if let State::Grading { pending: None, .. } = self.state {
            return self.regrade().map(Retry::Grade);
        }

        match &mut self.state {
            State::Loading { ticket, stalled } => {
                if !*stalled {
                    return Err(SessionError::RequestInFlight);
                }
                let collection_id = self
                    .collection_id
                    .clone()
                    .ok_or(SessionError::NothingPending)?;
                *stalled = false;
                Ok(Retry::Load {
                    ticket: *ticket,
                    collection_id,
                })
            }
            State::Grading {
                pending: Some(write),
                stalled,
                ..
            } => {
                if !*stalled {
                    return Err(SessionError::RequestInFlight);
                }
                *stalled = false;
                Ok(Retry::Write(write.clone()))
            }
            _ => Err(SessionError::NothingPending),
        }
    }

    /// Issue a new grading attempt for the stored answer after an oracle failure.
    pub fn regrade(&mut self) -> Result<GradeRequest> {
        let answer = match &self.state {
            State::Grading {
                answer,
                pending: None,
                stalled: true,
                ..
            } => answer.clone(),
            State::Grading { pending: None, .. } => return Err(SessionError::RequestInFlight),
            State::Grading { .. } => return Err(SessionError::NothingPending),
            _ => return Err(self.invalid("regrade")),
        };

        self.attempt += 1;
        let ticket = self.current_ticket();
        if let State::Grading {
            ticket: current,
            stalled,
            ..
        } = &mut self.state
        {
            *current = ticket;
            *stalled = false;
        }
        self.grade_request(ticket, &answer)
    }

    /// Apply the oracle's grade. Returns the metadata to write back; the
    /// session stays in grading until the write is committed.
    pub fn grade_received(
        &mut self,
        ticket: Ticket,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<PendingWrite> {
        self.check_ticket(ticket, "receive a grade")?;
        let item = self
            .queue
            .get(self.cursor)
            .ok_or_else(|| self.invalid("receive a grade"))?;

        let State::Grading {
            answer, pending, ..
        } = &self.state
        else {
            return Err(self.invalid("receive a grade"));
        };
        if pending.is_some() {
            return Err(self.invalid("receive a grade"));
        }

        let write = PendingWrite {
            ticket,
            item_id: item.id.clone(),
            metadata: self.scheduler.apply_grade(item, &grade, answer, now),
            grade,
        };

        if let State::Grading { pending, .. } = &mut self.state {
            *pending = Some(write.clone());
        }
        self.last_error = None;
        Ok(write)
    }

    /// Record an oracle failure. Nothing advances; the answer can be regraded.
    pub fn grading_failed(&mut self, ticket: Ticket, reason: impl Into<String>) -> Result<()> {
        self.check_ticket(ticket, "fail grading")?;
        let State::Grading {
            pending: None,
            stalled,
            ..
        } = &mut self.state
        else {
            return Err(self.invalid("fail grading"));
        };
        *stalled = true;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Record a failed write-back. The pending metadata is kept for a retry.
    pub fn write_failed(&mut self, ticket: Ticket, reason: impl Into<String>) -> Result<()> {
        self.check_ticket(ticket, "fail a write")?;
        let State::Grading {
            pending: Some(_),
            stalled,
            ..
        } = &mut self.state
        else {
            return Err(SessionError::NothingPending);
        };
        *stalled = true;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Confirm the write-back and move on, re-queueing the item after a
    /// failing grade.
    pub fn write_committed(&mut self, ticket: Ticket) -> Result<Phase> {
        self.check_ticket(ticket, "commit a write")?;
        let write = match &mut self.state {
            State::Grading { pending, .. } => pending.take(),
            _ => None,
        }
        .ok_or(SessionError::NothingPending)?;

        if let Some(item) = self.queue.get_mut(self.cursor) {
            *item = item.with_metadata(&write.metadata, write.metadata.last_studied.date);
            if self.scheduler.should_requeue(&write.grade) {
                let retry = item.clone();
                self.queue.push(retry);
                self.stats.requeued += 1;
            }
        }

        self.stats.graded += 1;
        self.cursor += 1;
        self.last_error = None;
        self.state = if self.cursor < self.queue.len() {
            State::Presenting
        } else {
            State::Complete
        };
        Ok(self.phase())
    }

    fn current_ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            attempt: self.attempt,
        }
    }

    fn active_ticket(&self) -> Option<Ticket> {
        match self.state {
            State::Loading { ticket, .. } | State::Grading { ticket, .. } => Some(ticket),
            _ => None,
        }
    }

    fn check_ticket(&self, ticket: Ticket, event: &'static str) -> Result<()> {
        match self.active_ticket() {
            Some(active) if active == ticket => Ok(()),
            _ if ticket.is_older_than(self.current_ticket()) => Err(SessionError::StaleTicket),
            _ => Err(self.invalid(event)),
        }
    }

    fn invalid(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            event,
            phase: self.phase(),
        }
    }

    fn grade_request(&self, ticket: Ticket, answer: &str) -> Result<GradeRequest> {
        let item = self
            .queue
            .get(self.cursor)
            .ok_or_else(|| self.invalid("grade"))?;
        Ok(GradeRequest {
            ticket,
            item_id: item.id.clone(),
            question: item.content.clone(),
            expected_answer: item.expected_answer.clone(),
            answer: answer.to_string(),
        })
    }
}
