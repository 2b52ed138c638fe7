//! Observable loading/error state for one view.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::error::{ClientError, ErrorInfo};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

/// Identifies one dispatched operation. Higher tickets were dispatched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Sequence {
    issued: u64,
    applied: u64,
}

#[derive(Debug)]
pub struct LoadingCell {
    state: watch::Sender<LoadingState>,
    sequence: Mutex<Sequence>,
}

impl Default for LoadingCell {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingCell {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LoadingState::default());
        Self {
            state,
            sequence: Mutex::new(Sequence::default()),
        }
    }

    /// Runs `op`, tracking it in the published state.
    ///
    /// Overlapping calls are not ordered; whichever settles last determines the state.
    /// Dropping the returned future before it completes clears `loading`.
    pub async fn execute<T, F>(&self, op: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        self.mark_loading();
        let mut running = Running {
            cell: self,
            armed: true,
        };
        let outcome = op.await;
        running.armed = false;
        self.finish(outcome.as_ref().err());
        outcome
    }

    /// Starts a sequenced operation.
    pub fn begin(&self) -> Ticket {
        let mut seq = self.sequence();
        seq.issued += 1;
        self.mark_loading();
        Ticket(seq.issued)
    }

    /// Like `begin`, but the ticket is released if the guard is dropped unsettled.
    pub fn track(&self) -> PendingTicket<'_> {
        PendingTicket {
            cell: self,
            ticket: Some(self.begin()),
        }
    }

    /// Records the outcome of `ticket`.
    ///
    /// Returns false, leaving the state alone, if a later ticket has already settled.
    /// `loading` stays set until the most recently issued ticket settles.
    pub fn settle(&self, ticket: Ticket, failure: Option<&ClientError>) -> bool {
        let mut seq = self.sequence();
        if ticket.0 <= seq.applied {
            return false;
        }
        seq.applied = ticket.0;
        let latest = ticket.0 == seq.issued;
        let error = failure.map(ErrorInfo::from);
        self.state.send_modify(|s| {
            s.error = error;
            if latest {
                s.loading = false;
            }
        });
        true
    }

    /// Abandons `ticket` without an outcome. Clears `loading` if it was the latest.
    fn release(&self, ticket: Ticket) {
        let seq = self.sequence();
        if ticket.0 == seq.issued && ticket.0 > seq.applied {
            self.state.send_modify(|s| s.loading = false);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LoadingState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.state.borrow().error.clone()
    }

    fn mark_loading(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn finish(&self, failure: Option<&ClientError>) {
        let error = failure.map(ErrorInfo::from);
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = error;
        });
    }

    fn sequence(&self) -> std::sync::MutexGuard<'_, Sequence> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A ticket that settles itself when dropped, e.g. when its fetch is cancelled.
#[derive(Debug)]
pub struct PendingTicket<'a> {
    cell: &'a LoadingCell,
    ticket: Option<Ticket>,
}

impl PendingTicket<'_> {
    pub fn seq(&self) -> u64 {
        self.ticket.map(Ticket::seq).unwrap_or_default()
    }

    /// See `LoadingCell::settle`.
    pub fn settle(mut self, failure: Option<&ClientError>) -> bool {
        match self.ticket.take() {
            Some(ticket) => self.cell.settle(ticket, failure),
            None => false,
        }
    }
}

impl Drop for PendingTicket<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.cell.release(ticket);
        }
    }
}

struct Running<'a> {
    cell: &'a LoadingCell,
    armed: bool,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cell.state.send_modify(|s| s.loading = false);
        }
    }
}
