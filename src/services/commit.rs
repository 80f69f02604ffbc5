use crate::error::{ProcessError, SaveError};
use crate::models::{Book, BookId, BookUpdate};
use crate::services::client::BookApi;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Notifications from an editing session to the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The server-side book collection changed; cached lists must be re-fetched.
    BooksStale,
    /// The editor is done; show the book list again.
    ReturnToList,
}

/// Observable state of one commit phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PhaseStatus<T, E> {
    #[default]
    Idle,
    Pending,
    Ok(T),
    Err(E),
}

impl<T, E> PhaseStatus<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PhaseStatus::Pending)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PhaseStatus::Idle)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            PhaseStatus::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            PhaseStatus::Err(err) => Some(err),
            _ => None,
        }
    }
}

pub type SaveStatus = PhaseStatus<Book, SaveError>;
pub type ProcessStatus = PhaseStatus<Book, ProcessError>;

/// What a commit request ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Saved(Book),
    Processed(Book),
    SaveFailed(SaveError),
    ProcessFailed(ProcessError),
    /// A phase was already in flight, or nothing is being edited. No request was sent.
    Ignored,
    /// The book was left while the request was in flight; the result was not applied.
    Abandoned,
}

impl CommitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommitOutcome::Saved(_) | CommitOutcome::Processed(_))
    }
}

#[derive(Debug, Default)]
struct CommitState {
    epoch: u64,
    in_flight: bool,
    save: SaveStatus,
    process: ProcessStatus,
    // What the server holds for the book after the last successful save.
    last_saved: Option<(BookId, BookUpdate)>,
    // Requests still open on the server, per book. Survives `abandon`.
    outstanding: HashMap<BookId, usize>,
}

impl CommitState {
    fn holds(&self, book_id: BookId, update: &BookUpdate) -> bool {
        self.last_saved
            .as_ref()
            .is_some_and(|(id, saved)| *id == book_id && saved == update)
    }

    fn is_open(&self, book_id: BookId) -> bool {
        self.outstanding.contains_key(&book_id)
    }
}

/// Marks one request for a book as open until dropped.
struct Outstanding {
    state: Arc<Mutex<CommitState>>,
    book_id: BookId,
}

impl Outstanding {
    // Caller holds the lock on `state`.
    fn open(shared: &Arc<Mutex<CommitState>>, state: &mut CommitState, book_id: BookId) -> Self {
        *state.outstanding.entry(book_id).or_default() += 1;
        Outstanding {
            state: Arc::clone(shared),
            book_id,
        }
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = state.outstanding.get_mut(&self.book_id) {
            *count -= 1;
            if *count == 0 {
                state.outstanding.remove(&self.book_id);
            }
        }
    }
}

/// Sequences `save` and `process` for one editing session.
///
/// At most one phase is in flight at a time; requests made while busy are
/// ignored rather than queued. A book whose earlier request is still open on
/// the server, even one from an abandoned session, counts as busy. Process is
/// only issued for a draft that has been saved.
pub struct CommitCoordinator<A> {
    api: Arc<A>,
    state: Arc<Mutex<CommitState>>,
    signals: broadcast::Sender<SessionSignal>,
}

impl<A> Clone for CommitCoordinator<A> {
    fn clone(&self) -> Self {
        CommitCoordinator {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
            signals: self.signals.clone(),
        }
    }
}

impl<A: BookApi> CommitCoordinator<A> {
    pub fn new(api: Arc<A>, signals: broadcast::Sender<SessionSignal>) -> Self {
        CommitCoordinator {
            api,
            state: Arc::default(),
            signals,
        }
    }

    pub fn save_status(&self) -> SaveStatus {
        self.lock().save.clone()
    }

    pub fn process_status(&self) -> ProcessStatus {
        self.lock().process.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().in_flight
    }

    /// Whether a request for `book_id` is still open, including abandoned ones.
    pub fn has_open_request(&self, book_id: BookId) -> bool {
        self.lock().is_open(book_id)
    }

    /// Whether `update` is what the server already holds for `book_id`.
    pub fn is_saved(&self, book_id: BookId, update: &BookUpdate) -> bool {
        self.lock().holds(book_id, update)
    }

    /// Drops all phase state. Responses still in flight will not be applied,
    /// but their books stay busy until the server answers.
    pub fn abandon(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.in_flight = false;
        state.save = PhaseStatus::Idle;
        state.process = PhaseStatus::Idle;
        state.last_saved = None;
    }

    /// Persists `update`. Starting a save clears the process slot, since any
    /// earlier process result belongs to a previous commit attempt.
    pub async fn save(&self, book_id: BookId, update: BookUpdate) -> CommitOutcome {
        let Some((epoch, open)) = self.begin_save(book_id) else {
            return CommitOutcome::Ignored;
        };
        let outcome = self.run_save(epoch, open, book_id, update).await;
        self.finish(epoch);
        outcome
    }

    /// Regenerates the book from its saved state. `update` must match the
    /// last successful save, otherwise `ProcessError::Unsaved` is reported and
    /// nothing is sent.
    pub async fn process(&self, book_id: BookId, update: &BookUpdate) -> CommitOutcome {
        let (epoch, open) = {
            let mut state = self.lock();
            if state.in_flight || state.is_open(book_id) {
                tracing::debug!(book_id, "commit already in flight, ignoring process");
                return CommitOutcome::Ignored;
            }
            if !state.holds(book_id, update) {
                state.process = PhaseStatus::Err(ProcessError::Unsaved);
                return CommitOutcome::ProcessFailed(ProcessError::Unsaved);
            }
            state.in_flight = true;
            state.process = PhaseStatus::Pending;
            (state.epoch, Outstanding::open(&self.state, &mut state, book_id))
        };

        let outcome = self.run_process(epoch, open, book_id).await;
        self.finish(epoch);
        outcome
    }

    /// Saves `update`, then processes if and only if the save succeeded.
    pub async fn save_and_process(&self, book_id: BookId, update: BookUpdate) -> CommitOutcome {
        let Some((epoch, open)) = self.begin_save(book_id) else {
            return CommitOutcome::Ignored;
        };

        match self.run_save(epoch, open, book_id, update).await {
            CommitOutcome::Saved(_) => {}
            other => {
                self.finish(epoch);
                return other;
            }
        }

        let open = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return CommitOutcome::Abandoned;
            }
            state.process = PhaseStatus::Pending;
            Outstanding::open(&self.state, &mut state, book_id)
        };

        let outcome = self.run_process(epoch, open, book_id).await;
        self.finish(epoch);
        outcome
    }

    fn begin_save(&self, book_id: BookId) -> Option<(u64, Outstanding)> {
        let mut state = self.lock();
        if state.in_flight || state.is_open(book_id) {
            tracing::debug!(book_id, "commit already in flight, ignoring save");
            return None;
        }
        state.in_flight = true;
        state.save = PhaseStatus::Pending;
        state.process = PhaseStatus::Idle;
        let open = Outstanding::open(&self.state, &mut state, book_id);
        Some((state.epoch, open))
    }

    fn finish(&self, epoch: u64) {
        let mut state = self.lock();
        if state.epoch == epoch {
            state.in_flight = false;
        }
    }

    async fn run_save(
        &self,
        epoch: u64,
        open: Outstanding,
        book_id: BookId,
        update: BookUpdate,
    ) -> CommitOutcome {
        tracing::info!(book_id, "saving draft");
        let result = self.api.update_book(book_id, &update).await;
        drop(open);
        if result.is_ok() {
            // The server changed even if nobody is waiting for this result
            self.notify(SessionSignal::BooksStale);
        }

        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::warn!(book_id, "discarding save result for abandoned session");
            return CommitOutcome::Abandoned;
        }

        match result {
            Ok(book) => {
                tracing::info!(book_id, "draft saved");
                state.save = PhaseStatus::Ok(book.clone());
                state.last_saved = Some((book_id, update));
                CommitOutcome::Saved(book)
            }
            Err(err) => {
                let err = SaveError(err);
                tracing::warn!(book_id, error = %err, "save failed");
                state.save = PhaseStatus::Err(err.clone());
                CommitOutcome::SaveFailed(err)
            }
        }
    }

    async fn run_process(&self, epoch: u64, open: Outstanding, book_id: BookId) -> CommitOutcome {
        tracing::info!(book_id, "processing book");
        let result = self.api.process_book(book_id).await;
        drop(open);
        if result.is_ok() {
            self.notify(SessionSignal::BooksStale);
        }

        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::warn!(book_id, "discarding process result for abandoned session");
            return CommitOutcome::Abandoned;
        }

        match result {
            Ok(book) => {
                tracing::info!(book_id, words = book.current_word_count, "book processed");
                state.process = PhaseStatus::Ok(book.clone());
                CommitOutcome::Processed(book)
            }
            Err(err) => {
                let err = ProcessError::Api(err);
                tracing::warn!(book_id, error = %err, "process failed");
                state.process = PhaseStatus::Err(err.clone());
                CommitOutcome::ProcessFailed(err)
            }
        }
    }

    fn notify(&self, signal: SessionSignal) {
        // No subscribers is fine
        let _ = self.signals.send(signal);
    }

    fn lock(&self) -> MutexGuard<'_, CommitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
