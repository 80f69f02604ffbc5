use crate::error::FetchError;
use crate::models::{Book, BookId, BookUpdate, Chapter};
use crate::services::catalog::{CatalogStatus, ChapterCatalog};
use crate::services::client::BookApi;
use crate::services::commit::{
    CommitCoordinator, CommitOutcome, ProcessStatus, SaveStatus, SessionSignal,
};
use crate::services::draft::{EditDraft, Reconciler};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct SessionState {
    // Bumped whenever the edited book changes or the session ends.
    epoch: u64,
    book: Option<Book>,
    reconciler: Reconciler,
}

/// Editing session for one book at a time.
///
/// Handles are cheap to clone and share state, so a view can keep issuing
/// intents while a commit is in flight.
pub struct EditSession<A> {
    state: Arc<Mutex<SessionState>>,
    catalog: ChapterCatalog<A>,
    commit: CommitCoordinator<A>,
    signals: broadcast::Sender<SessionSignal>,
}

impl<A> Clone for EditSession<A> {
    fn clone(&self) -> Self {
        EditSession {
            state: Arc::clone(&self.state),
            catalog: self.catalog.clone(),
            commit: self.commit.clone(),
            signals: self.signals.clone(),
        }
    }
}

impl<A: BookApi> EditSession<A> {
    pub fn new(api: Arc<A>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        EditSession {
            state: Arc::default(),
            catalog: ChapterCatalog::new(api.clone()),
            commit: CommitCoordinator::new(api, signals.clone()),
            signals,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Starts editing `book`, or switches to it from another book.
    ///
    /// The draft is re-derived and the chapters fetched only when the book's
    /// identity changes. Handing in a fresh record of the book already being
    /// edited just replaces the snapshot and returns `None`.
    pub async fn enter(&self, book: Book) -> Option<Result<Vec<Chapter>, FetchError>> {
        let book_id = book.id;
        let fetch = {
            let mut state = self.lock();
            let changed = state.reconciler.reconcile(&book);
            state.book = Some(book);
            if !changed {
                return None;
            }
            state.epoch += 1;
            self.commit.abandon();
            tracing::info!(book_id, "editing session started");
            self.catalog.load(book_id)
        };

        Some(fetch.await)
    }

    /// Fetches the chapter list of the current book again, e.g. after a failure.
    pub async fn reload_chapters(&self) -> Option<Result<Vec<Chapter>, FetchError>> {
        let fetch = {
            let state = self.lock();
            state.book.as_ref()?;
            self.catalog.load(state.reconciler.bound()?)
        };
        Some(fetch.await)
    }

    /// Leaves the editor, discarding the draft.
    pub fn back(&self) {
        let mut state = self.lock();
        if state.book.is_some() {
            self.close(&mut state);
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().book.is_some()
    }

    pub fn book_id(&self) -> Option<BookId> {
        self.lock().reconciler.bound()
    }

    pub fn book(&self) -> Option<Book> {
        self.lock().book.clone()
    }

    pub fn draft(&self) -> Option<EditDraft> {
        let state = self.lock();
        state.book.as_ref()?;
        Some(state.reconciler.draft().clone())
    }

    /// Chapter list for the current book; never another book's.
    pub fn catalog(&self) -> CatalogStatus {
        match self.book_id() {
            Some(id) => self.catalog.status_for(id),
            None => CatalogStatus::Idle,
        }
    }

    pub fn save_status(&self) -> SaveStatus {
        self.commit.save_status()
    }

    pub fn process_status(&self) -> ProcessStatus {
        self.commit.process_status()
    }

    /// Returns false when no book is being edited.
    pub fn toggle_chapter(&self, chapter: &str) -> bool {
        let mut state = self.lock();
        if state.book.is_none() {
            return false;
        }
        state.reconciler.draft_mut().toggle_chapter(chapter);
        true
    }

    pub fn set_selectors_text(&self, text: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.book.is_none() {
            return false;
        }
        state.reconciler.draft_mut().set_selectors_text(text);
        true
    }

    /// Whether the current draft is what the server holds.
    pub fn is_saved(&self) -> bool {
        let state = self.lock();
        match state.reconciler.bound() {
            Some(id) => self.commit.is_saved(id, &state.reconciler.draft().to_update()),
            None => false,
        }
    }

    pub async fn save(&self) -> CommitOutcome {
        let Some((epoch, book_id, update)) = self.snapshot() else {
            return CommitOutcome::Ignored;
        };
        let outcome = self.commit.save(book_id, update).await;
        self.apply(epoch, &outcome);
        outcome
    }

    /// Processes the saved draft. Unsaved edits are rejected with
    /// `ProcessError::Unsaved`; use [`save_and_process`](Self::save_and_process)
    /// to commit them first.
    pub async fn process(&self) -> CommitOutcome {
        let Some((epoch, book_id, update)) = self.snapshot() else {
            return CommitOutcome::Ignored;
        };
        let outcome = self.commit.process(book_id, &update).await;
        self.apply(epoch, &outcome);
        outcome
    }

    pub async fn save_and_process(&self) -> CommitOutcome {
        let Some((epoch, book_id, update)) = self.snapshot() else {
            return CommitOutcome::Ignored;
        };
        let outcome = self.commit.save_and_process(book_id, update).await;
        if let CommitOutcome::ProcessFailed(_) = &outcome {
            // The save half went through; keep the snapshot in step with the server
            if let Some(saved) = self.commit.save_status().value() {
                self.apply(epoch, &CommitOutcome::Saved(saved.clone()));
            }
        }
        self.apply(epoch, &outcome);
        outcome
    }

    fn snapshot(&self) -> Option<(u64, BookId, BookUpdate)> {
        let state = self.lock();
        state.book.as_ref()?;
        let book_id = state.reconciler.bound()?;
        Some((state.epoch, book_id, state.reconciler.draft().to_update()))
    }

    fn apply(&self, epoch: u64, outcome: &CommitOutcome) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        match outcome {
            CommitOutcome::Saved(book) => state.book = Some(book.clone()),
            CommitOutcome::Processed(book) => {
                tracing::info!(book_id = book.id, "book processed, closing editor");
                self.close(&mut state);
            }
            _ => {}
        }
    }

    fn close(&self, state: &mut SessionState) {
        if let Some(id) = state.reconciler.bound() {
            tracing::info!(book_id = id, "editing session ended");
        }
        state.epoch += 1;
        state.book = None;
        state.reconciler.release();
        self.catalog.reset();
        self.commit.abandon();
        let _ = self.signals.send(SessionSignal::ReturnToList);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
