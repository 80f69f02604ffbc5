use crate::error::FetchError;
use crate::models::{BookId, Chapter};
use crate::services::client::BookApi;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CatalogStatus {
    #[default]
    Idle,
    Loading,
    Loaded(Vec<Chapter>),
    Failed(FetchError),
}

impl CatalogStatus {
    /// Chapters to display; empty while loading or after a failure.
    pub fn chapters(&self) -> &[Chapter] {
        match self {
            CatalogStatus::Loaded(chapters) => chapters,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            CatalogStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    // Bumped by every load and reset; a response only lands if it still matches.
    generation: u64,
    book_id: Option<BookId>,
    status: CatalogStatus,
}

/// Correlates an in-flight fetch with the request that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    book_id: BookId,
}

/// Chapter list of the book currently being edited.
///
/// The most recently *requested* book wins: a slow response for a book the
/// caller has moved away from is dropped on arrival.
pub struct ChapterCatalog<A> {
    api: Arc<A>,
    state: Arc<Mutex<CatalogState>>,
}

impl<A> Clone for ChapterCatalog<A> {
    fn clone(&self) -> Self {
        ChapterCatalog {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: BookApi> ChapterCatalog<A> {
    pub fn new(api: Arc<A>) -> Self {
        ChapterCatalog {
            api,
            state: Arc::default(),
        }
    }

    /// Fetches the chapters of `book_id` and publishes them unless a newer
    /// load or a reset happened meanwhile. The caller always gets its own result.
    ///
    /// The request is registered when this is called, not when the returned
    /// future is first polled.
    pub fn load(
        &self,
        book_id: BookId,
    ) -> impl Future<Output = Result<Vec<Chapter>, FetchError>> + Send {
        let ticket = self.begin(book_id);
        async move {
            let result = self.api.fetch_chapters(book_id).await.map_err(FetchError);
            self.complete(ticket, &result);
            result
        }
    }

    /// Forgets the current book; outstanding responses will be ignored.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.book_id = None;
        state.status = CatalogStatus::Idle;
    }

    pub fn book_id(&self) -> Option<BookId> {
        self.lock().book_id
    }

    pub fn status(&self) -> CatalogStatus {
        self.lock().status.clone()
    }

    /// Status for `book_id`, or `Idle` if the catalog is bound to another book.
    pub fn status_for(&self, book_id: BookId) -> CatalogStatus {
        let state = self.lock();
        if state.book_id == Some(book_id) {
            state.status.clone()
        } else {
            CatalogStatus::Idle
        }
    }

    fn begin(&self, book_id: BookId) -> Ticket {
        let mut state = self.lock();
        state.generation += 1;
        state.book_id = Some(book_id);
        state.status = CatalogStatus::Loading;
        Ticket {
            generation: state.generation,
            book_id,
        }
    }

    fn complete(&self, ticket: Ticket, result: &Result<Vec<Chapter>, FetchError>) {
        let mut state = self.lock();
        if state.generation != ticket.generation || state.book_id != Some(ticket.book_id) {
            tracing::warn!(book_id = ticket.book_id, "discarding stale chapter list");
            return;
        }

        state.status = match result {
            Ok(chapters) => {
                tracing::debug!(book_id = ticket.book_id, count = chapters.len(), "chapters loaded");
                CatalogStatus::Loaded(chapters.clone())
            }
            Err(err) => {
                tracing::warn!(book_id = ticket.book_id, error = %err, "chapter fetch failed");
                CatalogStatus::Failed(err.clone())
            }
        };
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
