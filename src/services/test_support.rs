//! Scripted in-memory `BookApi` for unit tests.
//!
//! Requests can be gated per endpoint and book so tests decide exactly when a
//! response arrives.

use crate::error::ApiError;
use crate::models::{Book, BookId, BookQuery, BookUpdate, Chapter};
use crate::services::client::BookApi;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    List,
    Chapters,
    Update,
    Process,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(BookQuery),
    Chapters(BookId),
    Update(BookId, BookUpdate),
    Process(BookId),
}

impl Call {
    fn endpoint(&self) -> Endpoint {
        match self {
            Call::List(_) => Endpoint::List,
            Call::Chapters(_) => Endpoint::Chapters,
            Call::Update(..) => Endpoint::Update,
            Call::Process(_) => Endpoint::Process,
        }
    }

    fn book_id(&self) -> Option<BookId> {
        match self {
            Call::List(_) => None,
            Call::Chapters(id) | Call::Update(id, _) | Call::Process(id) => Some(*id),
        }
    }
}

#[derive(Default)]
struct FakeState {
    books: BTreeMap<BookId, Book>,
    chapters: HashMap<BookId, Result<Vec<Chapter>, ApiError>>,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    gates: HashMap<(Endpoint, BookId), Arc<Notify>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
    requested: Notify,
}

pub fn book(id: BookId) -> Book {
    Book {
        id,
        title: format!("Book {id}"),
        author: "Anon".to_string(),
        series: None,
        master_word_count: 5000,
        current_word_count: 5000,
        div_selectors: Vec::new(),
        removed_chapters: Vec::new(),
    }
}

pub fn chapters(entries: &[(&str, &str)]) -> Vec<Chapter> {
    entries
        .iter()
        .map(|(filename, title)| Chapter {
            filename: filename.to_string(),
            title: title.to_string(),
        })
        .collect()
}

pub fn status(code: u16, detail: &str) -> ApiError {
    ApiError::Status {
        status: code,
        detail: detail.to_string(),
    }
}

impl FakeApi {
    pub fn with_books(books: impl IntoIterator<Item = Book>) -> Self {
        let api = FakeApi::default();
        api.state.lock().unwrap().books = books.into_iter().map(|b| (b.id, b)).collect();
        api
    }

    pub fn set_chapters(&self, id: BookId, chapters: Vec<Chapter>) {
        self.state.lock().unwrap().chapters.insert(id, Ok(chapters));
    }

    pub fn fail_chapters(&self, id: BookId, err: ApiError) {
        self.state.lock().unwrap().chapters.insert(id, Err(err));
    }

    /// The next call to `endpoint` fails with `err`.
    pub fn fail_next(&self, endpoint: Endpoint, err: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(err);
    }

    /// Holds every `endpoint` response for `id` until the returned handle is notified.
    pub fn gate(&self, endpoint: Endpoint, id: BookId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .gates
            .insert((endpoint, id), gate.clone());
        gate
    }

    pub fn gate_chapters(&self, id: BookId) -> Arc<Notify> {
        self.gate(Endpoint::Chapters, id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    pub async fn wait_for(&self, endpoint: Endpoint, id: BookId) {
        loop {
            let notified = self.requested.notified();
            let seen = self
                .calls()
                .iter()
                .any(|c| c.endpoint() == endpoint && c.book_id() == Some(id));
            if seen {
                return;
            }
            notified.await;
        }
    }

    pub async fn wait_for_chapter_request(&self, id: BookId) {
        self.wait_for(Endpoint::Chapters, id).await
    }

    fn record(&self, call: Call) -> Option<Arc<Notify>> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            let gate = call
                .book_id()
                .and_then(|id| state.gates.get(&(call.endpoint(), id)).cloned());
            state.calls.push(call);
            gate
        };
        self.requested.notify_waiters();
        gate
    }

    fn take_failure(&self, endpoint: Endpoint) -> Option<ApiError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
    }

    fn stored(&self, id: BookId) -> Result<Book, ApiError> {
        self.state
            .lock()
            .unwrap()
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| status(404, "Book not found"))
    }
}

impl BookApi for FakeApi {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, ApiError> {
        self.record(Call::List(query.clone()));
        if let Some(err) = self.take_failure(Endpoint::List) {
            return Err(err);
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .books
            .values()
            .filter(|b| query.author.as_ref().is_none_or(|a| &b.author == a))
            .filter(|b| query.series.as_ref().is_none_or(|s| b.series.as_ref() == Some(s)))
            .cloned()
            .collect())
    }

    async fn fetch_chapters(&self, id: BookId) -> Result<Vec<Chapter>, ApiError> {
        if let Some(gate) = self.record(Call::Chapters(id)) {
            gate.notified().await;
        }
        if let Some(err) = self.take_failure(Endpoint::Chapters) {
            return Err(err);
        }
        self.state
            .lock()
            .unwrap()
            .chapters
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Err(status(404, "Book not found")))
    }

    async fn update_book(&self, id: BookId, update: &BookUpdate) -> Result<Book, ApiError> {
        if let Some(gate) = self.record(Call::Update(id, update.clone())) {
            gate.notified().await;
        }
        if let Some(err) = self.take_failure(Endpoint::Update) {
            return Err(err);
        }
        let mut book = self.stored(id)?;
        book.removed_chapters = update.removed_chapters.clone();
        book.div_selectors = update.div_selectors.clone();
        self.state.lock().unwrap().books.insert(id, book.clone());
        Ok(book)
    }

    async fn process_book(&self, id: BookId) -> Result<Book, ApiError> {
        if let Some(gate) = self.record(Call::Process(id)) {
            gate.notified().await;
        }
        if let Some(err) = self.take_failure(Endpoint::Process) {
            return Err(err);
        }
        let mut book = self.stored(id)?;
        book.current_word_count = book
            .master_word_count
            .saturating_sub(100 * book.removed_chapters.len() as u64);
        self.state.lock().unwrap().books.insert(id, book.clone());
        Ok(book)
    }
}
