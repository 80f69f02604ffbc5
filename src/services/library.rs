use crate::error::FetchError;
use crate::models::{Book, BookId, BookQuery};
use crate::services::client::BookApi;
use crate::services::commit::SessionSignal;
use std::sync::Arc;

/// Cached book collection, re-fetched only after it has been marked stale.
pub struct BookLibrary<A> {
    api: Arc<A>,
    query: BookQuery,
    books: Vec<Book>,
    stale: bool,
}

impl<A: BookApi> BookLibrary<A> {
    pub fn new(api: Arc<A>) -> Self {
        BookLibrary {
            api,
            query: BookQuery::default(),
            books: Vec::new(),
            stale: true,
        }
    }

    pub fn query(&self) -> &BookQuery {
        &self.query
    }

    pub fn set_query(&mut self, query: BookQuery) {
        if query != self.query {
            self.query = query;
            self.stale = true;
        }
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Last successfully fetched list, without touching the network.
    pub fn cached(&self) -> &[Book] {
        &self.books
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Reacts to an editing session's notification.
    pub fn observe(&mut self, signal: SessionSignal) {
        if signal == SessionSignal::BooksStale {
            tracing::debug!("book list invalidated");
            self.invalidate();
        }
    }

    /// The collection for the current query, fetched if stale.
    ///
    /// On failure the previous list is kept and stays stale.
    pub async fn books(&mut self) -> Result<&[Book], FetchError> {
        if self.stale {
            let books = self.api.list_books(&self.query).await.map_err(FetchError)?;
            tracing::debug!(count = books.len(), "book list refreshed");
            self.books = books;
            self.stale = false;
        }
        Ok(&self.books)
    }

    pub async fn find(&mut self, id: BookId) -> Result<Option<Book>, FetchError> {
        Ok(self.books().await?.iter().find(|b| b.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Call, Endpoint, FakeApi, book, status};

    fn shelf() -> Arc<FakeApi> {
        let mut a = book(1);
        a.author = "Le Guin".into();
        a.series = Some("Earthsea".into());
        let mut b = book(2);
        b.author = "Banks".into();
        b.series = Some("Culture".into());
        Arc::new(FakeApi::with_books([a, b]))
    }

    #[tokio::test]
    async fn fetches_once_until_invalidated() {
        let api = shelf();
        let mut library = BookLibrary::new(api.clone());

        assert_eq!(library.books().await.unwrap().len(), 2);
        library.books().await.unwrap();
        assert_eq!(api.count(Endpoint::List), 1);

        library.observe(SessionSignal::ReturnToList);
        library.books().await.unwrap();
        assert_eq!(api.count(Endpoint::List), 1);

        library.observe(SessionSignal::BooksStale);
        assert!(library.is_stale());
        library.books().await.unwrap();
        assert_eq!(api.count(Endpoint::List), 2);
    }

    #[tokio::test]
    async fn query_change_refetches_with_filter() {
        let api = shelf();
        let mut library = BookLibrary::new(api.clone());

        library.set_query(BookQuery::new(None, Some(" Culture ")));
        let books = library.books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, 2);
        assert_eq!(
            api.calls(),
            vec![Call::List(BookQuery {
                author: None,
                series: Some("Culture".into()),
            })]
        );

        // Same query again is not a change
        library.set_query(BookQuery::new(None, Some("Culture")));
        assert!(!library.is_stale());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_list() {
        let api = shelf();
        let mut library = BookLibrary::new(api.clone());
        library.books().await.unwrap();

        library.invalidate();
        api.fail_next(Endpoint::List, status(503, "database unavailable"));
        let err = library.books().await.unwrap_err();
        assert_eq!(err.0.detail(), "database unavailable");
        assert!(library.is_stale());
        assert_eq!(library.cached().len(), 2);

        assert_eq!(library.find(2).await.unwrap().map(|b| b.id), Some(2));
        assert_eq!(library.find(9).await.unwrap(), None);
    }
}
