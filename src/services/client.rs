use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Book, BookId, BookQuery, BookUpdate, Chapter, ErrorDetail};
use anyhow::Result;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use std::future::Future;

/// The books API as the editing session sees it.
///
/// Each call is one request; retries and deadlines are the implementor's business.
pub trait BookApi: Send + Sync {
    fn list_books(
        &self,
        query: &BookQuery,
    ) -> impl Future<Output = Result<Vec<Book>, ApiError>> + Send;

    fn fetch_chapters(
        &self,
        id: BookId,
    ) -> impl Future<Output = Result<Vec<Chapter>, ApiError>> + Send;

    fn update_book(
        &self,
        id: BookId,
        update: &BookUpdate,
    ) -> impl Future<Output = Result<Book, ApiError>> + Send;

    fn process_book(&self, id: BookId) -> impl Future<Output = Result<Book, ApiError>> + Send;
}

/// HTTP client for the Story Manager books API.
pub struct BooksClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BooksClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(BooksClient {
            client,
            base_url: config.api_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Prefer the structured `{detail}` body, then whatever text came back
            let detail = serde_json::from_str::<ErrorDetail>(&body)
                .map(|e| e.detail)
                .ok()
                .or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl BookApi for BooksClient {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, ApiError> {
        let url = match (&query.author, &query.series) {
            (Some(author), _) => self.endpoint(&["books", "search", "author", author.as_str()])?,
            (None, Some(series)) => self.endpoint(&["books", "search", "series", series.as_str()])?,
            (None, None) => self.endpoint(&["books"])?,
        };
        tracing::debug!(%url, "listing books");

        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn fetch_chapters(&self, id: BookId) -> Result<Vec<Chapter>, ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["books", id.as_str(), "chapters"])?;
        tracing::debug!(%url, "fetching chapters");

        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn update_book(&self, id: BookId, update: &BookUpdate) -> Result<Book, ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["books", id.as_str()])?;
        tracing::debug!(
            %url,
            removed = update.removed_chapters.len(),
            selectors = update.div_selectors.len(),
            "saving book"
        );

        let response = self.client.put(url).json(update).send().await?;
        Self::read(response).await
    }

    async fn process_book(&self, id: BookId) -> Result<Book, ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["books", id.as_str(), "process"])?;
        tracing::debug!(%url, "processing book");

        let response = self.client.post(url).send().await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BooksClient {
        BooksClient::new(&Config::from_parts(base, "5").unwrap()).unwrap()
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let c = client("http://localhost:8000/api");
        assert_eq!(
            c.endpoint(&["books", "7", "chapters"]).unwrap().as_str(),
            "http://localhost:8000/api/books/7/chapters"
        );

        let c = client("http://localhost:8000/api/");
        assert_eq!(
            c.endpoint(&["books", "7"]).unwrap().as_str(),
            "http://localhost:8000/api/books/7"
        );
    }

    #[test]
    fn search_terms_are_percent_encoded() {
        let c = client("http://localhost:8000/api");
        let url = c
            .endpoint(&["books", "search", "author", "Ursula K. Le Guin/2"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/books/search/author/Ursula%20K.%20Le%20Guin%2F2"
        );
    }
}
