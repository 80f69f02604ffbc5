//! Client-side editing sessions for the Story Manager books API.
//!
//! An [`EditSession`] binds to one book, loads its chapter catalog, keeps the
//! user's uncommitted choices (removed chapters, content selectors to strip)
//! and commits them with a save followed by an optional server-side process
//! pass. Results are published to the rest of the application as
//! [`SessionSignal`]s.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{ApiError, FetchError, ProcessError, SaveError};
pub use models::{Book, BookId, BookQuery, BookUpdate, Chapter};
pub use services::catalog::{CatalogStatus, ChapterCatalog};
pub use services::client::{BookApi, BooksClient};
pub use services::commit::{CommitCoordinator, CommitOutcome, PhaseStatus, SessionSignal};
pub use services::draft::{EditDraft, parse_selectors, serialize_selectors};
pub use services::library::BookLibrary;
pub use services::session::EditSession;
