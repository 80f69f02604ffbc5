use serde::{Deserialize, Deserializer, Serialize};

pub type BookId = i64;

/// A book record as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub master_word_count: u64,
    #[serde(default)]
    pub current_word_count: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub div_selectors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub removed_chapters: Vec<String>,
}

/// One entry of a book's chapter catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub filename: String,
    pub title: String,
}

/// Body of `PUT /books/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub removed_chapters: Vec<String>,
    pub div_selectors: Vec<String>,
}

/// Error body the server attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Search filter for the book collection. Author takes precedence over series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BookQuery {
    pub author: Option<String>,
    pub series: Option<String>,
}

impl BookQuery {
    pub fn new(author: Option<&str>, series: Option<&str>) -> Self {
        let clean = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        BookQuery {
            author: clean(author),
            series: clean(series),
        }
    }
}

// The API sends `null` for books that were never edited.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
