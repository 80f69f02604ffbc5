use crate::models::{Book, BookId, BookUpdate};
use std::collections::BTreeSet;

/// Uncommitted edits for one book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditDraft {
    pub removed_chapters: BTreeSet<String>,
    /// Raw selector text as typed; only parsed when committing.
    pub selectors_text: String,
}

impl EditDraft {
    /// Seeds a draft from the server's record.
    pub fn from_book(book: &Book) -> Self {
        EditDraft {
            removed_chapters: book.removed_chapters.iter().cloned().collect(),
            selectors_text: serialize_selectors(&book.div_selectors),
        }
    }

    /// Flips whether `chapter` is marked as removed.
    ///
    /// Ids missing from the current catalog are accepted so a toggle racing a
    /// catalog reload is not lost.
    pub fn toggle_chapter(&mut self, chapter: &str) {
        if !self.removed_chapters.remove(chapter) {
            self.removed_chapters.insert(chapter.to_string());
        }
    }

    pub fn set_selectors_text(&mut self, text: impl Into<String>) {
        self.selectors_text = text.into();
    }

    pub fn is_removed(&self, chapter: &str) -> bool {
        self.removed_chapters.contains(chapter)
    }

    pub fn selectors(&self) -> Vec<String> {
        parse_selectors(&self.selectors_text)
    }

    /// The request body a commit of this draft sends.
    pub fn to_update(&self) -> BookUpdate {
        BookUpdate {
            removed_chapters: self.removed_chapters.iter().cloned().collect(),
            div_selectors: self.selectors(),
        }
    }
}

/// Splits comma-separated selector text, trimming and dropping empty entries.
pub fn parse_selectors(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn serialize_selectors(selectors: &[String]) -> String {
    selectors.join(", ")
}

/// Re-derives the draft only when the edited book's identity changes, so
/// refreshed snapshots of the same book never clobber in-progress edits.
#[derive(Debug, Default)]
pub struct Reconciler {
    bound: Option<BookId>,
    draft: EditDraft,
}

impl Reconciler {
    /// Returns true when the draft was re-derived from `book`.
    pub fn reconcile(&mut self, book: &Book) -> bool {
        if self.bound == Some(book.id) {
            return false;
        }
        self.bound = Some(book.id);
        self.draft = EditDraft::from_book(book);
        true
    }

    pub fn release(&mut self) {
        self.bound = None;
        self.draft = EditDraft::default();
    }

    pub fn bound(&self) -> Option<BookId> {
        self.bound
    }

    pub fn draft(&self) -> &EditDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut EditDraft {
        &mut self.draft
    }
}
