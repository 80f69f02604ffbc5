use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::sync::Arc;
use story_editor::{
    Book, BookId, BookLibrary, BookQuery, BooksClient, ChapterCatalog, CommitOutcome, Config,
    EditSession,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "story-editor",
    version,
    about = "Curate chapters and boilerplate of books in a Story Manager library"
)]
struct Cli {
    /// Books API base URL, overrides STORY_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List books, optionally filtered by author or series
    List {
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        series: Option<String>,
    },
    /// Show the chapter catalog of a book
    Chapters { id: BookId },
    /// Change which chapters are removed and which selectors are stripped
    Edit {
        id: BookId,
        /// Chapter file to flip between kept and removed (repeatable)
        #[arg(long = "toggle", value_name = "FILE")]
        toggles: Vec<String>,
        /// Comma-separated selectors of content to strip, replaces the current list
        #[arg(long)]
        selectors: Option<String>,
        /// Regenerate the book after saving
        #[arg(long)]
        process: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url)?;
    }

    let client = Arc::new(BooksClient::new(&config)?);
    tracing::info!("Using books API at {}", client.base_url());

    match cli.command {
        Command::List { author, series } => {
            let mut library = BookLibrary::new(client);
            library.set_query(BookQuery::new(author.as_deref(), series.as_deref()));
            let books = library.books().await?;
            if books.is_empty() {
                println!("No books found.");
            }
            for book in books {
                print_book(book);
            }
        }
        Command::Chapters { id } => {
            let chapters = ChapterCatalog::new(client).load(id).await?;
            for chapter in chapters {
                println!("{:<40} {}", chapter.filename, chapter.title);
            }
        }
        Command::Edit {
            id,
            toggles,
            selectors,
            process,
        } => edit(client, id, toggles, selectors, process).await?,
    }

    Ok(())
}

async fn edit(
    client: Arc<BooksClient>,
    id: BookId,
    toggles: Vec<String>,
    selectors: Option<String>,
    process: bool,
) -> Result<()> {
    let mut library = BookLibrary::new(client.clone());
    let book = library
        .find(id)
        .await?
        .ok_or_else(|| missing_book(id, client.base_url()))?;

    let session = EditSession::new(client);
    let mut signals = session.subscribe();

    // Selectors can still be edited without a chapter list
    if let Some(Err(err)) = session.enter(book).await {
        eprintln!("warning: {err}, retrying");
        if let Some(Err(err)) = session.reload_chapters().await {
            eprintln!("warning: {err}");
        }
    }

    let catalog = session.catalog();
    for file in &toggles {
        if !catalog.chapters().iter().any(|c| &c.filename == file) {
            tracing::warn!(chapter = %file, "chapter is not in the catalog");
        }
        session.toggle_chapter(file);
    }
    if let Some(text) = selectors {
        session.set_selectors_text(text);
    }

    if let Some(draft) = session.draft() {
        for chapter in catalog.chapters() {
            let mark = if draft.is_removed(&chapter.filename) { " " } else { "x" };
            println!("[{mark}] {}", chapter.title);
        }
        println!("Selectors: {:?}", draft.selectors());
    }

    let outcome = if process {
        session.save_and_process().await
    } else {
        session.save().await
    };

    while let Ok(signal) = signals.try_recv() {
        library.observe(signal);
    }

    match outcome {
        CommitOutcome::Saved(book) => println!("Saved changes to '{}'.", book.title),
        CommitOutcome::Processed(book) => println!(
            "Processed '{}': {} words (master {}).",
            book.title, book.current_word_count, book.master_word_count
        ),
        CommitOutcome::SaveFailed(err) => return Err(err.into()),
        CommitOutcome::ProcessFailed(err) => return Err(err.into()),
        CommitOutcome::Ignored | CommitOutcome::Abandoned => bail!("commit did not run"),
    }

    if library.is_stale() {
        if let Some(book) = library.find(id).await? {
            print_book(&book);
        }
    }

    Ok(())
}

fn print_book(book: &Book) {
    let series = book
        .series
        .as_deref()
        .map(|s| format!(" [{s}]"))
        .unwrap_or_default();
    println!(
        "{:>5}  {} by {}{}  (master {}, current {})",
        book.id, book.title, book.author, series, book.master_word_count, book.current_word_count
    );
}

fn missing_book(id: BookId, api_url: &Url) -> anyhow::Error {
    anyhow!("no book with id {id} at {api_url}")
}
