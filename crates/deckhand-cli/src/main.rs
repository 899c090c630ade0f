use std::fmt::Debug;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use deckhand_core::collection::CollectionManager;
use deckhand_core::config::DeckhandConfig;
use deckhand_core::models::{CardId, CoreError, CoreErrorKind, DeckId, Ease, NoteTypeId};
use deckhand_core::orchestration::{CollectionTaskQueue, ListenerEvent, listener_channel};
use deckhand_core::tasks::{
    AnswerCard, CheckDatabase, CollectionTask, DeleteNoteType, DismissCards, ExportPackage,
    FindEmptyCards, ImportAdd, ImportReplace, LoadDeckCounts, LoadNoteTypes, UndoLast,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Run collection tasks through the background task queue", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Collection file, overriding the config
    #[arg(long, global = true)]
    collection: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-deck new, learning and due counts
    Decks,
    /// Move cards to another deck
    MoveCards {
        #[arg(long)]
        deck: i64,
        #[arg(required = true, value_delimiter = ',')]
        cards: Vec<i64>,
    },
    Suspend {
        #[arg(required = true, value_delimiter = ',')]
        cards: Vec<i64>,
    },
    Unsuspend {
        #[arg(required = true, value_delimiter = ',')]
        cards: Vec<i64>,
    },
    /// Answer a card (1 = again, 2 = hard, 3 = good, 4 = easy)
    Answer {
        card: i64,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        ease: u8,
    },
    /// Undo the most recent change
    Undo,
    /// Check and repair the collection
    Check,
    /// List cards whose note has only blank fields
    EmptyCards,
    NoteTypes,
    DeleteNoteType {
        id: i64,
    },
    /// Write a package file
    Export {
        path: PathBuf,
        #[arg(long)]
        deck: Option<i64>,
        #[arg(long)]
        no_scheduling: bool,
        #[arg(long)]
        no_media: bool,
    },
    /// Merge packages into the collection
    ImportAdd {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Replace the collection with the one in a package
    ImportReplace {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref(), cli.collection) {
        Ok(config) => config,
        Err(error) => {
            report_error(&error);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_filter);

    match run(cli.command, config).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(
                kind = ?error.kind,
                message = %error.message,
                resource = ?error.resource,
                "command failed"
            );
            report_error(&error);
            ExitCode::FAILURE
        }
    }
}

fn load_config(
    config_path: Option<&PathBuf>,
    collection: Option<PathBuf>,
) -> Result<DeckhandConfig, CoreError> {
    let mut config = match config_path {
        Some(path) => DeckhandConfig::from_json_file(path)?,
        None => DeckhandConfig::default(),
    };
    if let Some(collection) = collection {
        config.collection_path = collection;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(command: Command, config: DeckhandConfig) -> Result<String, CoreError> {
    let queue = CollectionTaskQueue::new(CollectionManager::from_config(config)?)?;
    let output = execute(&queue, command).await;
    queue.shutdown(Some(SHUTDOWN_TIMEOUT)).await?;
    output
}

async fn execute(queue: &CollectionTaskQueue, command: Command) -> Result<String, CoreError> {
    match command {
        Command::Decks => render(&submit(queue, LoadDeckCounts).await?),
        Command::MoveCards { deck, cards } => {
            let task = DismissCards::change_deck(card_ids(cards), DeckId(deck));
            render(&submit(queue, task).await?)
        }
        Command::Suspend { cards } => {
            render(&submit(queue, DismissCards::suspend(card_ids(cards))).await?)
        }
        Command::Unsuspend { cards } => {
            render(&submit(queue, DismissCards::unsuspend(card_ids(cards))).await?)
        }
        Command::Answer { card, ease } => {
            let ease = Ease::from_u8(ease).ok_or_else(|| {
                CoreError::new(CoreErrorKind::InvalidInput, format!("invalid ease '{ease}'"))
            })?;
            render(&submit(queue, AnswerCard { card: CardId(card), ease }).await?)
        }
        Command::Undo => render(&submit(queue, UndoLast).await?),
        Command::Check => render(&submit(queue, CheckDatabase).await?),
        Command::EmptyCards => render(&submit(queue, FindEmptyCards).await?),
        Command::NoteTypes => render(&submit(queue, LoadNoteTypes).await?),
        Command::DeleteNoteType { id } => {
            let removed = submit(queue, DeleteNoteType { id: NoteTypeId(id) }).await?;
            render(&json!({ "cards_removed": removed }))
        }
        Command::Export {
            path,
            deck,
            no_scheduling,
            no_media,
        } => {
            let task = ExportPackage {
                path,
                deck: deck.map(DeckId),
                include_scheduling: !no_scheduling,
                include_media: !no_media,
            };
            render(&submit(queue, task).await?)
        }
        Command::ImportAdd { paths } => {
            let report = submit(queue, ImportAdd { paths }).await?;
            let failed: Vec<_> = report
                .failed
                .iter()
                .map(|failure| {
                    json!({
                        "file": failure.file,
                        "kind": failure.error.kind.as_str(),
                        "message": failure.error.message,
                    })
                })
                .collect();
            render(&json!({ "imported": report.imported, "failed": failed }))
        }
        Command::ImportReplace { path } => render(&submit(queue, ImportReplace { path }).await?),
    }
}

/// Submits one task and follows its listener events until it settles.
async fn submit<T>(queue: &CollectionTaskQueue, task: T) -> Result<T::Output, CoreError>
where
    T: CollectionTask,
    T::Progress: Debug,
{
    let (listener, mut events) = listener_channel();
    let handle = queue.submit(task, listener)?;
    let task = handle.kind().as_str();

    while let Some(event) = events.recv().await {
        match event {
            ListenerEvent::Started => tracing::debug!(task, "task started"),
            ListenerEvent::Progress(progress) => tracing::info!(task, progress = ?progress, "progress"),
            ListenerEvent::Completed(result) => return result,
            ListenerEvent::Cancelled => return Err(CoreError::cancelled(handle.kind())),
        }
    }

    Err(CoreError::new(
        CoreErrorKind::Internal,
        "task finished without reporting an outcome",
    ))
}

fn card_ids(raw: Vec<i64>) -> Vec<CardId> {
    raw.into_iter().map(CardId).collect()
}

fn render<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to render output: {error}"),
        )
    })
}

fn report_error(error: &CoreError) {
    let body = json!({
        "error": error.kind.as_str(),
        "task": error.task.map(|task| task.as_str()),
        "message": error.message,
        "resource": error.resource,
        "after_commit": error.is_after_commit(),
    });
    eprintln!("{body}");
}
