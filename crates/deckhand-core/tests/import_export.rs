use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

use deckhand_core::collection::{
    COLLECTION_ENTRY, Collection, CollectionManager, LEGACY_COLLECTION_ENTRY, MEDIA_MAP_ENTRY,
    PackageArchive,
};
use deckhand_core::config::default_media_dir;
use deckhand_core::models::{Card, CardId, CardQueue, CardType, CoreErrorKind, DeckId, TaskKind};
use deckhand_core::orchestration::{CollectionTaskQueue, TaskCancellationToken, TaskContext};
use deckhand_core::tasks::{
    CollectionTask, ExportPackage, ImportAdd, ImportReplace, LoadDeckCounts, WithCollection,
};

fn temp_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("deckhand-io-{test_name}-{nanos}"));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Creates a collection at `path` with one deck holding reviewed cards.
fn seed_collection(path: &Path, deck_name: &str, card_ids: &[i64]) -> DeckId {
    let mut collection = Collection::open(path).unwrap();
    let deck = collection.add_deck(deck_name, false).unwrap();
    let note_type = collection.add_note_type("Basic").unwrap();
    let note = collection
        .add_note(note_type, &["hola".to_string(), "hello".to_string()])
        .unwrap();
    for id in card_ids {
        let mut card = Card::new(CardId(*id), note, deck);
        card.card_type = CardType::Review;
        card.queue = CardQueue::Review;
        card.interval = 12;
        card.due = 20_000;
        card.reps = 4;
        collection.insert_card(&card).unwrap();
    }
    collection.close().unwrap();
    deck
}

fn write_package(
    path: &Path,
    collection: Option<(&str, &Path)>,
    media: &BTreeMap<String, String>,
) {
    let archive = PackageArchive::create(path).unwrap();
    if let Some((entry, source)) = collection {
        archive.add_file(entry, source).unwrap();
    }
    archive.write_media_map(media).unwrap();
}

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn queue_for(collection: &Path) -> CollectionTaskQueue {
    init_test_logging();
    CollectionTaskQueue::new(CollectionManager::for_path(collection)).unwrap()
}

async fn card_count(queue: &CollectionTaskQueue) -> u32 {
    queue
        .run(WithCollection::new(|collection| collection.card_count()))
        .await
        .unwrap()
}

#[tokio::test]
async fn exported_package_replaces_another_collection() {
    let source_dir = temp_dir("roundtrip-source");
    let source = source_dir.join("collection.deckhand2");
    seed_collection(&source, "Spanish", &[1, 2, 3]);
    let source_media = default_media_dir(&source);
    fs::create_dir_all(&source_media).unwrap();
    fs::write(source_media.join("gato.jpg"), b"jpeg bytes").unwrap();

    let package = source_dir.join("spanish.deckhandpkg");
    let source_queue = queue_for(&source);
    let report = source_queue
        .run(ExportPackage::whole_collection(package.clone()))
        .await
        .unwrap();
    assert_eq!(report.cards, 3);
    assert_eq!(report.media_files, 1);

    let archive = PackageArchive::open(&package).unwrap();
    let names = archive.entry_names().unwrap();
    assert!(names.contains(&COLLECTION_ENTRY.to_string()));
    assert!(names.contains(&MEDIA_MAP_ENTRY.to_string()));
    assert_eq!(
        archive.media_map().unwrap(),
        BTreeMap::from([("0".to_string(), "gato.jpg".to_string())])
    );

    let target_dir = temp_dir("roundtrip-target");
    let target = target_dir.join("collection.deckhand2");
    seed_collection(&target, "Other", &[99]);
    let target_queue = queue_for(&target);
    assert_eq!(target_queue.run(LoadDeckCounts).await.unwrap().len(), 2);

    let replaced = target_queue
        .run(ImportReplace {
            path: package.clone(),
        })
        .await
        .unwrap();
    assert_eq!(replaced.media_files, 1);

    assert_eq!(card_count(&target_queue).await, 3);
    let missing = target_queue
        .run(WithCollection::new(|collection| collection.card(CardId(99))))
        .await
        .unwrap_err();
    assert_eq!(missing.kind, CoreErrorKind::PreconditionFailure);
    assert_eq!(
        fs::read(default_media_dir(&target).join("gato.jpg")).unwrap(),
        b"jpeg bytes"
    );
}

#[tokio::test]
async fn deck_export_without_scheduling_keeps_only_that_deck() {
    let dir = temp_dir("deck-export");
    let path = dir.join("collection.deckhand2");
    let spanish = seed_collection(&path, "Spanish", &[1, 2]);
    {
        let mut collection = Collection::open(&path).unwrap();
        let note_type = collection.add_note_type("Cloze").unwrap();
        let note = collection
            .add_note(note_type, &["{{c1::uno}}".to_string()])
            .unwrap();
        collection.add_card(note, DeckId::DEFAULT).unwrap();
        collection.close().unwrap();
    }

    let queue = queue_for(&path);
    let package = dir.join("out").join("spanish-only.deckhandpkg");
    let report = queue
        .run(ExportPackage {
            path: package.clone(),
            deck: Some(spanish),
            include_scheduling: false,
            include_media: false,
        })
        .await
        .unwrap();
    assert_eq!(report.cards, 2);
    assert_eq!(report.media_files, 0);

    let extracted = dir.join("extracted.deckhand2");
    PackageArchive::open(&package)
        .unwrap()
        .extract_entry(COLLECTION_ENTRY, &extracted)
        .unwrap();
    let exported = Collection::open(&extracted).unwrap();
    let cards = exported.cards(&[CardId(1), CardId(2)]).unwrap();
    assert!(cards.iter().all(|card| card.queue == CardQueue::New));
    assert!(cards.iter().all(|card| card.reps == 0 && card.interval == 0));
    assert_eq!(exported.card_count().unwrap(), 2);
    assert_eq!(exported.note_type_usage().unwrap().len(), 1);

    assert_eq!(card_count(&queue).await, 3);

    let error = queue
        .run(ExportPackage {
            path: dir.join("nothing.deckhandpkg"),
            deck: Some(DeckId(4_242)),
            include_scheduling: true,
            include_media: true,
        })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::PreconditionFailure);
    assert!(!dir.join("nothing.deckhandpkg").exists());
}

#[test]
fn cancelled_export_keeps_the_existing_file() {
    let dir = temp_dir("export-cancel");
    let path = dir.join("collection.deckhand2");
    seed_collection(&path, "Spanish", &[1, 2]);
    let backup = dir.join("backup.deckhandpkg");
    fs::write(&backup, b"previous backup").unwrap();

    let mut manager = CollectionManager::for_path(path);
    manager.open_on_demand().unwrap();
    let token = TaskCancellationToken::new();
    token.cancel();
    let (context, _progress) = TaskContext::detached(TaskKind::ExportPackage, token);

    let error = ExportPackage::whole_collection(&backup)
        .run(&mut manager, &context)
        .unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(fs::read(&backup).unwrap(), b"previous backup");
    let leftovers: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(".export-"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");

    let (context, _progress) =
        TaskContext::detached(TaskKind::ExportPackage, TaskCancellationToken::new());
    let report = ExportPackage::whole_collection(&backup)
        .run(&mut manager, &context)
        .unwrap();
    assert_eq!(report.cards, 2);
    let archive = PackageArchive::open(&backup).unwrap();
    assert!(archive.entry_names().unwrap().contains(&COLLECTION_ENTRY.to_string()));
}

#[tokio::test]
async fn failures_before_replacement_leave_the_collection_untouched() {
    let dir = temp_dir("before-commit");
    let target = dir.join("collection.deckhand2");
    seed_collection(&target, "Spanish", &[1, 2, 3]);
    let original = fs::read(&target).unwrap();
    let queue = queue_for(&target);

    let no_collection = dir.join("empty.deckhandpkg");
    write_package(&no_collection, None, &BTreeMap::new());
    let error = queue
        .run(ImportReplace {
            path: no_collection,
        })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ExternalResource);
    assert!(!error.is_after_commit());
    assert_eq!(error.task, Some(TaskKind::ImportReplace));
    assert_eq!(error.resource.as_deref(), Some("empty.deckhandpkg"));
    assert_eq!(fs::read(&target).unwrap(), original);

    let garbage_source = dir.join("garbage.bin");
    fs::write(&garbage_source, vec![b'x'; 4096]).unwrap();
    let garbage = dir.join("garbage.deckhandpkg");
    write_package(
        &garbage,
        Some((COLLECTION_ENTRY, garbage_source.as_path())),
        &BTreeMap::new(),
    );
    let error = queue
        .run(ImportReplace { path: garbage })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ExternalResource);
    assert_eq!(error.resource.as_deref(), Some("garbage.deckhandpkg"));
    assert_eq!(fs::read(&target).unwrap(), original);

    let not_a_package = dir.join("notes.txt");
    fs::write(&not_a_package, b"plain text").unwrap();
    let error = queue
        .run(ImportReplace {
            path: not_a_package,
        })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ExternalResource);
    assert_eq!(fs::read(&target).unwrap(), original);

    assert_eq!(card_count(&queue).await, 3);
}

#[test]
fn failed_rename_keeps_the_collection_locked_until_a_replacement_succeeds() {
    let dir = temp_dir("rename-fails");
    let source = dir.join("source.deckhand2");
    seed_collection(&source, "Spanish", &[1, 2]);
    let package = dir.join("spanish.deckhandpkg");
    write_package(
        &package,
        Some((COLLECTION_ENTRY, source.as_path())),
        &BTreeMap::new(),
    );

    let target = dir.join("collection.deckhand2");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("occupied"), b"x").unwrap();
    let mut manager = CollectionManager::for_path(target.clone());
    let (context, _progress) =
        TaskContext::detached(TaskKind::ImportReplace, TaskCancellationToken::new());

    let error = ImportReplace {
        path: package.clone(),
    }
    .run(&mut manager, &context)
    .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ExternalResource);
    assert!(!error.is_after_commit());
    assert!(manager.is_locked());
    let unavailable = manager.open_on_demand().unwrap_err();
    assert_eq!(unavailable.kind, CoreErrorKind::StoreUnavailable);

    fs::remove_dir_all(&target).unwrap();
    ImportReplace { path: package }
        .run(&mut manager, &context)
        .unwrap();
    assert!(!manager.is_locked());
    assert_eq!(manager.open_on_demand().unwrap().card_count().unwrap(), 2);
}

#[tokio::test]
async fn media_failure_after_replacement_is_reported_as_after_commit() {
    let dir = temp_dir("after-commit");
    let source = dir.join("source.deckhand2");
    seed_collection(&source, "Spanish", &[1, 2, 3, 4]);
    let package = dir.join("missing-media.deckhandpkg");
    write_package(
        &package,
        Some((COLLECTION_ENTRY, source.as_path())),
        &BTreeMap::from([("0".to_string(), "gato.jpg".to_string())]),
    );

    let target = dir.join("collection.deckhand2");
    seed_collection(&target, "Other", &[99]);
    let queue = queue_for(&target);

    let error = queue
        .run(ImportReplace { path: package })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ExternalResourceAfterCommit);
    assert!(error.is_after_commit());
    assert_eq!(error.resource.as_deref(), Some("missing-media.deckhandpkg"));

    assert_eq!(card_count(&queue).await, 4);
}

#[tokio::test]
async fn legacy_collection_entry_is_imported() {
    let dir = temp_dir("legacy");
    let source = dir.join("source.deckhand2");
    seed_collection(&source, "Spanish", &[7, 8]);
    let package = dir.join("legacy.deckhandpkg");
    write_package(
        &package,
        Some((LEGACY_COLLECTION_ENTRY, source.as_path())),
        &BTreeMap::new(),
    );

    let target = dir.join("collection.deckhand2");
    let queue = queue_for(&target);
    let report = queue.run(ImportReplace { path: package }).await.unwrap();
    assert_eq!(report.media_files, 0);
    assert_eq!(card_count(&queue).await, 2);
}

#[tokio::test]
async fn import_add_merges_good_packages_and_reports_bad_ones() {
    let dir = temp_dir("import-add");
    let source = dir.join("source.deckhand2");
    seed_collection(&source, "Spanish", &[50, 51]);
    let good = dir.join("spanish.deckhandpkg");
    write_package(
        &good,
        Some((COLLECTION_ENTRY, source.as_path())),
        &BTreeMap::new(),
    );
    let bad = dir.join("notes.txt");
    fs::write(&bad, b"plain text").unwrap();

    let target = dir.join("collection.deckhand2");
    let queue = queue_for(&target);

    let report = queue
        .run(ImportAdd {
            paths: vec![bad.clone(), good.clone()],
        })
        .await
        .unwrap();
    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.imported[0].file, "spanish.deckhandpkg");
    assert_eq!(report.imported[0].cards_added, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].file, "notes.txt");
    assert_eq!(report.failed[0].error.kind, CoreErrorKind::ExternalResource);

    let decks = queue
        .run(WithCollection::new(|collection| collection.decks()))
        .await
        .unwrap();
    let spanish = decks.iter().find(|deck| deck.name == "Spanish").unwrap();
    let merged = queue
        .run(WithCollection::new(|collection| {
            collection.cards(&[CardId(50), CardId(51)])
        }))
        .await
        .unwrap();
    assert!(merged.iter().all(|card| card.deck_id == spanish.id));
    assert!(merged.iter().all(|card| card.interval == 12));

    let again = queue.run(ImportAdd { paths: vec![good] }).await.unwrap();
    assert_eq!(again.imported[0].cards_added, 0);
    assert_eq!(card_count(&queue).await, 2);
}

#[tokio::test]
async fn import_add_remaps_ids_taken_by_an_unrelated_collection() {
    let dir = temp_dir("import-add-remap");
    let target = dir.join("collection.deckhand2");
    let local_note = {
        let mut collection = Collection::open(&target).unwrap();
        let note_type = collection.add_note_type("Basic").unwrap();
        let note = collection
            .add_note(note_type, &["local".to_string(), "note".to_string()])
            .unwrap();
        collection
            .insert_card(&Card::new(CardId(1), note, DeckId::DEFAULT))
            .unwrap();
        collection.close().unwrap();
        note
    };

    let source = dir.join("source.deckhand2");
    seed_collection(&source, "Spanish", &[1, 2]);
    let package = dir.join("spanish.deckhandpkg");
    write_package(
        &package,
        Some((COLLECTION_ENTRY, source.as_path())),
        &BTreeMap::new(),
    );

    let queue = queue_for(&target);
    let report = queue
        .run(ImportAdd {
            paths: vec![package.clone()],
        })
        .await
        .unwrap();
    assert!(report.failed.is_empty());
    assert_eq!(report.imported[0].notes_added, 1);
    assert_eq!(report.imported[0].cards_added, 2);

    let (notes, local_cards, total) = queue
        .run(WithCollection::new(move |collection| {
            Ok((
                collection.notes()?,
                collection.card_ids_for_note(local_note)?,
                collection.card_count()?,
            ))
        }))
        .await
        .unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].id, local_note);
    assert_eq!(notes[0].fields, vec!["local", "note"]);
    assert_eq!(local_cards, vec![CardId(1)]);
    assert_eq!(total, 3);

    let imported = notes
        .iter()
        .find(|note| note.fields == vec!["hola", "hello"])
        .unwrap()
        .id;
    assert_ne!(imported, local_note);
    let (imported_cards, spanish) = queue
        .run(WithCollection::new(move |collection| {
            let ids = collection.card_ids_for_note(imported)?;
            let decks = collection.decks()?;
            Ok((collection.cards(&ids)?, decks))
        }))
        .await
        .unwrap();
    let spanish = spanish.iter().find(|deck| deck.name == "Spanish").unwrap();
    assert_eq!(imported_cards.len(), 2);
    assert!(imported_cards.iter().all(|card| card.id != CardId(1)));
    assert!(imported_cards.iter().all(|card| card.deck_id == spanish.id));
    assert!(imported_cards.iter().all(|card| card.interval == 12 && card.reps == 4));

    let again = queue
        .run(ImportAdd {
            paths: vec![package],
        })
        .await
        .unwrap();
    assert_eq!(again.imported[0].notes_added, 0);
    assert_eq!(again.imported[0].cards_added, 0);
    assert_eq!(card_count(&queue).await, 3);
}
