use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use deckhand_core::collection::{
    Collection, CollectionManager, current_schema_version, migration, migrations, today,
};
use deckhand_core::models::{Card, CardId, CardQueue, CardType, CoreErrorKind, DeckId, NoteId};
use deckhand_core::orchestration::{CollectionTaskQueue, ListenerEvent, listener_channel};
use deckhand_core::tasks::maintenance::LAST_CHECK_KEY;
use deckhand_core::tasks::{
    CheckDatabase, DeleteNoteType, DismissCards, FindEmptyCards, LoadDeckCounts, LoadNoteTypes,
    ResetScheduler, WithCollection,
};

fn temp_collection(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("deckhand-store-{test_name}-{nanos}"))
        .join("collection.deckhand2")
}

fn fields(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn migration_versions_are_strictly_increasing() {
    let entries = migrations();
    assert!(!entries.is_empty());

    let mut previous = 0;
    for entry in entries {
        assert!(entry.version > previous);
        previous = entry.version;
    }
}

#[test]
fn migration_lookup_and_schema_version_are_consistent() {
    let latest = current_schema_version();
    let latest_entry = migration(latest).expect("latest migration must exist");
    assert_eq!(latest_entry.version, latest);
}

#[test]
fn migration_sql_is_defined_for_up_and_down_paths() {
    for entry in migrations() {
        assert!(!entry.up_sql.trim().is_empty(), "up sql must not be empty");
        assert!(
            !entry.down_sql.trim().is_empty(),
            "down sql must not be empty"
        );
    }
}

#[test]
fn collection_migrates_down_and_back_up() {
    let path = temp_collection("migrate");
    let mut collection = Collection::open(&path).unwrap();
    assert_eq!(collection.schema_version().unwrap(), current_schema_version());
    assert!(collection.config_value("created_at_unix").unwrap().is_some());

    collection.apply_migration(1).unwrap();
    assert_eq!(collection.schema_version().unwrap(), 1);
    let error = collection.config_value("created_at_unix").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);

    collection.apply_migration(current_schema_version()).unwrap();
    assert!(collection.config_value("created_at_unix").unwrap().is_some());

    let error = collection
        .apply_migration(current_schema_version() + 1)
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
}

#[test]
fn validate_file_accepts_only_collections() {
    let path = temp_collection("validate");
    let missing = Collection::validate_file(&path).unwrap_err();
    assert_eq!(missing.kind, CoreErrorKind::InvalidInput);

    Collection::open(&path).unwrap().close().unwrap();
    assert_eq!(
        Collection::validate_file(&path).unwrap(),
        current_schema_version()
    );

    let garbage = path.with_file_name("garbage.deckhand2");
    fs::write(&garbage, vec![b'x'; 4096]).unwrap();
    assert!(Collection::validate_file(&garbage).is_err());

    let foreign = path.with_file_name("foreign.sqlite");
    rusqlite::Connection::open(&foreign)
        .unwrap()
        .execute_batch("CREATE TABLE unrelated (id INTEGER PRIMARY KEY);")
        .unwrap();
    let error = Collection::validate_file(&foreign).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}

#[tokio::test]
async fn deck_counts_split_queues_and_only_count_due_reviews() {
    let path = temp_collection("deck-counts");
    {
        let mut collection = Collection::open(&path).unwrap();
        let note_type = collection.add_note_type("Basic").unwrap();
        let note = collection.add_note(note_type, &fields(&["a", "b"])).unwrap();
        let day = today();

        let shapes = [
            (1, CardType::New, CardQueue::New, 0),
            (2, CardType::Learning, CardQueue::Learning, day),
            (3, CardType::Review, CardQueue::Review, day - 1),
            (4, CardType::Review, CardQueue::Review, day + 30),
            (5, CardType::Review, CardQueue::Suspended, day - 1),
        ];
        for (id, card_type, queue, due) in shapes {
            let mut card = Card::new(CardId(id), note, DeckId::DEFAULT);
            card.card_type = card_type;
            card.queue = queue;
            card.due = due;
            collection.insert_card(&card).unwrap();
        }
        collection.close().unwrap();
    }

    let queue = CollectionTaskQueue::new(CollectionManager::for_path(path)).unwrap();
    let (listener, mut events) = listener_channel();
    let handle = queue.submit(LoadDeckCounts, listener).unwrap();
    handle.wait_for_terminal(None).await.unwrap();

    let mut counts = None;
    while let Some(event) = events.recv().await {
        if let ListenerEvent::Completed(result) = event {
            counts = Some(result.unwrap());
        }
    }
    let counts = counts.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].deck_id, DeckId::DEFAULT);
    assert_eq!((counts[0].new, counts[0].learning, counts[0].review), (1, 1, 1));
}

#[tokio::test]
async fn check_database_repairs_and_closes_the_collection() {
    let path = temp_collection("check");
    {
        let mut collection = Collection::open(&path).unwrap();
        let note_type = collection.add_note_type("Basic").unwrap();
        let kept = collection.add_note(note_type, &fields(&["a", "b"])).unwrap();
        collection.add_note(note_type, &fields(&["no", "cards"])).unwrap();
        collection.add_card(kept, DeckId::DEFAULT).unwrap();
        collection
            .insert_card(&Card::new(CardId(500), kept, DeckId(77)))
            .unwrap();
        collection
            .insert_card(&Card::new(CardId(501), NoteId(999), DeckId::DEFAULT))
            .unwrap();
        collection.close().unwrap();
    }

    let queue = CollectionTaskQueue::new(CollectionManager::for_path(path)).unwrap();
    queue
        .run(DismissCards::suspend(vec![CardId(500)]))
        .await
        .unwrap();

    let (listener, mut events) = listener_channel();
    let handle = queue.submit(CheckDatabase, listener).unwrap();
    handle.wait_for_terminal(None).await.unwrap();

    let mut progress = Vec::new();
    let mut report = None;
    while let Some(event) = events.recv().await {
        match event {
            ListenerEvent::Progress(step) => progress.push(step),
            ListenerEvent::Completed(result) => report = Some(result.unwrap()),
            _ => {}
        }
    }
    assert_eq!(progress, vec!["checking integrity", "repairing", "done"]);

    let report = report.unwrap();
    assert!(report.ok);
    assert!(report.problems.is_empty());
    assert_eq!(report.repairs.orphan_cards_removed, 1);
    assert_eq!(report.repairs.cards_moved_to_default, 1);
    assert_eq!(report.repairs.empty_notes_removed, 1);

    let (undo_len, card, checked) = queue
        .run(WithCollection::new(|collection| {
            Ok((
                collection.undo_len(),
                collection.card(CardId(500))?,
                collection.config_value(LAST_CHECK_KEY)?,
            ))
        }))
        .await
        .unwrap();
    assert_eq!(undo_len, 0);
    assert_eq!(card.deck_id, DeckId::DEFAULT);
    assert!(checked.is_some());
}

#[tokio::test]
async fn empty_cards_are_those_of_blank_notes() {
    let path = temp_collection("empty-cards");
    let blank_cards = {
        let mut collection = Collection::open(&path).unwrap();
        let note_type = collection.add_note_type("Basic").unwrap();
        let filled = collection.add_note(note_type, &fields(&["a", ""])).unwrap();
        let blank = collection.add_note(note_type, &fields(&["", "  "])).unwrap();
        collection.add_card(filled, DeckId::DEFAULT).unwrap();
        let blank_cards = vec![
            collection.add_card(blank, DeckId::DEFAULT).unwrap(),
            collection.add_card(blank, DeckId::DEFAULT).unwrap(),
        ];
        collection.close().unwrap();
        blank_cards
    };

    let queue = CollectionTaskQueue::new(CollectionManager::for_path(path)).unwrap();
    assert_eq!(queue.run(FindEmptyCards).await.unwrap(), blank_cards);
}

#[tokio::test]
async fn deleting_a_note_type_removes_its_cards_and_undo_history() {
    let path = temp_collection("note-types");
    let (basic, cloze) = {
        let mut collection = Collection::open(&path).unwrap();
        let basic = collection.add_note_type("Basic").unwrap();
        let cloze = collection.add_note_type("Cloze").unwrap();
        for _ in 0..2 {
            let note = collection.add_note(cloze, &fields(&["{{c1::x}}"])).unwrap();
            collection.add_card(note, DeckId::DEFAULT).unwrap();
        }
        let note = collection.add_note(basic, &fields(&["a", "b"])).unwrap();
        collection.add_card(note, DeckId::DEFAULT).unwrap();
        collection.close().unwrap();
        (basic, cloze)
    };

    let queue = CollectionTaskQueue::new(CollectionManager::for_path(path)).unwrap();
    let usage = queue.run(LoadNoteTypes).await.unwrap();
    let counts: Vec<(String, u32)> = usage
        .iter()
        .map(|entry| (entry.note_type.name.clone(), entry.note_count))
        .collect();
    assert_eq!(
        counts,
        vec![("Basic".to_string(), 1), ("Cloze".to_string(), 2)]
    );

    queue
        .run(DismissCards::suspend(vec![CardId(1)]))
        .await
        .unwrap();
    assert_eq!(queue.run(DeleteNoteType { id: cloze }).await.unwrap(), 2);

    let (remaining, undo_len) = queue
        .run(WithCollection::new(|collection| {
            Ok((collection.card_count()?, collection.undo_len()))
        }))
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert_eq!(undo_len, 0);

    let usage = queue.run(LoadNoteTypes).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].note_type.id, basic);

    let error = queue
        .run(DeleteNoteType { id: cloze })
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::PreconditionFailure);
}

#[tokio::test]
async fn scheduler_reset_bumps_the_generation() {
    let queue =
        CollectionTaskQueue::new(CollectionManager::for_path(temp_collection("reset"))).unwrap();

    assert_eq!(queue.run(ResetScheduler).await.unwrap(), 1);
    assert_eq!(queue.run(ResetScheduler).await.unwrap(), 2);
}
