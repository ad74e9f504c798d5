use futures::StreamExt;
use librarian_archive::exts::TaskQueue;
use librarian_archive::{
    AUTO_LANGUAGE, Archive, ContentType, ContentTypes, Database, EntryType, GetOptions, Metadata, Processors, Record,
    ScanOptions, callback,
};
use librarian_config::Config;
use librarian_extract::CannedProber;
use librarian_fsal::MockFsal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const IMAGE_JSON: &str = r#"{"frames": [{"width": 640, "height": 480, "tags": {"ImageDescription": "Fluffy"}}]}"#;
const AUDIO_JSON: &str = r#"{
    "streams": [{"codec_type": "audio", "duration": "181.5"}],
    "format": {"duration": "182.04", "tags": {"artist": "The Cats", "title": "Meow"}}
}"#;
const PAGE: &str = "<html><head><title>Site</title></head><body></body></html>";

struct Harness {
    db: Database,
    archive: Archive,
    queue: TaskQueue,
    fsal: Arc<MockFsal>,
}

async fn harness(fsal: MockFsal) -> Harness {
    let fsal = Arc::new(fsal);
    let db = Database::connect_in_memory().await.unwrap();
    let queue = TaskQueue::new();
    let prober = CannedProber::json("{}").with(".jpg", IMAGE_JSON).with(".mp3", AUDIO_JSON);
    let archive = Archive::builder(&db, &Config::default())
        .fsal(fsal.clone())
        .tasks(Arc::new(queue.clone()))
        .processors(Processors::with_prober(Arc::new(prober)))
        .build()
        .unwrap();
    Harness { db, archive, queue, fsal }
}

/// `(path, type, content_types)` for every stored entry.
async fn fs_rows(db: &Database) -> Vec<(String, i64, i64)> {
    sqlx::query_as("SELECT path, type, content_types FROM fs ORDER BY path").fetch_all(db.pool()).await.unwrap()
}

/// `(language, key, value)` stored for `path`.
async fn meta_rows(db: &Database, path: &str) -> Vec<(String, String, String)> {
    sqlx::query_as(
        "SELECT meta.language, meta.key, meta.value FROM meta JOIN fs ON fs.id = meta.fs_id
         WHERE fs.path = ? ORDER BY meta.language, meta.key",
    )
    .bind(path)
    .fetch_all(db.pool())
    .await
    .unwrap()
}

fn row(path: &str, entry_type: i64, types: ContentTypes) -> (String, i64, i64) {
    (path.to_string(), entry_type, i64::from(types.bits()))
}

async fn main_of(archive: &Archive, directory: &str) -> Option<String> {
    let found = archive.get(directory, GetOptions::default().ignore_missing(true)).await.unwrap();
    found.get(directory)?.metadata().get(AUTO_LANGUAGE)?.get("main").cloned()
}

#[tokio::test]
async fn test_cold_ingest_of_single_image() {
    let h = harness(MockFsal::with_files([("/media/cats/fluffy.jpg", "jpg")])).await;
    let analysis = h.archive.analyze("/media/cats/fluffy.jpg", false).await.unwrap();
    h.archive.save(analysis["/media/cats/fluffy.jpg"].clone()).await.unwrap();

    let image = ContentTypes::GENERIC | ContentTypes::IMAGE;
    assert_eq!(
        fs_rows(&h.db).await,
        vec![
            row("", 1, ContentTypes::GENERIC),
            row("/media", 1, ContentTypes::GENERIC),
            row("/media/cats", 1, image),
            row("/media/cats/fluffy.jpg", 0, image),
        ]
    );
    let meta = meta_rows(&h.db, "/media/cats/fluffy.jpg").await;
    let expected = [("height", "480"), ("title", "Fluffy"), ("width", "640")];
    assert_eq!(
        meta,
        expected.iter().map(|(k, v)| (String::new(), k.to_string(), v.to_string())).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_entry_point_election_prefers_better_rank() {
    let h = harness(MockFsal::with_files([("/site/main.html", PAGE), ("/site/index.html", PAGE)])).await;
    h.archive.analyze("/site/main.html", false).await.unwrap();
    assert_eq!(main_of(&h.archive, "/site").await.as_deref(), Some("main.html"));
    h.archive.analyze("/site/index.html", false).await.unwrap();
    assert_eq!(main_of(&h.archive, "/site").await.as_deref(), Some("index.html"));
}

#[tokio::test]
async fn test_entry_point_election_during_full_scan() {
    let h = harness(MockFsal::with_files([("/site/main.html", PAGE), ("/site/index.html", PAGE)])).await;
    let mut levels = h.archive.scan(ScanOptions::new("/site"));
    while let Some(analysis) = levels.next().await {
        h.archive.save_many(analysis).await.unwrap();
    }
    assert_eq!(main_of(&h.archive, "/site").await.as_deref(), Some("index.html"));
    let site = h.archive.get("/site", GetOptions::default()).await.unwrap();
    assert_eq!(site["/site"].entry_type(), EntryType::Directory);
    assert!(site["/site"].content_types().contains(ContentTypes::HTML));
}

#[tokio::test]
async fn test_partial_get_schedules_fill() {
    let h = harness(MockFsal::with_files([("/u/new.mp3", "mp3")])).await;
    let found = h.archive.get("/u/new.mp3", GetOptions::default()).await.unwrap();
    let song = &found["/u/new.mp3"];
    assert!(song.content_types().contains(ContentTypes::AUDIO));
    assert_eq!(song.entry_type(), EntryType::File);
    assert!(song.metadata().is_empty());
    assert_eq!(h.queue.len(), 1);
    assert!(fs_rows(&h.db).await.is_empty());

    assert_eq!(h.queue.run_pending().await, 1);
    let found = h.archive.get("/u/new.mp3", GetOptions::default()).await.unwrap();
    let section = &found["/u/new.mp3"].metadata()[""];
    assert_eq!(section["duration"], "182.04");
    assert_eq!(section["title"], "Meow");
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn test_remove_refreshes_parent() {
    let h = harness(MockFsal::with_files([("/a/b/c.mp3", "mp3"), ("/a/b/d.jpg", "jpg")])).await;
    let analysis = h.archive.analyze(["/a/b/c.mp3", "/a/b/d.jpg"], false).await.unwrap();
    h.archive.save_many(analysis).await.unwrap();
    let before = fs_rows(&h.db).await;
    assert!(before.contains(&row("/a/b", 1, ContentTypes::GENERIC | ContentTypes::AUDIO | ContentTypes::IMAGE)));

    h.fsal.remove("/a/b/c.mp3").await;
    h.archive.remove(["/a/b/c.mp3"]).await.unwrap();

    let after = fs_rows(&h.db).await;
    assert!(!after.iter().any(|(path, ..)| path == "/a/b/c.mp3"));
    assert!(meta_rows(&h.db, "/a/b/c.mp3").await.is_empty());
    assert!(after.contains(&row("/a/b", 1, ContentTypes::GENERIC | ContentTypes::IMAGE)));
    for untouched in ["", "/a"] {
        let pick = |rows: &[(String, i64, i64)]| rows.iter().find(|(path, ..)| path == untouched).cloned();
        assert_eq!(pick(&before), pick(&after));
    }
}

#[tokio::test]
async fn test_search_with_language_filter() {
    let h = harness(MockFsal::default()).await;
    let page = |path: &str, language: &str, title: &str| {
        let mut record = Record::new(path);
        record.content_types |= ContentTypes::HTML;
        record.metadata = Metadata::from([(
            language.to_string(),
            BTreeMap::from([("title".to_string(), title.to_string()), ("author".to_string(), "Nobody".to_string())]),
        )]);
        record
    };
    h.archive.save(page("/x", "en", "Hello World")).await.unwrap();
    h.archive.save(page("/y", "fr", "Bonjour le monde")).await.unwrap();

    let found = h.archive.search("world", Some(ContentType::Html), Some("en")).await.unwrap();
    assert_eq!(found.keys().collect::<Vec<_>>(), vec!["/x"]);
    let expected = Metadata::from([(
        "en".to_string(),
        BTreeMap::from([("title".to_string(), "Hello World".to_string())]),
    )]);
    assert_eq!(found["/x"].metadata(), &expected);

    let anywhere = h.archive.search("WORLD", Some(ContentType::Html), None).await.unwrap();
    assert_eq!(anywhere.keys().collect::<Vec<_>>(), vec!["/x"]);
    assert!(h.archive.search("world", Some(ContentType::Html), Some("fr")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_and_reload() {
    let fsal = MockFsal::with_files([("lib/a.jpg", "jpg"), ("lib/sub/b.mp3", "mp3"), ("top.txt", "text")]);
    let h = harness(fsal).await;
    let mut stale = Record::new("gone/old.mp3");
    stale.content_types |= ContentTypes::AUDIO;
    h.archive.save(stale).await.unwrap();

    h.archive.clear_and_reload().await.unwrap();

    let image = ContentTypes::GENERIC | ContentTypes::IMAGE;
    let audio = ContentTypes::GENERIC | ContentTypes::AUDIO;
    assert_eq!(
        fs_rows(&h.db).await,
        vec![
            row("", 1, ContentTypes::GENERIC),
            row("/lib", 1, image),
            row("/lib/a.jpg", 0, image),
            row("/lib/sub", 1, audio),
            row("/lib/sub/b.mp3", 0, audio),
            row("/top.txt", 0, ContentTypes::GENERIC),
        ]
    );
    assert!(meta_rows(&h.db, "/gone/old.mp3").await.is_empty());
    assert_eq!(meta_rows(&h.db, "/lib/sub/b.mp3").await.len(), 3);
}

#[tokio::test]
async fn test_reload_then_get_reuses_rows() {
    let h = harness(MockFsal::with_files([("media/cats/fluffy.jpg", "jpg")])).await;
    h.archive.clear_and_reload().await.unwrap();
    let reloaded = fs_rows(&h.db).await;

    for spelling in ["/media/cats/fluffy.jpg", "media/cats/fluffy.jpg", "media//cats/./fluffy.jpg"] {
        let found = h.archive.get(spelling, GetOptions::default()).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["/media/cats/fluffy.jpg"]);
    }
    assert_eq!(fs_rows(&h.db).await, reloaded);
    let image = ContentTypes::GENERIC | ContentTypes::IMAGE;
    assert_eq!(
        reloaded,
        vec![
            row("", 1, ContentTypes::GENERIC),
            row("/media", 1, ContentTypes::GENERIC),
            row("/media/cats", 1, image),
            row("/media/cats/fluffy.jpg", 0, image),
        ]
    );
}

#[tokio::test]
async fn test_for_parent_lists_children() {
    let fsal = MockFsal::with_files([("/m/a.jpg", "jpg"), ("/m/b.mp3", "mp3"), ("/m/sub/c.txt", "text")]);
    let h = harness(fsal).await;
    let analysis = h.archive.analyze(["/m/a.jpg", "/m/b.mp3", "/m/sub/c.txt"], false).await.unwrap();
    h.archive.save_many(analysis).await.unwrap();

    let children = h.archive.for_parent("/m", None).await.unwrap();
    assert_eq!(children.keys().collect::<Vec<_>>(), vec!["/m/a.jpg", "/m/b.mp3", "/m/sub"]);
    let audio = h.archive.for_parent("/m", Some(ContentType::Audio)).await.unwrap();
    assert_eq!(audio.keys().collect::<Vec<_>>(), vec!["/m/b.mp3"]);
}

#[tokio::test]
async fn test_refresh_changes_follows_the_library() {
    let h = harness(MockFsal::with_files([("/m/a.jpg", "jpg")])).await;
    let analysis = h.archive.analyze("/m/a.jpg", false).await.unwrap();
    h.archive.save_many(analysis).await.unwrap();

    h.fsal.write("/m/b.mp3", "mp3").await;
    h.fsal.remove("/m/a.jpg").await;
    assert!(h.archive.refresh_changes().await.unwrap());
    assert!(!h.archive.refresh_changes().await.unwrap());

    let paths: Vec<String> = fs_rows(&h.db).await.into_iter().map(|(path, ..)| path).collect();
    assert_eq!(paths, vec!["", "/m", "/m/b.mp3"]);
    assert!(fs_rows(&h.db).await.contains(&row("/m", 1, ContentTypes::GENERIC | ContentTypes::AUDIO)));
}

#[tokio::test]
async fn test_callback_scan_stops_quietly_when_analysis_fails() {
    let h = harness(MockFsal::with_files([("/site/index.html", PAGE), ("/site/sub/page.html", PAGE)])).await;
    // Storing the page's links needs the database.
    h.db.close().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let count = callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async {}
    });
    h.archive.scan_with_callback(ScanOptions::new("/site"), count).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(h.queue.is_empty());
}
