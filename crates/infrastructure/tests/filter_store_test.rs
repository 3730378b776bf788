//! Filter store lifecycle against local list sources: refresh eligibility,
//! idempotence, persistence, and matcher recompilation on change.

use aegis_dns_domain::config::FilterListSpec;
use aegis_dns_infrastructure::filterstore::FilterStore;
use std::path::PathBuf;

fn spec(id: i64, source: &PathBuf) -> FilterListSpec {
    FilterListSpec {
        id,
        source: source.display().to_string(),
        enabled: true,
        name: format!("list-{id}"),
    }
}

async fn open_store(
    data_dir: &std::path::Path,
    specs: &[FilterListSpec],
) -> FilterStore {
    FilterStore::open(
        data_dir,
        specs,
        vec![],
        30,
        reqwest::Client::new(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn refresh_pulls_local_list_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("source.txt");
    std::fs::write(&list_path, "! Title: Local Rules\n||ads.example.com^\n").unwrap();

    let store = open_store(dir.path(), &[spec(1, &list_path)]).await;
    let outcome = store.refresh(false).await;
    assert_eq!(outcome.attempted, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.failed, 0);

    // Raw bytes persisted under filters/<id>.txt.
    let persisted = dir.path().join("filters").join("1.txt");
    assert!(persisted.exists());

    let summaries = store.summaries().await;
    assert_eq!(summaries[0].name, "Local Rules");
    assert_eq!(summaries[0].rule_count, 1);

    let matcher = store.compile().await;
    assert_eq!(matcher.rule_count(), 1);
}

#[tokio::test]
async fn unchanged_content_refreshes_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("source.txt");
    std::fs::write(&list_path, "||ads.example.com^\n").unwrap();

    let store = open_store(dir.path(), &[spec(1, &list_path)]).await;
    assert_eq!(store.refresh(false).await.updated, 1);

    // Freshly updated: the periodic pass has nothing to do.
    let second = store.refresh(false).await;
    assert_eq!(second.attempted, 0);

    // Forced: one re-read, zero content changes, zero recompiles.
    let forced = store.refresh(true).await;
    assert_eq!(forced.attempted, 1);
    assert_eq!(forced.updated, 0);
}

#[tokio::test]
async fn failed_source_keeps_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("source.txt");
    std::fs::write(&list_path, "||ads.example.com^\n").unwrap();

    let store = open_store(dir.path(), &[spec(1, &list_path)]).await;
    store.refresh(false).await;

    std::fs::remove_file(&list_path).unwrap();
    let outcome = store.refresh(true).await;
    assert_eq!(outcome.failed, 1);

    // Previous rules still serve.
    assert_eq!(store.compile().await.rule_count(), 1);
    assert_eq!(store.summaries().await[0].failures, 1);
}

#[tokio::test]
async fn disabled_lists_leave_the_matcher() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("source.txt");
    std::fs::write(&list_path, "||ads.example.com^\n").unwrap();

    let store = open_store(dir.path(), &[spec(1, &list_path)]).await;
    store.refresh(false).await;
    assert_eq!(store.compile().await.rule_count(), 1);

    store.set_enabled(1, false).await.unwrap();
    assert_eq!(store.compile().await.rule_count(), 0);

    store.set_enabled(1, true).await.unwrap();
    assert_eq!(store.compile().await.rule_count(), 1);
}

#[tokio::test]
async fn added_lists_get_monotonic_ids() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    std::fs::write(&a, "||one.example^\n").unwrap();
    std::fs::write(&b, "||two.example^\n").unwrap();

    let store = open_store(dir.path(), &[spec(3, &a)]).await;
    let id = store.add(b.display().to_string(), "second".into()).await.unwrap();
    assert_eq!(id, 4);

    store.remove(id).await.unwrap();
    // Removed ids are never reused.
    let again = store
        .add(b.display().to_string(), "third".into())
        .await
        .unwrap();
    assert_eq!(again, 5);
}
