//! Snapshot consistency: `apply` builds the new core fully before the swap,
//! and cores already handed out keep serving their own snapshot.

use aegis_dns_domain::CoreConfig;
use aegis_dns_infrastructure::{Core, CoreHandle};

fn base_config(dir: &std::path::Path) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.server.data_dir = dir.display().to_string();
    config
}

#[tokio::test]
async fn apply_swaps_to_a_fully_built_core() {
    let dir = tempfile::tempdir().unwrap();

    let mut initial = base_config(dir.path());
    initial.filtering.user_rules = vec!["||ads.example.com^".to_string()];
    let core = Core::bootstrap(initial).await.unwrap();
    let handle = CoreHandle::new(core);

    let before = handle.current();
    assert_eq!(before.engine.rule_count(), 1);

    let mut next = base_config(dir.path());
    next.filtering.user_rules = vec![
        "||ads.example.com^".to_string(),
        "||tracker.example.net^".to_string(),
        "@@||cdn.example.com^".to_string(),
    ];
    handle.apply(next).await.unwrap();

    // The pre-swap core still sees its own matcher; new requests see three
    // rules.
    assert_eq!(before.engine.rule_count(), 1);
    assert_eq!(handle.current().engine.rule_count(), 3);
}

#[tokio::test]
async fn apply_rejects_invalid_snapshot_and_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let core = Core::bootstrap(base_config(dir.path())).await.unwrap();
    let handle = CoreHandle::new(core);

    let mut broken = base_config(dir.path());
    broken.upstream.upstreams.clear();
    assert!(handle.apply(broken).await.is_err());

    // The old core is untouched.
    assert!(handle.current().config.upstream.upstreams.len() >= 2);
}
