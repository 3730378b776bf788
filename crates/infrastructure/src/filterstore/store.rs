use super::download::{fetch_list, is_url, read_local};
use crate::filter::{parser, RuleMatcher};
use aegis_dns_domain::{config::FilterListSpec, CoreError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Callback invoked with every freshly compiled matcher.
pub type UpdateCallback = Box<dyn Fn(RuleMatcher) + Send + Sync>;

/// In-memory state of one rule list.
struct StoredList {
    id: i64,
    source: String,
    enabled: bool,
    /// Configured name, replaced by a `! Title:` header when one arrives.
    name: String,
    content: Arc<str>,
    last_updated: Option<DateTime<Utc>>,
    rule_count: usize,
    /// Consecutive refresh failures since the last success.
    failures: u32,
}

/// Public summary for the admin surface.
#[derive(Debug, Clone)]
pub struct ListSummary {
    pub id: i64,
    pub source: String,
    pub enabled: bool,
    pub name: String,
    pub rule_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub failures: u32,
}

/// Outcome of one refresh pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub attempted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Manages the set of rule lists: persistence under `filters/<id>.txt`,
/// refresh, and matcher recompilation.
///
/// Failures never replace good content: a list keeps serving its previous
/// rules until a download both succeeds and differs.
pub struct FilterStore {
    dir: PathBuf,
    update_interval: chrono::Duration,
    lists: Mutex<Vec<StoredList>>,
    user_rules: Mutex<Vec<String>>,
    next_id: AtomicI64,
    http: reqwest::Client,
    on_update: Mutex<Vec<UpdateCallback>>,
}

impl FilterStore {
    /// Load the store from config and the on-disk `filters/` directory.
    /// Missing files start empty and fill in on the first refresh.
    pub async fn open(
        data_dir: &Path,
        specs: &[FilterListSpec],
        user_rules: Vec<String>,
        update_interval_mins: u64,
        http: reqwest::Client,
    ) -> Result<Self, CoreError> {
        let dir = data_dir.join("filters");
        tokio::fs::create_dir_all(&dir).await?;

        let mut lists = Vec::with_capacity(specs.len());
        let mut max_id = 0i64;

        for spec in specs {
            max_id = max_id.max(spec.id);
            let path = dir.join(format!("{}.txt", spec.id));
            let (content, last_updated) = match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let mtime = tokio::fs::metadata(&path)
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from);
                    (text, mtime)
                }
                Err(_) => (String::new(), None),
            };

            let parsed = parser::parse_list(spec.id, &content);
            lists.push(StoredList {
                id: spec.id,
                source: spec.source.clone(),
                enabled: spec.enabled,
                name: parsed.title.unwrap_or_else(|| spec.name.clone()),
                rule_count: parsed.rules.len(),
                content: Arc::from(content),
                last_updated,
                failures: 0,
            });
        }

        info!(lists = lists.len(), "Filter store opened");

        Ok(Self {
            dir,
            update_interval: chrono::Duration::minutes(update_interval_mins.max(1) as i64),
            lists: Mutex::new(lists),
            user_rules: Mutex::new(user_rules),
            next_id: AtomicI64::new(max_id + 1),
            http,
            on_update: Mutex::new(Vec::new()),
        })
    }

    pub async fn on_update(&self, callback: UpdateCallback) {
        self.on_update.lock().await.push(callback);
    }

    /// Add a new list. IDs are monotonic and never reused.
    pub async fn add(&self, source: String, name: String) -> Result<i64, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut lists = self.lists.lock().await;
            lists.push(StoredList {
                id,
                source,
                enabled: true,
                name,
                content: Arc::from(""),
                last_updated: None,
                rule_count: 0,
                failures: 0,
            });
        }
        // Pull content immediately; failure leaves an empty list behind.
        let _ = self.refresh(true).await;
        Ok(id)
    }

    pub async fn remove(&self, id: i64) -> Result<(), CoreError> {
        {
            let mut lists = self.lists.lock().await;
            let before = lists.len();
            lists.retain(|l| l.id != id);
            if lists.len() == before {
                return Err(CoreError::FilterList(format!("no such list: {id}")));
            }
        }
        let _ = tokio::fs::remove_file(self.dir.join(format!("{id}.txt"))).await;
        self.recompile_and_publish().await;
        Ok(())
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), CoreError> {
        {
            let mut lists = self.lists.lock().await;
            let list = lists
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| CoreError::FilterList(format!("no such list: {id}")))?;
            if list.enabled == enabled {
                return Ok(());
            }
            list.enabled = enabled;
        }
        self.recompile_and_publish().await;
        Ok(())
    }

    pub async fn set_user_rules(&self, rules: Vec<String>) {
        *self.user_rules.lock().await = rules;
        self.recompile_and_publish().await;
    }

    pub async fn summaries(&self) -> Vec<ListSummary> {
        self.lists
            .lock()
            .await
            .iter()
            .map(|l| ListSummary {
                id: l.id,
                source: l.source.clone(),
                enabled: l.enabled,
                name: l.name.clone(),
                rule_count: l.rule_count,
                last_updated: l.last_updated,
                failures: l.failures,
            })
            .collect()
    }

    /// Walk enabled lists and re-download the ones whose content is older
    /// than the update period (`force` skips the freshness check). Only a
    /// changed download persists and triggers one recompilation.
    pub async fn refresh(&self, force: bool) -> RefreshOutcome {
        let now = Utc::now();
        let candidates: Vec<(i64, String)> = {
            let lists = self.lists.lock().await;
            lists
                .iter()
                .filter(|l| l.enabled)
                .filter(|l| {
                    force
                        || l.last_updated
                            .map(|t| now - t >= self.update_interval)
                            .unwrap_or(true)
                })
                .map(|l| (l.id, l.source.clone()))
                .collect()
        };

        let mut outcome = RefreshOutcome {
            attempted: candidates.len(),
            ..Default::default()
        };

        for (id, source) in candidates {
            let fetched = if is_url(&source) {
                fetch_list(&self.http, &source).await
            } else {
                read_local(Path::new(&source)).await
            };

            match fetched {
                Ok(text) => {
                    let changed = self.apply_content(id, text).await;
                    if changed {
                        outcome.updated += 1;
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    let mut lists = self.lists.lock().await;
                    if let Some(list) = lists.iter_mut().find(|l| l.id == id) {
                        list.failures += 1;
                        warn!(
                            list = id,
                            source = %list.source,
                            failures = list.failures,
                            error = %e,
                            "List refresh failed; keeping previous content"
                        );
                    }
                }
            }
        }

        if outcome.updated > 0 {
            self.recompile_and_publish().await;
        }
        outcome
    }

    /// Store newly fetched content for a list. Returns true when the bytes
    /// actually changed (and were persisted).
    async fn apply_content(&self, id: i64, text: String) -> bool {
        {
            let mut lists = self.lists.lock().await;
            let Some(list) = lists.iter_mut().find(|l| l.id == id) else {
                return false;
            };

            if list.content.as_ref() == text.as_str() {
                list.last_updated = Some(Utc::now());
                list.failures = 0;
                return false;
            }

            let parsed = parser::parse_list(id, &text);
            if let Some(title) = parsed.title {
                list.name = title;
            }
            list.rule_count = parsed.rules.len();
            list.content = Arc::from(text.as_str());
            list.last_updated = Some(Utc::now());
            list.failures = 0;
        }

        if let Err(e) = self.persist(id, &text).await {
            warn!(list = id, error = %e, "Failed to persist list content");
        }
        true
    }

    /// Write-to-temp-and-rename so a crash never leaves a torn list file.
    async fn persist(&self, id: i64, text: &str) -> Result<(), CoreError> {
        let path = self.dir.join(format!("{id}.txt"));
        let tmp = self.dir.join(format!("{id}.txt.tmp"));
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Compile the current enabled set plus user rules and hand the matcher
    /// to every subscriber.
    ///
    /// The matcher is not `Clone` (the trie dominates its size), so each
    /// subscriber gets its own compilation; in practice there is exactly
    /// one subscriber, the engine.
    pub async fn recompile_and_publish(&self) {
        let count = self.on_update.lock().await.len();
        for i in 0..count {
            let matcher = self.compile().await;
            let callbacks = self.on_update.lock().await;
            if let Some(callback) = callbacks.get(i) {
                callback(matcher);
            }
        }
    }

    pub async fn compile(&self) -> RuleMatcher {
        let lists = self.lists.lock().await;
        let user_rules = self.user_rules.lock().await;
        let inputs: Vec<(i64, &str)> = lists
            .iter()
            .filter(|l| l.enabled)
            .map(|l| (l.id, l.content.as_ref()))
            .collect();
        RuleMatcher::compile(&inputs, &user_rules)
    }
}
