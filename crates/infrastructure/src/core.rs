//! Assembly of the request pipeline and its collaborators from one
//! `CoreConfig` snapshot.
//!
//! There are no process singletons: everything hangs off a `Core` value.
//! Reconfiguration builds a complete new `Core` (new matcher compiled first)
//! and swaps the handle's pointer; listeners dereference the handle per
//! request, so in-flight requests finish on the snapshot they started with.

use crate::cache::ResponseCache;
use crate::clients::{ClientResolver, PolicyDefaults, RuntimeClients};
use crate::filter::{FilterEngine, HashPrefixClient};
use crate::filterstore::FilterStore;
use crate::forward::Forwarder;
use crate::hosts::HostsView;
use crate::pipeline::{Pipeline, PipelineSettings, Sinkhole};
use crate::querylog::QueryLog;
use crate::stats::{StatsStore, StatsTracker};
use aegis_dns_application::ports::ReputationLookup;
use arc_swap::ArcSwap;
use aegis_dns_domain::{CoreConfig, CoreError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One fully wired core, built from one config snapshot.
pub struct Core {
    pub config: CoreConfig,
    pub engine: Arc<FilterEngine>,
    pub store: Arc<FilterStore>,
    pub hosts: Arc<HostsView>,
    pub clients: Arc<ClientResolver>,
    /// Auto-discovered clients, fed by the DHCP/rDNS/ARP collaborators.
    pub runtime_clients: Arc<RuntimeClients>,
    pub cache: Arc<ResponseCache>,
    pub forwarder: Arc<Forwarder>,
    pub querylog: Arc<QueryLog>,
    pub stats: Arc<StatsTracker>,
    pub stats_store: Arc<StatsStore>,
    pub pipeline: Arc<Pipeline>,
}

impl Core {
    pub async fn bootstrap(config: CoreConfig) -> Result<Arc<Self>, CoreError> {
        config.validate()?;
        let data_dir = Path::new(&config.server.data_dir).to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("aegis-dns/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Internal(format!("HTTP client build failed: {e}")))?;

        // Filter store loads persisted list contents; the initial matcher
        // compiles before anything serves, so there is never a matcherless
        // window.
        let store = Arc::new(
            FilterStore::open(
                &data_dir,
                &config.filtering.lists,
                config.filtering.user_rules.clone(),
                config.filtering.update_interval_mins,
                http.clone(),
            )
            .await?,
        );
        let matcher = store.compile().await;

        let safebrowsing: Option<Arc<dyn ReputationLookup>> =
            if config.filtering.safebrowsing.enabled {
                Some(Arc::new(HashPrefixClient::new(
                    &config.filtering.safebrowsing,
                    http.clone(),
                )))
            } else {
                None
            };
        let parental: Option<Arc<dyn ReputationLookup>> = if config.filtering.parental.enabled {
            Some(Arc::new(HashPrefixClient::new(
                &config.filtering.parental,
                http.clone(),
            )))
        } else {
            None
        };

        let engine = Arc::new(FilterEngine::new(matcher, safebrowsing, parental));
        {
            let engine = Arc::clone(&engine);
            store
                .on_update(Box::new(move |matcher| engine.publish(matcher)))
                .await;
        }

        let hosts = Arc::new(HostsView::new(
            config.server.local_domain.clone(),
            config.server.local_ranges.clone(),
        ));

        let clients = Arc::new(ClientResolver::new(
            config.clients.clone(),
            PolicyDefaults {
                filtering: config.filtering.enabled,
                safesearch: config.filtering.safesearch_enabled,
                safebrowsing: config.filtering.safebrowsing.enabled,
                parental: config.filtering.parental.enabled,
                blocked_services: Arc::from(config.filtering.blocked_services.clone()),
            },
            Arc::clone(&hosts),
        ));

        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let forwarder = Arc::new(Forwarder::new(&config.upstream)?);
        let querylog = Arc::new(QueryLog::new(config.querylog.clone(), &data_dir));

        let stats_store = Arc::new(StatsStore::new(&data_dir));
        let stats = Arc::new(StatsTracker::new(config.stats.clone(), stats_store.load()));

        let settings = PipelineSettings {
            access: config.access.clone(),
            sinkhole: Sinkhole {
                v4: config.filtering.sinkhole_v4,
                v6: config.filtering.sinkhole_v6,
                safe: config.filtering.safe_sinkhole,
            },
            request_budget: Duration::from_millis(config.server.request_budget_ms.max(100)),
            protection_enabled: config.server.protection_enabled,
            ddr_templates: config.server.ddr_templates.clone(),
            ecs_enabled: config.upstream.edns_client_subnet,
            ecs_prefix_v4: config.upstream.edns_subnet_prefix_v4,
            ecs_prefix_v6: config.upstream.edns_subnet_prefix_v6,
        };

        let pipeline = Arc::new(Pipeline::new(
            engine.clone(),
            clients.clone(),
            hosts.clone(),
            forwarder.clone(),
            Arc::clone(&cache),
            querylog.clone(),
            stats.clone(),
            settings,
        ));

        info!(
            rules = engine.rule_count(),
            upstreams = config.upstream.upstreams.len(),
            "Core assembled"
        );

        Ok(Arc::new(Self {
            config,
            engine,
            store,
            hosts,
            clients,
            runtime_clients: Arc::new(RuntimeClients::new()),
            cache,
            forwarder,
            querylog,
            stats,
            stats_store,
            pipeline,
        }))
    }
}

/// The atomic pointer listeners and jobs dereference per request.
pub struct CoreHandle {
    inner: ArcSwap<Core>,
}

impl CoreHandle {
    pub fn new(core: Arc<Core>) -> Self {
        Self {
            inner: ArcSwap::from(core),
        }
    }

    pub fn current(&self) -> Arc<Core> {
        self.inner.load_full()
    }

    /// Consistent reconfiguration: the new core is fully built (matcher
    /// compiled, pools parsed) before the pointer moves. On build failure the
    /// old core keeps serving.
    pub async fn apply(&self, config: CoreConfig) -> Result<(), CoreError> {
        let fresh = Core::bootstrap(config).await?;
        // Pending query-log records belong to the old core; flush them so
        // nothing is lost in the swap.
        self.current().querylog.flush();
        self.inner.store(fresh);
        info!("Configuration snapshot applied");
        Ok(())
    }
}
