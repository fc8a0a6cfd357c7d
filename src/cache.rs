//! Keyed, de-duplicating cache in front of [`aggregate`](crate::aggregate::aggregate).
//!
//! Results are kept per `(network, plugin, creator, plugin type, block)` and
//! served until they go stale. Concurrent fetches of one key share a single
//! in-flight aggregation. Without a plugin type or a resolvable client the
//! query is disabled and nothing is issued.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{
    aggregate::aggregate_counted,
    detail::DetailResolver,
    errors::Error,
    identifiers::Network,
    plugin::{ClientResolver, PluginClient},
    telemetry::{AggregationMetrics, MetricsCallbacks, Telemetry},
    types::{CreatorProposalsParams, PluginType, ProposalCreatorQuery, ProposalRecord},
};

/// Default freshness window of a cached result.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60);

type SharedAggregation =
    Shared<BoxFuture<'static, Result<Arc<Vec<ProposalRecord>>, Arc<Error>>>>;

/// Cache key of one creator-proposals query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub network: Network,
    pub plugin_address: String,
    pub creator_address: String,
    pub plugin_type: PluginType,
    pub block_number: Option<u64>,
}

impl QueryKey {
    pub fn new(network: &Network, query: &ProposalCreatorQuery) -> Self {
        Self {
            network: network.clone(),
            plugin_address: query.plugin_address.to_lowercase(),
            creator_address: query.creator_address.to_lowercase(),
            plugin_type: query.plugin_type,
            // Block zero is unbounded on both lookup paths.
            block_number: query.block_number.filter(|number| *number > 0),
        }
    }
}

/// Observable state of a cached query.
#[derive(Debug, Clone)]
pub enum QueryState {
    /// Plugin type or client missing; the query is never run.
    Disabled,
    /// Enabled but not fetched yet.
    Idle,
    Loading,
    Data(Arc<Vec<ProposalRecord>>),
    Error(Arc<Error>),
}

impl QueryState {
    pub fn data(&self) -> Option<&Arc<Vec<ProposalRecord>>> {
        match self {
            QueryState::Data(records) => Some(records),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            QueryState::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, QueryState::Disabled)
    }
}

enum Entry {
    Loading(SharedAggregation),
    Ready {
        records: Arc<Vec<ProposalRecord>>,
        fetched_at: Instant,
    },
    Failed(Arc<Error>),
}

enum Lookup {
    Fresh(Arc<Vec<ProposalRecord>>),
    InFlight(SharedAggregation),
    Miss,
}

/// Cached creator-proposals query for one network.
pub struct CreatorProposalsCache {
    network: Network,
    clients: Arc<dyn ClientResolver>,
    details: Arc<dyn DetailResolver>,
    stale_time: Duration,
    telemetry: Telemetry,
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

impl CreatorProposalsCache {
    pub fn new(
        network: impl Into<Network>,
        clients: Arc<dyn ClientResolver>,
        details: Arc<dyn DetailResolver>,
    ) -> Self {
        Self {
            network: network.into(),
            clients,
            details,
            stale_time: DEFAULT_STALE_TIME,
            telemetry: Telemetry::default(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCallbacks) -> Self {
        self.telemetry = Telemetry::new(Some(metrics));
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Returns cached data when fresh, joins an in-flight fetch of the same
    /// key, or runs a new aggregation.
    pub async fn fetch(&self, params: &CreatorProposalsParams) -> QueryState {
        let Some((query, client)) = self.enabled(params) else {
            return QueryState::Disabled;
        };
        let key = QueryKey::new(&self.network, &query);

        let shared = {
            let mut entries = self.lock();
            let lookup = match entries.get(&key) {
                Some(Entry::Ready {
                    records,
                    fetched_at,
                }) if fetched_at.elapsed() < self.stale_time => Lookup::Fresh(records.clone()),
                Some(Entry::Loading(shared)) => Lookup::InFlight(shared.clone()),
                _ => Lookup::Miss,
            };
            match lookup {
                Lookup::Fresh(records) => return QueryState::Data(records),
                Lookup::InFlight(shared) => shared,
                Lookup::Miss => {
                    let shared = self.start(query, client);
                    entries.insert(key.clone(), Entry::Loading(shared.clone()));
                    shared
                }
            }
        };

        let outcome = shared.clone().await;

        let mut entries = self.lock();
        // Only the fetch that is still registered may settle the entry; an
        // invalidated or superseded one just reports its outcome.
        let current = matches!(entries.get(&key), Some(Entry::Loading(s)) if s.ptr_eq(&shared));
        match outcome {
            Ok(records) => {
                if current {
                    entries.insert(
                        key,
                        Entry::Ready {
                            records: records.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                QueryState::Data(records)
            }
            Err(err) => {
                if current {
                    entries.insert(key, Entry::Failed(err.clone()));
                }
                QueryState::Error(err)
            }
        }
    }

    /// Snapshot of the query's state without issuing anything.
    pub fn state(&self, params: &CreatorProposalsParams) -> QueryState {
        let Some((query, _)) = self.enabled(params) else {
            return QueryState::Disabled;
        };
        let key = QueryKey::new(&self.network, &query);
        match self.lock().get(&key) {
            None => QueryState::Idle,
            Some(Entry::Loading(_)) => QueryState::Loading,
            Some(Entry::Ready { records, .. }) => QueryState::Data(records.clone()),
            Some(Entry::Failed(err)) => QueryState::Error(err.clone()),
        }
    }

    /// Drops the cached entry for `params`; returns whether one existed.
    pub fn invalidate(&self, params: &CreatorProposalsParams) -> bool {
        let Some(query) = params.to_query() else {
            return false;
        };
        let key = QueryKey::new(&self.network, &query);
        self.lock().remove(&key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn enabled(
        &self,
        params: &CreatorProposalsParams,
    ) -> Option<(ProposalCreatorQuery, Arc<dyn PluginClient>)> {
        let query = params.to_query()?;
        let client = self.clients.resolve_client(query.plugin_type)?;
        Some((query, client))
    }

    fn start(
        &self,
        query: ProposalCreatorQuery,
        client: Arc<dyn PluginClient>,
    ) -> SharedAggregation {
        let network = self.network.clone();
        let details = self.details.clone();
        let telemetry = self.telemetry.clone();

        async move {
            let started = Instant::now();
            let outcome =
                aggregate_counted(&query, Some(client.as_ref()), &network, details.as_ref()).await;

            let (identifiers, resolved, error) = match &outcome {
                Ok((records, identifiers)) => (*identifiers, records.len(), None),
                Err(err) => (0, 0, Some(err.to_string())),
            };
            log_fetch(query.plugin_type, identifiers, resolved, error.as_deref());
            telemetry.record_aggregation(AggregationMetrics {
                plugin_type: query.plugin_type,
                network,
                identifiers,
                resolved,
                latency: started.elapsed(),
                error,
            });

            outcome
                .map(|(records, _)| Arc::new(records))
                .map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(feature = "tracing")]
fn log_fetch(plugin_type: PluginType, identifiers: usize, resolved: usize, error: Option<&str>) {
    match error {
        None => tracing::debug!(
            plugin_type = %plugin_type,
            identifiers,
            resolved,
            "creator proposals fetched"
        ),
        Some(error) => tracing::warn!(
            plugin_type = %plugin_type,
            error,
            "creator proposals fetch failed"
        ),
    }
}

#[cfg(not(feature = "tracing"))]
fn log_fetch(_: PluginType, _: usize, _: usize, _: Option<&str>) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_treats_block_zero_as_latest() {
        let network = Network::new("ethereum");
        let latest = ProposalCreatorQuery::new("0xP", "0xC", PluginType::Multisig);
        let zero = latest.clone().at_block(0);
        let bounded = latest.clone().at_block(12);

        assert_eq!(QueryKey::new(&network, &latest), QueryKey::new(&network, &zero));
        assert_ne!(QueryKey::new(&network, &latest), QueryKey::new(&network, &bounded));
        assert_eq!(QueryKey::new(&network, &zero).plugin_address, "0xp");
    }
}
