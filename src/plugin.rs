//! Plugin clients: the capability-bearing handles the aggregation talks through.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::Utc;
use futures::future::BoxFuture;

use crate::{
    client::{Config, IndexerClient},
    detail::fetch_proposal,
    errors::Result,
    identifiers::{Address, ProposalId},
    indexer::IndexerTransport,
    member_proposals::query_member_proposals,
    types::{PluginType, ProposalRecord, ProposalSortBy, SortDirection},
};

/// A client able to perform the calls of one governance plugin.
pub trait PluginClient: Send + Sync {
    fn plugin_type(&self) -> PluginType;

    /// Indexer the plugin's entities are queried from.
    fn indexer(&self) -> &dyn IndexerTransport;

    /// Direct member-proposal listing, if the plugin offers one.
    fn member_proposals(&self) -> Option<&dyn MemberProposals> {
        None
    }

    /// Fetches one proposal; `Ok(None)` when it does not exist.
    fn proposal<'a>(&'a self, id: &'a ProposalId) -> BoxFuture<'a, Result<Option<ProposalRecord>>>;
}

/// Lists the proposals a member created on a plugin.
pub trait MemberProposals: Send + Sync {
    /// `block_number == 0` means no block bound.
    fn get_member_proposals<'a>(
        &'a self,
        plugin_address: &'a Address,
        member: &'a Address,
        block_number: u64,
        direction: SortDirection,
        sort_by: ProposalSortBy,
    ) -> BoxFuture<'a, Result<Vec<ProposalId>>>;
}

/// Resolves the client for a plugin type. `None` disables any work for it.
pub trait ClientResolver: Send + Sync {
    fn resolve_client(&self, plugin_type: PluginType) -> Option<Arc<dyn PluginClient>>;
}

/// Registry of plugin clients keyed by their plugin type.
#[derive(Clone, Default)]
pub struct PluginClients {
    clients: HashMap<PluginType, Arc<dyn PluginClient>>,
}

impl PluginClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under its own plugin type, replacing any previous one.
    pub fn with_client(mut self, client: Arc<dyn PluginClient>) -> Self {
        self.insert(client);
        self
    }

    pub fn insert(&mut self, client: Arc<dyn PluginClient>) {
        self.clients.insert(client.plugin_type(), client);
    }

    pub fn remove(&mut self, plugin_type: PluginType) -> Option<Arc<dyn PluginClient>> {
        self.clients.remove(&plugin_type)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for PluginClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.clients.keys()).finish()
    }
}

impl ClientResolver for PluginClients {
    fn resolve_client(&self, plugin_type: PluginType) -> Option<Arc<dyn PluginClient>> {
        self.clients.get(&plugin_type).cloned()
    }
}

/// [`PluginClient`] backed by the HTTP indexer.
///
/// Proposal details are read from the plugin's indexed entities; the gasless
/// plugin additionally exposes its member-proposal listing.
#[derive(Clone)]
pub struct HttpPluginClient {
    plugin_type: PluginType,
    indexer: IndexerClient,
}

impl HttpPluginClient {
    pub fn new(plugin_type: PluginType, indexer: IndexerClient) -> Self {
        Self {
            plugin_type,
            indexer,
        }
    }

    pub fn from_config(plugin_type: PluginType, cfg: Config) -> Result<Self> {
        Ok(Self::new(plugin_type, IndexerClient::new(cfg)?))
    }
}

impl PluginClient for HttpPluginClient {
    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    fn indexer(&self) -> &dyn IndexerTransport {
        &self.indexer
    }

    fn member_proposals(&self) -> Option<&dyn MemberProposals> {
        match self.plugin_type {
            PluginType::Gasless => Some(self),
            PluginType::Multisig | PluginType::TokenVoting => None,
        }
    }

    fn proposal<'a>(&'a self, id: &'a ProposalId) -> BoxFuture<'a, Result<Option<ProposalRecord>>> {
        Box::pin(fetch_proposal(&self.indexer, self.plugin_type, id, Utc::now()))
    }
}

impl MemberProposals for HttpPluginClient {
    fn get_member_proposals<'a>(
        &'a self,
        plugin_address: &'a Address,
        member: &'a Address,
        block_number: u64,
        direction: SortDirection,
        sort_by: ProposalSortBy,
    ) -> BoxFuture<'a, Result<Vec<ProposalId>>> {
        Box::pin(query_member_proposals(
            &self.indexer,
            plugin_address,
            member,
            block_number,
            direction,
            sort_by,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_client(plugin_type: PluginType) -> Arc<dyn PluginClient> {
        Arc::new(
            HttpPluginClient::from_config(
                plugin_type,
                Config {
                    endpoint: Some("http://127.0.0.1:1/graphql".into()),
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn registry_resolves_by_plugin_type() {
        let clients = PluginClients::new()
            .with_client(http_client(PluginType::Multisig))
            .with_client(http_client(PluginType::Gasless));
        assert_eq!(clients.len(), 2);
        assert!(clients.resolve_client(PluginType::Multisig).is_some());
        assert!(clients.resolve_client(PluginType::TokenVoting).is_none());
    }

    #[test]
    fn only_gasless_exposes_member_proposals() {
        assert!(http_client(PluginType::Gasless).member_proposals().is_some());
        assert!(http_client(PluginType::Multisig).member_proposals().is_none());
        assert!(http_client(PluginType::TokenVoting)
            .member_proposals()
            .is_none());
    }
}
