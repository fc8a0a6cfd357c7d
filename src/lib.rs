//! Lists the governance proposals an address created on a DAO plugin.
//!
//! Multisig and token-voting plugins are looked up through their subgraph
//! indexer; the gasless voting plugin answers through its own
//! member-proposals method. Identifiers are then resolved to full records
//! concurrently. [`CreatorProposalsCache`] puts a keyed, de-duplicating cache
//! in front of [`aggregate()`].
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

/// Default client header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str =
    concat!("creator-proposals/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP header carrying the client identifier.
pub(crate) const CLIENT_HEADER: &str = "X-Client";

pub mod aggregate;
pub mod cache;
mod client;
pub mod detail;
mod errors;
mod http;
mod identifiers;
pub mod indexer;
pub mod member_proposals;
#[cfg(feature = "mock")]
mod mock;
pub mod plugin;
mod telemetry;
pub mod testing;
mod types;

pub use aggregate::{aggregate, resolve_all};
pub use cache::{CreatorProposalsCache, QueryKey, QueryState, DEFAULT_STALE_TIME};
pub use client::{Config, IndexerClient};
pub use detail::{ClientDetailResolver, DetailResolver};
pub use errors::{
    Error, GraphQlError, HttpError, QueryExecutionError, Result, RetryMetadata, TransportError,
    TransportErrorKind, ValidationError,
};
pub use http::{HeaderEntry, HeaderList, RequestOptions, RetryConfig};
pub use identifiers::{Address, Network, ProposalId};
pub use indexer::{fetch_via_indexer, GraphQlRequest, IndexerTransport};
pub use member_proposals::fetch_via_plugin_method;
#[cfg(feature = "mock")]
pub use mock::{fixtures, MemberProposalsCall, MockIndexer, MockPluginClient};
pub use plugin::{ClientResolver, HttpPluginClient, MemberProposals, PluginClient, PluginClients};
pub use telemetry::{AggregationMetrics, HttpRequestMetrics, MetricsCallbacks, RequestContext};
pub use types::{
    CreatorProposalsParams, FetchStrategy, GaslessVotingProposal, IndexerShape, MultisigProposal,
    PluginType, ProposalBase, ProposalCreatorQuery, ProposalRecord, ProposalSortBy, ProposalStatus,
    SortDirection, TokenVotingProposal, VoteTally, VotingMode, CREATOR_SORT_BY,
    CREATOR_SORT_DIRECTION,
};
