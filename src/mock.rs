//! In-memory plugin client for exercising the aggregation without a network.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use futures::future::BoxFuture;

use crate::{
    errors::{
        Error, GraphQlError, QueryExecutionError, Result, TransportError, TransportErrorKind,
    },
    identifiers::{Address, ProposalId},
    indexer::{GraphQlRequest, IndexerTransport},
    plugin::{MemberProposals, PluginClient},
    types::{PluginType, ProposalRecord, ProposalSortBy, SortDirection},
};

#[derive(Clone)]
enum IndexerReply {
    Data(serde_json::Value),
    Transport(String),
    GraphQl(String),
}

#[derive(Clone)]
enum DetailReply {
    Record(ProposalRecord),
    Fail(String),
}

/// Arguments of one recorded member-proposals call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProposalsCall {
    pub plugin_address: Address,
    pub member: Address,
    pub block_number: u64,
    pub direction: SortDirection,
    pub sort_by: ProposalSortBy,
}

/// Indexer fake that answers every request with the same configured reply.
pub struct MockIndexer {
    reply: Mutex<IndexerReply>,
    requests: Mutex<Vec<GraphQlRequest>>,
}

impl MockIndexer {
    fn new() -> Self {
        Self {
            reply: Mutex::new(IndexerReply::Data(serde_json::json!({}))),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        lock(&self.requests).clone()
    }
}

impl IndexerTransport for MockIndexer {
    fn request(&self, request: GraphQlRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        lock(&self.requests).push(request);
        let reply = lock(&self.reply).clone();
        Box::pin(async move {
            match reply {
                IndexerReply::Data(data) => Ok(data),
                IndexerReply::Transport(message) => Err(TransportError {
                    kind: TransportErrorKind::Connect,
                    message,
                    source: None,
                    retries: None,
                }
                .into()),
                IndexerReply::GraphQl(message) => {
                    Err(QueryExecutionError::GraphQl(vec![GraphQlError::new(message)]).into())
                }
            }
        })
    }
}

/// In-memory [`PluginClient`] that records every call it receives.
pub struct MockPluginClient {
    plugin_type: PluginType,
    indexer: MockIndexer,
    member_proposals: Option<Vec<ProposalId>>,
    member_calls: Mutex<Vec<MemberProposalsCall>>,
    details: HashMap<ProposalId, DetailReply>,
    detail_delay: Option<Duration>,
    detail_delays: HashMap<ProposalId, Duration>,
    detail_calls: Mutex<Vec<ProposalId>>,
    completed_details: Mutex<Vec<ProposalId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPluginClient {
    pub fn new(plugin_type: PluginType) -> Self {
        Self {
            plugin_type,
            indexer: MockIndexer::new(),
            member_proposals: None,
            member_calls: Mutex::new(Vec::new()),
            details: HashMap::new(),
            detail_delay: None,
            detail_delays: HashMap::new(),
            detail_calls: Mutex::new(Vec::new()),
            completed_details: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// `data` object returned for every indexer request.
    pub fn with_indexer_data(self, data: serde_json::Value) -> Self {
        *lock(&self.indexer.reply) = IndexerReply::Data(data);
        self
    }

    pub fn with_indexer_transport_failure(self, message: impl Into<String>) -> Self {
        *lock(&self.indexer.reply) = IndexerReply::Transport(message.into());
        self
    }

    pub fn with_indexer_graphql_error(self, message: impl Into<String>) -> Self {
        *lock(&self.indexer.reply) = IndexerReply::GraphQl(message.into());
        self
    }

    /// Enables the member-proposals method, answering with `ids`.
    pub fn with_member_proposals<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ProposalId>,
    {
        self.member_proposals = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Detail lookup for the record's id returns the record; unknown ids are absent.
    pub fn with_record(mut self, record: ProposalRecord) -> Self {
        self.details
            .insert(record.id().clone(), DetailReply::Record(record));
        self
    }

    pub fn with_detail_failure(
        mut self,
        id: impl Into<ProposalId>,
        message: impl Into<String>,
    ) -> Self {
        self.details
            .insert(id.into(), DetailReply::Fail(message.into()));
        self
    }

    /// Delay every detail lookup, to observe concurrency.
    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    /// Delay the detail lookup of one id; overrides [`with_detail_delay`](Self::with_detail_delay).
    pub fn with_detail_delay_for(mut self, id: impl Into<ProposalId>, delay: Duration) -> Self {
        self.detail_delays.insert(id.into(), delay);
        self
    }

    pub fn indexer_requests(&self) -> Vec<GraphQlRequest> {
        self.indexer.requests()
    }

    pub fn member_calls(&self) -> Vec<MemberProposalsCall> {
        lock(&self.member_calls).clone()
    }

    /// Ids whose detail lookup was started, in call order.
    pub fn detail_calls(&self) -> Vec<ProposalId> {
        lock(&self.detail_calls).clone()
    }

    /// Ids whose detail lookup ran to completion, in completion order.
    pub fn completed_details(&self) -> Vec<ProposalId> {
        lock(&self.completed_details).clone()
    }

    /// Highest number of detail lookups that were pending at the same time.
    pub fn max_concurrent_details(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Total number of calls issued through this client.
    pub fn total_calls(&self) -> usize {
        self.indexer_requests().len() + self.member_calls().len() + self.detail_calls().len()
    }
}

impl PluginClient for MockPluginClient {
    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    fn indexer(&self) -> &dyn IndexerTransport {
        &self.indexer
    }

    fn member_proposals(&self) -> Option<&dyn MemberProposals> {
        self.member_proposals
            .as_ref()
            .map(|_| self as &dyn MemberProposals)
    }

    fn proposal<'a>(&'a self, id: &'a ProposalId) -> BoxFuture<'a, Result<Option<ProposalRecord>>> {
        lock(&self.detail_calls).push(id.clone());
        Box::pin(async move {
            let pending = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(pending, Ordering::SeqCst);
            if let Some(delay) = self.detail_delays.get(id).copied().or(self.detail_delay) {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            lock(&self.completed_details).push(id.clone());

            match self.details.get(id) {
                Some(DetailReply::Record(record)) => Ok(Some(record.clone())),
                Some(DetailReply::Fail(message)) => Err(Error::QueryExecution(
                    QueryExecutionError::GraphQl(vec![GraphQlError::new(message.clone())]),
                )),
                None => Ok(None),
            }
        })
    }
}

impl MemberProposals for MockPluginClient {
    fn get_member_proposals<'a>(
        &'a self,
        plugin_address: &'a Address,
        member: &'a Address,
        block_number: u64,
        direction: SortDirection,
        sort_by: ProposalSortBy,
    ) -> BoxFuture<'a, Result<Vec<ProposalId>>> {
        lock(&self.member_calls).push(MemberProposalsCall {
            plugin_address: plugin_address.clone(),
            member: member.clone(),
            block_number,
            direction,
            sort_by,
        });
        let ids = self.member_proposals.clone().unwrap_or_default();
        Box::pin(async move { Ok(ids) })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Canned proposal records.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::{
        identifiers::{Address, ProposalId},
        types::{
            GaslessVotingProposal, MultisigProposal, ProposalBase, ProposalRecord, ProposalStatus,
            TokenVotingProposal, VoteTally, VotingMode,
        },
    };

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
    }

    pub fn base(id: &str, created_at: i64) -> ProposalBase {
        ProposalBase {
            id: ProposalId::new(id),
            dao_address: Address::new("0xdao"),
            creator_address: Address::new("0xc"),
            metadata: Some(format!("ipfs://{id}")),
            creation_date: at(created_at),
            creation_block_number: created_at as u64,
            start_date: at(created_at),
            end_date: at(created_at + 86_400),
            status: ProposalStatus::Active,
            execution_tx_hash: None,
        }
    }

    pub fn multisig(id: &str, created_at: i64) -> ProposalRecord {
        ProposalRecord::Multisig(MultisigProposal {
            base: base(id, created_at),
            approvals: vec![Address::new("0xc")],
            min_approvals: 2,
            approval_reached: false,
        })
    }

    pub fn token_voting(id: &str, created_at: i64) -> ProposalRecord {
        ProposalRecord::TokenVoting(TokenVotingProposal {
            base: base(id, created_at),
            voting_mode: VotingMode::Standard,
            support_threshold: 500_000,
            min_voting_power: 1,
            total_voting_power: 100,
            tally: VoteTally {
                yes: 10,
                no: 2,
                abstain: 0,
            },
            early_executable: false,
            potentially_executable: false,
        })
    }

    pub fn gasless(id: &str, created_at: i64) -> ProposalRecord {
        ProposalRecord::Gasless(GaslessVotingProposal {
            base: base(id, created_at),
            vochain_proposal_id: format!("vochain-{id}"),
            tally_end_date: at(created_at + 2 * 86_400),
            approvers: Vec::new(),
            support_threshold: 500_000,
            min_participation: 100_000,
            total_voting_power: 100,
            tally: VoteTally::default(),
        })
    }
}
