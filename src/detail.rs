//! Proposal detail resolution: one identifier in, one hydrated record (or nothing) out.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{QueryExecutionError, Result},
    identifiers::{Address, Network, ProposalId},
    indexer::{GraphQlRequest, IndexerTransport},
    plugin::PluginClient,
    types::{
        bigint, GaslessVotingProposal, MultisigProposal, PluginType, ProposalBase, ProposalRecord,
        ProposalStatus, TokenVotingProposal, VoteTally, VotingMode,
    },
};

/// Maps a proposal identifier to its record.
///
/// Returns `Ok(None)` when the proposal does not exist or is not visible, and
/// `Err` only for transport or protocol faults.
pub trait DetailResolver: Send + Sync {
    fn resolve_detail<'a>(
        &'a self,
        client: &'a dyn PluginClient,
        id: &'a ProposalId,
        network: &'a Network,
    ) -> BoxFuture<'a, Result<Option<ProposalRecord>>>;
}

/// Resolves details through the plugin client's own proposal lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientDetailResolver;

impl DetailResolver for ClientDetailResolver {
    fn resolve_detail<'a>(
        &'a self,
        client: &'a dyn PluginClient,
        id: &'a ProposalId,
        network: &'a Network,
    ) -> BoxFuture<'a, Result<Option<ProposalRecord>>> {
        #[cfg(feature = "tracing")]
        tracing::trace!(proposal = %id, network = %network, "resolving proposal detail");
        #[cfg(not(feature = "tracing"))]
        let _ = network;
        client.proposal(id)
    }
}

pub const MULTISIG_PROPOSAL_QUERY: &str = r#"
query MultisigProposal($proposalId: ID!) {
  multisigProposal(id: $proposalId) {
    id
    dao { id }
    creator
    metadata
    createdAt
    creationBlockNumber
    startDate
    endDate
    executed
    executionTxHash
    approvalReached
    minApprovals
    approvers { id }
  }
}
"#;

pub const TOKEN_VOTING_PROPOSAL_QUERY: &str = r#"
query TokenVotingProposal($proposalId: ID!) {
  tokenVotingProposal(id: $proposalId) {
    id
    dao { id }
    creator
    metadata
    createdAt
    creationBlockNumber
    startDate
    endDate
    executed
    executionTxHash
    votingMode
    supportThreshold
    minVotingPower
    totalVotingPower
    yes
    no
    abstain
    earlyExecutable
    potentiallyExecutable
  }
}
"#;

pub const GASLESS_VOTING_PROPOSAL_QUERY: &str = r#"
query GaslessVotingProposal($proposalId: ID!) {
  gaslessVotingProposal(id: $proposalId) {
    id
    dao { id }
    creator
    metadata
    createdAt
    creationBlockNumber
    startDate
    endDate
    tallyEndDate
    executed
    executionTxHash
    vochainProposalId
    approvers { id }
    supportThreshold
    minParticipation
    totalVotingPower
    yes
    no
    abstain
  }
}
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposalVariables<'a> {
    proposal_id: &'a ProposalId,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: Address,
}

/// Indexed fields common to every proposal entity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBase {
    id: ProposalId,
    dao: RawAccount,
    creator: Address,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(with = "bigint")]
    created_at: i64,
    #[serde(with = "bigint")]
    creation_block_number: u64,
    #[serde(with = "bigint")]
    start_date: i64,
    #[serde(with = "bigint")]
    end_date: i64,
    executed: bool,
    #[serde(default)]
    execution_tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMultisigProposal {
    #[serde(flatten)]
    base: RawBase,
    approval_reached: bool,
    min_approvals: u32,
    #[serde(default)]
    approvers: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenVotingProposal {
    #[serde(flatten)]
    base: RawBase,
    voting_mode: String,
    #[serde(with = "bigint")]
    support_threshold: u32,
    #[serde(with = "bigint")]
    min_voting_power: u128,
    #[serde(with = "bigint")]
    total_voting_power: u128,
    #[serde(flatten)]
    tally: VoteTally,
    #[serde(default)]
    early_executable: Option<bool>,
    #[serde(default)]
    potentially_executable: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGaslessVotingProposal {
    #[serde(flatten)]
    base: RawBase,
    #[serde(with = "bigint")]
    tally_end_date: i64,
    vochain_proposal_id: String,
    #[serde(default)]
    approvers: Vec<RawAccount>,
    #[serde(with = "bigint")]
    support_threshold: u32,
    #[serde(with = "bigint")]
    min_participation: u32,
    #[serde(with = "bigint")]
    total_voting_power: u128,
    #[serde(flatten)]
    tally: VoteTally,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultisigProposalData {
    multisig_proposal: Option<RawMultisigProposal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenVotingProposalData {
    token_voting_proposal: Option<RawTokenVotingProposal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GaslessVotingProposalData {
    gasless_voting_proposal: Option<RawGaslessVotingProposal>,
}

/// Reads one proposal entity from the indexer and maps it to a record.
///
/// `now` anchors the computed [`ProposalStatus`].
pub async fn fetch_proposal(
    indexer: &dyn IndexerTransport,
    plugin_type: PluginType,
    id: &ProposalId,
    now: DateTime<Utc>,
) -> Result<Option<ProposalRecord>> {
    let variables = ProposalVariables { proposal_id: id };
    let record = match plugin_type {
        PluginType::Multisig => {
            let request =
                GraphQlRequest::new("MultisigProposal", MULTISIG_PROPOSAL_QUERY, &variables)?;
            let data: MultisigProposalData = decode(indexer.request(request).await?)?;
            data.multisig_proposal
                .map(|raw| raw.into_record(now))
                .transpose()?
        }
        PluginType::TokenVoting => {
            let request = GraphQlRequest::new(
                "TokenVotingProposal",
                TOKEN_VOTING_PROPOSAL_QUERY,
                &variables,
            )?;
            let data: TokenVotingProposalData = decode(indexer.request(request).await?)?;
            data.token_voting_proposal
                .map(|raw| raw.into_record(now))
                .transpose()?
        }
        PluginType::Gasless => {
            let request = GraphQlRequest::new(
                "GaslessVotingProposal",
                GASLESS_VOTING_PROPOSAL_QUERY,
                &variables,
            )?;
            let data: GaslessVotingProposalData = decode(indexer.request(request).await?)?;
            data.gasless_voting_proposal
                .map(|raw| raw.into_record(now))
                .transpose()?
        }
    };
    Ok(record)
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(data).map_err(QueryExecutionError::from)?)
}

fn timestamp(field: &str, secs: i64) -> Result<DateTime<Utc>, QueryExecutionError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| QueryExecutionError::Malformed(format!("{field} out of range: {secs}")))
}

/// Status rule shared by all plugins; `passing` is the plugin-specific success test.
pub fn compute_status(
    executed: bool,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    passing: bool,
    now: DateTime<Utc>,
) -> ProposalStatus {
    if executed {
        ProposalStatus::Executed
    } else if start_date >= now {
        ProposalStatus::Pending
    } else if passing {
        ProposalStatus::Succeeded
    } else if end_date >= now {
        ProposalStatus::Active
    } else {
        ProposalStatus::Defeated
    }
}

const RATIO_BASE: u128 = 1_000_000;

/// Whether a gasless tally meets both its support threshold and minimum participation (ppm).
pub fn gasless_passing(
    tally: &VoteTally,
    support_threshold: u32,
    min_participation: u32,
    total_voting_power: u128,
) -> bool {
    let cast = tally.yes.saturating_add(tally.no);
    let support = tally.yes.saturating_mul(RATIO_BASE)
        > (support_threshold as u128).saturating_mul(cast);
    let participation = tally.total().saturating_mul(RATIO_BASE)
        >= (min_participation as u128).saturating_mul(total_voting_power);
    cast > 0 && support && participation
}

fn parse_voting_mode(raw: &str) -> Result<VotingMode, QueryExecutionError> {
    match raw {
        "Standard" => Ok(VotingMode::Standard),
        "EarlyExecution" => Ok(VotingMode::EarlyExecution),
        "VoteReplacement" => Ok(VotingMode::VoteReplacement),
        other => Err(QueryExecutionError::Malformed(format!(
            "unknown voting mode {other:?}"
        ))),
    }
}

impl RawBase {
    fn into_base(
        self,
        passing: bool,
        now: DateTime<Utc>,
    ) -> Result<ProposalBase, QueryExecutionError> {
        let start_date = timestamp("startDate", self.start_date)?;
        let end_date = timestamp("endDate", self.end_date)?;
        Ok(ProposalBase {
            id: self.id,
            dao_address: self.dao.id,
            creator_address: self.creator,
            metadata: self.metadata.filter(|m| !m.trim().is_empty()),
            creation_date: timestamp("createdAt", self.created_at)?,
            creation_block_number: self.creation_block_number,
            start_date,
            end_date,
            status: compute_status(self.executed, start_date, end_date, passing, now),
            execution_tx_hash: self.execution_tx_hash,
        })
    }
}

impl RawMultisigProposal {
    fn into_record(self, now: DateTime<Utc>) -> Result<ProposalRecord, QueryExecutionError> {
        let base = self.base.into_base(self.approval_reached, now)?;
        Ok(ProposalRecord::Multisig(MultisigProposal {
            base,
            approvals: self.approvers.into_iter().map(|a| a.id).collect(),
            min_approvals: self.min_approvals,
            approval_reached: self.approval_reached,
        }))
    }
}

impl RawTokenVotingProposal {
    fn into_record(self, now: DateTime<Utc>) -> Result<ProposalRecord, QueryExecutionError> {
        let early_executable = self.early_executable.unwrap_or(false);
        let potentially_executable = self.potentially_executable.unwrap_or(false);
        let base = self
            .base
            .into_base(early_executable || potentially_executable, now)?;
        Ok(ProposalRecord::TokenVoting(TokenVotingProposal {
            base,
            voting_mode: parse_voting_mode(&self.voting_mode)?,
            support_threshold: self.support_threshold,
            min_voting_power: self.min_voting_power,
            total_voting_power: self.total_voting_power,
            tally: self.tally,
            early_executable,
            potentially_executable,
        }))
    }
}

impl RawGaslessVotingProposal {
    fn into_record(self, now: DateTime<Utc>) -> Result<ProposalRecord, QueryExecutionError> {
        let passing = gasless_passing(
            &self.tally,
            self.support_threshold,
            self.min_participation,
            self.total_voting_power,
        );
        let base = self.base.into_base(passing, now)?;
        Ok(ProposalRecord::Gasless(GaslessVotingProposal {
            base,
            vochain_proposal_id: self.vochain_proposal_id,
            tally_end_date: timestamp("tallyEndDate", self.tally_end_date)?,
            approvers: self.approvers.into_iter().map(|a| a.id).collect(),
            support_threshold: self.support_threshold,
            min_participation: self.min_participation,
            total_voting_power: self.total_voting_power,
            tally: self.tally,
        }))
    }
}
