use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::ValidationError,
    identifiers::{Address, ProposalId},
};

/// Governance plugin variant installed on a DAO.
///
/// Parses from (and displays as) the plugin's ENS repository name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PluginType {
    Multisig,
    TokenVoting,
    Gasless,
}

impl PluginType {
    pub const MULTISIG_TAG: &'static str = "multisig.plugin.ring-dao.eth";
    pub const TOKEN_VOTING_TAG: &'static str = "token-voting.plugin.ring-dao.eth";
    pub const GASLESS_TAG: &'static str = "vocdoni-gasless-voting-poc-vanilla-erc20.plugin.dao.eth";

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Multisig => Self::MULTISIG_TAG,
            PluginType::TokenVoting => Self::TOKEN_VOTING_TAG,
            PluginType::Gasless => Self::GASLESS_TAG,
        }
    }

    /// Which backend lists the identifiers of a creator's proposals for this plugin.
    pub fn fetch_strategy(&self) -> FetchStrategy {
        match self {
            PluginType::Multisig => FetchStrategy::Indexer(IndexerShape::Multisig),
            PluginType::TokenVoting => FetchStrategy::Indexer(IndexerShape::TokenVoting),
            PluginType::Gasless => FetchStrategy::PluginMethod,
        }
    }
}

impl FromStr for PluginType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            Self::MULTISIG_TAG | "multisig.plugin.dao.eth" => Ok(PluginType::Multisig),
            Self::TOKEN_VOTING_TAG | "token-voting.plugin.dao.eth" => Ok(PluginType::TokenVoting),
            Self::GASLESS_TAG => Ok(PluginType::Gasless),
            other => Err(ValidationError::new(format!("unknown plugin type {other:?}"))
                .with_field("plugin_type")),
        }
    }
}

impl TryFrom<String> for PluginType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PluginType> for String {
    fn from(value: PluginType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier retrieval strategy selected per plugin type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Query the indexer with one of its entity-specific query shapes.
    Indexer(IndexerShape),
    /// Call the plugin client's member-proposals method.
    PluginMethod,
}

/// Indexed entity family queried for a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexerShape {
    Multisig,
    TokenVoting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalSortBy {
    #[serde(rename = "createdAt")]
    CreatedAt,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl ProposalSortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalSortBy::CreatedAt => "createdAt",
        }
    }
}

/// Fixed ordering used for every creator listing: newest first.
pub const CREATOR_SORT_DIRECTION: SortDirection = SortDirection::Desc;
pub const CREATOR_SORT_BY: ProposalSortBy = ProposalSortBy::CreatedAt;

/// Input of a single aggregation call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProposalCreatorQuery {
    pub plugin_address: Address,
    pub creator_address: Address,
    pub plugin_type: PluginType,
    /// Historical upper bound; `None` means the latest block.
    pub block_number: Option<u64>,
}

impl ProposalCreatorQuery {
    pub fn new(
        plugin_address: impl Into<Address>,
        creator_address: impl Into<Address>,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            plugin_address: plugin_address.into(),
            creator_address: creator_address.into(),
            plugin_type,
            block_number: None,
        }
    }

    pub fn at_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.plugin_address.is_empty() {
            return Err(ValidationError::new("is required").with_field("plugin_address"));
        }
        if self.creator_address.is_empty() {
            return Err(ValidationError::new("is required").with_field("creator_address"));
        }
        Ok(())
    }
}

/// Caller-facing parameters of the cached creator-proposals query.
///
/// Unlike [`ProposalCreatorQuery`] the plugin type may be unknown yet, in which
/// case the query stays disabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreatorProposalsParams {
    pub plugin_address: Address,
    pub creator_address: Address,
    pub plugin_type: Option<PluginType>,
    pub block_number: Option<u64>,
}

impl CreatorProposalsParams {
    pub fn new(
        plugin_address: impl Into<Address>,
        creator_address: impl Into<Address>,
        plugin_type: Option<PluginType>,
    ) -> Self {
        Self {
            plugin_address: plugin_address.into(),
            creator_address: creator_address.into(),
            plugin_type,
            block_number: None,
        }
    }

    pub fn at_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    /// The concrete query, if the plugin type is known.
    pub fn to_query(&self) -> Option<ProposalCreatorQuery> {
        self.plugin_type.map(|plugin_type| ProposalCreatorQuery {
            plugin_address: self.plugin_address.clone(),
            creator_address: self.creator_address.clone(),
            plugin_type,
            block_number: self.block_number,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Active,
    Succeeded,
    Executed,
    Defeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMode {
    Standard,
    EarlyExecution,
    VoteReplacement,
}

/// Raw token-weighted vote counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(with = "bigint")]
    pub yes: u128,
    #[serde(with = "bigint")]
    pub no: u128,
    #[serde(with = "bigint")]
    pub abstain: u128,
}

impl VoteTally {
    pub fn total(&self) -> u128 {
        self.yes.saturating_add(self.no).saturating_add(self.abstain)
    }
}

/// Fields shared by every proposal kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBase {
    pub id: ProposalId,
    pub dao_address: Address,
    pub creator_address: Address,
    /// Metadata URI (usually `ipfs://...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub creation_block_number: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigProposal {
    #[serde(flatten)]
    pub base: ProposalBase,
    pub approvals: Vec<Address>,
    pub min_approvals: u32,
    pub approval_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenVotingProposal {
    #[serde(flatten)]
    pub base: ProposalBase,
    pub voting_mode: VotingMode,
    /// Parts per million.
    pub support_threshold: u32,
    #[serde(with = "bigint")]
    pub min_voting_power: u128,
    #[serde(with = "bigint")]
    pub total_voting_power: u128,
    pub tally: VoteTally,
    pub early_executable: bool,
    pub potentially_executable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaslessVotingProposal {
    #[serde(flatten)]
    pub base: ProposalBase,
    pub vochain_proposal_id: String,
    pub tally_end_date: DateTime<Utc>,
    pub approvers: Vec<Address>,
    /// Parts per million.
    pub support_threshold: u32,
    /// Parts per million.
    pub min_participation: u32,
    #[serde(with = "bigint")]
    pub total_voting_power: u128,
    pub tally: VoteTally,
}

/// A fully hydrated proposal of any supported plugin kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalRecord {
    Multisig(MultisigProposal),
    TokenVoting(TokenVotingProposal),
    Gasless(GaslessVotingProposal),
}

impl ProposalRecord {
    pub fn base(&self) -> &ProposalBase {
        match self {
            ProposalRecord::Multisig(p) => &p.base,
            ProposalRecord::TokenVoting(p) => &p.base,
            ProposalRecord::Gasless(p) => &p.base,
        }
    }

    pub fn id(&self) -> &ProposalId {
        &self.base().id
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.base().creation_date
    }

    pub fn status(&self) -> ProposalStatus {
        self.base().status
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            ProposalRecord::Multisig(_) => PluginType::Multisig,
            ProposalRecord::TokenVoting(_) => PluginType::TokenVoting,
            ProposalRecord::Gasless(_) => PluginType::Gasless,
        }
    }
}

/// (De)serializes integers as decimal strings, the way the indexer encodes `BigInt`.
pub(crate) mod bigint {
    use std::{fmt::Display, str::FromStr};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let raw = String::deserialize(deserializer)?;
        raw.trim()
            .parse()
            .map_err(|err| de::Error::custom(format!("invalid integer {raw:?}: {err}")))
    }
}
