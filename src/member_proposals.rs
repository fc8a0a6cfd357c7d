//! Identifier lookup through the plugin's own member-proposals method (gasless voting).

use serde::Deserialize;

use crate::{
    errors::{Error, QueryExecutionError, Result},
    identifiers::{Address, ProposalId},
    indexer::{
        BlockHeight, CreatorFilter, CreatorProposalsVariables, GraphQlRequest, IndexerTransport,
        ProposalIdRow,
    },
    plugin::PluginClient,
    types::{
        ProposalCreatorQuery, ProposalSortBy, SortDirection, CREATOR_SORT_BY,
        CREATOR_SORT_DIRECTION,
    },
};

/// Block sentinel understood by the member-proposals method as "no bound".
pub const UNBOUNDED_BLOCK: u64 = 0;

pub const GASLESS_MEMBER_PROPOSALS_QUERY: &str = r#"
query GaslessMemberProposals(
  $where: GaslessVotingProposal_filter!
  $block: Block_height
  $direction: OrderDirection!
  $sortBy: GaslessVotingProposal_orderBy!
) {
  gaslessVotingProposals(
    where: $where
    block: $block
    orderDirection: $direction
    orderBy: $sortBy
  ) {
    id
  }
}
"#;

/// Lists the identifiers of the creator's proposals via the client's
/// member-proposals capability, newest first.
pub async fn fetch_via_plugin_method(
    query: &ProposalCreatorQuery,
    client: Option<&dyn PluginClient>,
) -> Result<Vec<ProposalId>> {
    // The caller may hold a client that was invalidated after resolution.
    let client = client.ok_or_else(|| {
        Error::ClientUnavailable(format!("no client for {}", query.plugin_type))
    })?;
    let methods = client.member_proposals().ok_or_else(|| {
        Error::ClientUnavailable(format!(
            "{} client has no member-proposals method",
            client.plugin_type()
        ))
    })?;

    methods
        .get_member_proposals(
            &query.plugin_address,
            &query.creator_address,
            query.block_number.unwrap_or(UNBOUNDED_BLOCK),
            CREATOR_SORT_DIRECTION,
            CREATOR_SORT_BY,
        )
        .await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GaslessMemberProposalsData {
    #[serde(default)]
    gasless_voting_proposals: Option<Vec<ProposalIdRow>>,
}

/// Member-proposals method of the gasless plugin, served from its indexed entities.
pub(crate) async fn query_member_proposals(
    indexer: &dyn IndexerTransport,
    plugin_address: &Address,
    member: &Address,
    block_number: u64,
    direction: SortDirection,
    sort_by: ProposalSortBy,
) -> Result<Vec<ProposalId>> {
    let variables = CreatorProposalsVariables {
        filter: CreatorFilter {
            plugin: plugin_address.to_lowercase(),
            creator: member.to_lowercase(),
        },
        block: (block_number != UNBOUNDED_BLOCK).then_some(BlockHeight {
            number: block_number,
        }),
        direction,
        sort_by,
    };
    let request = GraphQlRequest::new(
        "GaslessMemberProposals",
        GASLESS_MEMBER_PROPOSALS_QUERY,
        &variables,
    )?;
    let data = indexer.request(request).await?;
    let data: GaslessMemberProposalsData =
        serde_json::from_value(data).map_err(QueryExecutionError::from)?;
    Ok(data
        .gasless_voting_proposals
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.id)
        .collect())
}
