//! Identifier lookup against the governance indexer.
//!
//! The indexer keeps one entity collection per plugin family, so the creator
//! listing is issued with one of two query documents that differ only in the
//! entity they select. Both are normalized to a plain list of [`ProposalId`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, QueryExecutionError, Result},
    identifiers::{Network, ProposalId},
    plugin::PluginClient,
    types::{
        IndexerShape, ProposalCreatorQuery, ProposalSortBy, SortDirection, CREATOR_SORT_BY,
        CREATOR_SORT_DIRECTION,
    },
};

pub const MULTISIG_PROPOSALS_QUERY: &str = r#"
query MultisigProposals(
  $where: MultisigProposal_filter!
  $block: Block_height
  $direction: OrderDirection!
  $sortBy: MultisigProposal_orderBy!
) {
  multisigProposals(
    where: $where
    block: $block
    orderDirection: $direction
    orderBy: $sortBy
  ) {
    id
  }
}
"#;

pub const TOKEN_VOTING_PROPOSALS_QUERY: &str = r#"
query TokenVotingProposals(
  $where: TokenVotingProposal_filter!
  $block: Block_height
  $direction: OrderDirection!
  $sortBy: TokenVotingProposal_orderBy!
) {
  tokenVotingProposals(
    where: $where
    block: $block
    orderDirection: $direction
    orderBy: $sortBy
  ) {
    id
  }
}
"#;

/// A GraphQL document plus its variables, as posted to the indexer.
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest {
    #[serde(rename = "operationName")]
    pub operation_name: &'static str,
    pub query: &'static str,
    pub variables: serde_json::Value,
}

impl GraphQlRequest {
    pub fn new(
        operation_name: &'static str,
        query: &'static str,
        variables: impl Serialize,
    ) -> Result<Self> {
        let variables = serde_json::to_value(variables).map_err(|err| {
            Error::Config(format!("failed to encode {operation_name} variables: {err}"))
        })?;
        Ok(Self {
            operation_name,
            query,
            variables,
        })
    }
}

/// Executes GraphQL documents against an indexer and yields the `data` object.
///
/// Implementations fail with [`Error::QueryExecution`] on transport faults,
/// GraphQL errors and malformed payloads.
pub trait IndexerTransport: Send + Sync {
    fn request(&self, request: GraphQlRequest) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// `where` filter shared by both creator queries. Addresses are lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorFilter {
    pub plugin: String,
    pub creator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeight {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorProposalsVariables {
    #[serde(rename = "where")]
    pub filter: CreatorFilter,
    /// `null` asks for the latest indexed block.
    pub block: Option<BlockHeight>,
    pub direction: SortDirection,
    #[serde(rename = "sortBy")]
    pub sort_by: ProposalSortBy,
}

impl CreatorProposalsVariables {
    pub fn for_query(query: &ProposalCreatorQuery) -> Self {
        Self {
            filter: CreatorFilter {
                plugin: query.plugin_address.to_lowercase(),
                creator: query.creator_address.to_lowercase(),
            },
            // Block zero carries no bound either.
            block: query
                .block_number
                .filter(|number| *number > 0)
                .map(|number| BlockHeight { number }),
            direction: CREATOR_SORT_DIRECTION,
            sort_by: CREATOR_SORT_BY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposalIdRow {
    pub id: ProposalId,
}

/// Typed `data` of either creator query. Only the collection of the executed
/// shape is present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorProposalsResponse {
    #[serde(default)]
    pub multisig_proposals: Option<Vec<ProposalIdRow>>,
    #[serde(default)]
    pub token_voting_proposals: Option<Vec<ProposalIdRow>>,
}

impl IndexerShape {
    pub fn operation_name(&self) -> &'static str {
        match self {
            IndexerShape::Multisig => "MultisigProposals",
            IndexerShape::TokenVoting => "TokenVotingProposals",
        }
    }

    pub fn document(&self) -> &'static str {
        match self {
            IndexerShape::Multisig => MULTISIG_PROPOSALS_QUERY,
            IndexerShape::TokenVoting => TOKEN_VOTING_PROPOSALS_QUERY,
        }
    }

    /// Identifiers of this shape's collection; a missing collection is empty.
    pub fn identifiers(&self, response: CreatorProposalsResponse) -> Vec<ProposalId> {
        let rows = match self {
            IndexerShape::Multisig => response.multisig_proposals,
            IndexerShape::TokenVoting => response.token_voting_proposals,
        };
        rows.unwrap_or_default().into_iter().map(|row| row.id).collect()
    }
}

/// Lists the identifiers of the creator's proposals through the indexer, newest first.
pub async fn fetch_via_indexer(
    query: &ProposalCreatorQuery,
    shape: IndexerShape,
    client: &dyn PluginClient,
    network: &Network,
) -> Result<Vec<ProposalId>> {
    let variables = CreatorProposalsVariables::for_query(query);
    let request = GraphQlRequest::new(shape.operation_name(), shape.document(), &variables)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        operation = shape.operation_name(),
        network = %network,
        plugin = %variables.filter.plugin,
        block = ?variables.block.map(|b| b.number),
        "querying indexer for creator proposals"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = network;

    let data = client.indexer().request(request).await?;
    let response: CreatorProposalsResponse =
        serde_json::from_value(data).map_err(QueryExecutionError::from)?;
    Ok(shape.identifiers(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PluginType;
    use serde_json::json;

    #[test]
    fn variables_lowercase_addresses_and_default_to_latest_block() {
        let query = ProposalCreatorQuery::new("0xPLUGIN", "0xCreator", PluginType::Multisig);
        let vars = serde_json::to_value(CreatorProposalsVariables::for_query(&query)).unwrap();
        assert_eq!(
            vars,
            json!({
                "where": { "plugin": "0xplugin", "creator": "0xcreator" },
                "block": null,
                "direction": "desc",
                "sortBy": "createdAt"
            })
        );
    }

    #[test]
    fn variables_carry_block_bound() {
        let query =
            ProposalCreatorQuery::new("0xP", "0xC", PluginType::TokenVoting).at_block(1234);
        let vars = serde_json::to_value(CreatorProposalsVariables::for_query(&query)).unwrap();
        assert_eq!(vars["block"], json!({ "number": 1234 }));

        let zero = ProposalCreatorQuery::new("0xP", "0xC", PluginType::TokenVoting).at_block(0);
        let vars = serde_json::to_value(CreatorProposalsVariables::for_query(&zero)).unwrap();
        assert!(vars["block"].is_null());
    }

    #[test]
    fn shapes_select_their_document() {
        assert!(IndexerShape::Multisig
            .document()
            .contains("multisigProposals("));
        assert!(IndexerShape::TokenVoting
            .document()
            .contains("tokenVotingProposals("));
        assert_eq!(IndexerShape::Multisig.operation_name(), "MultisigProposals");
    }

    #[test]
    fn identifiers_come_from_the_executed_shape() {
        let response: CreatorProposalsResponse = serde_json::from_value(json!({
            "multisigProposals": [{ "id": "m1" }, { "id": "m2" }]
        }))
        .unwrap();
        let ids = IndexerShape::Multisig.identifiers(response.clone());
        assert_eq!(ids, vec![ProposalId::new("m1"), ProposalId::new("m2")]);
        assert!(IndexerShape::TokenVoting.identifiers(response).is_empty());
    }

    #[test]
    fn null_collection_is_empty() {
        let response: CreatorProposalsResponse =
            serde_json::from_value(json!({ "tokenVotingProposals": null })).unwrap();
        assert!(IndexerShape::TokenVoting.identifiers(response).is_empty());
    }

    #[test]
    fn request_serializes_as_graphql_body() {
        let request = GraphQlRequest::new(
            "MultisigProposals",
            MULTISIG_PROPOSALS_QUERY,
            json!({ "block": null }),
        )
        .unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["operationName"], "MultisigProposals");
        assert!(body["variables"]["block"].is_null());
    }
}
