//! Creator-proposal aggregation: identifiers first, then concurrent detail fan-out.

use futures::future::join_all;

use crate::{
    detail::DetailResolver,
    errors::{Error, Result},
    identifiers::{Network, ProposalId},
    indexer::fetch_via_indexer,
    member_proposals::fetch_via_plugin_method,
    plugin::PluginClient,
    types::{FetchStrategy, ProposalCreatorQuery, ProposalRecord},
};

/// Lists every proposal created by `query.creator_address` on the plugin,
/// newest first.
///
/// Identifiers whose detail lookup yields nothing are dropped; any lookup
/// error fails the whole call once all lookups have settled.
pub async fn aggregate(
    query: &ProposalCreatorQuery,
    client: Option<&dyn PluginClient>,
    network: &Network,
    details: &dyn DetailResolver,
) -> Result<Vec<ProposalRecord>> {
    aggregate_counted(query, client, network, details)
        .await
        .map(|(records, _)| records)
}

/// [`aggregate`], also reporting how many identifiers were looked up.
pub(crate) async fn aggregate_counted(
    query: &ProposalCreatorQuery,
    client: Option<&dyn PluginClient>,
    network: &Network,
    details: &dyn DetailResolver,
) -> Result<(Vec<ProposalRecord>, usize)> {
    let client = client.ok_or_else(|| {
        Error::ClientUnavailable(format!("no client for {}", query.plugin_type))
    })?;
    query.validate()?;

    let strategy = query.plugin_type.fetch_strategy();
    let ids = match strategy {
        FetchStrategy::Indexer(shape) => fetch_via_indexer(query, shape, client, network).await?,
        FetchStrategy::PluginMethod => fetch_via_plugin_method(query, Some(client)).await?,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        plugin_type = %query.plugin_type,
        strategy = ?strategy,
        identifiers = ids.len(),
        "resolving creator proposals"
    );

    let records = resolve_all(&ids, client, network, details).await?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        resolved = records.len(),
        dropped = ids.len() - records.len(),
        "creator proposals aggregated"
    );

    Ok((records, ids.len()))
}

/// Resolves every identifier concurrently and keeps the present records in
/// identifier order.
pub async fn resolve_all(
    ids: &[ProposalId],
    client: &dyn PluginClient,
    network: &Network,
    details: &dyn DetailResolver,
) -> Result<Vec<ProposalRecord>> {
    let lookups = ids
        .iter()
        .map(|id| details.resolve_detail(client, id, network));
    let outcomes = join_all(lookups).await;

    let mut records = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if let Some(record) = outcome? {
            records.push(record);
        }
    }
    Ok(records)
}
