//! Test helpers: HTTP clients pointed at a wiremock server.

use crate::{
    client::{Config, IndexerClient},
    plugin::HttpPluginClient,
    types::PluginType,
    RetryConfig,
};

/// Create an indexer client pointed at a wiremock server.
/// Disables retries for predictable test behavior.
pub fn test_indexer(endpoint: &str) -> IndexerClient {
    IndexerClient::new(Config {
        endpoint: Some(endpoint.to_string()),
        retry: Some(RetryConfig::disabled()),
        ..Default::default()
    })
    .expect("indexer client")
}

/// HTTP plugin client pointed at a wiremock server.
pub fn test_plugin_client(plugin_type: PluginType, endpoint: &str) -> HttpPluginClient {
    HttpPluginClient::new(plugin_type, test_indexer(endpoint))
}
