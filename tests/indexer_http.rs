//! Indexer client tests against a wiremock GraphQL endpoint.
//!
//! These tests verify:
//! - GraphQL request bodies and headers
//! - Error mapping (GraphQL errors, HTTP failures, malformed payloads)
//! - Retry behavior
//! - End-to-end aggregation through [`HttpPluginClient`]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use creator_proposals::{
    aggregate,
    indexer::MULTISIG_PROPOSALS_QUERY,
    testing::{test_indexer, test_plugin_client},
    ClientDetailResolver, Config, Error, GraphQlRequest, HeaderEntry, HeaderList,
    HttpPluginClient, IndexerClient, MetricsCallbacks, Network, PluginType, ProposalCreatorQuery,
    ProposalRecord, ProposalStatus, QueryExecutionError, RequestOptions, RetryConfig,
    TransportErrorKind,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[derive(Clone)]
struct SequenceResponder {
    templates: Arc<Mutex<VecDeque<ResponseTemplate>>>,
}

impl SequenceResponder {
    fn new(templates: Vec<ResponseTemplate>) -> Self {
        Self {
            templates: Arc::new(Mutex::new(templates.into_iter().collect())),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let mut templates = self.templates.lock().expect("mutex should not be poisoned");
        templates.pop_front().unwrap_or_else(|| {
            ResponseTemplate::new(500).set_body_json(json!({
                "errors": [{ "message": "no more mock responses configured" }]
            }))
        })
    }
}

fn ethereum() -> Network {
    Network::new("ethereum")
}

fn endpoint(server: &MockServer) -> String {
    format!("{}/subgraphs/dao", server.uri())
}

fn multisig_request() -> GraphQlRequest {
    GraphQlRequest::new("MultisigProposals", MULTISIG_PROPOSALS_QUERY, json!({}))
        .expect("request")
}

fn multisig_entity(id: &str, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "dao": { "id": "0xdao" },
        "creator": "0xcreator",
        "metadata": "ipfs://Qm",
        "createdAt": created_at,
        "creationBlockNumber": "42",
        "startDate": created_at,
        "endDate": "1700000000",
        "executed": true,
        "executionTxHash": "0xtx",
        "approvalReached": true,
        "minApprovals": 2,
        "approvers": [{ "id": "0xa" }, { "id": "0xb" }]
    })
}

#[tokio::test]
async fn posts_graphql_document_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subgraphs/dao"))
        .and(header("authorization", "Bearer graph-key"))
        .and(header("x-client", concat!("creator-proposals/", env!("CARGO_PKG_VERSION"))))
        .and(body_partial_json(json!({
            "operationName": "MultisigProposals",
            "variables": {
                "where": { "plugin": "0xplugin", "creator": "0xcreator" },
                "block": null,
                "direction": "desc",
                "sortBy": "createdAt"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "multisigProposals": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpPluginClient::from_config(
        PluginType::Multisig,
        Config {
            endpoint: Some(endpoint(&server)),
            api_key: Some("graph-key".into()),
            retry: Some(RetryConfig::disabled()),
            ..Default::default()
        },
    )
    .expect("client");
    let query = ProposalCreatorQuery::new("0xPlugin", "0xCREATOR", PluginType::Multisig);

    let network = Network::new("sepolia");
    let records = aggregate(&query, Some(&client), &network, &ClientDetailResolver)
        .await
        .expect("aggregate");
    assert!(records.is_empty());
}

#[tokio::test]
async fn resolves_multisig_details_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "MultisigProposals" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "multisigProposals": [{ "id": "0xp_0x1" }, { "id": "0xp_0x9" }, { "id": "0xp_0x0" }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "MultisigProposal",
            "variables": { "proposalId": "0xp_0x1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "multisigProposal": multisig_entity("0xp_0x1", "1600000200") }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "MultisigProposal",
            "variables": { "proposalId": "0xp_0x9" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "multisigProposal": null }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "MultisigProposal",
            "variables": { "proposalId": "0xp_0x0" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "multisigProposal": multisig_entity("0xp_0x0", "1600000100") }
        })))
        .mount(&server)
        .await;

    let client = test_plugin_client(PluginType::Multisig, &endpoint(&server));
    let query = ProposalCreatorQuery::new("0xp", "0xcreator", PluginType::Multisig);

    let records = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .expect("aggregate");

    let ids: Vec<_> = records.iter().map(|r| r.id().as_str()).collect();
    assert_eq!(ids, vec!["0xp_0x1", "0xp_0x0"]);
    match &records[0] {
        ProposalRecord::Multisig(p) => {
            assert_eq!(p.base.status, ProposalStatus::Executed);
            assert_eq!(p.base.creation_date.timestamp(), 1_600_000_200);
            assert_eq!(p.base.execution_tx_hash.as_deref(), Some("0xtx"));
            assert_eq!(p.approvals.len(), 2);
            assert_eq!(p.min_approvals, 2);
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn gasless_member_proposals_query_the_plugin_entities() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "GaslessMemberProposals",
            "variables": {
                "where": { "plugin": "0xgasless", "creator": "0xmember" },
                "block": { "number": 900 },
                "direction": "desc",
                "sortBy": "createdAt"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "gaslessVotingProposals": [{ "id": "g1" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "GaslessVotingProposal",
            "variables": { "proposalId": "g1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "gaslessVotingProposal": {
                    "id": "g1",
                    "dao": { "id": "0xdao" },
                    "creator": "0xmember",
                    "metadata": null,
                    "createdAt": "1600000000",
                    "creationBlockNumber": "800",
                    "startDate": "1600000000",
                    "endDate": "1600086400",
                    "tallyEndDate": "1600172800",
                    "executed": false,
                    "executionTxHash": null,
                    "vochainProposalId": "0xvoc",
                    "approvers": [],
                    "supportThreshold": "500000",
                    "minParticipation": "100000",
                    "totalVotingPower": "1000",
                    "yes": "10",
                    "no": "30",
                    "abstain": "0"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_plugin_client(PluginType::Gasless, &endpoint(&server));
    let query =
        ProposalCreatorQuery::new("0xGasless", "0xMember", PluginType::Gasless).at_block(900);

    let records = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .expect("aggregate");

    assert_eq!(records.len(), 1);
    match &records[0] {
        ProposalRecord::Gasless(p) => {
            assert_eq!(p.vochain_proposal_id, "0xvoc");
            assert_eq!(p.base.metadata, None);
            // Voting closed long ago without enough support.
            assert_eq!(p.base.status, ProposalStatus::Defeated);
            assert_eq!(p.tally.no, 30);
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn graphql_errors_fail_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [
                { "message": "indexing_error", "path": ["multisigProposals"] },
                { "message": "store error" }
            ]
        })))
        .mount(&server)
        .await;

    let client = test_plugin_client(PluginType::Multisig, &endpoint(&server));
    let query = ProposalCreatorQuery::new("0xp", "0xc", PluginType::Multisig);
    let err = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .unwrap_err();

    match err {
        Error::QueryExecution(QueryExecutionError::GraphQl(errors)) => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].message, "indexing_error");
            assert_eq!(errors[0].path, vec![json!("multisigProposals")]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn http_failure_surfaces_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(502)
                .insert_header("X-Request-Id", "req_upstream")
                .set_body_json(json!({ "message": "bad gateway" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_plugin_client(PluginType::TokenVoting, &endpoint(&server));
    let query = ProposalCreatorQuery::new("0xp", "0xc", PluginType::TokenVoting);
    let err = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .unwrap_err();

    match err {
        Error::QueryExecution(QueryExecutionError::Http(http)) => {
            assert_eq!(http.status, 502);
            assert_eq!(http.message, "bad gateway");
            assert_eq!(http.request_id.as_deref(), Some("req_upstream"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = test_plugin_client(PluginType::Multisig, &endpoint(&server));
    let query = ProposalCreatorQuery::new("0xp", "0xc", PluginType::Multisig);
    let err = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::QueryExecution(QueryExecutionError::Malformed(_))),
        "{err:?}"
    );
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(503),
            ResponseTemplate::new(200).set_body_json(json!({
                "data": { "tokenVotingProposals": [] }
            })),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let http_events = Arc::new(Mutex::new(Vec::new()));
    let sink = http_events.clone();
    let client = HttpPluginClient::new(
        PluginType::TokenVoting,
        IndexerClient::new(Config {
            endpoint: Some(endpoint(&server)),
            retry: Some(RetryConfig {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            }),
            metrics: Some(MetricsCallbacks {
                http_request: Some(Arc::new(move |m| sink.lock().unwrap().push(m))),
                ..Default::default()
            }),
            ..Default::default()
        })
        .expect("client"),
    );
    let query = ProposalCreatorQuery::new("0xp", "0xc", PluginType::TokenVoting);

    let records = aggregate(&query, Some(&client), &ethereum(), &ClientDetailResolver)
        .await
        .expect("aggregate");
    assert!(records.is_empty());

    let events = http_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, Some(200));
    assert_eq!(events[0].context.operation.as_deref(), Some("TokenVotingProposals"));
    let retries = events[0].retries.as_ref().expect("retry metadata");
    assert_eq!(retries.attempts, 2);
    assert_eq!(retries.last_status, Some(503));
}

#[tokio::test]
async fn missing_endpoint_is_a_config_error() {
    let err = IndexerClient::new(Config::default()).err().expect("error");
    assert!(matches!(err, Error::Config(_)), "{err:?}");

    let err = IndexerClient::new(Config {
        endpoint: Some("not a url".into()),
        ..Default::default()
    })
    .err()
    .expect("error");
    assert!(err.to_string().contains("invalid indexer endpoint"), "{err}");
}

#[tokio::test]
async fn empty_data_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let indexer = test_indexer(&endpoint(&server));
    let request = multisig_request();
    let err = indexer
        .execute(&request, Default::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("response has no data"), "{err}");
}

#[tokio::test]
async fn sends_request_id_and_custom_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-request-id", "req_creator_1"))
        .and(header("x-gateway", "dao-indexer"))
        .and(header("x-trace", "t-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "multisigProposals": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let http_events = Arc::new(Mutex::new(Vec::new()));
    let sink = http_events.clone();
    let mut defaults = HeaderList::new();
    defaults.push(HeaderEntry::new("X-Gateway".into(), "dao-indexer".into()));
    let indexer = IndexerClient::new(Config {
        endpoint: Some(endpoint(&server)),
        retry: Some(RetryConfig::disabled()),
        default_headers: Some(defaults),
        metrics: Some(MetricsCallbacks {
            http_request: Some(Arc::new(move |m| sink.lock().unwrap().push(m))),
            ..Default::default()
        }),
        ..Default::default()
    })
    .expect("client");

    let options = RequestOptions::default()
        .with_request_id("req_creator_1")
        .with_header("X-Trace", "t-42");
    let data = indexer
        .execute(&multisig_request(), options)
        .await
        .expect("execute");

    assert_eq!(data, json!({ "multisigProposals": [] }));
    let events = http_events.lock().unwrap();
    assert_eq!(events[0].context.request_id.as_deref(), Some("req_creator_1"));
}

#[tokio::test]
async fn per_call_timeout_overrides_the_client_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({ "data": { "multisigProposals": [] } })),
        )
        .mount(&server)
        .await;

    let indexer = test_indexer(&endpoint(&server));
    let options = RequestOptions::default().with_timeout(Duration::from_millis(50));
    let err = indexer
        .execute(&multisig_request(), options)
        .await
        .unwrap_err();

    match err {
        Error::QueryExecution(QueryExecutionError::Transport(transport)) => {
            assert_eq!(transport.kind, TransportErrorKind::Timeout);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn per_call_retry_overrides_the_client_policy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429),
            ResponseTemplate::new(200).set_body_json(json!({
                "data": { "multisigProposals": [{ "id": "0xp_0x0" }] }
            })),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    // The client itself never retries.
    let indexer = test_indexer(&endpoint(&server));
    let options = RequestOptions::default().with_retry(RetryConfig {
        max_attempts: 2,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    });
    let data = indexer
        .execute(&multisig_request(), options)
        .await
        .expect("execute");

    assert_eq!(data["multisigProposals"][0]["id"], "0xp_0x0");
}
