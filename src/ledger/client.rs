//! IRI HTTP API client
//!
//! The node speaks a single-endpoint JSON command protocol: every call is a
//! POST with a `command` field and the `X-IOTA-API-Version` header. The
//! composite operations (`replay_bundle`, `promote_transaction`) are built
//! from the node's primitives: tip selection and attachment are invoked on
//! the node, never computed locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::errors::LedgerError;
use super::trytes;
use crate::config::NodeConfig;
use crate::types::{SpamTransfer, TransactionRecord};

/// Subset of getNodeInfo the confirmation engine cares about
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    /// Latest milestone hash, the reference point for inclusion checks
    pub latest_milestone: String,
    #[serde(default)]
    pub latest_milestone_index: u64,
}

/// Capability boundary between the confirmation engine and the node
///
/// Stateless per call and safe for concurrent use; trackers share one
/// instance behind an `Arc`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Query transaction hashes matching a bundle hash and address
    async fn find_transactions(
        &self,
        bundle: &str,
        address: &str,
    ) -> Result<Vec<String>, LedgerError>;

    /// Fetch node info, including the latest milestone
    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError>;

    /// Fetch inclusion states of transactions as of a milestone
    async fn get_inclusion_states(
        &self,
        hashes: &[String],
        milestone: &str,
    ) -> Result<Vec<bool>, LedgerError>;

    /// Rebroadcast a bundle from its tail under freshly selected tips;
    /// returns the reattached bundle's transactions
    async fn replay_bundle(
        &self,
        tail_hash: &str,
        depth: u32,
        min_weight_magnitude: u32,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    /// Issue a zero-value spam transaction referencing a tail to add
    /// confirmation weight
    async fn promote_transaction(
        &self,
        tail_hash: &str,
        depth: u32,
        min_weight_magnitude: u32,
        transfer: &SpamTransfer,
    ) -> Result<TransactionRecord, LedgerError>;
}

/// HTTP client for a live IRI node
pub struct IriClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TipsResponse {
    trunk_transaction: String,
    branch_transaction: String,
}

impl IriClient {
    /// Build a client against the configured node
    pub fn new(node: &NodeConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(node.timeout_secs))
            .build()
            .map_err(|e| LedgerError::from_reqwest("clientInit", e))?;
        Ok(Self {
            http,
            endpoint: node.endpoint.clone(),
            api_version: node.api_version.clone(),
        })
    }

    /// One round-trip of the command protocol
    async fn command(&self, name: &'static str, body: Value) -> Result<Value, LedgerError> {
        debug!(command = name, "issuing node command");
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-IOTA-API-Version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::from_reqwest(name, e))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::from_reqwest(name, e))?;

        if !status.is_success() {
            let message = payload
                .get("error")
                .or_else(|| payload.get("exception"))
                .and_then(Value::as_str)
                .unwrap_or("unknown node error")
                .to_string();
            return Err(LedgerError::Api {
                command: name,
                status: status.as_u16(),
                message,
            });
        }
        Ok(payload)
    }

    fn expect_string_array(
        payload: &Value,
        field: &str,
        command: &'static str,
    ) -> Result<Vec<String>, LedgerError> {
        payload
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| LedgerError::UnexpectedResponse {
                command,
                message: format!("missing {} field", field),
            })
    }

    async fn get_trytes(&self, hashes: &[String]) -> Result<Vec<String>, LedgerError> {
        let payload = self
            .command("getTrytes", json!({ "command": "getTrytes", "hashes": hashes }))
            .await?;
        Self::expect_string_array(&payload, "trytes", "getTrytes")
    }

    async fn get_transactions_to_approve(
        &self,
        depth: u32,
        reference: Option<&str>,
    ) -> Result<TipsResponse, LedgerError> {
        let mut body = json!({ "command": "getTransactionsToApprove", "depth": depth });
        if let Some(reference) = reference {
            body["reference"] = json!(reference);
        }
        let payload = self.command("getTransactionsToApprove", body).await?;
        serde_json::from_value(payload).map_err(|e| LedgerError::UnexpectedResponse {
            command: "getTransactionsToApprove",
            message: e.to_string(),
        })
    }

    async fn attach_to_tangle(
        &self,
        trunk: &str,
        branch: &str,
        min_weight_magnitude: u32,
        trytes: &[String],
    ) -> Result<Vec<String>, LedgerError> {
        let payload = self
            .command(
                "attachToTangle",
                json!({
                    "command": "attachToTangle",
                    "trunkTransaction": trunk,
                    "branchTransaction": branch,
                    "minWeightMagnitude": min_weight_magnitude,
                    "trytes": trytes,
                }),
            )
            .await?;
        Self::expect_string_array(&payload, "trytes", "attachToTangle")
    }

    async fn store_and_broadcast(&self, trytes: &[String]) -> Result<(), LedgerError> {
        self.command(
            "storeTransactions",
            json!({ "command": "storeTransactions", "trytes": trytes }),
        )
        .await?;
        self.command(
            "broadcastTransactions",
            json!({ "command": "broadcastTransactions", "trytes": trytes }),
        )
        .await?;
        Ok(())
    }

    /// Walk the trunk chain from a tail and collect the bundle's trytes in
    /// index order
    async fn collect_bundle_trytes(&self, tail_hash: &str) -> Result<Vec<String>, LedgerError> {
        let mut chain = Vec::new();
        let mut cursor = tail_hash.to_string();
        loop {
            let fetched = self.get_trytes(&[cursor.clone()]).await?;
            let raw = fetched
                .into_iter()
                .next()
                .ok_or_else(|| LedgerError::UnexpectedResponse {
                    command: "getTrytes",
                    message: format!("node returned no trytes for {}", cursor),
                })?;
            let tx = trytes::parse_transaction(&raw)?;
            if chain.is_empty() && !tx.is_tail() {
                return Err(LedgerError::MalformedTransaction(format!(
                    "{} is not a tail transaction (currentIndex {})",
                    cursor, tx.current_index
                )));
            }
            let done = tx.current_index == tx.last_index;
            let next = tx.trunk.clone();
            chain.push(raw);
            if done {
                return Ok(chain);
            }
            if chain.len() as u64 > tx.last_index {
                return Err(LedgerError::MalformedTransaction(format!(
                    "trunk chain of {} exceeds its lastIndex {}",
                    tail_hash, tx.last_index
                )));
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl LedgerClient for IriClient {
    async fn find_transactions(
        &self,
        bundle: &str,
        address: &str,
    ) -> Result<Vec<String>, LedgerError> {
        let payload = self
            .command(
                "findTransactions",
                json!({
                    "command": "findTransactions",
                    "bundles": [bundle],
                    "addresses": [address],
                }),
            )
            .await?;
        Self::expect_string_array(&payload, "hashes", "findTransactions")
    }

    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError> {
        let payload = self
            .command("getNodeInfo", json!({ "command": "getNodeInfo" }))
            .await?;
        serde_json::from_value(payload).map_err(|e| LedgerError::UnexpectedResponse {
            command: "getNodeInfo",
            message: e.to_string(),
        })
    }

    async fn get_inclusion_states(
        &self,
        hashes: &[String],
        milestone: &str,
    ) -> Result<Vec<bool>, LedgerError> {
        let payload = self
            .command(
                "getInclusionStates",
                json!({
                    "command": "getInclusionStates",
                    "transactions": hashes,
                    "tips": [milestone],
                }),
            )
            .await?;
        payload
            .get("states")
            .and_then(Value::as_array)
            .map(|states| states.iter().filter_map(Value::as_bool).collect())
            .ok_or_else(|| LedgerError::UnexpectedResponse {
                command: "getInclusionStates",
                message: "missing states field".to_string(),
            })
    }

    async fn replay_bundle(
        &self,
        tail_hash: &str,
        depth: u32,
        min_weight_magnitude: u32,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let bundle_trytes = self.collect_bundle_trytes(tail_hash).await?;
        let tips = self.get_transactions_to_approve(depth, None).await?;

        // The attach step expects head-first order
        let mut to_attach = bundle_trytes;
        to_attach.reverse();
        let attached = self
            .attach_to_tangle(
                &tips.trunk_transaction,
                &tips.branch_transaction,
                min_weight_magnitude,
                &to_attach,
            )
            .await?;
        self.store_and_broadcast(&attached).await?;

        attached
            .iter()
            .map(|t| trytes::parse_transaction(t))
            .collect()
    }

    async fn promote_transaction(
        &self,
        tail_hash: &str,
        depth: u32,
        min_weight_magnitude: u32,
        transfer: &SpamTransfer,
    ) -> Result<TransactionRecord, LedgerError> {
        // Referencing the tail during tip selection is what ties the spam
        // transaction's weight to the promoted bundle
        let tips = self
            .get_transactions_to_approve(depth, Some(tail_hash))
            .await?;
        let spam = trytes::build_spam_transaction(&transfer.address)?;
        let attached = self
            .attach_to_tangle(
                &tips.trunk_transaction,
                &tips.branch_transaction,
                min_weight_magnitude,
                &[spam],
            )
            .await?;
        self.store_and_broadcast(&attached).await?;

        let head = attached
            .first()
            .ok_or_else(|| LedgerError::UnexpectedResponse {
                command: "attachToTangle",
                message: "empty trytes in attach response".to_string(),
            })?;
        trytes::parse_transaction(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(url: &str) -> IriClient {
        IriClient::new(&NodeConfig {
            endpoint: url.to_string(),
            api_version: "1".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_node_info() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-iota-api-version", "1")
            .match_body(Matcher::PartialJsonString(
                r#"{"command":"getNodeInfo"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"appName":"IRI","appVersion":"1.5.5","latestMilestone":"MILESTONEAAA","latestMilestoneIndex":42}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let info = client.get_node_info().await.unwrap();
        assert_eq!(info.latest_milestone, "MILESTONEAAA");
        assert_eq!(info.latest_milestone_index, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_transactions_sends_bundle_and_address() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJsonString(r#"{"command":"findTransactions"}"#.to_string()),
                Matcher::PartialJsonString(r#"{"bundles":["BUNDLEHASH"]}"#.to_string()),
                Matcher::PartialJsonString(r#"{"addresses":["ADDRESSHASH"]}"#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"hashes":["TXA","TXB"]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let hashes = client
            .find_transactions("BUNDLEHASH", "ADDRESSHASH")
            .await
            .unwrap();
        assert_eq!(hashes, vec!["TXA".to_string(), "TXB".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_inclusion_states() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"command":"getInclusionStates"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"states":[false,true]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let states = client
            .get_inclusion_states(&["TXA".to_string(), "TXB".to_string()], "MILESTONE")
            .await
            .unwrap();
        assert_eq!(states, vec![false, true]);
    }

    #[tokio::test]
    async fn test_node_error_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"error":"Invalid addresses input"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .find_transactions("BUNDLE", "ADDRESS")
            .await
            .unwrap_err();
        match err {
            LedgerError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid addresses input");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_field_is_unexpected_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"duration":3}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .find_transactions("BUNDLE", "ADDRESS")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnexpectedResponse { .. }));
        assert!(!err.is_retryable());
    }
}
