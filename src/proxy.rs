//! Transparent ingestion proxy in front of the node
//!
//! Every request is forwarded to the configured node unchanged; the proxy
//! never alters a payload or a response. On the way through, transaction
//! submissions are observed off the hot path: the submission body is handed
//! to a background task that parses it and schedules confirmation tracking,
//! so a slow or failing observation can never delay the client's call.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{self, header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ledger::trytes;
use crate::metrics;
use crate::tracker::{group_by_bundle, TrackerRegistry};

/// Header that marks a request as a node API command
const API_VERSION_HEADER: &str = "x-iota-api-version";

/// Node commands whose trytes represent a transaction submission
const SUBMISSION_COMMANDS: [&str; 2] = ["attachToTangle", "storeTransactions"];

/// Shared state behind the proxy handlers
pub struct ProxyState {
    http: reqwest::Client,
    upstream: String,
    registry: Arc<TrackerRegistry>,
    max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(
        config: &Config,
        registry: Arc<TrackerRegistry>,
    ) -> Result<Arc<Self>, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.node.timeout_secs))
            .build()?;
        Ok(Arc::new(Self {
            http,
            upstream: config.node.endpoint.trim_end_matches('/').to_string(),
            registry,
            max_body_bytes: config.proxy.max_body_bytes,
        }))
    }
}

/// The JSON envelope of a node API command; only the fields the observer
/// needs are pulled out
#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    command: String,
    #[serde(default)]
    trytes: Vec<String>,
}

/// Build the proxy router; everything funnels through the forward handler
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new().fallback(forward).with_state(state)
}

/// Bind the proxy listener and serve until the task is dropped
pub async fn serve(config: &Config, state: Arc<ProxyState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.proxy.listen_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, upstream = %state.upstream, "proxy listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Forward one request to the node, observing submissions on the side
async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(
                limit = state.max_body_bytes,
                "rejecting request body over the size limit"
            );
            return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }
    };

    if parts.method == Method::POST && parts.headers.contains_key(API_VERSION_HEADER) {
        let registry = Arc::clone(&state.registry);
        let payload = body.clone();
        tokio::spawn(async move {
            observe_submission(&registry, &payload);
        });
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream, path_and_query);

    let upstream_request = state
        .http
        .request(parts.method.clone(), &url)
        .headers(forwardable_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    let upstream_response = match upstream_request {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "upstream request failed");
            return plain_response(StatusCode::BAD_GATEWAY, "upstream node unreachable");
        }
    };
    metrics::metrics().requests_proxied.inc();

    let status = upstream_response.status();
    let headers = forwardable_headers(upstream_response.headers());
    let body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %url, error = %e, "failed reading upstream response body");
            return plain_response(StatusCode::BAD_GATEWAY, "upstream response truncated");
        }
    };

    let mut builder = http::Response::builder().status(status);
    if let Some(map) = builder.headers_mut() {
        *map = headers;
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| plain_response(StatusCode::BAD_GATEWAY, "invalid upstream response"))
}

/// Inspect a submission payload and schedule tracking for its bundles
///
/// Anything that is not a well-formed submission command is silently
/// skipped; a malformed trytes array is counted and dropped. Nothing here
/// can fail the proxied request, which has already been forwarded.
fn observe_submission(registry: &Arc<TrackerRegistry>, payload: &Bytes) {
    let envelope: CommandEnvelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(_) => return,
    };
    if !SUBMISSION_COMMANDS.contains(&envelope.command.as_str()) {
        debug!(command = %envelope.command, "pass-through command, not a submission");
        return;
    }
    metrics::metrics().submissions_observed.inc();

    if let Err(e) = trytes::validate_trytes_array(&envelope.trytes) {
        warn!(command = %envelope.command, error = %e, "dropping malformed submission");
        metrics::metrics().submissions_rejected.inc();
        return;
    }

    match group_by_bundle(&envelope.trytes) {
        Ok(groups) => {
            for group in groups {
                registry.track(group);
            }
        }
        Err(e) => {
            warn!(command = %envelope.command, error = %e, "submission failed bundle grouping");
            metrics::metrics().submissions_rejected.inc();
        }
    }
}

/// Copy headers, dropping the hop-by-hop set the forwarding layer owns
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn plain_response(status: StatusCode, message: &'static str) -> Response {
    http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(message))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_bundle_group, MockLedgerClient};
    use crate::tracker::TrackerSettings;
    use std::time::Duration;

    fn registry(client: Arc<MockLedgerClient>) -> Arc<TrackerRegistry> {
        let settings = TrackerSettings {
            cadence: Duration::from_secs(60),
            ..TrackerSettings::default()
        };
        TrackerRegistry::new(client, settings)
    }

    fn submission_payload(command: &str, trytes: &[String]) -> Bytes {
        Bytes::from(
            serde_json::json!({ "command": command, "trytes": trytes }).to_string(),
        )
    }

    #[tokio::test]
    async fn test_submission_schedules_tracking() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = registry(client);
        let group = sample_bundle_group("OBSERVED", 2, 500);

        observe_submission(&registry, &submission_payload("attachToTangle", &group.trytes));
        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_tracking(&group.hash));
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_non_submission_command_is_ignored() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = registry(client);
        let group = sample_bundle_group("IGNORED", 2, 500);

        observe_submission(&registry, &submission_payload("getNodeInfo", &group.trytes));
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = registry(client);

        observe_submission(&registry, &Bytes::from_static(b"not json at all"));
        observe_submission(
            &registry,
            &submission_payload("storeTransactions", &["SHORT".to_string()]),
        );
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_bundle_submission_tracks_each_bundle() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = registry(client);
        let first = sample_bundle_group("FIRSTOFTWO", 1, 10);
        let second = sample_bundle_group("SECONDOFTWO", 1, 20);
        let mut trytes = first.trytes.clone();
        trytes.extend(second.trytes.clone());

        observe_submission(&registry, &submission_payload("storeTransactions", &trytes));
        assert_eq!(registry.active_count(), 2);
        assert!(registry.is_tracking(&first.hash));
        assert!(registry.is_tracking(&second.hash));
        registry.shutdown();
    }

    #[test]
    fn test_hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "proxy.local".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert("x-iota-api-version", "1".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let out = forwardable_headers(&headers);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONTENT_LENGTH).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(out.get("x-iota-api-version").unwrap(), "1");
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }
}
