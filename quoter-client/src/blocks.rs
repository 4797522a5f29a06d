//! Latest block tracking.
//!
//! [`BlockTracker`] publishes the latest known block of one chain. It only ever moves forward, a
//! delayed provider answer with an older block is ignored.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use quoter_common::{display::opt, models::ChainId};
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, trace, warn};

#[derive(Error, Debug)]
pub enum BlockProviderError {
    #[error("Failed to parse URL: {0}. Error: {1}")]
    UrlParsing(String, String),

    #[error("Unexpected HTTP client error: {0}")]
    HttpClient(String, #[source] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseResponse(String),

    #[error("Node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockNumberProvider: Send + Sync {
    async fn block_number(&self) -> Result<u64, BlockProviderError>;
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// Reads `eth_blockNumber` from a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct JsonRpcBlockProvider {
    http_client: Client,
    url: Url,
}

impl JsonRpcBlockProvider {
    pub fn new(rpc_url: &str) -> Result<Self, BlockProviderError> {
        let url = rpc_url
            .parse::<Url>()
            .map_err(|e| BlockProviderError::UrlParsing(rpc_url.to_string(), e.to_string()))?;
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BlockProviderError::HttpClient(e.to_string(), e))?;
        Ok(Self { http_client, url })
    }
}

#[async_trait]
impl BlockNumberProvider for JsonRpcBlockProvider {
    async fn block_number(&self) -> Result<u64, BlockProviderError> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []});
        let response = self
            .http_client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| BlockProviderError::HttpClient(e.to_string(), e))?;
        let text = response
            .text()
            .await
            .map_err(|e| BlockProviderError::ParseResponse(e.to_string()))?;
        let parsed = serde_json::from_str::<JsonRpcResponse>(&text)
            .map_err(|err| BlockProviderError::ParseResponse(format!("Error: {err}, Body: {text}")))?;

        if let Some(err) = parsed.error {
            return Err(BlockProviderError::Rpc { code: err.code, message: err.message });
        }
        let result = parsed
            .result
            .ok_or_else(|| BlockProviderError::ParseResponse(format!("No result in: {text}")))?;
        u64::from_str_radix(result.trim_start_matches("0x"), 16)
            .map_err(|e| BlockProviderError::ParseResponse(format!("Invalid block number {result}: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct BlockTracker {
    chain_id: ChainId,
    latest: Arc<watch::Sender<Option<u64>>>,
}

impl BlockTracker {
    pub fn new(chain_id: ChainId) -> Self {
        let (latest, _) = watch::channel(None);
        Self { chain_id, latest: Arc::new(latest) }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn latest(&self) -> Option<u64> {
        *self.latest.borrow()
    }

    /// Records a block. Returns whether the latest block moved.
    pub fn update(&self, block_number: u64) -> bool {
        let moved = self.latest.send_if_modified(|latest| match latest {
            Some(current) if *current >= block_number => false,
            _ => {
                *latest = Some(block_number);
                true
            }
        });
        if moved {
            trace!(chain_id = self.chain_id, block_number, "New latest block");
        } else {
            let latest = self.latest();
            trace!(
                chain_id = self.chain_id,
                block_number,
                latest = opt(&latest),
                "Ignoring block that is not newer than latest"
            );
        }
        moved
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.latest.subscribe()
    }

    /// Polls `provider` every `interval` until the returned task is aborted.
    pub fn spawn_poller<P>(&self, provider: P, interval: Duration) -> JoinHandle<()>
    where
        P: BlockNumberProvider + 'static,
    {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match provider.block_number().await {
                    Ok(block_number) => {
                        tracker.update(block_number);
                    }
                    Err(err) => {
                        warn!(chain_id = tracker.chain_id, error = %err, "Failed to fetch block number");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_tracker_is_monotonic() {
        let tracker = BlockTracker::new(1);

        assert_eq!(tracker.latest(), None);
        assert!(tracker.update(10));
        assert!(!tracker.update(9));
        assert!(!tracker.update(10));
        assert!(tracker.update(11));
        assert_eq!(tracker.latest(), Some(11));
    }

    #[tokio::test]
    async fn test_subscribe_sees_updates() {
        let tracker = BlockTracker::new(1);
        let mut rx = tracker.subscribe();

        tracker.update(5);
        rx.changed().await.unwrap();

        assert_eq!(*rx.borrow_and_update(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_updates_tracker() {
        let mut provider = MockBlockNumberProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_block_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(20));
        provider
            .expect_block_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BlockProviderError::ParseResponse("garbage".to_string())));
        provider
            .expect_block_number()
            .returning(|| Ok(19));
        let tracker = BlockTracker::new(1);
        let mut rx = tracker.subscribe();

        let poller = tracker.spawn_poller(provider, Duration::from_secs(12));
        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        poller.abort();

        assert_eq!(tracker.latest(), Some(20));
    }

    #[tokio::test]
    async fn test_json_rpc_block_number() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method": "eth_blockNumber"}"#.to_string()))
            .with_body(r#"{"jsonrpc": "2.0", "id": 1, "result": "0x1b4"}"#)
            .create_async()
            .await;
        let provider = JsonRpcBlockProvider::new(&server.url()).unwrap();

        let block = provider.block_number().await.unwrap();

        mocked_server.assert();
        assert_eq!(block, 436);
    }

    #[tokio::test]
    async fn test_json_rpc_error() {
        let mut server = Server::new_async().await;
        let _mocked = server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "header not found"}}"#)
            .create_async()
            .await;
        let provider = JsonRpcBlockProvider::new(&server.url()).unwrap();

        let err = provider.block_number().await.unwrap_err();

        assert!(matches!(err, BlockProviderError::Rpc { code: -32000, .. }));
    }
}
