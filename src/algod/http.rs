use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::types::SendResponse;
use super::{
    AlgodClient, AlgodError, CompiledProgram, DryrunResponse, NodeStatus, PendingTransaction,
    SuggestedParams,
};
use crate::config::{AuthHeader, NodeConfig};
use crate::txn::{Address, TxId};

const BINARY_CONTENT: &str = "application/x-binary";
const MSGPACK_CONTENT: &str = "application/msgpack";
const TEXT_CONTENT: &str = "text/plain";

#[derive(Clone)]
pub struct HttpAlgodClient {
    base_url: Url,
    client: reqwest::Client,
    auth_header: AuthHeader,
    token: String,
    request_timeout: Duration,
}

impl fmt::Debug for HttpAlgodClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAlgodClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth_header", &self.auth_header.as_str())
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl HttpAlgodClient {
    pub fn new(client: reqwest::Client, node: &NodeConfig) -> Result<Self, AlgodError> {
        let base_url = Url::parse(node.address.trim()).map_err(|source| {
            AlgodError::InvalidAddress {
                address: node.address.clone(),
                source,
            }
        })?;
        Ok(Self {
            base_url,
            client,
            auth_header: node.auth_header,
            token: node.token.clone(),
            request_timeout: node.request_timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.request_timeout)
            .header(self.auth_header.as_str(), &self.token)
    }

    async fn send(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AlgodError> {
        let started = Instant::now();
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                AlgodError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }
            } else {
                AlgodError::Http(err)
            }
        })?;
        trace!(
            target: "algod::http",
            endpoint,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "algod 响应"
        );
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, AlgodError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AlgodError::Api {
                endpoint: endpoint.to_string(),
                status,
                message: error_message(&body),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlgodError> {
        let url = self.endpoint(path);
        let response = self
            .send(path, self.request(reqwest::Method::GET, &url))
            .await?;
        Self::read_json(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &[u8],
        content_type: &'static str,
    ) -> Result<T, AlgodError> {
        let url = self.endpoint(path);
        let builder = self
            .request(reqwest::Method::POST, &url)
            .header(CONTENT_TYPE, content_type)
            .body(body.to_vec());
        let response = self.send(path, builder).await?;
        Self::read_json(path, response).await
    }
}

/// algod 错误体为 `{"message": "..."}`；无法解析时保留原文。
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl AlgodClient for HttpAlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams, AlgodError> {
        self.get_json("/v2/transactions/params").await
    }

    async fn compile(&self, source: &[u8]) -> Result<CompiledProgram, AlgodError> {
        self.post_json("/v2/teal/compile", source, TEXT_CONTENT)
            .await
    }

    async fn send_raw(&self, payload: &[u8]) -> Result<TxId, AlgodError> {
        let path = "/v2/transactions";
        let url = self.endpoint(path);
        let builder = self
            .request(reqwest::Method::POST, &url)
            .header(CONTENT_TYPE, BINARY_CONTENT)
            .body(payload.to_vec());
        let response = self.send(path, builder).await?;
        let status = response.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await?;
            return Err(AlgodError::Rejected {
                message: error_message(&body),
            });
        }
        let sent: SendResponse = Self::read_json(path, response).await?;
        debug!(target: "algod::http", tx_id = %sent.tx_id, bytes = payload.len(), "广播已被节点接受");
        Ok(TxId::from(sent.tx_id))
    }

    async fn pending_transaction(&self, tx_id: &TxId) -> Result<PendingTransaction, AlgodError> {
        self.get_json(&format!(
            "/v2/transactions/pending/{}?format=json",
            tx_id.as_str()
        ))
        .await
    }

    async fn status(&self) -> Result<NodeStatus, AlgodError> {
        self.get_json("/v2/status").await
    }

    async fn status_after_round(&self, round: u64) -> Result<NodeStatus, AlgodError> {
        self.get_json(&format!("/v2/status/wait-for-block-after/{round}"))
            .await
    }

    async fn dryrun(&self, request: &[u8]) -> Result<DryrunResponse, AlgodError> {
        let raw: Value = self
            .post_json("/v2/teal/dryrun", request, MSGPACK_CONTENT)
            .await?;
        let mut response: DryrunResponse = serde_json::from_value(raw.clone())?;
        response.raw = raw;
        Ok(response)
    }

    async fn application(&self, app_id: u64) -> Result<Value, AlgodError> {
        self.get_json(&format!("/v2/applications/{app_id}")).await
    }

    async fn asset(&self, asset_id: u64) -> Result<Value, AlgodError> {
        self.get_json(&format!("/v2/assets/{asset_id}")).await
    }

    async fn account(&self, address: &Address) -> Result<Value, AlgodError> {
        self.get_json(&format!("/v2/accounts/{address}")).await
    }
}
