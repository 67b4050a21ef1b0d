//! Transmission RPC download client.

use crate::config::{FeedConfig, ServerConfig};
use crate::dispatch::{Dispatch, DispatchError};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Hands links to a Transmission daemon with `torrent-add` RPC calls.
///
/// Transmission wants a session id on every call: the first request fetches
/// one, and a 409 reply means the cached id expired and carries the
/// replacement, so the call is repeated once with it.
pub struct TransmissionClient {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    session_id: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    result: String,
}

impl TransmissionClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create RPC HTTP client")?;

        Ok(Self {
            client,
            url: format!("http://{}:{}{}", config.host, config.port, config.rpc_path),
            auth: config.username.clone().zip(config.password.clone()),
            session_id: Mutex::new(None),
        })
    }

    async fn add_torrent(
        &self,
        url: &str,
        download_path: Option<&str>,
    ) -> Result<(), DispatchError> {
        let mut arguments = json!({ "filename": url, "paused": false });
        if let Some(path) = download_path {
            arguments["download-dir"] = json!(path);
        }
        let body = json!({ "method": "torrent-add", "arguments": arguments });

        let mut session_id = self.session_id.lock().await;
        if session_id.is_none() {
            *session_id = Some(self.fetch_session_id().await?);
        }

        let mut response = self
            .rpc_request(&body, session_id.as_deref().unwrap_or_default())
            .send()
            .await
            .map_err(classify_transport)?;

        // A 409 reply carries a fresh session id; repeat the call once with it.
        if response.status() == reqwest::StatusCode::CONFLICT {
            let fresh = session_id_of(&response).ok_or_else(|| {
                DispatchError::Other(anyhow!("409 reply carried no {SESSION_ID_HEADER} header"))
            })?;
            tracing::debug!("Session id expired, retrying with a fresh one");
            response = self
                .rpc_request(&body, &fresh)
                .send()
                .await
                .map_err(classify_transport)?;
            *session_id = Some(fresh);
        }
        drop(session_id);

        match response.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(DispatchError::RateLimited),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(DispatchError::Unauthorized);
            }
            status if !status.is_success() => {
                return Err(DispatchError::Other(anyhow!(
                    "RPC endpoint answered {status}"
                )));
            }
            _ => {}
        }

        let reply: RpcReply = response
            .json()
            .await
            .map_err(|error| DispatchError::Other(anyhow!(error).context("Malformed RPC reply")))?;
        if reply.result != "success" {
            return Err(DispatchError::Other(anyhow!(
                "RPC call failed: {}",
                reply.result
            )));
        }

        Ok(())
    }

    /// Asks the endpoint for a session id. Transmission answers the bare GET
    /// with a 409, which still carries the header.
    async fn fetch_session_id(&self) -> Result<String, DispatchError> {
        let mut request = self.client.get(&self.url);
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, Some(password));
        }
        let response = request.send().await.map_err(classify_transport)?;

        match response.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(DispatchError::Unauthorized);
            }
            _ => {}
        }

        session_id_of(&response).ok_or_else(|| {
            DispatchError::Other(anyhow!("RPC endpoint sent no {SESSION_ID_HEADER} header"))
        })
    }

    fn rpc_request(&self, body: &serde_json::Value, session_id: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .header(SESSION_ID_HEADER, session_id)
            .json(body);
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, Some(password));
        }
        request
    }
}

#[async_trait]
impl Dispatch for TransmissionClient {
    async fn deliver(
        &self,
        url: &str,
        _feed: &FeedConfig,
        download_path: Option<&str>,
    ) -> Result<(), DispatchError> {
        tracing::debug!("torrent-add {url}");
        self.add_torrent(url, download_path).await
    }
}

fn classify_transport(error: reqwest::Error) -> DispatchError {
    if error.is_timeout() {
        DispatchError::TimedOut
    } else if error.is_connect() {
        DispatchError::Unreachable(error.to_string())
    } else {
        DispatchError::Other(error.into())
    }
}

fn session_id_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(SESSION_ID_HEADER)?
        .to_str()
        .ok()
        .map(str::to_string)
}
