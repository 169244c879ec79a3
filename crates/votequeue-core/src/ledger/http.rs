//! JSON gateway client for the voting ledger.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{LedgerClient, LedgerError};
use crate::models::{ballot_problem, VoteBallot, VoterKey};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the gateway lives and how to sign through it
#[derive(Clone, PartialEq, Eq)]
pub struct LedgerGatewayConfig {
    pub base_url: String,
    /// Bearer credential of the transaction signer; `None` means no signer
    pub signer_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for LedgerGatewayConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LedgerGatewayConfig")
            .field("base_url", &self.base_url)
            .field(
                "signer_token",
                &self.signer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LedgerGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            signer_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_signer_token(mut self, token: Option<String>) -> Self {
        self.signer_token = normalize_text_option(token);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    signer_token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SubmitVoteRequest<'a> {
    voter_key: &'a str,
    candidate_id: &'a str,
    ward_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitVoteResponse {
    transaction_id: Option<String>,
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoterStatusResponse {
    has_voted: bool,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerGatewayConfig) -> Result<Self, LedgerError> {
        let base_url = normalize_base_url(config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| LedgerError::Unknown(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            signer_token: normalize_text_option(config.signer_token),
            client,
        })
    }

    /// Health endpoint suitable for connectivity probing
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    fn voter_status_url(&self, voter_key: &VoterKey) -> String {
        format!("{}/v1/voters/{}/status", self.base_url, voter_key.as_str())
    }

    fn votes_url(&self) -> String {
        format!("{}/v1/votes", self.base_url)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    fn signer_available(&self) -> bool {
        self.signer_token.is_some()
    }

    async fn has_already_voted(&self, voter_key: &VoterKey) -> Result<bool, LedgerError> {
        let response = self
            .client
            .get(self.voter_status_url(voter_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let payload = response
            .json::<VoterStatusResponse>()
            .await
            .map_err(|error| LedgerError::Unknown(format!("invalid voter status payload: {error}")))?;
        Ok(payload.has_voted)
    }

    async fn submit_vote(&self, ballot: &VoteBallot) -> Result<String, LedgerError> {
        if let Some(problem) = ballot_problem(ballot) {
            return Err(LedgerError::InvalidParameters(problem));
        }
        let Some(token) = self.signer_token.as_deref() else {
            return Err(LedgerError::Unavailable("no transaction signer configured".into()));
        };

        let request = SubmitVoteRequest {
            voter_key: ballot.voter_key.as_str(),
            candidate_id: ballot.candidate_selection.trim(),
            ward_id: ballot.ward_selection.trim(),
        };

        let response = self
            .client
            .post(self.votes_url())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let payload = response
            .json::<SubmitVoteResponse>()
            .await
            .map_err(|error| LedgerError::Unknown(format!("invalid vote receipt payload: {error}")))?;

        payload
            .transaction_id
            .or(payload.tx_hash)
            .and_then(|tx| normalize_text_option(Some(tx)))
            .ok_or_else(|| {
                LedgerError::Unknown("gateway response did not include transaction_id/tx_hash".into())
            })
    }
}

fn map_transport_error(error: reqwest::Error) -> LedgerError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        LedgerError::Unavailable(error.to_string())
    } else {
        LedgerError::Unknown(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &str) -> LedgerError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            LedgerError::InvalidParameters(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LedgerError::Rejected,
        StatusCode::CONFLICT => LedgerError::AlreadyVoted,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            LedgerError::Unavailable(message)
        }
        status if status.is_server_error() => LedgerError::Unavailable(message),
        _ => LedgerError::Unknown(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GatewayErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String, LedgerError> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        LedgerError::InvalidParameters("ledger gateway URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(LedgerError::InvalidParameters(
            "ledger gateway URL must include http:// or https://".to_string(),
        ))
    }
}
