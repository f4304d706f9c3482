//! JSON-RPC client for the ledger.
//!
//! Requests go through a blocking `ureq` agent; the async [`RemoteClient`] methods move
//! each call onto tokio's blocking pool so the run loop never parks a runtime thread.
//!
//! Methods used:
//! - `getHealth` (start-up connectivity check)
//! - `getAccountInfo` (base64 encoding)
//! - `getLatestBlockhash`
//! - `sendTransaction` (base64 encoding)
//! - `getSignatureStatuses` (confirmation polling)

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use metadata_batch_types::Address;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::instruction::{encode_transaction, Instruction, Message};
use crate::{RemoteClient, Signer};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Confirmation polling: interval and number of polls before giving up.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONFIRM_MAX_POLLS: u32 = 60;

/// How settled a transaction must be before it counts as confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!(
                "unknown commitment '{}' (expected processed, confirmed or finalized)",
                other
            )),
        }
    }
}

/// JSON-RPC ledger client.
#[derive(Clone)]
pub struct RpcClient {
    endpoint: String,
    agent: ureq::Agent,
    commitment: Commitment,
    poll_interval: Duration,
    max_polls: u32,
}

impl RpcClient {
    /// Create a client with `confirmed` commitment.
    pub fn new(endpoint: &str) -> Self {
        Self::with_commitment(endpoint, Commitment::default())
    }

    pub fn with_commitment(endpoint: &str, commitment: Commitment) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
            commitment,
            poll_interval: CONFIRM_POLL_INTERVAL,
            max_polls: CONFIRM_MAX_POLLS,
        }
    }

    /// Override confirmation polling.
    pub fn with_confirmation_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Execute one JSON-RPC call and return its `result` member.
    fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, endpoint = %self.endpoint, "rpc request");

        let response: Value = match self.agent.post(&self.endpoint).send_json(body) {
            Ok(resp) => resp
                .into_json()
                .with_context(|| format!("{} returned a non-JSON body", method))?,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                bail!("{} failed with HTTP {}: {}", method, code, text.trim());
            }
            Err(e) => bail!("{} request failed: {}", method, e),
        };

        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| err.to_string());
            bail!("{} returned error: {}", method, message);
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("{} response has no result", method))
    }

    async fn call_async(&self, method: &'static str, params: Value) -> Result<Value> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.call(method, params))
            .await
            .map_err(|e| anyhow!("{} worker task failed: {}", method, e))?
    }

    /// Connectivity check; fails unless the node reports itself healthy.
    pub async fn health(&self) -> Result<()> {
        let result = self.call_async("getHealth", json!([])).await?;
        match result.as_str() {
            Some("ok") => Ok(()),
            _ => Err(anyhow!("node reported unhealthy status: {}", result)),
        }
    }

    pub async fn latest_blockhash(&self) -> Result<[u8; 32]> {
        let result = self
            .call_async(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        let text = result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("getLatestBlockhash response has no blockhash"))?;
        let bytes = bs58::decode(text)
            .into_vec()
            .with_context(|| format!("blockhash '{}' is not base58", text))?;
        bytes
            .try_into()
            .map_err(|_| anyhow!("blockhash '{}' is not 32 bytes", text))
    }

    /// Send a signed wire transaction, returning its signature as reported by the node.
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(wire);
        let result = self
            .call_async(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": self.commitment.as_str(),
                }]),
            )
            .await?;
        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("sendTransaction returned a non-string signature"))
    }

    /// Poll until `signature` reaches the configured commitment.
    pub async fn confirm(&self, signature: &str) -> Result<()> {
        for _ in 0..self.max_polls {
            let result = self
                .call_async("getSignatureStatuses", json!([[signature]]))
                .await?;
            let status = result.pointer("/value/0").cloned().unwrap_or(Value::Null);
            if !status.is_null() {
                if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                    bail!("transaction {} failed: {}", signature, err);
                }
                let reached = status
                    .get("confirmationStatus")
                    .and_then(|s| s.as_str())
                    .and_then(|s| s.parse::<Commitment>().ok());
                if reached.is_some_and(|level| level >= self.commitment) {
                    return Ok(());
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(anyhow!(
            "transaction {} not {} after {} polls",
            signature,
            self.commitment,
            self.max_polls
        ))
    }
}

#[async_trait::async_trait]
impl RemoteClient for RpcClient {
    async fn fetch_raw(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        let result = self
            .call_async(
                "getAccountInfo",
                json!([address.to_string(), {
                    "encoding": "base64",
                    "commitment": self.commitment.as_str(),
                }]),
            )
            .await?;
        let value = result.get("value").cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(None);
        }
        let encoded = value
            .pointer("/data/0")
            .and_then(|d| d.as_str())
            .ok_or_else(|| anyhow!("account {} has no base64 data", address))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .with_context(|| format!("account {} data is not valid base64", address))?;
        Ok(Some(bytes))
    }

    async fn submit(&self, instruction: &Instruction, signer: &dyn Signer) -> Result<String> {
        let fee_payer = signer.address();
        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(std::slice::from_ref(instruction), &fee_payer, blockhash)?;
        if message.signers() != [fee_payer] {
            bail!(
                "instruction needs {} signers, only the fee payer can sign",
                message.header.num_required_signatures
            );
        }
        let message_bytes = message.serialize();
        let signature = signer.sign(&message_bytes)?;
        let wire = encode_transaction(&[signature], &message_bytes);

        let signature = self.send_transaction(&wire).await?;
        self.confirm(&signature).await?;
        Ok(signature)
    }
}
