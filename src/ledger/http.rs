//! JSON over HTTP transport for [`LedgerRpc`]
//!
//! Every boundary operation maps to one request:
//!
//! | operation                | request                          |
//! |--------------------------|----------------------------------|
//! | `query_utxos`            | `POST /utxos/query`              |
//! | `compute_signature_hash` | `POST /transactions/sighash`     |
//! | `finalize_transaction`   | `POST /transactions/finalize`    |
//! | `submit_transaction`     | `POST /transactions/submit`      |
//! | `fetch_transaction`      | `GET /transactions/{tx_hash}`    |
//!
//! Binary fields travel as lowercase hex through the data structures' serde
//! implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    data_structures::{
        Address, CanonicalTxBytes, ConfirmedTransaction, FinalizedTransaction, FixedHash,
        SignatureEntry, SignatureHashResponse, SighashType, SpendableOutput, SubmitResponse,
        TokenId, TransactionDraft,
    },
    errors::{DraftError, DraftResult, LedgerError, SerializationError},
    ledger::LedgerRpc,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct QueryUtxosRequest<'a> {
    owner: &'a Address,
    token_id: Option<&'a TokenId>,
}

#[derive(Serialize)]
struct SignatureHashRequest<'a> {
    draft: &'a TransactionDraft,
    input_index: u32,
    sighash_type: SighashType,
}

#[derive(Serialize)]
struct FinalizeRequest<'a> {
    draft: &'a TransactionDraft,
    canonical_unsigned_tx: &'a CanonicalTxBytes,
    signatures: &'a [SignatureEntry],
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    transaction: &'a FinalizedTransaction,
}

/// HTTP client for a remote ledger
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLedgerClient {
    /// Create a client without contacting the ledger
    pub fn new(base_url: impl Into<String>) -> DraftResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> DraftResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DraftError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DraftError::invalid_argument(
                "base_url",
                "",
                "ledger URL must not be empty",
            ));
        }
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B, R>(&self, step: &'static str, path: &str, body: &B) -> DraftResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(step, url = %url, "Ledger request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(step, e))?;
        decode(step, check_status(response).await?).await
    }

    async fn get_optional<R: DeserializeOwned>(
        &self,
        step: &'static str,
        path: &str,
    ) -> DraftResult<Option<R>> {
        let url = self.url(path);
        debug!(step, url = %url, "Ledger request");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(step, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(step, check_status(response).await?).await.map(Some)
    }
}

fn transport_error(step: &'static str, err: reqwest::Error) -> DraftError {
    if err.is_timeout() {
        warn!(step, "Ledger request timed out");
        return LedgerError::Timeout { step }.into();
    }
    warn!(step, error = %err, "Ledger request failed");
    LedgerError::Unreachable(err.to_string()).into()
}

async fn check_status(response: Response) -> DraftResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(LedgerError::Remote {
        status: status.as_u16(),
        message,
    }
    .into())
}

async fn decode<R: DeserializeOwned>(step: &'static str, response: Response) -> DraftResult<R> {
    let body = response.bytes().await.map_err(|e| transport_error(step, e))?;
    serde_json::from_slice(&body).map_err(|e| {
        SerializationError::JsonDeserializationError(format!("{step} response: {e}")).into()
    })
}

#[async_trait]
impl LedgerRpc for HttpLedgerClient {
    async fn query_utxos(
        &self,
        owner: &Address,
        token_id: Option<&TokenId>,
    ) -> DraftResult<Vec<SpendableOutput>> {
        self.post(
            "query_utxos",
            "utxos/query",
            &QueryUtxosRequest { owner, token_id },
        )
        .await
    }

    async fn compute_signature_hash(
        &self,
        draft: &TransactionDraft,
        input_index: u32,
        sighash_type: SighashType,
    ) -> DraftResult<SignatureHashResponse> {
        self.post(
            "compute_signature_hash",
            "transactions/sighash",
            &SignatureHashRequest {
                draft,
                input_index,
                sighash_type,
            },
        )
        .await
    }

    async fn finalize_transaction(
        &self,
        draft: &TransactionDraft,
        canonical_unsigned_tx: &CanonicalTxBytes,
        signatures: &[SignatureEntry],
    ) -> DraftResult<FinalizedTransaction> {
        self.post(
            "finalize_transaction",
            "transactions/finalize",
            &FinalizeRequest {
                draft,
                canonical_unsigned_tx,
                signatures,
            },
        )
        .await
    }

    async fn submit_transaction(
        &self,
        finalized: &FinalizedTransaction,
    ) -> DraftResult<SubmitResponse> {
        self.post(
            "submit_transaction",
            "transactions/submit",
            &SubmitRequest {
                transaction: finalized,
            },
        )
        .await
    }

    async fn fetch_transaction(
        &self,
        tx_hash: &FixedHash,
    ) -> DraftResult<Option<ConfirmedTransaction>> {
        self.get_optional(
            "fetch_transaction",
            &format!("transactions/{}", tx_hash.to_hex()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = HttpLedgerClient::new("http://127.0.0.1:9000/api/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9000/api");
        assert_eq!(
            client.url("/utxos/query"),
            "http://127.0.0.1:9000/api/utxos/query"
        );
        assert_eq!(client.timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_empty_url_is_rejected() {
        assert!(matches!(
            HttpLedgerClient::new("/"),
            Err(DraftError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_request_bodies_use_hex() {
        let owner = Address::new([0xab; 20]);
        let body = serde_json::to_value(QueryUtxosRequest {
            owner: &owner,
            token_id: None,
        })
        .unwrap();
        assert_eq!(body["owner"], serde_json::json!("ab".repeat(20)));
        assert!(body["token_id"].is_null());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_retryable() {
        // Nothing listens on port 1
        let client =
            HttpLedgerClient::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client
            .query_utxos(&Address::new([1; 20]), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
