use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::PaymentsConfig;
use crate::error::{AppError, AppResult};

/// Adapter over the external Lightning wallet RPC. The core never speaks
/// bolt11 itself; `payment_request` is carried as an opaque string.
#[derive(Clone)]
pub struct PaymentsClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub payment_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceRequest<'a> {
    out: bool,
    amount: u64,
    memo: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentState {
    #[serde(default)]
    paid: bool,
}

impl PaymentsClient {
    pub fn new(config: &PaymentsConfig) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Mint a fresh invoice. Each call creates a new one; idempotency is not
    /// part of the backend contract.
    pub async fn create_invoice(&self, amount_sats: u64, memo: &str) -> AppResult<Invoice> {
        let url = format!("{}/api/v1/payments", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&CreateInvoiceRequest {
                out: false,
                amount: amount_sats,
                memo,
            })
            .send()
            .await
            .map_err(|e| AppError::PaymentBackend(format!("create invoice: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Invoice creation rejected");
            return Err(AppError::PaymentBackend(format!(
                "create invoice returned {}",
                status
            )));
        }

        let invoice = response
            .json::<Invoice>()
            .await
            .map_err(|e| AppError::PaymentBackend(format!("parse invoice response: {}", e)))?;
        Ok(invoice)
    }

    /// True iff the backend reports the invoice settled. Fails closed: an
    /// unverifiable invoice is treated as unpaid.
    pub async fn is_paid(&self, payment_hash: &str) -> bool {
        let url = format!("{}/api/v1/payments/{}", self.base_url, payment_hash);

        let response = match self
            .http_client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(payment_hash = %payment_hash, "Payment status check failed: {}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            return false;
        }

        match response.json::<PaymentState>().await {
            Ok(state) => state.paid,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentsConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PaymentsClient {
        PaymentsClient::new(&PaymentsConfig {
            url: server.uri(),
            api_key: "test-key".to_string(),
        })
    }

    #[tokio::test]
    async fn create_invoice_posts_inbound_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/payments"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "payment_hash": "aa".repeat(32),
                "payment_request": "lnbc10n1test",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let invoice = client_for(&server).create_invoice(100, "memo").await.unwrap();
        assert_eq!(invoice.payment_hash, "aa".repeat(32));
        assert_eq!(invoice.payment_request, "lnbc10n1test");
    }

    #[tokio::test]
    async fn create_invoice_surfaces_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/payments"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).create_invoice(100, "memo").await;
        assert!(matches!(err, Err(AppError::PaymentBackend(_))));
    }

    #[tokio::test]
    async fn is_paid_reads_paid_flag() {
        let server = MockServer::start().await;
        let hash = "bb".repeat(32);
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/payments/{}", hash)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"paid": true})))
            .mount(&server)
            .await;

        assert!(client_for(&server).is_paid(&hash).await);
    }

    #[tokio::test]
    async fn is_paid_fails_closed() {
        let server = MockServer::start().await;
        let hash = "cc".repeat(32);
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/payments/{}", hash)))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.is_paid(&hash).await);

        // Backend gone entirely: still unpaid.
        drop(server);
        assert!(!client.is_paid(&hash).await);
    }
}
