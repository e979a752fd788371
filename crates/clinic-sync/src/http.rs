//! # HTTP Backend
//!
//! [`PaymentBackend`] over the clinic REST API using `reqwest`.
//!
//! Transport timeouts are the only timeouts in the write path: the client
//! is built with `backend.timeout_secs` and the gateway reacts to whatever
//! error comes back.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::backend::{Acknowledgement, PaymentBackend};
use crate::config::BackendSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    ApiEnvelope, NoteCollectionRequest, RemoteAck, RemoteNote, RemotePaymentPlan, RemoteSale,
    SalePaymentRequest,
};

/// REST client for the clinic backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> SyncResult<Self> {
        let parsed = url::Url::parse(&settings.base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(settings.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(HttpBackend {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SyncResult<Option<T>> {
        let url = self.endpoint(path);
        debug!(url = %url, "GET");

        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SyncResult<Option<T>> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST");

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Maps HTTP status and the envelope onto [`SyncError`].
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> SyncResult<Option<T>> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("no body").to_string()
            } else {
                text
            };
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        envelope.into_result()
    }
}

#[async_trait]
impl PaymentBackend for HttpBackend {
    async fn record_sale_payment(&self, request: &SalePaymentRequest) -> SyncResult<Acknowledgement> {
        let ack: Option<RemoteAck> = self.post("payment-records", request).await?;
        Ok(ack.map(Acknowledgement::from).unwrap_or_default())
    }

    async fn collect_note(
        &self,
        note_id: &str,
        request: &NoteCollectionRequest,
    ) -> SyncResult<Acknowledgement> {
        let path = format!("promissory-notes/{note_id}/collect");
        let ack: Option<RemoteAck> = self.post(&path, request).await?;
        Ok(ack.map(Acknowledgement::from).unwrap_or_default())
    }

    async fn fetch_patient_sales(&self, patient_id: &str) -> SyncResult<Vec<RemoteSale>> {
        let sales = self.get(&format!("patients/{patient_id}/sales")).await?;
        Ok(sales.unwrap_or_default())
    }

    async fn fetch_patient_notes(&self, patient_id: &str) -> SyncResult<Vec<RemoteNote>> {
        let notes = self
            .get(&format!("patients/{patient_id}/promissory-notes"))
            .await?;
        Ok(notes.unwrap_or_default())
    }

    async fn fetch_payment_plan(&self, sale_id: &str) -> SyncResult<Option<RemotePaymentPlan>> {
        match self.get(&format!("sales/{sale_id}/payment-plan")).await {
            Err(SyncError::RemoteRejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            other => other,
        }
    }
}
