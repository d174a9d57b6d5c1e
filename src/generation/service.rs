//! Client for a dedicated generation endpoint.

use super::{map_http_error, map_status, GenerationClient, GenerationRequest};
use crate::dataset::GeneratedDataset;
use crate::error::EngineError;
use crate::flags::GenerationFlags;
use crate::types::{CustomerDescriptor, Period};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// POSTs a [`GenerationRequest`] and reads `{summary?, detail?, channelA?, channelB?, collateral?}` back.
pub struct ServiceGenerationClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ServiceGenerationClient {
    pub fn new(client: Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl GenerationClient for ServiceGenerationClient {
    async fn generate(
        &self,
        customer: &CustomerDescriptor,
        flags: &GenerationFlags,
        period: &Period,
    ) -> Result<GeneratedDataset, EngineError> {
        let request = GenerationRequest::new(customer, flags, period);
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(customer_id = %customer.id, endpoint = %self.endpoint, "calling generation service");
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body));
        }

        let body = response.text().await.map_err(map_http_error)?;
        parse_service_response(&body, flags)
    }

    fn client_name(&self) -> &str {
        "service"
    }
}

/// Parse a service response body.
///
/// Accepts the dataset object directly or wrapped in `{"data": {...}}`. A top-level
/// `error` string is reported as a failed request.
pub(crate) fn parse_service_response(
    body: &str,
    flags: &GenerationFlags,
) -> Result<GeneratedDataset, EngineError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| EngineError::GenerationMalformed(format!("Invalid JSON: {}", e)))?;
    let Value::Object(mut object) = value else {
        return Err(EngineError::GenerationMalformed(
            "Response is not a JSON object".to_string(),
        ));
    };

    if let Some(Value::String(message)) = object.get("error") {
        return Err(EngineError::GenerationRequestFailed(message.clone()));
    }

    let payload = match object.remove("data") {
        Some(data @ Value::Object(_)) => data,
        Some(_) => {
            return Err(EngineError::GenerationMalformed(
                "'data' is not a JSON object".to_string(),
            ))
        }
        None => Value::Object(object),
    };

    let mut dataset: GeneratedDataset = serde_json::from_value(payload)
        .map_err(|e| EngineError::GenerationMalformed(format!("Unexpected dataset shape: {}", e)))?;
    dataset.retain_requested(flags);
    Ok(dataset)
}
