//! Generation through an OpenAI-compatible chat completions endpoint.
//!
//! The model is asked for a single JSON object holding only the requested sections.
//! Anything it returns beyond those sections is dropped.

use super::{map_http_error, map_status, GenerationClient};
use crate::dataset::{GeneratedDataset, SectionKind};
use crate::error::EngineError;
use crate::flags::GenerationFlags;
use crate::types::{CustomerDescriptor, Period};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SYSTEM_PROMPT: &str = "You generate realistic but entirely synthetic financial data for \
banking test environments. Respond with a single JSON object and nothing else. Use camelCase \
field names exactly as specified and plain numbers without thousands separators.";

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Chat completions generation client
pub struct ChatGenerationClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
}

impl ChatGenerationClient {
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        model: String,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl GenerationClient for ChatGenerationClient {
    async fn generate(
        &self,
        customer: &CustomerDescriptor,
        flags: &GenerationFlags,
        period: &Period,
    ) -> Result<GeneratedDataset, EngineError> {
        if flags.requested_sections().is_empty() {
            return Ok(GeneratedDataset::default());
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(customer, flags, period),
                },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(customer_id = %customer.id, model = %self.model, "requesting chat completion");
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(map_http_error)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| EngineError::GenerationMalformed("No choices in response".to_string()))?;

        parse_completion_content(&content, flags)
    }

    fn client_name(&self) -> &str {
        "chat"
    }
}

fn section_schema(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Summary => {
            "\"summary\": {currency, revenue, operatingExpenses, netIncome, totalAssets, totalLiabilities, equity}"
        }
        SectionKind::Detail => {
            "\"detail\": [{accountId, accountType, currency, balance, averageBalance}] (2-6 accounts)"
        }
        SectionKind::ChannelA => {
            "\"channelA\": [{providerCode, transactionCount, grossVolume, feeAmount}] (card-present acquiring, 1-4 providers)"
        }
        SectionKind::ChannelB => {
            "\"channelB\": [{providerCode, transactionCount, grossVolume, feeAmount}] (e-commerce acquiring, 1-4 providers)"
        }
        SectionKind::Collateral => {
            "\"collateral\": [{collateralId, collateralType, marketValue, haircutPct}] (1-5 positions)"
        }
    }
}

pub(crate) fn build_prompt(
    customer: &CustomerDescriptor,
    flags: &GenerationFlags,
    period: &Period,
) -> String {
    let mut prompt = format!(
        "Customer: {} (id {})\nSegment: {}\nSector: {}\nReporting period: {}\n\n\
         Produce a JSON object with exactly these keys:\n",
        customer.name, customer.id, customer.segment, customer.sector, period
    );
    for kind in flags.requested_sections() {
        prompt.push_str("- ");
        prompt.push_str(section_schema(kind));
        prompt.push('\n');
    }
    prompt.push_str("\nFigures must be internally consistent and plausible for the segment and sector.");
    prompt
}

/// Extract the JSON object from a completion, tolerating code fences and stray prose.
pub(crate) fn parse_completion_content(
    content: &str,
    flags: &GenerationFlags,
) -> Result<GeneratedDataset, EngineError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(EngineError::GenerationMalformed(
                "Completion contains no JSON object".to_string(),
            ))
        }
    };
    let mut dataset: GeneratedDataset = serde_json::from_str(json)
        .map_err(|e| EngineError::GenerationMalformed(format!("Invalid dataset JSON: {}", e)))?;
    dataset.retain_requested(flags);
    Ok(dataset)
}
