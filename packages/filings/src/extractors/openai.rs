//! OpenAI implementation of the record reviewer.
//!
//! Sends the draft records plus a document excerpt to the chat completions
//! endpoint in JSON mode and reads back a revised record list.
//!
//! # Example
//!
//! ```rust,ignore
//! use filings::extractors::OpenAiReviewer;
//!
//! let reviewer = OpenAiReviewer::new("sk-...").with_model("gpt-4o-mini");
//! let extractor = ReviewingExtractor::new(CompensationTableExtractor::new(), config)
//!     .with_reviewer(Arc::new(reviewer));
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExtractionError, ExtractionResult};
use crate::traits::extractor::{Document, DocumentKind};
use crate::traits::reviewer::RecordReviewer;
use crate::types::{
    cik::Cik,
    record::{ExtractedRecord, RecordFacts},
};

const SYSTEM_PROMPT: &str = "You review facts extracted from corporate regulatory filings. \
You receive an excerpt of the filing and draft records produced by a heuristic parser. \
Correct wrong values, remove rows that are not executives or not for the requested fiscal year, \
and add rows the parser missed. Amounts are plain non-negative numbers in US dollars; \
use null when a value is not stated. \
Respond with a JSON object: {\"records\": [...]}, where each record is either \
{\"kind\": \"executive_compensation\", \"executive_name\": str, \"title\": str|null, \
\"salary\": num|null, \"bonus\": num|null, \"stock_awards\": num|null, \"option_awards\": num|null, \
\"non_equity_incentive\": num|null, \"other_compensation\": num|null, \"total\": num|null} or \
{\"kind\": \"tax_expense\", \"total\": num|null, \"current\": num|null, \"deferred\": num|null}.";

/// LLM reviewer backed by OpenAI chat completions.
pub struct OpenAiReviewer {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiReviewer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::from(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Set the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system: &str, user: &str) -> ExtractionResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Review(Box::new(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Review(
                format!("OpenAI error {}: {}", status, error_text).into(),
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Review(Box::new(e)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::Review("no response from OpenAI".into()))
    }
}

impl std::fmt::Debug for OpenAiReviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiReviewer")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordReviewer for OpenAiReviewer {
    async fn review(
        &self,
        document: &Document,
        cik: &Cik,
        excerpt: &str,
        draft: &[ExtractedRecord],
        target_year: i32,
    ) -> ExtractionResult<Vec<ExtractedRecord>> {
        let prompt = user_prompt(document.kind, excerpt, draft, target_year)?;
        debug!(
            cik = %cik,
            target_year,
            model = %self.model,
            prompt_chars = prompt.len(),
            "requesting review"
        );

        let content = self.chat(SYSTEM_PROMPT, &prompt).await?;
        parse_review(&content, cik, target_year, &document.source_id)
    }
}

fn user_prompt(
    kind: DocumentKind,
    excerpt: &str,
    draft: &[ExtractedRecord],
    target_year: i32,
) -> ExtractionResult<String> {
    let facts: Vec<&RecordFacts> = draft.iter().map(|r| &r.facts).collect();
    let draft_json = serde_json::to_string_pretty(&facts)?;
    let kind = match kind {
        DocumentKind::CompanyFacts => "structured company facts",
        DocumentKind::ProxyStatement => "proxy statement",
        DocumentKind::AnnualReport => "annual report",
    };
    Ok(format!(
        "Fiscal year: {}\nDocument type: {}\n\nDraft records:\n{}\n\nDocument excerpt:\n{}",
        target_year, kind, draft_json, excerpt
    ))
}

#[derive(Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    records: Vec<RecordFacts>,
}

fn parse_review(
    content: &str,
    cik: &Cik,
    target_year: i32,
    source_id: &str,
) -> ExtractionResult<Vec<ExtractedRecord>> {
    let response: ReviewResponse = serde_json::from_str(content)?;
    Ok(response
        .records
        .into_iter()
        .map(|facts| ExtractedRecord::new(cik.clone(), target_year, facts, source_id))
        .collect())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}
