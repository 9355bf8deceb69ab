//! The LLM exclusion-term oracle: an external collaborator treated
//! as a pure `suggest_exclusion_terms` function. This module owns only the
//! HTTP transport and the trait seam; term-selection strategy lives in
//! `partition::planner`.

use crate::config::LlmOracleConfig;
use crate::error::Result;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One batch response from the oracle, including the bookkeeping the
/// Partition Planner logs into `PartitionLlmCall`.
#[derive(Debug, Clone)]
pub struct LlmSuggestion {
    pub terms: Vec<String>,
    pub prompt: String,
    pub response: String,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub latency: std::time::Duration,
}

#[async_trait]
pub trait LlmOracle: Send + Sync {
    /// Suggest a batch of 25-30 candidate title terms whose exclusion might
    /// help bring `current_count` for `title`/`year` below the overflow cap,
    /// excluding any term already tried (`already_excluded`).
    async fn suggest_exclusion_terms(
        &self,
        title: &str,
        year: Option<i32>,
        current_count: i64,
        already_excluded: &[String],
    ) -> Result<LlmSuggestion>;
}

pub struct HttpLlmOracle {
    http: reqwest::Client,
    config: LlmOracleConfig,
}

impl HttpLlmOracle {
    pub fn new(config: LlmOracleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("building LLM oracle http client")?;
        Ok(Self { http, config })
    }

    fn build_prompt(
        title: &str,
        year: Option<i32>,
        current_count: i64,
        already_excluded: &[String],
    ) -> String {
        format!(
            "The citing-works query for \"{title}\"{} currently returns {current_count} results, \
             above the index's 1000-result cap. Suggest 25-30 single- or multi-word title terms \
             whose exclusion (via -intitle:\"term\") would likely reduce this count, ordered by \
             expected impact. Do not repeat any of: {}.",
            year.map(|y| format!(" ({y})")).unwrap_or_default(),
            already_excluded.join(", "),
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: i32,
    completion_tokens: i32,
}

#[async_trait]
impl LlmOracle for HttpLlmOracle {
    async fn suggest_exclusion_terms(
        &self,
        title: &str,
        year: Option<i32>,
        current_count: i64,
        already_excluded: &[String],
    ) -> Result<LlmSuggestion> {
        let prompt = Self::build_prompt(title, year, current_count, already_excluded);
        let started = Instant::now();

        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
            })
            .send()
            .await
            .context("sending LLM oracle request")?
            .error_for_status()
            .context("LLM oracle returned an error status")?
            .json()
            .await
            .context("parsing LLM oracle response")?;

        let latency = started.elapsed();
        let raw_response = response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let terms: Vec<String> = raw_response
            .lines()
            .map(|line| line.trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|line| !line.is_empty())
            .filter(|line| !already_excluded.iter().any(|t| t.eq_ignore_ascii_case(line)))
            .take(30)
            .collect();

        Ok(LlmSuggestion {
            terms,
            prompt,
            response: raw_response,
            input_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
            latency,
        })
    }
}
