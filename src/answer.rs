//! Answer generation over retrieved context.
//!
//! Assembles a grounded prompt from the retrieval context and the user's
//! question, then calls an OpenRouter-compatible chat-completions endpoint.
//! The transport is a thin wrapper; a failed call is surfaced as a provider
//! error, never replaced with a canned answer.

use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Build the completion prompt: context paragraphs, then the question.
pub fn build_prompt(context: &[String], question: &str) -> String {
    format!(
        "Answer the following question using only the provided context.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context.join("\n\n"),
        question
    )
}

/// Send the assembled prompt to the configured chat-completions endpoint.
///
/// Requires the `OPENROUTER_API_KEY` environment variable.
pub async fn generate_answer(config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .map_err(|_| Error::Provider("OPENROUTER_API_KEY environment variable not set".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(Error::provider)?;

    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": "You are a helpful assistant." },
            { "role": "user", "content": prompt },
        ],
    });

    let response = client
        .post(format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        ))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(Error::provider)?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(Error::Provider(format!(
            "completions API error {}: {}",
            status, body_text
        )));
    }

    let json: serde_json::Value = response.json().await.map_err(Error::provider)?;
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Provider("invalid completions response: missing content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let context = vec!["first chunk".to_string(), "second chunk".to_string()];
        let prompt = build_prompt(&context, "what is this?");

        assert!(prompt.contains("first chunk\n\nsecond chunk"));
        assert!(prompt.contains("Question: what is this?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_with_empty_context() {
        let prompt = build_prompt(&[], "anything?");
        assert!(prompt.contains("Context:\n\n\n"));
        assert!(prompt.contains("Question: anything?"));
    }
}
