use std::time::Duration;

use async_trait::async_trait;
use checkup_common::Stage;
use serde::Deserialize;

use super::{Annotator, parse_reply, prompts};
use crate::errors::AnnotateError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Annotator backed by the OpenAI Responses API.
pub struct OpenAiAnnotator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponsesReply {
    fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

impl OpenAiAnnotator {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, AnnotateError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AnnotateError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(AnnotateError::Http)?;
        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Annotator for OpenAiAnnotator {
    async fn annotate(
        &self,
        stage: Stage,
        text: &str,
        tone: Option<&str>,
    ) -> Result<Vec<String>, AnnotateError> {
        let body = serde_json::json!({
            "model": self.model,
            "instructions": prompts::instructions(stage),
            "input": prompts::user_message(stage, text, tone),
            "temperature": 0,
        });

        let resp = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(AnnotateError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnnotateError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let reply: ResponsesReply = resp
            .json()
            .await
            .map_err(|e| AnnotateError::MalformedResponse(e.to_string()))?;
        Ok(parse_reply(&reply.output_text()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        assert!(matches!(
            OpenAiAnnotator::new(None, None, None),
            Err(AnnotateError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiAnnotator::new(Some("  ".into()), None, None),
            Err(AnnotateError::MissingApiKey)
        ));
    }

    #[test]
    fn test_defaults_and_trailing_slash() {
        let a = OpenAiAnnotator::new(
            Some("sk-test".into()),
            None,
            Some("http://localhost:9999/v1/".into()),
        )
        .unwrap();
        assert_eq!(a.model(), DEFAULT_MODEL);
        assert_eq!(a.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_output_text_joins_message_parts() {
        let reply: ResponsesReply = serde_json::from_value(serde_json::json!({
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"1\": "},
                    {"type": "output_text", "text": "[\"Foo.\"]}"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(parse_reply(&reply.output_text()), vec!["Foo.".to_string()]);
    }
}
