//! The external text-analysis operation used by the stage processor.
//!
//! An [`Annotator`] takes one stage, one text and (for the tone stage) the
//! target tone, and returns the proposed corrections. An empty list means
//! "no issue".

mod openai;
pub mod prompts;

pub use openai::OpenAiAnnotator;

use async_trait::async_trait;
use checkup_common::Stage;

use crate::errors::AnnotateError;
use crate::util::extract_json_object;

#[async_trait]
pub trait Annotator: Send + Sync {
    /// Proposed corrections for `text` under `stage`, in model order.
    async fn annotate(
        &self,
        stage: Stage,
        text: &str,
        tone: Option<&str>,
    ) -> Result<Vec<String>, AnnotateError>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}

/// Reports every text as clean. Used for dry runs.
pub struct NoopAnnotator;

#[async_trait]
impl Annotator for NoopAnnotator {
    async fn annotate(
        &self,
        _stage: Stage,
        _text: &str,
        _tone: Option<&str>,
    ) -> Result<Vec<String>, AnnotateError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Parse a model reply. The first JSON object in the reply is used;
/// `{"1": [...]}` yields the list, anything else is "no issue".
pub fn parse_reply(raw: &str) -> Vec<String> {
    let Some(json) = extract_json_object(raw) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
        return Vec::new();
    };
    match value.get("1").and_then(|v| v.as_array()) {
        Some(items) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_issues() {
        assert_eq!(
            parse_reply(r#"{"1": ["teşekkür", "ederim"]}"#),
            vec!["teşekkür".to_string(), "ederim".to_string()]
        );
    }

    #[test]
    fn test_parse_reply_surrounded_by_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"1\": [\"Foo.\"]}\n```";
        assert_eq!(parse_reply(raw), vec!["Foo.".to_string()]);
    }

    #[test]
    fn test_parse_reply_no_issue_forms() {
        assert!(parse_reply(r#"{"0": []}"#).is_empty());
        assert!(parse_reply("no json at all").is_empty());
        assert!(parse_reply(r#"{"1": "not a list"}"#).is_empty());
        assert!(parse_reply(r#"{"1": [}"#).is_empty());
    }

    #[tokio::test]
    async fn test_noop_annotator_is_always_clean() {
        let out = NoopAnnotator
            .annotate(Stage::Tone, "Selam", Some("tr-formal"))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
