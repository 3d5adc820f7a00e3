//! Instructions and user messages sent to the text-analysis model.

use checkup_common::Stage;

const REPLY_CONTRACT: &str = r#"Reply with a single JSON object and nothing else.
If you found problems: {"1": ["corrected text", ...]}
If the text is fine: {"0": []}"#;

/// System instructions for a stage.
pub fn instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Spellcheck => {
            "You check spelling only. Apply the official orthography of the language \
             the text is written in (Turkish rules for Turkish text). Report the corrected \
             words, not whole sentences."
        }
        Stage::Grammar => {
            "You are a grammar checker. Correct grammatical mistakes using the standard \
             rules of the text's language. Spelling or punctuation may be fixed only when \
             the grammar fix needs it. Never change style, tone or meaning."
        }
        Stage::Punctuation => {
            "You are a punctuation checker. Correct punctuation using the official rules \
             of the text's language. Never change style, tone or meaning."
        }
        Stage::Clarity => {
            "You check clarity and expression. Rewrite awkward or unclear phrasing into \
             natural wording in the same language, keeping the meaning, style and tone."
        }
        Stage::Tone => {
            "You check tone. Rewrite text whose tone is inconsistent with the requested \
             target tone, following the communication norms of the text's language. \
             Keep the meaning."
        }
    }
}

/// User message for a stage and text. `tone` is only used by the tone stage.
pub fn user_message(stage: Stage, text: &str, tone: Option<&str>) -> String {
    let task = match stage {
        Stage::Spellcheck => "Find spelling errors in the text below.",
        Stage::Grammar => "Find grammar errors in the text below and return corrected sentences.",
        Stage::Punctuation => {
            "Find punctuation errors in the text below and return corrected sentences."
        }
        Stage::Clarity => "Find clarity problems in the text below and return rewritten sentences.",
        Stage::Tone => "Check whether the text below matches the target tone.",
    };
    let mut msg = String::new();
    msg.push_str(task);
    msg.push('\n');
    if stage.takes_tone() {
        msg.push_str(&format!("Target tone: {}\n", tone.unwrap_or("").trim()));
    }
    msg.push_str(REPLY_CONTRACT);
    msg.push_str("\n\nText: ");
    msg.push_str(text);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_message_carries_target_tone() {
        let msg = user_message(Stage::Tone, "Merhaba", Some("tr-formal"));
        assert!(msg.contains("Target tone: tr-formal"));
        assert!(msg.ends_with("Text: Merhaba"));
    }

    #[test]
    fn test_other_stages_ignore_tone() {
        let msg = user_message(Stage::Grammar, "x", Some("tr-formal"));
        assert!(!msg.contains("Target tone"));
        assert!(msg.contains(r#"{"0": []}"#));
    }
}
