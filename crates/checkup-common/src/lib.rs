//! Shared domain types for checkup.
//!
//! The annotation worker and the run-control server both speak in terms of
//! the five ordered [`Stage`]s, the tri-state [`CheckOutcome`] stored per
//! stage on every row, and the [`RunStatus`] lifecycle of a supervised run.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown stage '{0}'. Valid values: spellcheck, grammar, punctuation, clarity, tone")]
    UnknownStage(String),

    #[error("Unknown run status '{0}'")]
    UnknownStatus(String),

    #[error("Invalid check value '{0}': expected \"\", \"0\" or \"1\"")]
    InvalidCheck(String),
}

// ── Stage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Spellcheck,
    Grammar,
    Punctuation,
    Clarity,
    Tone,
}

impl Stage {
    /// Stages in the order a run executes them.
    pub const ALL: [Stage; 5] = [
        Stage::Spellcheck,
        Stage::Grammar,
        Stage::Punctuation,
        Stage::Clarity,
        Stage::Tone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spellcheck => "spellcheck",
            Self::Grammar => "grammar",
            Self::Punctuation => "punctuation",
            Self::Clarity => "clarity",
            Self::Tone => "tone",
        }
    }

    /// Column holding the stage's check flag in the annotated store.
    pub fn check_column(&self) -> &'static str {
        match self {
            Self::Spellcheck => "spellCheck",
            Self::Grammar => "grammarCheck",
            Self::Punctuation => "puncCheck",
            Self::Clarity => "clarityCheck",
            Self::Tone => "toneCheck",
        }
    }

    /// Column holding the stage's JSON list of corrections.
    pub fn correct_column(&self) -> &'static str {
        match self {
            Self::Spellcheck => "spellCorrect",
            Self::Grammar => "grammarCorrect",
            Self::Punctuation => "puncCorrect",
            Self::Clarity => "clarityCorrect",
            Self::Tone => "toneCorrect",
        }
    }

    /// Whether findings of this stage are compared against the grammar stage
    /// before being recorded.
    pub fn is_suppressible(&self) -> bool {
        matches!(self, Self::Punctuation | Self::Clarity | Self::Tone)
    }

    pub fn takes_tone(&self) -> bool {
        matches!(self, Self::Tone)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spellcheck" => Ok(Self::Spellcheck),
            "grammar" => Ok(Self::Grammar),
            "punctuation" => Ok(Self::Punctuation),
            "clarity" => Ok(Self::Clarity),
            "tone" => Ok(Self::Tone),
            _ => Err(DomainError::UnknownStage(s.to_string())),
        }
    }
}

// ── Check outcome ─────────────────────────────────────────────────────

/// Result of one stage for one row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckOutcome {
    /// Not processed yet; the row is picked up the next time the stage runs.
    #[default]
    Pending,
    /// Processed, nothing to report.
    Clean,
    /// Processed, with the proposed corrections in the order they were returned.
    Flagged(Vec<String>),
}

impl CheckOutcome {
    /// Outcome for a finished annotation: an empty list is a clean result.
    pub fn from_corrections(corrections: Vec<String>) -> Self {
        if corrections.is_empty() {
            Self::Clean
        } else {
            Self::Flagged(corrections)
        }
    }

    /// Decode the `(check, correct)` cell pair of the annotated store.
    ///
    /// An unparseable correction cell on a flagged row decodes as an empty
    /// list rather than an error so hand-edited stores stay loadable.
    pub fn from_cells(check: &str, correct: &str) -> Result<Self, DomainError> {
        match check.trim() {
            "" => Ok(Self::Pending),
            "0" => Ok(Self::Clean),
            "1" => Ok(Self::Flagged(parse_correction_list(correct))),
            other => Err(DomainError::InvalidCheck(other.to_string())),
        }
    }

    /// Encode as the `(check, correct)` cell pair.
    pub fn to_cells(&self) -> (String, String) {
        match self {
            Self::Pending => (String::new(), String::new()),
            Self::Clean => ("0".to_string(), String::new()),
            Self::Flagged(items) => ("1".to_string(), encode_correction_list(items)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn check_flag(&self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Clean => "0",
            Self::Flagged(_) => "1",
        }
    }

    pub fn corrections(&self) -> &[String] {
        match self {
            Self::Flagged(items) => items,
            _ => &[],
        }
    }
}

/// JSON list with `", "` separators and unescaped non-ASCII text, the layout
/// existing stores were written with.
pub fn encode_correction_list(items: &[String]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|s| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()))
        .collect();
    format!("[{}]", parts.join(", "))
}

pub fn parse_correction_list(cell: &str) -> Vec<String> {
    if cell.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(cell) {
        Ok(values) => values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized set of strings, used to compare correction lists.
pub fn normalized_set<'a, I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    items.into_iter().map(|s| normalize_ws(s)).collect()
}

// ── Run status ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Human label used in the run footer.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Ok => "Success",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            "stopped" => Ok(Self::Stopped),
            _ => Err(DomainError::UnknownStatus(s.to_string())),
        }
    }
}

/// Run status transitions. Terminal states are final.
pub fn is_valid_transition(from: RunStatus, to: RunStatus) -> bool {
    matches!(
        (from, to),
        (RunStatus::Running, RunStatus::Ok)
            | (RunStatus::Running, RunStatus::Error)
            | (RunStatus::Running, RunStatus::Stopped)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_columns() {
        let names: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["spellcheck", "grammar", "punctuation", "clarity", "tone"]);
        assert_eq!(Stage::Punctuation.check_column(), "puncCheck");
        assert_eq!(Stage::Spellcheck.correct_column(), "spellCorrect");
    }

    #[test]
    fn test_stage_from_str_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!(matches!("bogus".parse::<Stage>(), Err(DomainError::UnknownStage(_))));
    }

    #[test]
    fn test_only_late_stages_are_suppressible() {
        assert!(!Stage::Spellcheck.is_suppressible());
        assert!(!Stage::Grammar.is_suppressible());
        assert!(Stage::Punctuation.is_suppressible());
        assert!(Stage::Clarity.is_suppressible());
        assert!(Stage::Tone.is_suppressible());
    }

    #[test]
    fn test_outcome_cells() {
        assert_eq!(CheckOutcome::from_cells("", "").unwrap(), CheckOutcome::Pending);
        assert_eq!(CheckOutcome::from_cells("0", "").unwrap(), CheckOutcome::Clean);
        assert_eq!(
            CheckOutcome::from_cells("1", r#"["Foo.", "Bar"]"#).unwrap(),
            CheckOutcome::Flagged(vec!["Foo.".into(), "Bar".into()])
        );
        assert_eq!(
            CheckOutcome::from_cells("2", ""),
            Err(DomainError::InvalidCheck("2".into()))
        );
    }

    #[test]
    fn test_outcome_to_cells() {
        assert_eq!(CheckOutcome::Pending.to_cells(), (String::new(), String::new()));
        assert_eq!(CheckOutcome::Clean.to_cells(), ("0".into(), String::new()));
        let flagged = CheckOutcome::Flagged(vec!["Merhaba dünya.".into(), "x".into()]);
        assert_eq!(
            flagged.to_cells(),
            ("1".into(), r#"["Merhaba dünya.", "x"]"#.to_string())
        );
    }

    #[test]
    fn test_from_corrections_empty_is_clean() {
        assert_eq!(CheckOutcome::from_corrections(vec![]), CheckOutcome::Clean);
    }

    #[test]
    fn test_parse_correction_list_tolerates_garbage() {
        assert!(parse_correction_list("not json").is_empty());
        assert!(parse_correction_list("  ").is_empty());
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("  Foo \t bar\n baz "), "Foo bar baz");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn test_run_status_transitions() {
        use RunStatus::*;
        assert!(is_valid_transition(Running, Ok));
        assert!(is_valid_transition(Running, Error));
        assert!(is_valid_transition(Running, Stopped));
        for terminal in [Ok, Error, Stopped] {
            for to in [Running, Ok, Error, Stopped] {
                assert!(!is_valid_transition(terminal, to));
            }
        }
    }

    #[test]
    fn test_run_status_serde() {
        let json = serde_json::to_string(&RunStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
