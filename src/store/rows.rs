use checkup_common::{CheckOutcome, DomainError, Stage};
use serde::{Deserialize, Serialize};

use super::{Fragment, StoreRow};

/// Header of the extraction store.
pub const MESSAGE_FIELDS: &[&str] = &[
    "row_id",
    "node_id",
    "node_name",
    "node_type",
    "module_type",
    "source",
    "text",
];

/// Header of the annotated store.
pub const RESULT_FIELDS: &[&str] = &[
    "row_id",
    "node_id",
    "node_name",
    "node_type",
    "module_type",
    "source",
    "text",
    "spellCheck",
    "spellCorrect",
    "grammarCheck",
    "grammarCorrect",
    "puncCheck",
    "puncCorrect",
    "clarityCheck",
    "clarityCorrect",
    "toneCheck",
    "toneCorrect",
];

// ── Extraction store ──────────────────────────────────────────────────

/// A row of the extraction store: a fragment and its assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub row_id: u64,
    pub fragment: Fragment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    row_id: u64,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    node_type: String,
    #[serde(default, alias = "moduleType")]
    module_type: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    text: String,
}

impl StoreRow for MessageRow {
    const FIELDS: &'static [&'static str] = MESSAGE_FIELDS;
    type Record = MessageRecord;

    fn row_id(&self) -> u64 {
        self.row_id
    }

    fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    fn from_fragment(row_id: u64, fragment: Fragment) -> Self {
        Self { row_id, fragment }
    }

    fn to_record(&self) -> MessageRecord {
        let f = &self.fragment;
        MessageRecord {
            row_id: self.row_id,
            node_id: f.node_id.clone(),
            node_name: f.node_name.clone(),
            node_type: f.node_type.clone(),
            module_type: f.module_type.clone(),
            source: f.source.clone(),
            text: f.text.clone(),
        }
    }

    fn from_record(record: MessageRecord) -> Result<Self, DomainError> {
        Ok(Self {
            row_id: record.row_id,
            fragment: Fragment {
                node_id: record.node_id,
                node_name: record.node_name,
                node_type: record.node_type,
                module_type: record.module_type,
                source: record.source,
                text: record.text,
            },
        })
    }
}

// ── Annotated store ───────────────────────────────────────────────────

/// A row of the annotated store with one outcome per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub row_id: u64,
    pub fragment: Fragment,
    outcomes: [CheckOutcome; 5],
}

impl ResultRow {
    pub fn outcome(&self, stage: Stage) -> &CheckOutcome {
        &self.outcomes[stage_index(stage)]
    }

    pub fn set_outcome(&mut self, stage: Stage, outcome: CheckOutcome) {
        self.outcomes[stage_index(stage)] = outcome;
    }
}

fn stage_index(stage: Stage) -> usize {
    match stage {
        Stage::Spellcheck => 0,
        Stage::Grammar => 1,
        Stage::Punctuation => 2,
        Stage::Clarity => 3,
        Stage::Tone => 4,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultRecord {
    row_id: u64,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    node_type: String,
    #[serde(default, alias = "moduleType")]
    module_type: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    text: String,
    #[serde(default, rename = "spellCheck")]
    spell_check: String,
    #[serde(default, rename = "spellCorrect")]
    spell_correct: String,
    #[serde(default, rename = "grammarCheck")]
    grammar_check: String,
    #[serde(default, rename = "grammarCorrect")]
    grammar_correct: String,
    #[serde(default, rename = "puncCheck")]
    punc_check: String,
    #[serde(default, rename = "puncCorrect")]
    punc_correct: String,
    #[serde(default, rename = "clarityCheck")]
    clarity_check: String,
    #[serde(default, rename = "clarityCorrect")]
    clarity_correct: String,
    #[serde(default, rename = "toneCheck")]
    tone_check: String,
    #[serde(default, rename = "toneCorrect")]
    tone_correct: String,
}

impl StoreRow for ResultRow {
    const FIELDS: &'static [&'static str] = RESULT_FIELDS;
    type Record = ResultRecord;

    fn row_id(&self) -> u64 {
        self.row_id
    }

    fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    fn from_fragment(row_id: u64, fragment: Fragment) -> Self {
        Self {
            row_id,
            fragment,
            outcomes: Default::default(),
        }
    }

    fn to_record(&self) -> ResultRecord {
        let f = &self.fragment;
        let [spell, grammar, punc, clarity, tone] = self.outcomes.clone().map(|o| o.to_cells());
        ResultRecord {
            row_id: self.row_id,
            node_id: f.node_id.clone(),
            node_name: f.node_name.clone(),
            node_type: f.node_type.clone(),
            module_type: f.module_type.clone(),
            source: f.source.clone(),
            text: f.text.clone(),
            spell_check: spell.0,
            spell_correct: spell.1,
            grammar_check: grammar.0,
            grammar_correct: grammar.1,
            punc_check: punc.0,
            punc_correct: punc.1,
            clarity_check: clarity.0,
            clarity_correct: clarity.1,
            tone_check: tone.0,
            tone_correct: tone.1,
        }
    }

    fn from_record(r: ResultRecord) -> Result<Self, DomainError> {
        let outcomes = [
            CheckOutcome::from_cells(&r.spell_check, &r.spell_correct)?,
            CheckOutcome::from_cells(&r.grammar_check, &r.grammar_correct)?,
            CheckOutcome::from_cells(&r.punc_check, &r.punc_correct)?,
            CheckOutcome::from_cells(&r.clarity_check, &r.clarity_correct)?,
            CheckOutcome::from_cells(&r.tone_check, &r.tone_correct)?,
        ];
        Ok(Self {
            row_id: r.row_id,
            fragment: Fragment {
                node_id: r.node_id,
                node_name: r.node_name,
                node_type: r.node_type,
                module_type: r.module_type,
                source: r.source,
                text: r.text,
            },
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_columns_match_header() {
        for stage in Stage::ALL {
            assert!(RESULT_FIELDS.contains(&stage.check_column()));
            assert!(RESULT_FIELDS.contains(&stage.correct_column()));
        }
        assert_eq!(&RESULT_FIELDS[..7], MESSAGE_FIELDS);
    }

    #[test]
    fn test_result_row_starts_pending() {
        let row = ResultRow::from_fragment(3, Fragment::default());
        for stage in Stage::ALL {
            assert!(row.outcome(stage).is_pending());
        }
    }

    #[test]
    fn test_result_row_outcome_survives_record() {
        let mut row = ResultRow::from_fragment(1, Fragment::default());
        row.set_outcome(Stage::Grammar, CheckOutcome::Flagged(vec!["Foo.".into()]));
        row.set_outcome(Stage::Tone, CheckOutcome::Clean);
        let back = ResultRow::from_record(row.to_record()).unwrap();
        assert_eq!(back, row);
    }
}
