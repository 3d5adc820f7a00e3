use checkup_common::{CheckOutcome, Stage, normalize_ws, normalized_set};

use crate::store::ResultRow;

/// Turn the raw corrections proposed for `row` under `stage` into the
/// outcome to record, demoting findings the grammar stage already covers.
///
/// Only punctuation, clarity and tone are compared against grammar:
/// - grammar flagged the row and the proposed set equals grammar's set
///   (whitespace-normalized): the fix was already reported, record clean;
/// - grammar found the row clean and a proposal equals the original text
///   (whitespace-normalized): a no-op correction, record clean.
pub fn apply_suppression(stage: Stage, row: &ResultRow, proposed: Vec<String>) -> CheckOutcome {
    if !stage.is_suppressible() {
        return CheckOutcome::from_corrections(proposed);
    }

    match row.outcome(Stage::Grammar) {
        CheckOutcome::Flagged(grammar) => {
            if normalized_set(&proposed) == normalized_set(grammar) {
                return CheckOutcome::Clean;
            }
        }
        CheckOutcome::Clean => {
            let text = normalize_ws(&row.fragment.text);
            if proposed.iter().any(|p| normalize_ws(p) == text) {
                return CheckOutcome::Clean;
            }
        }
        CheckOutcome::Pending => {}
    }

    CheckOutcome::from_corrections(proposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fragment, StoreRow};

    fn row(text: &str, grammar: CheckOutcome) -> ResultRow {
        let mut row = ResultRow::from_fragment(
            1,
            Fragment {
                text: text.into(),
                ..Default::default()
            },
        );
        row.set_outcome(Stage::Grammar, grammar);
        row
    }

    #[test]
    fn test_same_fix_as_grammar_is_suppressed() {
        let r = row("Foo", CheckOutcome::Flagged(vec!["Foo.".into()]));
        let out = apply_suppression(Stage::Punctuation, &r, vec!["Foo.".into()]);
        assert_eq!(out, CheckOutcome::Clean);
        assert_eq!(out.to_cells(), ("0".to_string(), String::new()));
    }

    #[test]
    fn test_set_comparison_ignores_order_and_spacing() {
        let r = row("x", CheckOutcome::Flagged(vec!["A  b.".into(), "C.".into()]));
        let out = apply_suppression(Stage::Tone, &r, vec!["C.".into(), " A b. ".into()]);
        assert_eq!(out, CheckOutcome::Clean);
    }

    #[test]
    fn test_different_fix_than_grammar_is_kept() {
        let r = row("Foo", CheckOutcome::Flagged(vec!["Foo.".into()]));
        let out = apply_suppression(Stage::Clarity, &r, vec!["Foo!".into()]);
        assert_eq!(out, CheckOutcome::Flagged(vec!["Foo!".into()]));
    }

    #[test]
    fn test_noop_correction_on_clean_grammar_is_suppressed() {
        let r = row("Bar.", CheckOutcome::Clean);
        let out = apply_suppression(Stage::Clarity, &r, vec![" Bar. ".into()]);
        assert_eq!(out, CheckOutcome::Clean);
    }

    #[test]
    fn test_real_correction_on_clean_grammar_is_kept() {
        let r = row("Bar.", CheckOutcome::Clean);
        let out = apply_suppression(Stage::Punctuation, &r, vec!["Bar!".into()]);
        assert_eq!(out, CheckOutcome::Flagged(vec!["Bar!".into()]));
    }

    #[test]
    fn test_early_stages_pass_through() {
        let r = row("Foo", CheckOutcome::Flagged(vec!["Foo.".into()]));
        let out = apply_suppression(Stage::Spellcheck, &r, vec!["Foo.".into()]);
        assert_eq!(out, CheckOutcome::Flagged(vec!["Foo.".into()]));
        let out = apply_suppression(Stage::Grammar, &r, vec![]);
        assert_eq!(out, CheckOutcome::Clean);
    }

    #[test]
    fn test_pending_grammar_keeps_result() {
        let r = row("Bar.", CheckOutcome::Pending);
        let out = apply_suppression(Stage::Tone, &r, vec!["Bar.".into()]);
        assert_eq!(out, CheckOutcome::Flagged(vec!["Bar.".into()]));
    }
}
