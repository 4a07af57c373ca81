//! Property tests for judgment extraction: a well-formed judgment must
//! survive whatever prose or fencing a model wraps around it.

use appraise_core::Judgment;
use appraise_llm::parse_judgment;
use proptest::prelude::*;

fn judgment_strategy() -> impl Strategy<Value = Judgment> {
    (
        "[A-Za-z][A-Za-z ]{0,20}",
        "[A-Za-z0-9 .,;]{0,80}",
        "[A-Za-z0-9 .,;]{0,80}",
    )
        .prop_map(|(value, rationale, evidence)| Judgment::new(value, rationale, evidence))
}

/// Prose that cannot smuggle in a competing JSON object.
fn noise_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .,:;!?\n-]{0,120}"
}

proptest! {
    #[test]
    fn fenced_judgments_survive_surrounding_prose(
        judgment in judgment_strategy(),
        before in noise_strategy(),
        after in noise_strategy(),
    ) {
        let raw = format!(
            "{before}\n```json\n{}\n```\n{after}",
            serde_json::to_string_pretty(&judgment).unwrap()
        );
        let parsed = parse_judgment(&raw).unwrap();
        prop_assert_eq!(parsed, judgment);
    }

    #[test]
    fn bare_judgments_embedded_in_prose_are_found(
        judgment in judgment_strategy(),
        before in noise_strategy(),
        after in noise_strategy(),
    ) {
        let raw = format!(
            "{before} {} {after}",
            serde_json::to_string(&judgment).unwrap()
        );
        let parsed = parse_judgment(&raw).unwrap();
        prop_assert_eq!(parsed, judgment);
    }

    #[test]
    fn extraction_never_panics_on_arbitrary_text(raw in ".{0,400}") {
        let _ = parse_judgment(&raw);
    }
}
