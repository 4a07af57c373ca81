//! Prompt assembly for evaluation and arbitration calls.
//!
//! Both prompts pin the output contract to a JSON object in a fenced block
//! so [`crate::extract::parse_judgment`] has a stable target.

use appraise_core::{Judgment, MetricDefinition};

/// System prompt for a single-metric evaluation pass.
pub const EVALUATION_SYSTEM_PROMPT: &str = "\
You are an expert in academic research analysis.

You are given:
1. One assessment metric definition specific to a research domain.
2. The full text of a research paper.

Your task is to evaluate the method proposed in the paper against this single metric.

Instructions:
- Base your reasoning strictly on the paper's content. Do not infer or assume anything not explicitly stated.
- Focus on technical and methodological sections (e.g., design, implementation, evaluation, dataset).
- Assign one of the allowed values listed in the metric definition.
- Explain why this value applies.
- Provide direct evidence from the paper: quotes, section names, or page numbers.
Output:
- Return a JSON object wrapped in a markdown code block.
- Follow this schema:
```json
{
  \"value\": \"<value>\",
  \"rationale\": \"Explanation of why this value was assigned\",
  \"evidence\": \"<Page number, section name, and quote from the paper>\"
}
```";

/// System prompt for the arbitration pass over two disagreeing assessments.
pub const ARBITRATION_SYSTEM_PROMPT: &str = "\
You are an expert evaluator resolving discrepancies between two LLM assessments.
You are given:
1. A metric definition.
2. The full research paper text.
3. Two LLM assessments with different verdicts.

Instructions:
- Carefully evaluate both assessments based on the metric and the paper.
- Provide your own reasoning and conclusion.
- Output should be a JSON object wrapped in a markdown code block.
- Follow this format:
```json
{
  \"value\": \"<value>\",
  \"rationale\": \"Your detailed reasoning\",
  \"evidence\": \"<Page number, section, or quote>\"
}
```";

/// Render a metric as the prompt block: `name: description` followed by one
/// `- value: description` line per allowed value, in enumeration order.
pub fn metric_block(metric: &MetricDefinition) -> String {
    let mut lines = Vec::with_capacity(metric.values.len() + 1);
    lines.push(format!("{}: {}", metric.name, metric.description));
    for value in &metric.values {
        lines.push(format!("- {}: {}", value.value, value.description));
    }
    lines.join("\n")
}

/// User message for an evaluation call.
pub fn evaluation_user_prompt(metric: &MetricDefinition) -> String {
    format!("Assessment Metric:\n{}", metric_block(metric))
}

/// User message for an arbitration call: the metric, both judgments, and
/// explicit license to leave the enumerated set when neither verdict fits.
pub fn arbitration_user_prompt(metric: &MetricDefinition, a: &Judgment, b: &Judgment) -> String {
    let allowed: Vec<&str> = metric.allowed_values().collect();
    format!(
        "Metric: {}\nDescription: {}\nPossible Values: {}\n\
         Feel free to assign a value outside the list of possible values when appropriate.\n\n\
         Evaluator A output:\n{}\n\nEvaluator B output:\n{}",
        metric.name,
        metric.description,
        allowed.join(", "),
        serde_json::to_string_pretty(a).unwrap_or_else(|_| a.value.clone()),
        serde_json::to_string_pretty(b).unwrap_or_else(|_| b.value.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use appraise_core::Codebook;

    fn metric() -> MetricDefinition {
        let codebook = Codebook::from_json_str(
            r#"{
                "Failure Severity": {
                    "description": "Severity of surfaced failures",
                    "values": [
                        { "value": "High", "description": "crashes" },
                        { "value": "Medium", "description": "deviations" },
                        { "value": "Low", "description": "cosmetic" }
                    ]
                }
            }"#,
        )
        .unwrap();
        codebook.get("Failure Severity").unwrap().clone()
    }

    #[test]
    fn metric_block_lists_values_in_order() {
        let block = metric_block(&metric());
        assert_eq!(
            block,
            "Failure Severity: Severity of surfaced failures\n\
             - High: crashes\n- Medium: deviations\n- Low: cosmetic"
        );
    }

    #[test]
    fn arbitration_prompt_carries_both_judgments() {
        let a = Judgment::new("High", "crash reported", "p. 3");
        let b = Judgment::new("Low", "only cosmetic", "p. 9");
        let prompt = arbitration_user_prompt(&metric(), &a, &b);
        assert!(prompt.contains("Possible Values: High, Medium, Low"));
        assert!(prompt.contains("Evaluator A output:"));
        assert!(prompt.contains("crash reported"));
        assert!(prompt.contains("only cosmetic"));
        assert!(prompt.contains("outside the list"));
    }
}
