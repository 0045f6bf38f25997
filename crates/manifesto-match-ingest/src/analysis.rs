use std::fmt::Write as _;

use manifesto_match_core::{
    Manifesto, ManifestoAnalysis, Score, TextGenerator, TopicTag, NOT_MENTIONED_EXPLANATION,
};
use time::OffsetDateTime;

use crate::IngestError;

fn stance_schema() -> String {
    let mut schema = String::from(
        "{\n  \"summary\": \"A 2-3 sentence, simple-language overview of the manifesto's main focus and tone.\",\n  \"policy_scores\": {\n",
    );
    for (index, topic) in TopicTag::ALL.iter().enumerate() {
        let separator = if index + 1 == TopicTag::ALL.len() { "" } else { "," };
        let _ = write!(
            schema,
            "    \"{topic}\": {{\n      \"score\": <1-5>,\n      \"explanation\": \"<Simple 1-sentence explanation of the stance on {topic}>\"\n    }}{separator}\n"
        );
    }
    schema.push_str("  }\n}");
    schema
}

/// Prompt asking a generator to score every topic of `manifesto_text` on the 1..=5 scale.
#[must_use]
pub fn build_analysis_prompt(manifesto_text: &str) -> String {
    let topics = TopicTag::ALL.iter().map(|topic| format!("- {topic}")).collect::<Vec<_>>().join("\n");
    format!(
        r#"You are a precise, non-partisan political analyst. Analyze the political manifesto below and output a structured JSON object.

Instructions:
1. Read the entire manifesto text.
2. For each of the {count} policy areas listed below, determine the party's stance and assign a score from 1 to 5:
   * 1 = Strong Left/Progressive (high government spending, strong regulation, social programs)
   * 2 = Moderate Left/Progressive
   * 3 = Neutral / Centrist (mixed policies, no strong stance, or not mentioned)
   * 4 = Moderate Right/Conservative
   * 5 = Strong Right/Conservative (tax cuts, free market, privatization)
3. If a policy is not mentioned or the stance is unclear, assign 3 and set the explanation to "{not_mentioned}"
4. For each policy, give a one-sentence explanation in plain language.
5. Give a 2-3 sentence summary of the manifesto's overall goals.

Policy areas to score:
{topics}

Output only the JSON object in this exact schema, with no code fences or other text:
{schema}

Manifesto text:
---
{manifesto_text}
---
"#,
        count = TopicTag::ALL.len(),
        not_mentioned = NOT_MENTIONED_EXPLANATION,
        schema = stance_schema(),
    )
}

/// Decode the outermost `{...}` span of a generator reply into an analysis.
///
/// # Errors
/// Returns [`IngestError::NoJsonObject`] when no brace-delimited span exists, and
/// [`IngestError::Decode`] when the span is not a valid analysis object.
pub fn parse_analysis_output(raw: &str) -> Result<ManifestoAnalysis, IngestError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(IngestError::NoJsonObject);
    };
    if end < start {
        return Err(IngestError::NoJsonObject);
    }
    Ok(serde_json::from_str(&raw[start..=end])?)
}

#[must_use]
pub fn missing_topics(analysis: &ManifestoAnalysis) -> Vec<TopicTag> {
    TopicTag::ALL
        .into_iter()
        .filter(|topic| !analysis.policy_scores.contains_key(topic.as_str()))
        .collect()
}

/// Stance keys whose score would make the manifesto unscorable.
#[must_use]
pub fn out_of_range_topics(analysis: &ManifestoAnalysis) -> Vec<String> {
    analysis
        .policy_scores
        .iter()
        .filter(|(_, stance)| Score::new(stance.score).is_none())
        .map(|(topic, _)| topic.clone())
        .collect()
}

/// Run one analysis round trip and wrap the result as a stance-store entry.
///
/// # Errors
/// Returns [`IngestError::EmptyText`] for blank input, or the generation and
/// parsing failures of the round trip.
pub fn analyze_manifesto(
    generator: &dyn TextGenerator,
    id: u64,
    name: Option<String>,
    text: &str,
) -> Result<Manifesto, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    tracing::info!(generator = generator.name(), manifesto_id = id, chars = text.chars().count(), "analyzing manifesto");
    let raw = generator.generate(&build_analysis_prompt(text))?;
    let analysis = parse_analysis_output(&raw)?;

    let missing = missing_topics(&analysis);
    if !missing.is_empty() {
        tracing::warn!(manifesto_id = id, ?missing, "analysis omitted topics; they will score as neutral");
    }
    let invalid = out_of_range_topics(&analysis);
    if !invalid.is_empty() {
        tracing::warn!(manifesto_id = id, ?invalid, "analysis has scores outside 1..=5; manifesto will be skipped when aligning");
    }

    Ok(Manifesto {
        id,
        name,
        analysis: Some(analysis),
        source_text: Some(text.to_string()),
        analyzed_at: Some(OffsetDateTime::now_utc()),
    })
}

#[cfg(test)]
mod tests {
    use manifesto_match_core::GenerationError;

    use super::*;

    struct FixedGenerator(Result<String, GenerationError>);

    impl TextGenerator for FixedGenerator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.clone()
        }
    }

    const REPLY: &str = r#"Here is the analysis:
```json
{
  "summary": "A growth-first platform.",
  "policy_scores": {
    "Economy": {"score": 5, "explanation": "Cuts taxes broadly."},
    "Social Justice": {"score": 2, "explanation": "Expands anti-discrimination law."}
  }
}
```
Let me know if you need more."#;

    // Test IDs: TING-001
    #[test]
    fn prompt_lists_every_topic_and_the_neutral_rule() {
        let prompt = build_analysis_prompt("We will plant a million trees.");
        for topic in TopicTag::ALL {
            assert!(prompt.contains(&format!("- {topic}\n")), "missing {topic}");
            assert!(prompt.contains(&format!("\"{topic}\": {{")), "schema missing {topic}");
        }
        assert!(prompt.contains(NOT_MENTIONED_EXPLANATION));
        assert!(prompt.contains("We will plant a million trees."));
    }

    // Test IDs: TING-002
    #[test]
    fn parse_tolerates_fences_and_prose() {
        let analysis = parse_analysis_output(REPLY)
            .unwrap_or_else(|err| panic!("reply should parse: {err}"));
        assert_eq!(analysis.summary.as_deref(), Some("A growth-first platform."));
        assert_eq!(analysis.policy_scores.get("Economy").map(|stance| stance.score), Some(5));
        assert_eq!(missing_topics(&analysis).len(), 8);
        assert!(out_of_range_topics(&analysis).is_empty());
    }

    // Test IDs: TING-003
    #[test]
    fn parse_reports_missing_or_broken_json() {
        assert!(matches!(parse_analysis_output("no json here"), Err(IngestError::NoJsonObject)));
        assert!(matches!(parse_analysis_output("} backwards {"), Err(IngestError::NoJsonObject)));
        assert!(matches!(
            parse_analysis_output(r#"{"policy_scores": {"Economy": {"score": "high"}}}"#),
            Err(IngestError::Decode(_))
        ));
    }

    // Test IDs: TING-004
    #[test]
    fn analyze_wraps_result_as_store_entry() {
        let generator = FixedGenerator(Ok(REPLY.to_string()));
        let manifesto = analyze_manifesto(&generator, 7, Some("Growth Party".to_string()), "Full text")
            .unwrap_or_else(|err| panic!("analysis should succeed: {err}"));
        assert_eq!(manifesto.id, 7);
        assert_eq!(manifesto.display_name(), "Growth Party");
        assert_eq!(manifesto.source_text.as_deref(), Some("Full text"));
        assert!(manifesto.analyzed_at.is_some());
        assert!(manifesto.stances().is_some());
    }

    // Test IDs: TING-005
    #[test]
    fn analyze_rejects_blank_text_and_propagates_generation_errors() {
        let generator = FixedGenerator(Err(GenerationError::Failed("boom".to_string())));
        assert!(matches!(analyze_manifesto(&generator, 1, None, "  \n"), Err(IngestError::EmptyText)));
        assert!(matches!(
            analyze_manifesto(&generator, 1, None, "text"),
            Err(IngestError::Generation(GenerationError::Failed(_)))
        ));
    }

    // Test IDs: TING-006
    #[test]
    fn out_of_range_scores_are_flagged() {
        let analysis = parse_analysis_output(
            r#"{"policy_scores": {"Defense": {"score": 7, "explanation": "x"}, "Economy": {"score": 3}}}"#,
        )
        .unwrap_or_else(|err| panic!("analysis should parse: {err}"));
        assert_eq!(out_of_range_topics(&analysis), vec!["Defense".to_string()]);
    }
}
