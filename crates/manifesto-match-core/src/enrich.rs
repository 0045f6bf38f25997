//! Optional, best-effort rewriting of topic explanations through a text generator.
//!
//! Enrichment runs only after the numeric report is final. The topic calls for one
//! manifesto run concurrently under a shared deadline, and the whole pass is capped
//! by a request budget. Failures are isolated per topic: a failed topic keeps its
//! short explanation and never changes any score.
//!
//! A call that misses its deadline is abandoned, not cancelled. Its worker thread
//! runs until the generator returns, bounded by the backend's own HTTP timeout.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::{Manifesto, TopicTag};
use crate::ranking::AlignmentReport;
use crate::scoring::TopicDetail;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum GenerationError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("generator returned empty output")]
    Empty,
}

/// A backend that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &str;

    /// # Errors
    /// Returns a [`GenerationError`] when the backend cannot produce text.
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentConfig {
    pub per_topic_timeout: Duration,
    /// Wall-clock cap for the whole pass; topics still pending when it runs out keep
    /// their short explanation.
    pub total_budget: Duration,
    pub source_char_budget: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            per_topic_timeout: Duration::from_secs(20),
            total_budget: Duration::from_secs(60),
            source_char_budget: 12_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExplanationContext<'a> {
    pub topic: TopicTag,
    pub user_score: f64,
    pub party_score: u8,
    pub explanation: &'a str,
    pub source_text: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutcome {
    pub report: AlignmentReport,
    pub enriched: usize,
    pub failed: usize,
}

#[must_use]
pub fn build_explanation_prompt(context: &ExplanationContext<'_>) -> String {
    format!(
        r#"You explain how a voter's views compare with a political manifesto, in plain language.

Policy area: {topic}
Voter's average answer (1 = strongly disagree, 5 = strongly agree): {user_score:.1}
Manifesto stance score (1 = strong left/progressive, 5 = strong right/conservative): {party_score}
Short stance summary: {explanation}

Write 2-3 simple sentences describing what the manifesto proposes on {topic} and how that
relates to the voter's answer. Quote no more than one short phrase from the manifesto. Do not
add headings, lists, or any text before or after the paragraph.

Manifesto text:
---
{source}
---
"#,
        topic = context.topic,
        user_score = context.user_score,
        party_score = context.party_score,
        explanation = context.explanation,
        source = context.source_text,
    )
}

/// Longest prefix of `text` holding at most `budget` characters.
#[must_use]
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn clean_output(result: Result<String, GenerationError>) -> Result<String, GenerationError> {
    let text = result?;
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text.to_string())
}

#[derive(Debug, Default)]
struct Tally {
    enriched: usize,
    failed: usize,
}

fn record_failure(
    tally: &mut Tally,
    generator: &Arc<dyn TextGenerator>,
    manifesto_id: u64,
    topic: TopicTag,
    err: &GenerationError,
) {
    tracing::warn!(
        generator = generator.name(),
        manifesto_id,
        topic = %topic,
        error = %err,
        "explanation enrichment failed; keeping short explanation"
    );
    tally.failed += 1;
}

/// Generate every detail's explanation concurrently, waiting until `deadline` at most.
fn enrich_details(
    details: &mut [&mut TopicDetail],
    manifesto_id: u64,
    source_text: &str,
    generator: &Arc<dyn TextGenerator>,
    deadline: Instant,
    tally: &mut Tally,
) {
    let waited = deadline.saturating_duration_since(Instant::now());
    let (sender, receiver) = mpsc::channel();
    let mut settled = vec![false; details.len()];
    let mut pending = 0_usize;

    for (index, detail) in details.iter().enumerate() {
        let prompt = build_explanation_prompt(&ExplanationContext {
            topic: detail.tag,
            user_score: detail.user_score,
            party_score: detail.party_score,
            explanation: &detail.explanation,
            source_text,
        });
        let worker = Arc::clone(generator);
        let sender = sender.clone();
        let spawned = std::thread::Builder::new().name("mm-enrich".to_string()).spawn(move || {
            let _ = sender.send((index, worker.generate(&prompt)));
        });
        match spawned {
            Ok(_) => pending += 1,
            Err(err) => {
                settled[index] = true;
                let err = GenerationError::Unavailable(err.to_string());
                record_failure(tally, generator, manifesto_id, detail.tag, &err);
            }
        }
    }
    drop(sender);

    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok((index, result)) = receiver.recv_timeout(remaining) else {
            break;
        };
        pending -= 1;
        settled[index] = true;
        match clean_output(result) {
            Ok(text) => {
                details[index].explanation = text;
                tally.enriched += 1;
            }
            Err(err) => record_failure(tally, generator, manifesto_id, details[index].tag, &err),
        }
    }

    for (detail, _) in details.iter().zip(&settled).filter(|(_, settled)| !**settled) {
        let err = GenerationError::TimedOut(waited);
        record_failure(tally, generator, manifesto_id, detail.tag, &err);
    }
}

/// Replace the explanations of surfaced topics with generated paragraphs.
///
/// Manifestos without `source_text` are passed through untouched.
#[must_use]
pub fn enrich_report(
    report: AlignmentReport,
    manifestos: &[Manifesto],
    generator: &Arc<dyn TextGenerator>,
    config: &EnrichmentConfig,
) -> EnrichmentOutcome {
    let AlignmentReport { mut alignment_results, user_preferences } = report;
    let request_deadline = Instant::now() + config.total_budget;
    let mut tally = Tally::default();

    for result in &mut alignment_results {
        let Some(source_text) = manifestos
            .iter()
            .find(|manifesto| manifesto.id == result.manifesto_id)
            .and_then(|manifesto| manifesto.source_text.as_deref())
            .filter(|text| !text.trim().is_empty())
        else {
            continue;
        };
        let source_text = truncate_chars(source_text, config.source_char_budget);
        let manifesto_id = result.manifesto_id;
        let mut details = result
            .top_matching_policies
            .iter_mut()
            .chain(result.top_disagreements.iter_mut().flatten())
            .collect::<Vec<_>>();

        let now = Instant::now();
        if now >= request_deadline {
            for detail in &details {
                let err = GenerationError::TimedOut(config.total_budget);
                record_failure(&mut tally, generator, manifesto_id, detail.tag, &err);
            }
            continue;
        }
        let deadline = request_deadline.min(now + config.per_topic_timeout);
        enrich_details(&mut details, manifesto_id, source_text, generator, deadline, &mut tally);
    }

    EnrichmentOutcome {
        report: AlignmentReport { alignment_results, user_preferences },
        enriched: tally.enriched,
        failed: tally.failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::UserPreference;
    use crate::scoring::AlignmentResult;

    struct ScriptedGenerator {
        delay: Duration,
        fail_topic: Option<TopicTag>,
    }

    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            std::thread::sleep(self.delay);
            if let Some(topic) = self.fail_topic {
                if prompt.contains(&format!("Policy area: {topic}")) {
                    return Err(GenerationError::Failed("scripted failure".to_string()));
                }
            }
            Ok(format!("  Rich explanation ({} chars of prompt)  ", prompt.len()))
        }
    }

    fn detail(tag: TopicTag, similarity_score: f64) -> TopicDetail {
        TopicDetail {
            tag,
            similarity_score,
            explanation: format!("short {tag}"),
            party_score: 3,
            user_score: 4.0,
        }
    }

    fn report() -> AlignmentReport {
        AlignmentReport {
            alignment_results: vec![
                AlignmentResult {
                    manifesto_id: 1,
                    name: "Party 1".to_string(),
                    alignment: 62.5,
                    summary: "Summary".to_string(),
                    top_matching_policies: vec![
                        detail(TopicTag::Economy, 75.0),
                        detail(TopicTag::Defense, 50.0),
                    ],
                    top_disagreements: None,
                },
                AlignmentResult {
                    manifesto_id: 2,
                    name: "Party 2".to_string(),
                    alignment: 40.0,
                    summary: "Summary".to_string(),
                    top_matching_policies: vec![detail(TopicTag::Economy, 40.0)],
                    top_disagreements: None,
                },
            ],
            user_preferences: vec![UserPreference(TopicTag::Economy, 4.0)],
        }
    }

    fn manifestos() -> Vec<Manifesto> {
        vec![
            Manifesto {
                id: 1,
                name: None,
                analysis: None,
                source_text: Some("We will build railways.".to_string()),
                analyzed_at: None,
            },
            Manifesto { id: 2, name: None, analysis: None, source_text: None, analyzed_at: None },
        ]
    }

    // Test IDs: TENR-001
    #[test]
    fn enrichment_rewrites_explanations_and_keeps_numbers() {
        let generator: Arc<dyn TextGenerator> =
            Arc::new(ScriptedGenerator { delay: Duration::ZERO, fail_topic: None });
        let original = report();
        let outcome =
            enrich_report(original.clone(), &manifestos(), &generator, &EnrichmentConfig::default());

        assert_eq!(outcome.enriched, 2);
        assert_eq!(outcome.failed, 0);
        let first = &outcome.report.alignment_results[0];
        assert!(first.top_matching_policies[0].explanation.starts_with("Rich explanation"));
        assert_eq!(first.alignment, original.alignment_results[0].alignment);
        assert_eq!(
            first.top_matching_policies[0].similarity_score,
            original.alignment_results[0].top_matching_policies[0].similarity_score
        );
        // Manifesto 2 has no source text.
        assert_eq!(
            outcome.report.alignment_results[1].top_matching_policies[0].explanation,
            "short Economy"
        );
    }

    // Test IDs: TENR-002
    #[test]
    fn failed_topic_keeps_short_explanation_without_aborting_others() {
        let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator {
            delay: Duration::ZERO,
            fail_topic: Some(TopicTag::Economy),
        });
        let outcome =
            enrich_report(report(), &manifestos(), &generator, &EnrichmentConfig::default());

        let details = &outcome.report.alignment_results[0].top_matching_policies;
        assert_eq!(details[0].explanation, "short Economy");
        assert!(details[1].explanation.starts_with("Rich explanation"));
        assert_eq!((outcome.enriched, outcome.failed), (1, 1));
    }

    // Test IDs: TENR-003
    #[test]
    fn slow_generator_is_cut_off_per_topic() {
        let generator: Arc<dyn TextGenerator> =
            Arc::new(ScriptedGenerator { delay: Duration::from_millis(500), fail_topic: None });
        let config = EnrichmentConfig {
            per_topic_timeout: Duration::from_millis(20),
            ..EnrichmentConfig::default()
        };
        let original = report();
        let outcome = enrich_report(original.clone(), &manifestos(), &generator, &config);

        assert_eq!(outcome.report, original);
        assert_eq!((outcome.enriched, outcome.failed), (0, 2));
    }

    // Test IDs: TENR-006
    #[test]
    fn topic_calls_for_one_manifesto_share_a_deadline() {
        let generator: Arc<dyn TextGenerator> =
            Arc::new(ScriptedGenerator { delay: Duration::from_millis(150), fail_topic: None });
        let config = EnrichmentConfig {
            per_topic_timeout: Duration::from_millis(1_500),
            ..EnrichmentConfig::default()
        };
        let mut three_topics = report();
        three_topics.alignment_results[0].top_disagreements =
            Some(vec![detail(TopicTag::Healthcare, 10.0)]);

        let started = Instant::now();
        let outcome = enrich_report(three_topics, &manifestos(), &generator, &config);
        assert_eq!((outcome.enriched, outcome.failed), (3, 0));
        assert!(started.elapsed() < Duration::from_millis(1_000), "{:?}", started.elapsed());
    }

    // Test IDs: TENR-007
    #[test]
    fn request_budget_caps_the_whole_pass() {
        let generator: Arc<dyn TextGenerator> =
            Arc::new(ScriptedGenerator { delay: Duration::from_secs(3), fail_topic: None });
        let config = EnrichmentConfig {
            per_topic_timeout: Duration::from_secs(10),
            total_budget: Duration::from_millis(100),
            ..EnrichmentConfig::default()
        };
        let mut both_sourced = manifestos();
        both_sourced[1].source_text = Some("We will fund schools.".to_string());
        let original = report();

        let started = Instant::now();
        let outcome = enrich_report(original.clone(), &both_sourced, &generator, &config);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(outcome.report, original);
        assert_eq!((outcome.enriched, outcome.failed), (0, 3));
    }

    // Test IDs: TENR-004
    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    // Test IDs: TENR-005
    #[test]
    fn prompt_carries_scores_and_source() {
        let prompt = build_explanation_prompt(&ExplanationContext {
            topic: TopicTag::SocialJustice,
            user_score: 4.3,
            party_score: 2,
            explanation: "Backs anti-discrimination law.",
            source_text: "Equal pay for equal work.",
        });
        assert!(prompt.contains("Policy area: Social Justice"));
        assert!(prompt.contains("5 = strongly agree): 4.3"));
        assert!(prompt.contains("5 = strong right/conservative): 2"));
        assert!(prompt.contains("Equal pay for equal work."));
    }
}
