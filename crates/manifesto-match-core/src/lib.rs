use std::fmt::{Display, Formatter};

mod enrich;
mod linker;
mod model;
mod ranking;
mod scoring;

pub use enrich::{
    build_explanation_prompt, enrich_report, truncate_chars, EnrichmentConfig, EnrichmentOutcome,
    ExplanationContext, GenerationError, TextGenerator,
};
pub use linker::{link_answers_to_topics, TagAnswerMap, TopicAnswers};
pub use model::{
    Manifesto, ManifestoAnalysis, PolicyStance, Score, SurveyItem, TopicTag, UserAnswer,
    DEFAULT_SUMMARY, NOT_MENTIONED_EXPLANATION,
};
pub use ranking::{rank_results, summarize_preferences, AlignmentReport, UserPreference};
pub use scoring::{
    align_manifesto, similarity, AlignmentResult, TopicDetail, MAX_DISTANCE, TOP_TOPIC_LIMIT,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NoDataReason {
    NoManifestos,
    NoSurveyItems,
    NoLinkedAnswers,
    NoScorableManifestos,
}

impl NoDataReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoManifestos => "no manifestos loaded",
            Self::NoSurveyItems => "no quiz questions available",
            Self::NoLinkedAnswers => "no valid answers or quiz questions",
            Self::NoScorableManifestos => "no manifesto could be scored",
        }
    }
}

impl Display for NoDataReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("no data: {0}")]
    NoData(NoDataReason),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("internal computation error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct AlignmentOptions {
    /// Also surface the three least-aligned topics per manifesto.
    pub include_disagreements: bool,
}

pub(crate) fn count_as_f64(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

/// Convert raw request integers into validated answers.
///
/// # Errors
/// Returns [`EngineError::MalformedInput`] when the sequence is empty or any value
/// falls outside 1..=5.
pub fn validate_answers(raw: &[i64]) -> Result<Vec<UserAnswer>, EngineError> {
    if raw.is_empty() {
        return Err(EngineError::MalformedInput("answers MUST be a non-empty list".to_string()));
    }
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            Score::new(*value).ok_or_else(|| {
                EngineError::MalformedInput(format!(
                    "answers[{index}]={value} is outside {}..={}",
                    Score::MIN,
                    Score::MAX
                ))
            })
        })
        .collect()
}

/// Score every manifesto against the user's answers and rank the results.
///
/// Manifestos without stances are left out; a manifesto whose stances cannot be
/// scored is logged and skipped without affecting the others.
///
/// # Errors
/// Returns [`EngineError::MalformedInput`] for an empty answer list, and
/// [`EngineError::NoData`] when there are no manifestos, no survey items, no
/// answer could be linked to a topic, or no manifesto could be scored.
pub fn compute_alignment(
    catalog: &[SurveyItem],
    manifestos: &[Manifesto],
    answers: &[UserAnswer],
    options: &AlignmentOptions,
) -> Result<AlignmentReport, EngineError> {
    if answers.is_empty() {
        return Err(EngineError::MalformedInput("answers MUST be a non-empty list".to_string()));
    }
    if manifestos.is_empty() {
        return Err(EngineError::NoData(NoDataReason::NoManifestos));
    }
    if catalog.is_empty() {
        return Err(EngineError::NoData(NoDataReason::NoSurveyItems));
    }

    let tag_answers = link_answers_to_topics(catalog, answers);
    if tag_answers.is_empty() {
        return Err(EngineError::NoData(NoDataReason::NoLinkedAnswers));
    }

    let mut results = Vec::with_capacity(manifestos.len());
    for manifesto in manifestos {
        match align_manifesto(&tag_answers, manifesto, options) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {
                tracing::debug!(manifesto_id = manifesto.id, "manifesto has no stances; excluded");
            }
            Err(err) => {
                tracing::warn!(manifesto_id = manifesto.id, error = %err, "manifesto skipped");
            }
        }
    }

    if results.is_empty() {
        return Err(EngineError::NoData(NoDataReason::NoScorableManifestos));
    }

    Ok(AlignmentReport {
        alignment_results: rank_results(results),
        user_preferences: summarize_preferences(&tag_answers),
    })
}
