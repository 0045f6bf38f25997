use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use manifesto_match_core::{
    compute_alignment, enrich_report, validate_answers, AlignmentOptions, AlignmentReport,
    EngineError, EnrichmentConfig, Manifesto, NoDataReason, SurveyItem, TextGenerator,
    UserAnswer,
};
use manifesto_match_store::{DataConfig, StoreSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Body of an alignment request. `answers` is kept untyped so shape errors surface
/// as [`EngineError::MalformedInput`] instead of a decoder rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlignRequest {
    #[serde(default)]
    pub answers: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_disagreements: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrich: Option<bool>,
}

impl AlignRequest {
    #[must_use]
    pub fn from_answers(answers: &[i64]) -> Self {
        Self { answers: Value::from(answers.to_vec()), ..Self::default() }
    }
}

/// # Errors
/// Returns [`EngineError::MalformedInput`] unless `answers` is a non-empty array of
/// integers within 1..=5.
pub fn parse_answers(answers: &Value) -> Result<Vec<UserAnswer>, EngineError> {
    let Some(entries) = answers.as_array() else {
        return Err(EngineError::MalformedInput("answers MUST be a non-empty list".to_string()));
    };
    let raw = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry.as_i64().ok_or_else(|| {
                EngineError::MalformedInput(format!("answers[{index}]={entry} is not an integer"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    validate_answers(&raw)
}

/// Request-level facade over a loaded snapshot and an optional text generator.
#[derive(Clone)]
pub struct MatchApi {
    snapshot: Arc<StoreSnapshot>,
    generator: Option<Arc<dyn TextGenerator>>,
    options: AlignmentOptions,
    enrichment: EnrichmentConfig,
}

impl Debug for MatchApi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchApi")
            .field("fingerprint", &self.snapshot.fingerprint())
            .field("generator", &self.generator.as_ref().map(|generator| generator.name()))
            .field("options", &self.options)
            .field("enrichment", &self.enrichment)
            .finish()
    }
}

impl MatchApi {
    #[must_use]
    pub fn new(snapshot: Arc<StoreSnapshot>) -> Self {
        Self {
            snapshot,
            generator: None,
            options: AlignmentOptions::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(Arc::new(StoreSnapshot::load(config)))
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: AlignmentOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    /// # Errors
    /// Returns [`EngineError::NoData`] when the survey catalog is empty.
    pub fn quiz(&self) -> Result<&[SurveyItem], EngineError> {
        let survey = self.snapshot.survey();
        if survey.is_empty() {
            return Err(EngineError::NoData(NoDataReason::NoSurveyItems));
        }
        Ok(survey)
    }

    /// # Errors
    /// Returns [`EngineError::NoData`] when the stance store is empty.
    pub fn manifestos(&self) -> Result<&[Manifesto], EngineError> {
        let manifestos = self.snapshot.manifestos();
        if manifestos.is_empty() {
            return Err(EngineError::NoData(NoDataReason::NoManifestos));
        }
        Ok(manifestos)
    }

    /// Validate a request body, score it, and enrich explanations when a
    /// generator is attached.
    ///
    /// # Errors
    /// Returns [`EngineError::MalformedInput`] for a bad body, or whatever
    /// [`compute_alignment`] reports.
    pub fn align(&self, request: &AlignRequest) -> Result<AlignmentReport, EngineError> {
        let answers = parse_answers(&request.answers)?;
        let options = AlignmentOptions {
            include_disagreements: request
                .include_disagreements
                .unwrap_or(self.options.include_disagreements),
        };
        let report = self.align_answers(&answers, &options)?;

        match (&self.generator, request.enrich) {
            (Some(generator), None | Some(true)) => {
                let outcome = enrich_report(
                    report,
                    self.snapshot.manifestos(),
                    generator,
                    &self.enrichment,
                );
                tracing::info!(
                    generator = generator.name(),
                    enriched = outcome.enriched,
                    failed = outcome.failed,
                    "explanation enrichment finished"
                );
                Ok(outcome.report)
            }
            _ => Ok(report),
        }
    }

    /// Numeric alignment only, without enrichment.
    ///
    /// # Errors
    /// See [`compute_alignment`].
    pub fn align_answers(
        &self,
        answers: &[UserAnswer],
        options: &AlignmentOptions,
    ) -> Result<AlignmentReport, EngineError> {
        compute_alignment(self.snapshot.survey(), self.snapshot.manifestos(), answers, options)
    }
}
