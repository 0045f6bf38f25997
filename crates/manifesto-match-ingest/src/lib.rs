//! Producing the engine's inputs: stance mappings from manifesto text and the survey catalog.

mod analysis;
mod pdf;
mod simplify;
mod survey;

pub use analysis::{
    analyze_manifesto, build_analysis_prompt, missing_topics, out_of_range_topics,
    parse_analysis_output,
};
pub use pdf::{extract_pdf_text, extract_pdf_text_from_mem};
pub use simplify::{build_simplify_prompt, simplify_text};
pub use survey::{default_options, generate_survey, templates_for, OPTION_LABELS};

use manifesto_match_core::GenerationError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("input text is empty")]
    EmptyText,
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to extract PDF text: {0}")]
    Pdf(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("generated output did not contain a JSON object")]
    NoJsonObject,
    #[error("generated analysis could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
