use manifesto_match_core::TextGenerator;

use crate::IngestError;

#[must_use]
pub fn build_simplify_prompt(text: &str) -> String {
    format!(
        r#"You rewrite complex political, legal, or policy text so a general audience can understand it.

Replace political jargon, technical terms, and bureaucratic phrasing with simple, direct, everyday language. Keep the original meaning and intent, and do not drop any critical detail. Output only the rewritten text under the title "Simplified Policy Text", with no commentary before or after it.

Text to simplify:
{text}
"#
    )
}

/// # Errors
/// Returns [`IngestError::EmptyText`] for blank input or [`IngestError::Generation`]
/// when the generator fails.
pub fn simplify_text(generator: &dyn TextGenerator, text: &str) -> Result<String, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }
    let simplified = generator.generate(&build_simplify_prompt(text))?;
    Ok(simplified.trim().to_string())
}
