use std::fs;
use std::path::Path;

use crate::IngestError;

/// Plain text of every page of the PDF at `path`, trimmed.
///
/// # Errors
/// Returns [`IngestError::Io`] when the file cannot be read, [`IngestError::Pdf`] when
/// it is not a readable PDF, and [`IngestError::EmptyText`] when it has no text layer.
pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)
        .map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    let text = extract_pdf_text_from_mem(&bytes)?;
    tracing::info!(path = %path.display(), chars = text.chars().count(), "extracted PDF text");
    Ok(text)
}

/// # Errors
/// Same as [`extract_pdf_text`], minus the I/O case.
pub fn extract_pdf_text_from_mem(bytes: &[u8]) -> Result<String, IngestError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| IngestError::Pdf(err.to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::EmptyText);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const RAIL_MANIFESTO: &[u8] = include_bytes!("../tests/fixtures/rail-manifesto.pdf");

    fn squash_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    // Test IDs: TPDF-001
    #[test]
    fn extracts_text_layer_from_pdf_file() {
        let dir = std::env::temp_dir().join(format!("manifesto-match-pdf-{}", ulid::Ulid::new()));
        fs::create_dir_all(&dir)
            .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
        let path = dir.join("manifesto.pdf");
        fs::write(&path, RAIL_MANIFESTO)
            .unwrap_or_else(|err| panic!("failed to write fixture: {err}"));

        let text = extract_pdf_text(&path).unwrap_or_else(|err| panic!("pdf should extract: {err}"));
        let text = squash_whitespace(&text);
        assert!(text.contains("We will cut taxes and expand rail."), "text: {text}");
        assert!(text.contains("Every town gets a clinic."), "text: {text}");
        let _ = fs::remove_dir_all(&dir);
    }

    // Test IDs: TPDF-002
    #[test]
    fn rejects_missing_and_non_pdf_input() {
        let missing = PathBuf::from("/nonexistent/manifesto.pdf");
        assert!(matches!(extract_pdf_text(&missing), Err(IngestError::Io { .. })));
        assert!(matches!(
            extract_pdf_text_from_mem(b"plain text, not a PDF"),
            Err(IngestError::Pdf(_))
        ));
    }
}
