use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use manifesto_match_core::{Manifesto, SurveyItem};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const DEFAULT_QUIZ_FILE: &str = "qq.json";
pub const DEFAULT_MANIFESTOS_FILE: &str = "manifestos.json";

/// Locations of the survey catalog and the stance store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    pub quiz_path: PathBuf,
    pub manifestos_path: PathBuf,
}

impl DataConfig {
    #[must_use]
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            quiz_path: data_dir.join(DEFAULT_QUIZ_FILE),
            manifestos_path: data_dir.join(DEFAULT_MANIFESTOS_FILE),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::from_data_dir(Path::new("./data"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Read the survey catalog, failing on any I/O or decode error.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a JSON array of survey items.
pub fn read_survey_catalog(path: &Path) -> Result<Vec<SurveyItem>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read survey catalog {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to decode survey catalog {}", path.display()))
}

fn read_manifesto_entries(path: &Path) -> Result<Vec<Value>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifestos {}", path.display()))?;
    let value: Value = serde_json::from_str(&body)
        .with_context(|| format!("failed to decode manifestos {}", path.display()))?;
    match value {
        Value::Array(entries) => Ok(entries),
        _ => Err(anyhow!("manifestos file {} MUST contain a JSON array", path.display())),
    }
}

/// Read the stance store. Entries that do not decode are skipped with a warning so
/// one malformed manifesto cannot hide the others.
///
/// # Errors
/// Returns an error when the file cannot be read or its top level is not a JSON array.
pub fn read_manifestos(path: &Path) -> Result<Vec<Manifesto>> {
    let entries = read_manifesto_entries(path)?;
    let mut manifestos = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Manifesto>(entry) {
            Ok(manifesto) => manifestos.push(manifesto),
            Err(err) => {
                tracing::warn!(index, error = %err, path = %path.display(), "skipping undecodable manifesto");
            }
        }
    }
    Ok(manifestos)
}

/// Lenient variant of [`read_survey_catalog`]: load failures become an empty catalog.
#[must_use]
pub fn load_survey_catalog(path: &Path) -> Vec<SurveyItem> {
    read_survey_catalog(path).unwrap_or_else(|err| {
        tracing::warn!(error = format!("{err:#}"), "survey catalog unavailable");
        Vec::new()
    })
}

/// Lenient variant of [`read_manifestos`]: load failures become an empty store.
#[must_use]
pub fn load_manifestos(path: &Path) -> Vec<Manifesto> {
    read_manifestos(path).unwrap_or_else(|err| {
        tracing::warn!(error = format!("{err:#}"), "stance store unavailable");
        Vec::new()
    })
}

fn write_json_atomically<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    {
        let file = File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("failed to encode {}", temp_path.display()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)
        .with_context(|| format!("failed to move {} into place", temp_path.display()))?;
    Ok(())
}

/// # Errors
/// Returns an error when the catalog cannot be encoded or written.
pub fn write_survey_catalog(path: &Path, catalog: &[SurveyItem]) -> Result<()> {
    write_json_atomically(path, catalog)
}

/// # Errors
/// Returns an error when the manifestos cannot be encoded or written.
pub fn write_manifestos(path: &Path, manifestos: &[Manifesto]) -> Result<()> {
    write_json_atomically(path, manifestos)
}

/// Insert a manifesto, or replace the entry with the same id, and persist the store.
///
/// Works on the raw JSON entries: entries that do not decode as [`Manifesto`] are
/// written back unchanged.
///
/// # Errors
/// Returns an error when an existing store cannot be read, or the result cannot be written.
pub fn upsert_manifesto(path: &Path, manifesto: Manifesto) -> Result<UpsertOutcome> {
    let mut entries = if path.exists() { read_manifesto_entries(path)? } else { Vec::new() };
    let id = manifesto.id;
    let encoded = serde_json::to_value(&manifesto)
        .with_context(|| format!("failed to encode manifesto {id}"))?;

    let outcome = match entries.iter_mut().find(|entry| entry_id(entry) == Some(id)) {
        Some(existing) => {
            *existing = encoded;
            UpsertOutcome::Replaced
        }
        None => {
            entries.push(encoded);
            UpsertOutcome::Inserted
        }
    };

    write_json_atomically(path, &entries)?;
    tracing::debug!(id, entries = entries.len(), ?outcome, "manifesto stored");
    Ok(outcome)
}

fn entry_id(entry: &Value) -> Option<u64> {
    entry.get("id").and_then(Value::as_u64)
}

/// Survey catalog and stance store loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    survey: Vec<SurveyItem>,
    manifestos: Vec<Manifesto>,
    fingerprint: String,
}

impl StoreSnapshot {
    #[must_use]
    pub fn load(config: &DataConfig) -> Self {
        let snapshot = Self::from_parts(
            load_survey_catalog(&config.quiz_path),
            load_manifestos(&config.manifestos_path),
        );
        tracing::info!(
            survey_items = snapshot.survey.len(),
            manifestos = snapshot.manifestos.len(),
            fingerprint = %snapshot.fingerprint,
            "data snapshot loaded"
        );
        snapshot
    }

    #[must_use]
    pub fn from_parts(survey: Vec<SurveyItem>, manifestos: Vec<Manifesto>) -> Self {
        let fingerprint = compute_fingerprint(&survey, &manifestos);
        Self { survey, manifestos, fingerprint }
    }

    #[must_use]
    pub fn survey(&self) -> &[SurveyItem] {
        &self.survey
    }

    #[must_use]
    pub fn manifestos(&self) -> &[Manifesto] {
        &self.manifestos
    }

    /// Content digest of the loaded data, stable across reloads of identical files.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn compute_fingerprint(survey: &[SurveyItem], manifestos: &[Manifesto]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"survey:");
    hasher.update(serde_json::to_vec(survey).unwrap_or_default());
    hasher.update(b"manifestos:");
    hasher.update(serde_json::to_vec(manifestos).unwrap_or_default());

    let digest = hasher.finalize();
    let digest_hex = format!("{digest:x}");
    format!("snap_{}", &digest_hex[..16])
}
