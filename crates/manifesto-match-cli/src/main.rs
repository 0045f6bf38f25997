use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use manifesto_match_api::{AlignRequest, MatchApi};
use manifesto_match_core::{AlignmentOptions, EnrichmentConfig, Manifesto, TextGenerator};
use manifesto_match_ingest::{
    analyze_manifesto, extract_pdf_text, generate_survey, missing_topics, out_of_range_topics,
    parse_analysis_output, simplify_text,
};
use manifesto_match_provider::{build_generator, ProviderConfig, ProviderError, ProviderKind};
use manifesto_match_store::{
    read_manifestos, read_survey_catalog, upsert_manifesto, write_survey_catalog, DataConfig,
    StoreSnapshot,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "mm")]
#[command(about = "Manifesto Match operator CLI")]
struct Cli {
    #[arg(long, env = "MM_QUIZ_PATH", default_value = "./data/qq.json")]
    quiz: PathBuf,

    #[arg(long, env = "MM_MANIFESTOS_PATH", default_value = "./data/manifestos.json")]
    manifestos: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Quiz {
        #[command(subcommand)]
        command: Box<QuizCommand>,
    },
    Manifestos {
        #[command(subcommand)]
        command: Box<ManifestosCommand>,
    },
    /// Score a manifesto's text and store the result.
    Analyze(AnalyzeArgs),
    /// Rewrite policy text in plain language.
    Simplify(SimplifyArgs),
    /// Rank stored manifestos against a set of answers.
    Align(AlignArgs),
}

#[derive(Debug, Subcommand)]
enum QuizCommand {
    Generate(QuizGenerateArgs),
    Show,
}

#[derive(Debug, Subcommand)]
enum ManifestosCommand {
    List,
}

#[derive(Debug, Args)]
struct QuizGenerateArgs {
    /// Seed for reproducible question selection.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Args)]
struct ProviderArgs {
    /// openai, anthropic or google; defaults to the first provider with an API key set.
    #[arg(long, env = "MM_PROVIDER")]
    provider: Option<String>,
    #[arg(long, env = "MM_MODEL")]
    model: Option<String>,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(long)]
    id: u64,
    #[arg(long)]
    name: Option<String>,
    /// Plain-text manifesto.
    #[arg(long, required_unless_present = "pdf_file", conflicts_with = "pdf_file")]
    text_file: Option<PathBuf>,
    /// Manifesto as a PDF; its text layer is extracted before analysis.
    #[arg(long)]
    pdf_file: Option<PathBuf>,
    /// Parse a saved generator reply instead of calling a provider.
    #[arg(long)]
    from_reply: Option<PathBuf>,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Args)]
struct SimplifyArgs {
    #[arg(long)]
    text_file: PathBuf,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Args)]
struct AlignArgs {
    /// Comma-separated answers on the 1..5 scale, in survey order.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    answers: Vec<i64>,
    #[arg(long, default_value_t = false)]
    include_disagreements: bool,
    #[arg(long, default_value_t = false)]
    enrich: bool,
    #[arg(long, default_value_t = 20)]
    enrich_timeout_secs: u64,
    /// Cap on the whole enrichment pass of one request.
    #[arg(long, default_value_t = 60)]
    enrich_budget_secs: u64,
    #[command(flatten)]
    provider: ProviderArgs,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn generator_from(args: &ProviderArgs) -> Result<Arc<dyn TextGenerator>> {
    let config = match args.provider.as_deref() {
        Some(name) => {
            let kind = ProviderKind::parse(name)
                .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;
            ProviderConfig::from_env_for(kind)?
        }
        None => ProviderConfig::from_env()?,
    };
    let config = config.with_timeout(Duration::from_secs(args.timeout_secs));
    let config = match &args.model {
        Some(model) => config.with_model(model.clone()),
        None => config,
    };
    Ok(build_generator(config))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data = DataConfig { quiz_path: cli.quiz, manifestos_path: cli.manifestos };
    match cli.command {
        Command::Quiz { command } => run_quiz(&command, &data),
        Command::Manifestos { command } => run_manifestos(&command, &data),
        Command::Analyze(args) => run_analyze(&args, &data),
        Command::Simplify(args) => run_simplify(&args),
        Command::Align(args) => run_align(&args, &data),
    }
}

fn run_quiz(command: &QuizCommand, data: &DataConfig) -> Result<()> {
    match command {
        QuizCommand::Generate(args) => {
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let survey = generate_survey(&mut rng);
            write_survey_catalog(&data.quiz_path, &survey)?;
            tracing::info!(items = survey.len(), path = %data.quiz_path.display(), "survey catalog written");
            emit_json(json!({
                "path": data.quiz_path.display().to_string(),
                "survey": survey,
            }))
        }
        QuizCommand::Show => {
            let survey = read_survey_catalog(&data.quiz_path)?;
            emit_json(json!({
                "path": data.quiz_path.display().to_string(),
                "survey": survey,
            }))
        }
    }
}

fn run_manifestos(command: &ManifestosCommand, data: &DataConfig) -> Result<()> {
    match command {
        ManifestosCommand::List => {
            let manifestos = read_manifestos(&data.manifestos_path)?;
            let entries = manifestos
                .iter()
                .map(|manifesto| {
                    let (missing, invalid) = manifesto.analysis.as_ref().map_or_else(
                        || (Vec::new(), Vec::new()),
                        |analysis| (missing_topics(analysis), out_of_range_topics(analysis)),
                    );
                    json!({
                        "id": manifesto.id,
                        "name": manifesto.display_name(),
                        "scorable": manifesto.stances().is_some() && invalid.is_empty(),
                        "missing_topics": missing,
                        "out_of_range_topics": invalid,
                    })
                })
                .collect::<Vec<_>>();
            emit_json(json!({ "manifestos": entries }))
        }
    }
}

fn manifesto_text(args: &AnalyzeArgs) -> Result<String> {
    match (&args.pdf_file, &args.text_file) {
        (Some(pdf), _) => Ok(extract_pdf_text(pdf)?),
        (None, Some(path)) => read_text(path),
        (None, None) => Err(anyhow!("one of --text-file or --pdf-file is required")),
    }
}

fn run_analyze(args: &AnalyzeArgs, data: &DataConfig) -> Result<()> {
    let text = manifesto_text(args)?;
    let manifesto = match &args.from_reply {
        Some(reply_path) => {
            let analysis = parse_analysis_output(&read_text(reply_path)?)?;
            Manifesto {
                id: args.id,
                name: args.name.clone(),
                analysis: Some(analysis),
                source_text: Some(text),
                analyzed_at: None,
            }
        }
        None => {
            let generator = generator_from(&args.provider)?;
            analyze_manifesto(generator.as_ref(), args.id, args.name.clone(), &text)?
        }
    };

    let name = manifesto.display_name();
    let scored_topics = manifesto.stances().map_or(0, std::collections::BTreeMap::len);
    let outcome = upsert_manifesto(&data.manifestos_path, manifesto)?;
    emit_json(json!({
        "id": args.id,
        "name": name,
        "scored_topics": scored_topics,
        "outcome": outcome,
        "path": data.manifestos_path.display().to_string(),
    }))
}

fn run_simplify(args: &SimplifyArgs) -> Result<()> {
    let text = read_text(&args.text_file)?;
    let generator = generator_from(&args.provider)?;
    let simplified = simplify_text(generator.as_ref(), &text)?;
    emit_json(json!({ "simplified": simplified }))
}

fn run_align(args: &AlignArgs, data: &DataConfig) -> Result<()> {
    let snapshot = StoreSnapshot::load(data);
    let fingerprint = snapshot.fingerprint().to_string();
    let mut api = MatchApi::new(Arc::new(snapshot))
        .with_options(AlignmentOptions { include_disagreements: args.include_disagreements })
        .with_enrichment(EnrichmentConfig {
            per_topic_timeout: Duration::from_secs(args.enrich_timeout_secs),
            total_budget: Duration::from_secs(args.enrich_budget_secs),
            ..EnrichmentConfig::default()
        });
    if args.enrich {
        api = api.with_generator(generator_from(&args.provider)?);
    }

    let report = api.align(&AlignRequest::from_answers(&args.answers))?;
    let mut value = serde_json::to_value(&report)?;
    if let Value::Object(object) = &mut value {
        object.insert("snapshot".to_string(), Value::String(fingerprint));
    }
    emit_json(value)
}
