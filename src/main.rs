use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use redliner::config::{self, AgentConfig};
use redliner::pipeline::extraction::{AnnotationMode, DocumentBackend, DocxBackend, HostedBackend};
use redliner::pipeline::playbook::PlaybookStore;
use redliner::pipeline::processor::RedlineProcessor;
use redliner::remote::{HttpHostedClient, StaticToken};

/// Analyze redlines in a contract document against a negotiation playbook.
#[derive(Parser)]
#[command(name = "redliner", version, about)]
struct Cli {
    /// Input document: a packaged document path, or a hosted document id.
    #[arg(short, long)]
    input: String,

    /// Playbook file (single default playbook). Mutually exclusive with
    /// --playbook-dir.
    #[arg(short, long, conflicts_with = "playbook_dir")]
    playbook: Option<PathBuf>,

    /// Directory of playbooks with an optional contract_types.json
    /// registry. Defaults to ~/.redliner/playbooks when neither flag is
    /// given.
    #[arg(long)]
    playbook_dir: Option<PathBuf>,

    /// Contract type selecting the playbook; falls back to the default.
    #[arg(short = 't', long)]
    contract_type: Option<String>,

    /// Output path for the annotated document (packaged format).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document format.
    #[arg(short, long, value_enum, default_value = "word")]
    format: Format,

    /// Model provider (overrides DEFAULT_AI_PROVIDER).
    #[arg(long)]
    provider: Option<String>,

    /// Model name (overrides DEFAULT_MODEL).
    #[arg(short, long)]
    model: Option<String>,

    /// Write-back mode.
    #[arg(long, value_enum, default_value = "comment")]
    mode: Mode,

    /// Judge only; do not write anything back.
    #[arg(long)]
    analyze_only: bool,

    /// Abort the whole run if any annotation anchor has gone stale.
    #[arg(long)]
    strict: bool,

    /// Skip writing the Markdown run summary next to the output.
    #[arg(long)]
    no_summary: bool,

    /// Hosted API base URL (hosted format only).
    #[arg(long, env = "HOSTED_DOCS_BASE_URL")]
    hosted_base_url: Option<String>,

    /// Hosted API access token (hosted format only).
    #[arg(long, env = "HOSTED_DOCS_TOKEN", hide_env_values = true)]
    hosted_token: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Word,
    Hosted,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Comment,
    Counter,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let cli = Cli::parse();

    let mut agent_config = AgentConfig::from_env();
    if let Some(provider) = &cli.provider {
        agent_config.provider = provider
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(model) = &cli.model {
        agent_config.model = model.clone();
    }
    agent_config.annotation.strict = cli.strict;

    let store = match (&cli.playbook, &cli.playbook_dir) {
        (Some(path), _) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading playbook {}", path.display()))?;
            PlaybookStore::from_source(&source)?
        }
        (None, Some(dir)) => PlaybookStore::load_dir(dir)?,
        (None, None) => PlaybookStore::load_dir(&config::playbooks_dir())
            .context("no playbook given and ~/.redliner/playbooks not usable")?,
    };

    let processor = RedlineProcessor::from_config(agent_config, Arc::new(store))?;
    let mode = match cli.mode {
        Mode::Comment => AnnotationMode::Comment,
        Mode::Counter => AnnotationMode::CounterRedline,
    };

    let (backend, summary_path): (Box<dyn DocumentBackend>, PathBuf) = match cli.format {
        Format::Word => {
            let input = PathBuf::from(&cli.input);
            let output = cli.output.clone().unwrap_or_else(|| {
                let stem = input
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document");
                let ext = input
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or("docx");
                input.with_file_name(format!("{stem}_reviewed.{ext}"))
            });
            let summary = output.with_extension("report.md");
            (Box::new(DocxBackend::new(input, output)), summary)
        }
        Format::Hosted => {
            let base_url = cli
                .hosted_base_url
                .as_deref()
                .context("--hosted-base-url (or HOSTED_DOCS_BASE_URL) is required for hosted documents")?;
            let token = cli
                .hosted_token
                .clone()
                .context("--hosted-token (or HOSTED_DOCS_TOKEN) is required for hosted documents")?;
            let api = HttpHostedClient::new(base_url, Box::new(StaticToken(token)))?;
            let summary = cli
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}_report.md", cli.input)));
            (
                Box::new(HostedBackend::new(Arc::new(api), &cli.input)),
                summary,
            )
        }
    };

    let report = processor.process(backend.as_ref(), cli.contract_type.as_deref(), mode, cli.analyze_only)?;

    if report.redline_count == 0 {
        println!("No tracked changes found; document left untouched.");
        return Ok(());
    }

    println!(
        "Redlines: {}  verdicts: {}  judgment failures: {}  annotation skips: {}",
        report.redline_count,
        report.verdicts.len(),
        report.judgment_failures.len(),
        report.annotation_skips.len(),
    );
    for verdict in &report.verdicts {
        println!(
            "  #{} [{}] {}",
            verdict.redline_id,
            verdict.risk.as_str(),
            verdict.assessment
        );
    }
    for failure in &report.judgment_failures {
        println!("  #{} not judged: {}", failure.redline_id, failure.reason);
    }

    if !cli.no_summary && !cli.analyze_only {
        std::fs::write(&summary_path, report.to_markdown())
            .with_context(|| format!("writing summary {}", summary_path.display()))?;
        println!("Summary written to {}", summary_path.display());
    }

    if cli.analyze_only {
        println!("Analyze-only run; nothing written back.");
    } else if !report.annotated {
        bail!("run finished without producing an annotated document");
    }

    Ok(())
}
