use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corpus_store::GateReport;
use report_book::{format_percentage, AnalysisResult, CommandTypesetter, DEFAULT_TYPESETTER};
use report_cli::{
    full_build, generate_chapters, generate_document, seal, stats, validate, BuildSummary,
    PipelineError, PipelineOptions, PipelinePaths, DEFAULT_CONFIG, DEFAULT_CORPUS,
    DEFAULT_OUT_DIR,
};

#[derive(Parser)]
#[command(
    name = "report-cli",
    version,
    about = "Corpus vocabulary statistics and report builder"
)]
struct Cli {
    /// Translation corpus (tab-separated)
    #[arg(long, global = true, env = "REPORT_CORPUS", default_value = DEFAULT_CORPUS, value_name = "PATH")]
    corpus: PathBuf,

    /// Report configuration (JSON)
    #[arg(long, global = true, env = "REPORT_CONFIG", default_value = DEFAULT_CONFIG, value_name = "PATH")]
    config: PathBuf,

    /// Checksum manifest verified before anything else runs
    #[arg(long, global = true, env = "REPORT_CHECKSUMS", value_name = "PATH")]
    checksums: Option<PathBuf>,

    #[arg(long, global = true, env = "REPORT_OUT_DIR", default_value = DEFAULT_OUT_DIR, value_name = "DIR")]
    out_dir: PathBuf,

    /// Typesetting program used by `full-build`
    #[arg(long, global = true, env = "REPORT_TYPESETTER", default_value = DEFAULT_TYPESETTER, value_name = "PROGRAM")]
    typesetter: PathBuf,

    /// Replaces the typesetter's default flags; repeat once per argument
    #[arg(long = "typesetter-arg", global = true, allow_hyphen_values = true, value_name = "ARG")]
    typesetter_args: Vec<String>,

    #[arg(long, global = true, env = "REPORT_TYPESET_TIMEOUT_SECS", default_value_t = 300, value_name = "SECS")]
    typeset_timeout_secs: u64,

    /// Overrides `expected_count` from the configuration
    #[arg(long, global = true, value_name = "N")]
    expected_count: Option<usize>,

    /// Emit JSON instead of key=value lines
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the integrity gate only
    Validate,
    /// Write one Markdown file per section
    GenerateChapters,
    /// Chapters plus the combined Markdown and LaTeX documents
    GenerateDocument,
    /// Everything, then typeset the LaTeX document in two passes
    FullBuild,
    /// Print the vocabulary analysis
    Stats,
    /// Write a checksum manifest covering FILES
    Seal(SealArgs),
}

#[derive(Args)]
struct SealArgs {
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), PipelineError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| PipelineError::Output(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn print_gate(report: &GateReport) {
    println!("records={}", report.record_count);
    println!("corpus_sha256={}", report.corpus_sha256);
    for file in &report.files_checked {
        println!("file_checked={}", file);
    }
    println!("checksums_verified={}", report.checksums_verified.len());
    for file in &report.checksums_verified {
        println!("checksum={}  {}", file.sha256, file.path);
    }
}

fn print_summary(summary: &BuildSummary) {
    println!("records={}", summary.record_count);
    println!("sections={}", summary.sections);
    for path in &summary.chapter_files {
        println!("chapter={}", path.display());
    }
    if let Some(path) = &summary.markdown {
        println!("markdown={}", path.display());
    }
    if let Some(path) = &summary.latex {
        println!("latex={}", path.display());
    }
    if let Some(path) = &summary.pdf {
        println!("pdf={}", path.display());
    }
}

fn print_stats(analysis: &AnalysisResult) {
    println!("records={}", analysis.record_count);
    println!("translated={}", analysis.translated_count);
    println!("total_tokens={}", analysis.total_tokens);
    println!("unique_words={}", analysis.unique_words);
    for (rank, stat) in analysis.top_words(10).iter().enumerate() {
        println!(
            "word.{}={} {} {}%",
            rank + 1,
            stat.word,
            stat.count,
            format_percentage(stat.count, analysis.total_tokens)
        );
    }
    for bucket in &analysis.category_buckets {
        println!(
            "bucket.{}={} {}%",
            bucket.name,
            bucket.matched_count,
            format_percentage(bucket.matched_count, analysis.total_tokens)
        );
    }
    for overlap in analysis.bucket_overlaps() {
        println!(
            "overlap.{}.{}={}",
            overlap.first,
            overlap.second,
            overlap.shared.join(",")
        );
    }
    for ratio in &analysis.ratios {
        println!("ratio.{}={}", ratio.name, ratio.display_value());
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<(), PipelineError> {
    if json {
        print_json(value)
    } else {
        text(value);
        Ok(())
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let paths = PipelinePaths {
        corpus: cli.corpus,
        config: cli.config,
        checksums: cli.checksums,
        out_dir: cli.out_dir,
    };
    let opts = PipelineOptions {
        expected_count: cli.expected_count,
    };
    match cli.command {
        Commands::Validate => emit(cli.json, &validate(&paths, &opts)?, print_gate),
        Commands::GenerateChapters => {
            emit(cli.json, &generate_chapters(&paths, &opts)?, print_summary)
        }
        Commands::GenerateDocument => {
            emit(cli.json, &generate_document(&paths, &opts)?, print_summary)
        }
        Commands::FullBuild => {
            let mut typesetter = CommandTypesetter::new(cli.typesetter)
                .with_timeout(Duration::from_secs(cli.typeset_timeout_secs));
            if !cli.typesetter_args.is_empty() {
                typesetter = typesetter.with_args(cli.typesetter_args);
            }
            emit(cli.json, &full_build(&paths, &opts, &typesetter)?, print_summary)
        }
        Commands::Stats => emit(cli.json, &stats(&paths, &opts)?, print_stats),
        Commands::Seal(args) => {
            let manifest = seal(&args.files, &args.output)?;
            if cli.json {
                let entries: Vec<serde_json::Value> = manifest
                    .entries
                    .iter()
                    .map(|e| serde_json::json!({ "path": e.path, "sha256": e.digest }))
                    .collect();
                print_json(&serde_json::json!({ "output": args.output, "entries": entries }))
            } else {
                println!("output={}", args.output.display());
                println!("entries={}", manifest.entries.len());
                Ok(())
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        let kind = err.kind();
        eprintln!("error[{}]: {}", kind, err);
        std::process::exit(kind.exit_code());
    }
}
