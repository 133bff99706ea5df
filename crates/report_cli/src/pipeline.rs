use std::fs;
use std::path::{Path, PathBuf};

use corpus_store::{ChecksumManifest, GateReport, IntegrityGate, VerifiedCorpus};
use report_book::{
    assemble, compose, default_latex_template, typeset, AnalysisResult, Analyzer, ComposeContext,
    Document, ReportConfig, Section, StaticSections, TypesetJob, Typesetter,
};
use serde::Serialize;

use crate::failure::PipelineError;

pub const DEFAULT_CORPUS: &str = "data/corpus.tsv";
pub const DEFAULT_CONFIG: &str = "data/report.json";
pub const DEFAULT_OUT_DIR: &str = "out";

pub const CHAPTERS_DIR: &str = "chapters";
pub const MARKDOWN_FILE: &str = "report.md";
pub const LATEX_FILE: &str = "report.tex";

#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub corpus: PathBuf,
    pub config: PathBuf,
    pub checksums: Option<PathBuf>,
    pub out_dir: PathBuf,
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self {
            corpus: PathBuf::from(DEFAULT_CORPUS),
            config: PathBuf::from(DEFAULT_CONFIG),
            checksums: None,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
        }
    }
}

impl PipelinePaths {
    pub fn chapters_dir(&self) -> PathBuf {
        self.out_dir.join(CHAPTERS_DIR)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Overrides `expected_count` from the report configuration.
    pub expected_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub record_count: usize,
    pub sections: usize,
    pub chapter_files: Vec<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub latex: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
}

struct Verified {
    config: ReportConfig,
    corpus: VerifiedCorpus,
}

// Checksums are checked before the configuration is parsed; the expected
// count is only known once it has been.
fn run_gate(paths: &PipelinePaths, opts: &PipelineOptions) -> Result<Verified, PipelineError> {
    tracing::info!(
        corpus = %paths.corpus.display(),
        config = %paths.config.display(),
        checksums = ?paths.checksums,
        "running integrity gate"
    );
    let mut gate = IntegrityGate::new(opts.expected_count.unwrap_or_default())
        .require(&paths.config)
        .with_checksums(paths.checksums.clone());
    let preflight = gate.preflight(&paths.corpus)?;
    let config = ReportConfig::load(&paths.config)?;
    gate.expected_count = opts.expected_count.unwrap_or(config.expected_count);
    let corpus = gate.admit(&paths.corpus, preflight)?;
    Ok(Verified { config, corpus })
}

fn run_analysis(paths: &PipelinePaths, verified: &Verified) -> Result<AnalysisResult, PipelineError> {
    let analyzer = Analyzer::from_config(&verified.config).map_err(|source| PipelineError::Analyzer {
        path: paths.config.clone(),
        source,
    })?;
    Ok(analyzer.analyze(verified.corpus.store.records()))
}

fn compose_sections(
    verified: &Verified,
    analysis: &AnalysisResult,
) -> Result<Vec<Section>, PipelineError> {
    let statics = StaticSections::load_dir(&verified.config.static_dir_path())?;
    let ctx = ComposeContext {
        analysis,
        records: verified.corpus.store.records(),
        gate: Some(&verified.corpus.report),
    };
    Ok(compose(
        &ctx,
        &statics,
        &verified.config.templates(),
        &verified.config.manifest,
    )?)
}

fn write_file(stage: &'static str, path: &Path, contents: &str) -> Result<(), PipelineError> {
    fs::write(path, contents).map_err(|e| PipelineError::io(stage, path, e))
}

/// Replaces every `.md` file in the chapters directory with `sections`.
fn write_chapters(paths: &PipelinePaths, sections: &[Section]) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = paths.chapters_dir();
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io("create chapters dir", &dir, e))?;
    let entries = fs::read_dir(&dir).map_err(|e| PipelineError::io("list chapters", &dir, e))?;
    for entry in entries {
        let stale = entry
            .map_err(|e| PipelineError::io("list chapters", &dir, e))?
            .path();
        if stale.extension().and_then(|e| e.to_str()) == Some("md") {
            fs::remove_file(&stale).map_err(|e| PipelineError::io("remove stale chapter", &stale, e))?;
        }
    }
    let mut written = Vec::with_capacity(sections.len());
    for section in sections {
        let path = dir.join(section.file_name());
        write_file("write chapter", &path, &section.to_markdown())?;
        tracing::debug!(ordinal = section.ordinal, path = %path.display(), "chapter written");
        written.push(path);
    }
    tracing::info!(dir = %dir.display(), chapters = written.len(), "chapters written");
    Ok(written)
}

fn write_document(
    paths: &PipelinePaths,
    document: &Document,
    summary: &mut BuildSummary,
) -> Result<PathBuf, PipelineError> {
    let markdown = paths.out_dir.join(MARKDOWN_FILE);
    write_file("write markdown", &markdown, &document.to_markdown())?;
    let latex = paths.out_dir.join(LATEX_FILE);
    write_file("write latex", &latex, &document.to_latex(default_latex_template()))?;
    tracing::info!(markdown = %markdown.display(), latex = %latex.display(), "document written");
    summary.markdown = Some(markdown);
    summary.latex = Some(latex.clone());
    Ok(latex)
}

/// Runs the integrity gate only.
pub fn validate(paths: &PipelinePaths, opts: &PipelineOptions) -> Result<GateReport, PipelineError> {
    Ok(run_gate(paths, opts)?.corpus.report)
}

pub fn stats(paths: &PipelinePaths, opts: &PipelineOptions) -> Result<AnalysisResult, PipelineError> {
    let verified = run_gate(paths, opts)?;
    run_analysis(paths, &verified)
}

pub fn generate_chapters(
    paths: &PipelinePaths,
    opts: &PipelineOptions,
) -> Result<BuildSummary, PipelineError> {
    let verified = run_gate(paths, opts)?;
    let analysis = run_analysis(paths, &verified)?;
    let sections = compose_sections(&verified, &analysis)?;
    Ok(BuildSummary {
        record_count: verified.corpus.store.count(),
        sections: sections.len(),
        chapter_files: write_chapters(paths, &sections)?,
        ..BuildSummary::default()
    })
}

fn build_document(
    paths: &PipelinePaths,
    opts: &PipelineOptions,
) -> Result<(BuildSummary, PathBuf), PipelineError> {
    let verified = run_gate(paths, opts)?;
    let analysis = run_analysis(paths, &verified)?;
    let sections = compose_sections(&verified, &analysis)?;
    let mut summary = BuildSummary {
        record_count: verified.corpus.store.count(),
        sections: sections.len(),
        ..BuildSummary::default()
    };
    // Assembled before anything is written so an invalid document leaves no files.
    let document = assemble(sections, verified.config.front_matter())?;
    summary.chapter_files = write_chapters(paths, &document.sections)?;
    let latex = write_document(paths, &document, &mut summary)?;
    Ok((summary, latex))
}

pub fn generate_document(
    paths: &PipelinePaths,
    opts: &PipelineOptions,
) -> Result<BuildSummary, PipelineError> {
    build_document(paths, opts).map(|(summary, _)| summary)
}

pub fn full_build(
    paths: &PipelinePaths,
    opts: &PipelineOptions,
    typesetter: &dyn Typesetter,
) -> Result<BuildSummary, PipelineError> {
    let (mut summary, latex) = build_document(paths, opts)?;
    let pdf = typeset(&TypesetJob::new(latex), typesetter)?;
    tracing::info!(pdf = %pdf.display(), "report built");
    summary.pdf = Some(pdf);
    Ok(summary)
}

/// Computes a checksum manifest for `files` and writes it to `output`.
/// Entry paths are recorded relative to the manifest's directory.
pub fn seal(files: &[PathBuf], output: &Path) -> Result<ChecksumManifest, PipelineError> {
    let base_dir = output.parent().unwrap_or_else(|| Path::new(""));
    for file in files {
        if !file.exists() {
            return Err(PipelineError::from(corpus_store::IntegrityError::MissingFile {
                path: file.clone(),
            }));
        }
    }
    let manifest = ChecksumManifest::seal(files, base_dir)
        .map_err(|e| PipelineError::io("hash", base_dir, e))?;
    write_file("write manifest", output, &manifest.render())?;
    tracing::info!(output = %output.display(), entries = manifest.entries.len(), "checksum manifest sealed");
    Ok(manifest)
}
