use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use report_book::{RenderFailure, TypesetJob, TypesetPass, Typesetter};
use report_cli::{
    full_build, generate_chapters, generate_document, seal, stats, validate, FailureKind,
    PipelineOptions, PipelinePaths,
};

fn sample_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("testdata")
        .join("sample")
        .join(name)
}

/// Copies the sample inputs into `dir` and returns paths pointing at the copy.
fn sample_workspace(dir: &Path) -> PipelinePaths {
    let data = dir.join("data");
    fs::create_dir_all(data.join("static")).expect("create data dir");
    for name in ["corpus.tsv", "report.json", "CHECKSUMS"] {
        fs::copy(sample_path(name), data.join(name)).expect("copy sample file");
    }
    for name in ["introduction.md", "methodology.md"] {
        fs::copy(
            sample_path("static").join(name),
            data.join("static").join(name),
        )
        .expect("copy static section");
    }
    PipelinePaths {
        corpus: data.join("corpus.tsv"),
        config: data.join("report.json"),
        checksums: Some(data.join("CHECKSUMS")),
        out_dir: dir.join("out"),
    }
}

fn read_dir_sorted(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| {
            let path = e.expect("entry").path();
            let name = path.file_name().expect("name").to_string_lossy().into_owned();
            (name, fs::read(&path).expect("read file"))
        })
        .collect();
    files.sort();
    files
}

#[derive(Default)]
struct RecordingTypesetter {
    passes: RefCell<Vec<TypesetPass>>,
    fail_second: bool,
}

impl RecordingTypesetter {
    fn pass(&self, pass: TypesetPass, job: &TypesetJob) -> Result<(), RenderFailure> {
        assert!(job.tex_path.exists(), "tex written before typesetting");
        self.passes.borrow_mut().push(pass);
        if self.fail_second && pass == TypesetPass::Second {
            return Err(RenderFailure {
                pass,
                status: "exit status: 1".to_string(),
                diagnostics: "! LaTeX Error: File `missing.sty' not found.".to_string(),
            });
        }
        if pass == TypesetPass::Second {
            fs::write(job.pdf_path(), b"%PDF-1.5\n").expect("write pdf");
        }
        Ok(())
    }
}

impl Typesetter for RecordingTypesetter {
    fn first_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure> {
        self.pass(TypesetPass::First, job)
    }

    fn second_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure> {
        self.pass(TypesetPass::Second, job)
    }
}

#[test]
fn validate_reports_verified_checksums() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let report = validate(&paths, &PipelineOptions::default()).expect("validate");
    assert_eq!(report.record_count, 20);
    assert_eq!(report.checksums_verified.len(), 2);
    assert!(!paths.out_dir.exists());
}

#[test]
fn chapters_are_byte_identical_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let opts = PipelineOptions::default();

    let first = generate_document(&paths, &opts).expect("first run");
    assert_eq!(first.chapter_files.len(), 8);
    let chapters_first = read_dir_sorted(&paths.chapters_dir());
    let markdown_first = fs::read(paths.out_dir.join("report.md")).expect("report.md");

    generate_document(&paths, &opts).expect("second run");
    assert_eq!(read_dir_sorted(&paths.chapters_dir()), chapters_first);
    assert_eq!(
        fs::read(paths.out_dir.join("report.md")).expect("report.md"),
        markdown_first
    );

    let names: Vec<&str> = chapters_first.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "01-introduction.md",
            "02-corpus-summary.md",
            "03-word-frequency.md",
            "04-category-analysis.md",
            "05-derived-ratios.md",
            "06-record-catalogue.md",
            "07-methodology.md",
            "08-integrity-appendix.md",
        ]
    );
}

#[test]
fn static_sections_are_copied_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    generate_chapters(&paths, &PipelineOptions::default()).expect("chapters");
    let source = fs::read_to_string(sample_path("static").join("methodology.md")).expect("source");
    let chapter =
        fs::read_to_string(paths.chapters_dir().join("07-methodology.md")).expect("chapter");
    assert_eq!(chapter, source);
}

#[test]
fn static_section_trailing_whitespace_is_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let authored = "# Methodology\n\nIndented code follows.\n\n    total = 54  \n\n\n";
    fs::write(dir.path().join("data").join("static").join("methodology.md"), authored)
        .expect("write static section");
    generate_chapters(&paths, &PipelineOptions::default()).expect("chapters");
    let chapter =
        fs::read_to_string(paths.chapters_dir().join("07-methodology.md")).expect("chapter");
    assert_eq!(chapter, authored);
}

#[test]
fn stale_chapters_are_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    fs::create_dir_all(paths.chapters_dir()).expect("mkdir");
    fs::write(paths.chapters_dir().join("09-old.md"), "stale").expect("write stale");
    fs::write(paths.chapters_dir().join("notes.txt"), "keep").expect("write other");
    generate_chapters(&paths, &PipelineOptions::default()).expect("chapters");
    assert!(!paths.chapters_dir().join("09-old.md").exists());
    assert!(paths.chapters_dir().join("notes.txt").exists());
}

#[test]
fn corrupted_input_halts_before_any_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let mut bytes = fs::read(&paths.corpus).expect("read corpus");
    let at = bytes.len() / 2;
    bytes[at] ^= 0x20;
    fs::write(&paths.corpus, bytes).expect("write corpus");

    let err = validate(&paths, &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ChecksumMismatch);
    assert_eq!(err.kind().exit_code(), 4);

    let typesetter = RecordingTypesetter::default();
    let err = full_build(&paths, &PipelineOptions::default(), &typesetter).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ChecksumMismatch);
    assert!(typesetter.passes.borrow().is_empty());
    assert!(!paths.out_dir.exists());
}

#[test]
fn corrupted_config_is_caught_before_it_is_parsed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    fs::write(&paths.config, "{ not json").expect("write config");
    let err = validate(&paths, &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ChecksumMismatch);
}

#[test]
fn corpus_not_listed_in_manifest_is_a_data_integrity_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut paths = sample_workspace(dir.path());
    let copy = dir.path().join("data").join("corpus-copy.tsv");
    fs::copy(&paths.corpus, &copy).expect("copy corpus");
    paths.corpus = copy;

    let err = generate_chapters(&paths, &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::DataIntegrity);
    assert_eq!(err.kind().exit_code(), 2);
    assert!(err.to_string().contains("corpus-copy.tsv"));
    assert!(!paths.out_dir.exists());
}

#[test]
fn expected_count_override_mismatch_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let opts = PipelineOptions {
        expected_count: Some(21),
    };
    let err = generate_chapters(&paths, &opts).unwrap_err();
    assert_eq!(err.kind(), FailureKind::CountMismatch);
    assert!(err.to_string().contains("expected 21, loaded 20"));
    assert!(!paths.out_dir.exists());
}

#[test]
fn unknown_manifest_entry_is_template_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut paths = sample_workspace(dir.path());
    paths.checksums = None;
    let mut config: serde_json::Value =
        serde_json::from_slice(&fs::read(&paths.config).expect("read config")).expect("json");
    config["manifest"]
        .as_array_mut()
        .expect("manifest array")
        .push(serde_json::json!("glossary"));
    fs::write(&paths.config, serde_json::to_vec_pretty(&config).expect("encode")).expect("write");

    let err = generate_document(&paths, &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::TemplateMissing);
    assert!(err.to_string().contains("glossary"));
    assert!(!paths.out_dir.exists());
}

#[test]
fn full_build_runs_two_passes_and_reports_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let typesetter = RecordingTypesetter::default();
    let summary = full_build(&paths, &PipelineOptions::default(), &typesetter).expect("build");
    assert_eq!(
        *typesetter.passes.borrow(),
        vec![TypesetPass::First, TypesetPass::Second]
    );
    assert_eq!(summary.pdf, Some(paths.out_dir.join("report.pdf")));
    let tex = fs::read_to_string(paths.out_dir.join("report.tex")).expect("tex");
    assert!(tex.contains("\\title{Inscription Ledger Report"));
}

#[test]
fn typesetter_failure_is_render_failure_with_diagnostics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let typesetter = RecordingTypesetter {
        fail_second: true,
        ..RecordingTypesetter::default()
    };
    let err = full_build(&paths, &PipelineOptions::default(), &typesetter).unwrap_err();
    assert_eq!(err.kind(), FailureKind::RenderFailure);
    assert_eq!(err.kind().exit_code(), 6);
    assert!(err
        .to_string()
        .contains("! LaTeX Error: File `missing.sty' not found."));
}

#[test]
fn stats_match_configured_buckets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = sample_workspace(dir.path());
    let analysis = stats(&paths, &PipelineOptions::default()).expect("stats");
    assert_eq!(analysis.total_tokens, 54);
    assert_eq!(analysis.word_stats[0].word, "official");
    assert_eq!(analysis.ratios[2].display_value(), "undefined");
}

#[test]
fn seal_writes_manifest_that_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut paths = sample_workspace(dir.path());
    let output = dir.path().join("data").join("SEALED");
    let manifest = seal(&[paths.corpus.clone(), paths.config.clone()], &output).expect("seal");
    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(
        fs::read_to_string(&output).expect("read sealed"),
        fs::read_to_string(sample_path("CHECKSUMS")).expect("read fixture")
    );
    paths.checksums = Some(output);
    validate(&paths, &PipelineOptions::default()).expect("sealed manifest validates");
}
