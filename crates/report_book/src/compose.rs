use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use corpus_store::{GateReport, Record};
use thiserror::Error;

use crate::analyze::format_percentage;
use crate::config::{GeneratorKind, GeneratorSpec};
use crate::model::{AnalysisResult, Section, SectionSource, UNDEFINED_MARKER};
use crate::render::slugify;

const DEFAULT_TOP_WORDS: usize = 10;
const DEFAULT_CATALOGUE_ROWS: usize = 50;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no generator or static section registered for manifest entry `{key}`")]
    TemplateMissing { key: String },
    #[error("manifest lists section `{key}` more than once")]
    DuplicateKey { key: String },
    #[error("read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

/// Authored Markdown passed through unchanged apart from its title heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSection {
    pub key: String,
    pub title: String,
    pub body: String,
}

impl StaticSection {
    pub fn parse(key: &str, raw: &str) -> StaticSection {
        let mut title = None;
        let mut body = raw;
        let first_line_end = raw.find('\n').unwrap_or(raw.len());
        let first_line = raw[..first_line_end].trim_end_matches('\r');
        if let Some(heading) = first_line.strip_prefix("# ") {
            title = Some(heading.trim().to_string());
            body = raw[first_line_end..].trim_start_matches(['\r', '\n']);
        }
        StaticSection {
            key: key.to_string(),
            title: title.unwrap_or_else(|| title_from_key(key)),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSections {
    sections: BTreeMap<String, StaticSection>,
}

impl StaticSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `<key>.md` file in `dir`. A missing directory yields an
    /// empty set.
    pub fn load_dir(dir: &Path) -> Result<StaticSections, ComposeError> {
        let mut out = StaticSections::new();
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "static section directory not found");
            return Ok(out);
        }
        let io_err = |path: &Path, err: std::io::Error| ComposeError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let entries = fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| io_err(dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            out.insert(StaticSection::parse(key, &raw));
        }
        tracing::debug!(dir = %dir.display(), sections = out.len(), "static sections loaded");
        Ok(out)
    }

    pub fn insert(&mut self, section: StaticSection) {
        self.sections.insert(section.key.clone(), section);
    }

    pub fn get(&self, key: &str) -> Option<&StaticSection> {
        self.sections.get(key)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub title: String,
    pub limit: Option<usize>,
}

/// Generator registry keyed by manifest key.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    generators: BTreeMap<String, Generator>,
}

impl Templates {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut t = Templates::empty();
        for (key, kind) in [
            ("corpus-summary", GeneratorKind::CorpusSummary),
            ("word-frequency", GeneratorKind::WordFrequency),
            ("category-analysis", GeneratorKind::CategoryBuckets),
            ("derived-ratios", GeneratorKind::DerivedRatios),
            ("record-catalogue", GeneratorKind::RecordCatalogue),
            ("integrity-appendix", GeneratorKind::IntegrityLog),
        ] {
            t.register(
                key,
                Generator {
                    kind,
                    title: title_from_key(key),
                    limit: None,
                },
            );
        }
        t
    }

    /// Applies configured generators on top of the registry. Unset fields
    /// keep the value already registered under the same key.
    pub fn with_overrides(mut self, specs: &BTreeMap<String, GeneratorSpec>) -> Self {
        for (key, spec) in specs {
            let existing = self.generators.get(key);
            let title = spec
                .title
                .clone()
                .or_else(|| existing.map(|g| g.title.clone()))
                .unwrap_or_else(|| title_from_key(key));
            let limit = spec.limit.or_else(|| existing.and_then(|g| g.limit));
            self.register(
                key,
                Generator {
                    kind: spec.kind,
                    title,
                    limit,
                },
            );
        }
        self
    }

    pub fn register(&mut self, key: &str, generator: Generator) {
        self.generators.insert(key.to_string(), generator);
    }

    pub fn get(&self, key: &str) -> Option<&Generator> {
        self.generators.get(key)
    }
}

/// Read-only inputs the generators draw on.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub analysis: &'a AnalysisResult,
    pub records: &'a [Record],
    pub gate: Option<&'a GateReport>,
}

pub fn compose(
    ctx: &ComposeContext<'_>,
    statics: &StaticSections,
    templates: &Templates,
    manifest: &[String],
) -> Result<Vec<Section>, ComposeError> {
    let mut seen = BTreeSet::new();
    let mut sections = Vec::with_capacity(manifest.len());
    for (idx, key) in manifest.iter().enumerate() {
        if !seen.insert(key.as_str()) {
            return Err(ComposeError::DuplicateKey { key: key.clone() });
        }
        let ordinal = idx + 1;
        let section = if let Some(generator) = templates.get(key) {
            Section {
                ordinal,
                key: key.clone(),
                title: generator.title.clone(),
                body: generate(generator, ctx),
                source: SectionSource::Generated,
            }
        } else if let Some(authored) = statics.get(key) {
            Section {
                ordinal,
                key: key.clone(),
                title: authored.title.clone(),
                body: authored.body.clone(),
                source: SectionSource::Static,
            }
        } else {
            return Err(ComposeError::TemplateMissing { key: key.clone() });
        };
        tracing::debug!(ordinal, key = %key, source = ?section.source, "section composed");
        sections.push(section);
    }
    tracing::info!(sections = sections.len(), "composition complete");
    Ok(sections)
}

impl Section {
    pub fn file_name(&self) -> String {
        format!("{:02}-{}.md", self.ordinal, slugify(&self.key))
    }

    /// Stand-alone chapter file contents. The body is written as is; a
    /// newline is added only when it lacks a final one.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n{}", self.title, self.body);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// `word-frequency` -> `Word Frequency`.
pub fn title_from_key(key: &str) -> String {
    key.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn generate(generator: &Generator, ctx: &ComposeContext<'_>) -> String {
    match generator.kind {
        GeneratorKind::CorpusSummary => corpus_summary(ctx.analysis),
        GeneratorKind::WordFrequency => {
            word_frequency(ctx.analysis, generator.limit.unwrap_or(DEFAULT_TOP_WORDS))
        }
        GeneratorKind::CategoryBuckets => category_buckets(ctx.analysis),
        GeneratorKind::DerivedRatios => derived_ratios(ctx.analysis),
        GeneratorKind::RecordCatalogue => {
            record_catalogue(ctx.records, generator.limit.unwrap_or(DEFAULT_CATALOGUE_ROWS))
        }
        GeneratorKind::IntegrityLog => integrity_log(ctx.gate),
    }
}

/// Backslash-escapes characters Markdown would read as markup.
fn escape_inline(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '`' | '*' | '_' | '[' | ']' | '|') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn cell(value: &str) -> String {
    let v = value.trim();
    if v.is_empty() {
        "-".to_string()
    } else {
        escape_inline(v)
    }
}

fn corpus_summary(a: &AnalysisResult) -> String {
    let coverage = format_percentage(a.translated_count, a.record_count);
    let mut out = String::new();
    out.push_str(&format!(
        "The corpus holds {} records; {} of them carry a translation ({}% coverage).\n\n",
        a.record_count, a.translated_count, coverage
    ));
    out.push_str("| Measure | Value |\n| --- | --- |\n");
    out.push_str(&format!("| Records | {} |\n", a.record_count));
    out.push_str(&format!("| Translated records | {} |\n", a.translated_count));
    out.push_str(&format!("| Translation coverage | {}% |\n", coverage));
    out.push_str(&format!("| Total tokens | {} |\n", a.total_tokens));
    out.push_str(&format!("| Distinct words | {} |\n", a.unique_words));
    out
}

fn word_frequency(a: &AnalysisResult, limit: usize) -> String {
    let rows = a.top_words(limit);
    let Some(leader) = rows.first() else {
        return "The corpus contains no translation tokens.\n".to_string();
    };
    let mut out = String::new();
    out.push_str(&format!(
        "The most frequent word is **{}** with {} occurrences ({}% of {} tokens).\n\n",
        escape_inline(&leader.word),
        leader.count,
        format_percentage(leader.count, a.total_tokens),
        a.total_tokens
    ));
    out.push_str("| Rank | Word | Count | Percentage |\n| --- | --- | --- | --- |\n");
    for (rank, stat) in rows.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {}% |\n",
            rank + 1,
            cell(&stat.word),
            stat.count,
            format_percentage(stat.count, a.total_tokens)
        ));
    }
    out.push_str(&format!(
        "\nShowing {} of {} distinct words. Words with equal counts are listed in order of first appearance.\n",
        rows.len(),
        a.unique_words
    ));
    out
}

fn category_buckets(a: &AnalysisResult) -> String {
    if a.category_buckets.is_empty() {
        return "No categories are configured.\n".to_string();
    }
    let mut out = String::new();
    out.push_str("| Category | Members | Matches | Share of tokens |\n| --- | --- | --- | --- |\n");
    for bucket in &a.category_buckets {
        let members: Vec<&str> = bucket.member_words.iter().map(String::as_str).collect();
        out.push_str(&format!(
            "| {} | {} | {} | {}% |\n",
            cell(&bucket.label),
            cell(&members.join(", ")),
            bucket.matched_count,
            format_percentage(bucket.matched_count, a.total_tokens)
        ));
    }
    out.push_str(&format!(
        "\nShares use the same denominator as the word table ({} tokens). Each category is counted on its own: a token is counted once for every category whose members include it, so shares need not sum to 100%.\n",
        a.total_tokens
    ));
    let overlaps = a.bucket_overlaps();
    if overlaps.is_empty() {
        out.push_str("\nNo two categories share a member word.\n");
    } else {
        out.push_str("\n**Overlap notice:** these categories share member words, so their counts include the same tokens more than once:\n\n");
        for overlap in overlaps {
            let shared: Vec<String> = overlap.shared.iter().map(|w| escape_inline(w)).collect();
            out.push_str(&format!(
                "- {} / {}: {}\n",
                escape_inline(&overlap.first),
                escape_inline(&overlap.second),
                shared.join(", ")
            ));
        }
    }
    out
}

fn derived_ratios(a: &AnalysisResult) -> String {
    if a.ratios.is_empty() {
        return "No ratios are configured.\n".to_string();
    }
    let mut out = String::new();
    out.push_str("| Ratio | Numerator | Denominator | Value |\n| --- | --- | --- | --- |\n");
    for ratio in &a.ratios {
        out.push_str(&format!(
            "| {} | {} ({}) | {} ({}) | {} |\n",
            cell(&ratio.name),
            cell(&ratio.numerator),
            ratio.numerator_count,
            cell(&ratio.denominator),
            ratio.denominator_count,
            ratio.display_value()
        ));
    }
    out.push_str(&format!(
        "\nA ratio is reported as `{}` when its denominator category matched no tokens.\n",
        UNDEFINED_MARKER
    ));
    out
}

fn record_catalogue(records: &[Record], limit: usize) -> String {
    if records.is_empty() {
        return "The corpus holds no records.\n".to_string();
    }
    let shown = &records[..limit.min(records.len())];
    let mut out = String::new();
    out.push_str("| ID | Source tokens | Translation |\n| --- | --- | --- |\n");
    for record in shown {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            cell(&record.id),
            cell(&record.source_tokens.join(" ")),
            cell(&record.translation_text)
        ));
    }
    let omitted = records.len() - shown.len();
    if omitted > 0 {
        out.push_str(&format!(
            "\n{} further records omitted ({}% of the corpus shown).\n",
            omitted,
            format_percentage(shown.len(), records.len())
        ));
    }
    out
}

fn integrity_log(gate: Option<&GateReport>) -> String {
    let Some(report) = gate else {
        return "No integrity report was supplied for this run.\n".to_string();
    };
    let mut out = String::new();
    out.push_str(&format!(
        "The integrity gate admitted {} records before analysis began.\n\n",
        report.record_count
    ));
    if !report.corpus_sha256.is_empty() {
        out.push_str(&format!("Corpus SHA-256: `{}`\n\n", report.corpus_sha256));
    }
    if report.checksums_verified.is_empty() {
        out.push_str("No checksum manifest was configured for this run.\n");
        return out;
    }
    out.push_str("| File | SHA-256 |\n| --- | --- |\n");
    for file in &report.checksums_verified {
        out.push_str(&format!("| {} | `{}` |\n", cell(&file.path), file.sha256));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Analyzer;
    use crate::config::BucketSpec;

    fn records() -> Vec<Record> {
        [
            ("A1", "1 2", "father water"),
            ("A2", "3", "water water"),
            ("A3", "", "father king"),
        ]
        .iter()
        .map(|(id, tokens, text)| Record {
            id: id.to_string(),
            source_tokens: tokens.split_whitespace().map(str::to_string).collect(),
            translation_text: text.to_string(),
        })
        .collect()
    }

    fn analysis(records: &[Record]) -> AnalysisResult {
        Analyzer::new(
            &[BucketSpec {
                name: "family".into(),
                label: Some("Family Terms".into()),
                members: vec!["father".into()],
            }],
            &[],
        )
        .expect("analyzer")
        .analyze(records)
    }

    fn manifest(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn sections_follow_manifest_order() {
        let records = records();
        let analysis = analysis(&records);
        let ctx = ComposeContext {
            analysis: &analysis,
            records: &records,
            gate: None,
        };
        let mut statics = StaticSections::new();
        statics.insert(StaticSection::parse("intro", "# Welcome\n\nHello *there*.\n"));
        let sections = compose(
            &ctx,
            &statics,
            &Templates::builtin(),
            &manifest(&["word-frequency", "intro", "corpus-summary"]),
        )
        .expect("compose");
        let keys: Vec<(usize, &str)> = sections.iter().map(|s| (s.ordinal, s.key.as_str())).collect();
        assert_eq!(keys, vec![(1, "word-frequency"), (2, "intro"), (3, "corpus-summary")]);
        assert_eq!(sections[1].title, "Welcome");
        assert_eq!(sections[1].body, "Hello *there*.\n");
        assert_eq!(sections[1].source, SectionSource::Static);
        assert_eq!(sections[0].file_name(), "01-word-frequency.md");
    }

    #[test]
    fn missing_template_names_the_key() {
        let records = records();
        let analysis = analysis(&records);
        let ctx = ComposeContext {
            analysis: &analysis,
            records: &records,
            gate: None,
        };
        let err = compose(
            &ctx,
            &StaticSections::new(),
            &Templates::builtin(),
            &manifest(&["corpus-summary", "appendix-z"]),
        )
        .unwrap_err();
        assert!(matches!(err, ComposeError::TemplateMissing { ref key } if key == "appendix-z"));
        assert!(err.to_string().contains("appendix-z"));
    }

    #[test]
    fn word_table_keeps_analyzer_order_and_prose_matches_first_row() {
        let records = records();
        let analysis = analysis(&records);
        let body = word_frequency(&analysis, 10);
        assert!(body.starts_with("The most frequent word is **water** with 3 occurrences (50.0% of 6 tokens)."));
        let water = body.find("| 1 | water | 3 | 50.0% |").expect("water row");
        let father = body.find("| 2 | father | 2 | 33.3% |").expect("father row");
        let king = body.find("| 3 | king | 1 | 16.7% |").expect("king row");
        assert!(water < father && father < king);
    }

    #[test]
    fn word_table_respects_limit() {
        let records = records();
        let analysis = analysis(&records);
        let body = word_frequency(&analysis, 1);
        assert!(body.contains("| 1 | water |"));
        assert!(!body.contains("| 2 |"));
        assert!(body.contains("Showing 1 of 3 distinct words."));
    }

    #[test]
    fn composition_is_deterministic() {
        let records = records();
        let analysis = analysis(&records);
        let ctx = ComposeContext {
            analysis: &analysis,
            records: &records,
            gate: None,
        };
        let keys = manifest(&[
            "corpus-summary",
            "word-frequency",
            "category-analysis",
            "derived-ratios",
            "record-catalogue",
            "integrity-appendix",
        ]);
        let first = compose(&ctx, &StaticSections::new(), &Templates::builtin(), &keys).expect("compose");
        let second = compose(&ctx, &StaticSections::new(), &Templates::builtin(), &keys).expect("compose");
        assert_eq!(first, second);
    }

    #[test]
    fn overrides_retitle_and_limit_catalogue() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "record-catalogue".to_string(),
            GeneratorSpec {
                kind: GeneratorKind::RecordCatalogue,
                title: Some("Sample Inscriptions".to_string()),
                limit: Some(2),
            },
        );
        specs.insert(
            "top-words".to_string(),
            GeneratorSpec {
                kind: GeneratorKind::WordFrequency,
                title: None,
                limit: Some(2),
            },
        );
        let templates = Templates::builtin().with_overrides(&specs);
        let records = records();
        let analysis = analysis(&records);
        let ctx = ComposeContext {
            analysis: &analysis,
            records: &records,
            gate: None,
        };
        let sections = compose(
            &ctx,
            &StaticSections::new(),
            &templates,
            &manifest(&["record-catalogue", "top-words"]),
        )
        .expect("compose");
        assert_eq!(sections[0].title, "Sample Inscriptions");
        assert!(sections[0].body.contains("| A2 | 3 | water water |"));
        assert!(!sections[0].body.contains("A3"));
        assert!(sections[0].body.contains("1 further records omitted"));
        assert_eq!(sections[1].title, "Top Words");
    }

    #[test]
    fn generator_wins_over_static_with_same_key() {
        let records = records();
        let analysis = analysis(&records);
        let ctx = ComposeContext {
            analysis: &analysis,
            records: &records,
            gate: None,
        };
        let mut statics = StaticSections::new();
        statics.insert(StaticSection::parse("corpus-summary", "hand written"));
        let sections = compose(&ctx, &statics, &Templates::builtin(), &manifest(&["corpus-summary"]))
            .expect("compose");
        assert_eq!(sections[0].source, SectionSource::Generated);
        assert!(sections[0].body.contains("| Records | 3 |"));
    }

    #[test]
    fn static_section_without_heading_takes_title_from_key() {
        let section = StaticSection::parse("data_sources", "Plain body.\n");
        assert_eq!(section.title, "Data Sources");
        assert_eq!(section.body, "Plain body.\n");
    }

    #[test]
    fn markup_characters_in_words_stay_literal() {
        let records = vec![Record {
            id: "Q_1".into(),
            source_tokens: vec![],
            translation_text: "a*b*c a*b*c `tick` snake_case".into(),
        }];
        let a = Analyzer::new(&[], &[]).expect("analyzer").analyze(&records);
        let body = word_frequency(&a, 10);
        assert!(body.contains("**a\\*b\\*c**"));
        assert!(body.contains("| 1 | a\\*b\\*c | 2 |"));
        assert!(body.contains("| 3 | snake\\_case | 1 |"));

        let tex = crate::md_to_latex(&body);
        assert!(tex.contains("1 & a*b*c & 2"));
        assert!(tex.contains("snake\\_case"));
        assert!(!tex.contains("\\textit"));
        assert!(!tex.contains("\\texttt"));

        let catalogue = record_catalogue(&records, 5);
        assert!(catalogue.contains("| Q\\_1 | - | a\\*b\\*c a\\*b\\*c \\`tick\\` snake\\_case |"));
    }

    #[test]
    fn catalogue_escapes_pipes_and_marks_empty_cells() {
        let records = vec![Record {
            id: "X1".into(),
            source_tokens: vec![],
            translation_text: "a | b".into(),
        }];
        let body = record_catalogue(&records, 5);
        assert!(body.contains("| X1 | - | a \\| b |"));
    }

    #[test]
    fn integrity_appendix_lists_verified_files() {
        let report = GateReport {
            files_checked: vec!["corpus.tsv".into()],
            checksums_verified: vec![corpus_store::VerifiedFile {
                path: "corpus.tsv".into(),
                sha256: "ab".repeat(32),
            }],
            record_count: 3,
            corpus_sha256: "ab".repeat(32),
            corpus_manifest_sha256: Some("ab".repeat(32)),
        };
        let body = integrity_log(Some(&report));
        assert!(body.contains("admitted 3 records"));
        assert!(body.contains(&format!("| corpus.tsv | `{}` |", "ab".repeat(32))));
        assert_eq!(
            integrity_log(None),
            "No integrity report was supplied for this run.\n"
        );
    }
}
